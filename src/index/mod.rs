pub mod cache;
pub mod facet;
pub mod lru;

pub use cache::{IndexCache, IndexSource, SnapshotId, DEFAULT_INDEX_CAPACITY};
pub use facet::{DocId, FacetIndex, Postings};
pub use lru::LruCache;

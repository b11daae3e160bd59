pub mod engine;
pub mod evaluator;
pub mod matcher;
pub mod request;
pub mod result_cache;
pub mod server;

pub use engine::*;
pub use evaluator::{evaluate, summarize, FacetSummary, Matches};
pub use matcher::*;
pub use request::*;
pub use result_cache::{CachedResult, Lookup, ResultCache, DEFAULT_RESULT_CAPACITY, DEFAULT_RESULT_TTL};
pub use server::*;

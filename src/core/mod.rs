pub mod asset;
pub mod material;
pub mod record;

pub use asset::*;
pub use material::*;
pub use record::*;

pub mod api_cache;

pub use api_cache::{ApiCache, CacheStats};

//! Response cache, retried HTTP fetch and headless render fallback.

mod cache;
mod fetch;
mod http;
mod render;

pub use cache::{
    cache_key, CacheBackend, CacheEntry, FsCacheBackend, MemoryCacheBackend, ResponseCache,
    DEFAULT_CACHE_TTL,
};
pub use fetch::{FetchMode, Fetcher};
pub use http::{
    classify_reqwest_error, classify_status, identity_headers, random_user_agent, BackoffPolicy,
    FetchError, HttpClientConfig, HttpTransport, ReqwestTransport, RetryDisposition, USER_AGENTS,
};
pub use render::{ChromeRenderer, PageRenderer, RenderSettings};

pub const CRATE_NAME: &str = "jobscout-storage";

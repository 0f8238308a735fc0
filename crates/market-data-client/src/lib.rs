pub mod fallback;
pub mod http_client;

pub use fallback::{FallbackCacheProvider, PriceFetch};
pub use http_client::HttpPriceProvider;

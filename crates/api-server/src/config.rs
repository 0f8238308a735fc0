use std::env;

/// Boot-time configuration, sourced from the environment (`dotenvy` loads
/// a local `.env` first, matching the teacher's `data-loader`/`api-server`
/// pattern). No config file beyond the factor registry TOML.
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub registry_path: String,
    pub market_data_base_url: String,
    pub watchlist_symbols: Vec<String>,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://composite-bias-engine.db".to_string()),
            registry_path: env::var("REGISTRY_PATH").unwrap_or_else(|_| "factor_registry.toml".to_string()),
            market_data_base_url: env::var("MARKET_DATA_BASE_URL").unwrap_or_else(|_| "http://localhost:9000".to_string()),
            watchlist_symbols: env::var("WATCHLIST_SYMBOLS")
                .unwrap_or_else(|_| "SPY,QQQ,^VIX".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

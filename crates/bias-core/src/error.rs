use thiserror::Error;

/// The closed error taxonomy of the ingest and recompute paths.
///
/// Every variant here is surfaced to callers as a structured reason string
/// and, where the spec requires it, paired with an anomaly event on the
/// `anomaly` broadcast topic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("factor '{0}' is not known to the registry")]
    UnknownFactor(String),

    #[error("producer '{producer}' attempted to write factor '{factor_id}' owned by '{owner}'")]
    OwnershipViolation {
        factor_id: String,
        producer: String,
        owner: String,
    },

    #[error("score {0} outside permitted range [-1.0, 1.0]")]
    OutOfRange(f64),

    #[error("raw price {value} for symbol '{symbol}' outside sanity bounds [{min}, {max}]")]
    SanityBoundsViolation {
        symbol: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("cache/log/record store unreachable: {0}")]
    GatewayUnavailable(String),

    #[error("external provider timed out after {0:?}")]
    ProviderTimeout(std::time::Duration),

    #[error("registry or sanity-bounds configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("signal id '{0}' already recorded")]
    DuplicateSignalId(String),

    #[error("circuit breaker durable state missing on startup")]
    CircuitBreakerFallbackLost,

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Stable, machine-readable tag matching the §7 taxonomy names.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::UnknownFactor(_) => "UNKNOWN_FACTOR",
            EngineError::OwnershipViolation { .. } => "OWNERSHIP_VIOLATION",
            EngineError::OutOfRange(_) => "OUT_OF_RANGE",
            EngineError::SanityBoundsViolation { .. } => "OUT_OF_RANGE",
            EngineError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            EngineError::ProviderTimeout(_) => "PROVIDER_TIMEOUT",
            EngineError::ConfigInvalid(_) => "CONFIG_INVALID",
            EngineError::DuplicateSignalId(_) => "DUPLICATE_SIGNAL_ID",
            EngineError::CircuitBreakerFallbackLost => "CIRCUIT_BREAKER_FALLBACK_LOST",
            EngineError::Internal(_) => "INTERNAL",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

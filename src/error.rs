//! Engine error taxonomy.
//!
//! Every core operation fails fast with one of these variants instead of
//! substituting defaults. Retries belong to the feed / alert collaborators.

/// Typed failure of a core computation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Market input cannot be priced (non-positive spot or tenor, degenerate
    /// rate differential, non-positive forward).
    InvalidInput { reason: String },
    /// Strategy parameters are out of range.
    InvalidConfig { reason: String },
    /// A theoretical forward resolved to zero.
    DivisionByZero { context: &'static str },
    /// Backtest or sweep was handed no bars.
    EmptySeries,
    /// The rate feed failed to supply a quote for this tick.
    UpstreamFeedError { message: String },
    /// Cooperative cancellation was requested.
    Cancelled,
    /// A run exceeded its per-configuration time budget.
    DeadlineExceeded { budget_ms: u64 },
}

impl EngineError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamFeedError {
            message: message.into(),
        }
    }

    /// Interruptions are skipped by the optimizer; everything else aborts.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded { .. })
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "Invalid input: {}", reason),
            Self::InvalidConfig { reason } => write!(f, "Invalid config: {}", reason),
            Self::DivisionByZero { context } => write!(f, "Division by zero in {}", context),
            Self::EmptySeries => write!(f, "Empty series: no bars to evaluate"),
            Self::UpstreamFeedError { message } => write!(f, "Upstream feed error: {}", message),
            Self::Cancelled => write!(f, "Run cancelled"),
            Self::DeadlineExceeded { budget_ms } => {
                write!(f, "Run exceeded its {}ms budget", budget_ms)
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

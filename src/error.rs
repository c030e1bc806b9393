use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Fatal failures. Validation errors abort an operation before any write.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A mandatory cross-currency conversion has no usable (positive) rate.
    #[error("Exchange rate required: {0}")]
    RateRequired(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    /// The storage collaborator failed. Snapshot regeneration is idempotent,
    /// so callers may retry the whole operation blindly.
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Non-fatal data-quality signals. Warnings never abort a computation; they
/// are threaded through result structs so reports can flag "rate missing"
/// instead of silently showing an inaccurate total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A period or transaction rate was unavailable; the unconvertible
    /// portion contributed zero.
    UnknownRate { context: String },
    /// Ownership percentages for a property do not sum to ~100.
    InconsistentOwnership {
        property_id: String,
        percent_sum: Decimal,
    },
}

impl Warning {
    pub fn unknown_rate(context: impl Into<String>) -> Self {
        Self::UnknownRate {
            context: context.into(),
        }
    }
}

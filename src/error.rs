//! Rejections raised for domain-invalid calculation input

use thiserror::Error;

/// Input the engine refuses to compute with.
///
/// Missing catalog references and "not configured yet" denominators are
/// not errors; they cost 0 instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostError {
    #[error("failure rate must be in [0, 100), got {0}")]
    FailureRateOutOfRange(f64),

    #[error("profit margin must be below 100%, got {0}")]
    MarginOutOfRange(f64),

    #[error("{field} must not be negative, got {value}")]
    NegativeValue { field: String, value: f64 },

    #[error("{field} must be a finite number")]
    NonFinite { field: String },

    #[error("sale quantity must be at least 1")]
    EmptySale,
}

pub type CostResult<T> = std::result::Result<T, CostError>;

/// Reject NaN, infinities and negative values for a named input
pub(crate) fn ensure_non_negative(field: &str, value: f64) -> CostResult<()> {
    if !value.is_finite() {
        return Err(CostError::NonFinite {
            field: field.to_string(),
        });
    }
    if value < 0.0 {
        return Err(CostError::NegativeValue {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

//! Boundary checks for bars and parameters.
//!
//! The engine itself never rejects input; these checks let callers refuse
//! malformed data before running it.

use crate::data::PriceBar;
use crate::strategy::StrategyParameters;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("bar {index}: {field} is not a finite number")]
    NonFinite { index: usize, field: &'static str },

    #[error("bar {index}: {field} must be positive, got {value}")]
    NonPositivePrice {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("bar {index}: volume must be non-negative, got {value}")]
    NegativeVolume { index: usize, value: f64 },

    #[error("bar {index}: high {high} is below low {low}")]
    InvertedRange { index: usize, high: f64, low: f64 },

    #[error("bar {index}: timestamp {timestamp} does not follow {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    #[error("k must be in (0, 1], got {0}")]
    InvalidK(f64),

    #[error("fee rate must be a non-negative number, got {0}")]
    InvalidFeeRate(f64),
}

/// Returns the first problem found, scanning bars oldest first.
pub fn validate_bars(bars: &[PriceBar]) -> Result<(), ValidationError> {
    let mut previous: Option<DateTime<Utc>> = None;

    for (index, bar) in bars.iter().enumerate() {
        let prices = [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ];

        for (field, value) in prices {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { index, field });
            }
            if value <= 0.0 {
                return Err(ValidationError::NonPositivePrice { index, field, value });
            }
        }

        if !bar.volume.is_finite() {
            return Err(ValidationError::NonFinite {
                index,
                field: "volume",
            });
        }
        if bar.volume < 0.0 {
            return Err(ValidationError::NegativeVolume {
                index,
                value: bar.volume,
            });
        }

        if bar.high < bar.low {
            return Err(ValidationError::InvertedRange {
                index,
                high: bar.high,
                low: bar.low,
            });
        }

        if let Some(prev) = previous {
            if bar.timestamp <= prev {
                return Err(ValidationError::NonMonotonicTimestamp {
                    index,
                    previous: prev,
                    timestamp: bar.timestamp,
                });
            }
        }
        previous = Some(bar.timestamp);
    }

    Ok(())
}

impl StrategyParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.k.is_finite() || self.k <= 0.0 || self.k > 1.0 {
            return Err(ValidationError::InvalidK(self.k));
        }
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 {
            return Err(ValidationError::InvalidFeeRate(self.fee_rate));
        }
        Ok(())
    }
}

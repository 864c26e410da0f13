//! Capture size budgets.

use once_cell::sync::Lazy;
use regex::Regex;
use rewind_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest byte budget accepted. Anything less cannot hold one invocation.
pub const MIN_BYTES: u64 = 128;

static BUDGET_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(files?|gb|mb|kb|b)\s*$")
});

/// Budget parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    /// Not of the form `<n> files` or `<number><unit>`
    #[error("unrecognized capture limit {input:?}")]
    Unrecognized {
        /// Rejected input
        input: String,
    },
    /// File count that is zero or fractional
    #[error("file budget must be a positive whole number, got {input:?}")]
    InvalidFileCount {
        /// Rejected input
        input: String,
    },
    /// Byte budget below [`MIN_BYTES`]
    #[error("byte budget of {bytes} is below the minimum of {MIN_BYTES}")]
    TooSmall {
        /// Parsed size
        bytes: u64,
    },
}

impl From<BudgetError> for CoreError {
    fn from(err: BudgetError) -> Self {
        CoreError::Configuration {
            field: "capture_limit".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Limit applied to a capture before it is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Budget {
    /// Keep entities from at most this many distinct source files
    Files(usize),
    /// Keep invocations totalling at most this many encoded bytes
    Bytes(u64),
}

impl Budget {
    /// Parse a budget string such as `"3 files"`, `"512kb"` or `"1.5 MB"`
    ///
    /// # Errors
    ///
    /// Returns error if the string is not a budget or the budget is unusable
    pub fn parse(input: &str) -> Result<Self, BudgetError> {
        let unrecognized = || BudgetError::Unrecognized {
            input: input.to_string(),
        };
        let re = BUDGET_RE.as_ref().map_err(|_| unrecognized())?;
        let caps = re.captures(input).ok_or_else(unrecognized)?;
        let number = &caps[1];
        let unit = caps[2].to_ascii_lowercase();

        if unit.starts_with("file") {
            return match number.parse::<usize>() {
                Ok(0) | Err(_) => Err(BudgetError::InvalidFileCount {
                    input: input.to_string(),
                }),
                Ok(n) => Ok(Self::Files(n)),
            };
        }

        let scale: u64 = match unit.as_str() {
            "b" => 1,
            "kb" => 1 << 10,
            "mb" => 1 << 20,
            "gb" => 1 << 30,
            _ => return Err(unrecognized()),
        };
        let value: f64 = number.parse().map_err(|_| unrecognized())?;
        let bytes = (value * scale as f64).floor();
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(unrecognized());
        }
        let bytes = bytes as u64;
        if bytes < MIN_BYTES {
            return Err(BudgetError::TooSmall { bytes });
        }
        Ok(Self::Bytes(bytes))
    }

    /// Resolve an optional configured limit. An unusable limit is logged and
    /// treated as no limit.
    #[must_use]
    pub fn from_config(limit: Option<&str>) -> Option<Self> {
        let limit = limit?;
        match Self::parse(limit) {
            Ok(budget) => Some(budget),
            Err(err) => {
                tracing::warn!(%err, "ignoring capture limit, captures will not be limited");
                None
            }
        }
    }
}

impl FromStr for Budget {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Files(1) => write!(f, "1 file"),
            Self::Files(n) => write!(f, "{} files", n),
            Self::Bytes(n) => write!(f, "{}b", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_files() {
        assert_eq!(Budget::parse("1 file"), Ok(Budget::Files(1)));
        assert_eq!(Budget::parse("3 files"), Ok(Budget::Files(3)));
        assert_eq!(Budget::parse(" 12FILES "), Ok(Budget::Files(12)));
    }

    #[test]
    fn test_parse_sizes() {
        assert_eq!(Budget::parse("512b"), Ok(Budget::Bytes(512)));
        assert_eq!(Budget::parse("2kb"), Ok(Budget::Bytes(2048)));
        assert_eq!(Budget::parse("1.5 MB"), Ok(Budget::Bytes(1_572_864)));
        assert_eq!(Budget::parse("1gb"), Ok(Budget::Bytes(1 << 30)));
        assert_eq!(Budget::parse("0.2kb"), Ok(Budget::Bytes(204)));
    }

    #[test]
    fn test_parse_rejects() {
        assert!(matches!(Budget::parse(""), Err(BudgetError::Unrecognized { .. })));
        assert!(matches!(Budget::parse("lots"), Err(BudgetError::Unrecognized { .. })));
        assert!(matches!(Budget::parse("10"), Err(BudgetError::Unrecognized { .. })));
        assert!(matches!(Budget::parse("-1kb"), Err(BudgetError::Unrecognized { .. })));
        assert!(matches!(Budget::parse("0 files"), Err(BudgetError::InvalidFileCount { .. })));
        assert!(matches!(Budget::parse("1.5 files"), Err(BudgetError::InvalidFileCount { .. })));
        assert_eq!(Budget::parse("100b"), Err(BudgetError::TooSmall { bytes: 100 }));
    }

    #[test]
    fn test_from_config_falls_back_to_unlimited() {
        assert_eq!(Budget::from_config(None), None);
        assert_eq!(Budget::from_config(Some("garbage")), None);
        assert_eq!(Budget::from_config(Some("2 files")), Some(Budget::Files(2)));
    }

    #[test]
    fn test_display_reparses() {
        for budget in [Budget::Files(1), Budget::Files(4), Budget::Bytes(4096)] {
            assert_eq!(budget.to_string().parse::<Budget>(), Ok(budget));
        }
    }
}

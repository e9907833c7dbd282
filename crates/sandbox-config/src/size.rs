//! Byte-size strings such as `2g` or `512m`.

use crate::error::ConfigError;
use std::fmt;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

/// Smallest size accepted for memory and scratch limits.
pub const MIN_BYTES: u64 = MIB;
/// Largest size accepted for memory and scratch limits.
pub const MAX_BYTES: u64 = 64 * GIB;

/// A validated byte count in `[MIN_BYTES, MAX_BYTES]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Parse `<number><unit>` with unit one of `k`, `m`, `g`, `t` (binary multiples).
    pub fn parse(field: &str, raw: &str) -> Result<Self, ConfigError> {
        let text = raw.trim().to_ascii_lowercase();
        let Some(unit) = text.chars().last() else {
            return Err(ConfigError::invalid(field, "size must not be empty"));
        };
        let multiplier = match unit {
            'k' => KIB,
            'm' => MIB,
            'g' => GIB,
            't' => TIB,
            _ => {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{}' must end with one of k, m, g, t", raw),
                ))
            }
        };

        let number = &text[..text.len() - 1];
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(ConfigError::invalid(
                field,
                format!("'{}' must match <number><unit>", raw),
            ));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| ConfigError::invalid(field, format!("'{}' has an invalid number", raw)))?;

        let bytes = value * multiplier as f64;
        if !bytes.is_finite() || bytes < MIN_BYTES as f64 || bytes > MAX_BYTES as f64 {
            return Err(ConfigError::invalid(
                field,
                format!("'{}' must resolve to between 1 MiB and 64 GiB", raw),
            ));
        }
        Ok(Self(bytes.round() as u64))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % GIB == 0 {
            write!(f, "{}g", self.0 / GIB)
        } else if self.0 % MIB == 0 {
            write!(f, "{}m", self.0 / MIB)
        } else if self.0 % KIB == 0 {
            write!(f, "{}k", self.0 / KIB)
        } else {
            write!(f, "{}b", self.0)
        }
    }
}

//! Hash range bounds
//!
//! A shard owns an inclusive interval of a 2^32 hash ring. The interval is
//! written as `"<low>-<high>"` in hex and compared as signed 32-bit values,
//! so `80000000` is the lowest hash and `7fffffff` the highest.

use serde::{Deserialize, Serialize};

/// Number of hashes on the ring
pub const HASH_RING_SIZE: u64 = 1 << 32;

/// Range string parse/validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundsError {
    #[error("failed to split {0:?}")]
    Split(String),
    #[error("failed to parse {0:?}")]
    Parse(String),
    #[error("low should be <= high {0:?}")]
    Order(String),
}

/// Parsed hash interval, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: i32,
    pub high: i32,
}

impl Bounds {
    pub fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    /// Number of hashes covered, wrapping around the ring
    pub fn width(&self) -> u64 {
        (self.high as u32).wrapping_sub(self.low as u32) as u64 + 1
    }

    /// Fraction of the whole ring owned by this interval
    pub fn share(&self) -> f64 {
        self.width() as f64 / HASH_RING_SIZE as f64
    }

    /// Split the interval into two adjacent halves.
    ///
    /// The lower half ends at the midpoint; returns `None` for a single hash.
    pub fn halves(&self) -> Option<(Bounds, Bounds)> {
        if self.low >= self.high {
            return None;
        }
        let mid = (self.low as i64 + (self.high as i64 - self.low as i64) / 2) as i32;
        Some((Bounds::new(self.low, mid), Bounds::new(mid + 1, self.high)))
    }

    /// Render back to the `"<low>-<high>"` hex form
    pub fn to_range_string(&self) -> String {
        format!("{:x}-{:x}", self.low as u32, self.high as u32)
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Parse a `"<low>-<high>"` range string.
///
/// Split errors win over parse errors, which win over ordering errors.
pub fn compute_bounds(range: &str) -> Result<Bounds, BoundsError> {
    let mut parts = range.split('-');
    let (low, high) = match (parts.next(), parts.next(), parts.next()) {
        (Some(low), Some(high), None) => (low, high),
        _ => return Err(BoundsError::Split(range.to_string())),
    };

    let low = parse_hash(low)?;
    let high = parse_hash(high)?;
    if low > high {
        return Err(BoundsError::Order(range.to_string()));
    }

    Ok(Bounds { low, high })
}

/// Share of the hash ring owned by a range string
pub fn hash_range_share(range: &str) -> Result<f64, BoundsError> {
    compute_bounds(range).map(|b| b.share())
}

/// Parse one unsigned 32-bit hex token and reinterpret it as two's complement
fn parse_hash(token: &str) -> Result<i32, BoundsError> {
    // from_str_radix tolerates a leading '+', the range format does not
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(BoundsError::Parse(token.to_string()));
    }
    u32::from_str_radix(token, 16)
        .map(|v| v as i32)
        .map_err(|_| BoundsError::Parse(token.to_string()))
}

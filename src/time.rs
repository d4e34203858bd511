//! Scalar event time.
//!
//! Spec §3 asks for "a totally ordered domain supporting addition,
//! subtraction (`delta`), strict less-than, and normalization to `[0,1]`".
//! This is deliberately a thin newtype rather than a generic numeric trait:
//! every trace in this system carries nanosecond-resolution timestamps, and
//! a single concrete type keeps `followedByCounts`-style tables (§4.3)
//! hashable and `Ord` without a type parameter threading through the whole
//! crate.

use std::ops::{Add, Sub};

/// A point in time along a single trace, in nanoseconds since the trace's
/// first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The zero timestamp, used as the implicit origin of a trace.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Signed difference `self - other`, per spec's `delta`.
    pub fn delta(&self, other: &Timestamp) -> i64 {
        self.0 - other.0
    }
}

impl Add for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Timestamp) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Timestamp) -> Timestamp {
        Timestamp(self.0 - rhs.0)
    }
}

/// Rescales a trace's timestamps into `[0, 1]`, per the `traceNormalization`
/// option (spec §6). A single-event trace normalizes to `0.0` for its sole
/// point rather than dividing by zero.
pub fn normalize_trace(times: &[Timestamp]) -> Vec<f64> {
    let Some(min) = times.iter().min() else {
        return Vec::new();
    };
    let max = times.iter().max().expect("non-empty checked above");

    let span = (max.0 - min.0) as f64;
    if span == 0.0 {
        return times.iter().map(|_| 0.0).collect();
    }

    times
        .iter()
        .map(|t| (t.0 - min.0) as f64 / span)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_signed() {
        let a = Timestamp(10);
        let b = Timestamp(3);
        assert_eq!(a.delta(&b), 7);
        assert_eq!(b.delta(&a), -7);
    }

    #[test]
    fn normalize_spans_zero_to_one() {
        let times = vec![Timestamp(100), Timestamp(150), Timestamp(200)];
        let norm = normalize_trace(&times);
        assert_eq!(norm, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn normalize_single_point_is_zero() {
        let times = vec![Timestamp(42)];
        assert_eq!(normalize_trace(&times), vec![0.0]);
    }
}

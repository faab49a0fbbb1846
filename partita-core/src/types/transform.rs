//! Affine time transform between performance and reference pulse space

use crate::types::note::Timestamp;
use crate::types::segment::Segment;

/// `r = s * p + t`, where `p` is the performed time measured from
/// `t_coarse` and normalized by the performance segment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    /// Scale (reference pulses per performed pulse)
    pub s: f64,
    /// Offset in reference pulses
    pub t: f64,
    /// Discrete origin in performance time
    pub t_coarse: Timestamp,
}

impl Transform {
    pub fn new(s: f64, t: f64, t_coarse: Timestamp) -> Self {
        Self { s, t, t_coarse }
    }

    /// Identity with origin at `t_coarse`
    pub fn identity(t_coarse: Timestamp) -> Self {
        Self::new(1.0, 0.0, t_coarse)
    }

    /// Shift a performance timestamp to the transform's origin
    #[inline]
    pub fn local(&self, timestamp: Timestamp) -> Timestamp {
        timestamp.saturating_sub(self.t_coarse)
    }

    /// Performance pulses to reference pulses
    #[inline]
    pub fn apply(&self, p: f64) -> f64 {
        self.s * p + self.t
    }

    /// Position of a performed timestamp in reference pulse space
    #[inline]
    pub fn to_reference(&self, segment: &Segment, timestamp: Timestamp) -> f64 {
        self.apply(segment.normalize(self.local(timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        let transform = Transform::new(2.0, 1.0, 0);
        assert_eq!(transform.apply(3.0), 7.0);
    }

    #[test]
    fn test_to_reference_uses_coarse_origin() {
        let segment = Segment::new(1000.0, 1.0);
        let transform = Transform::new(0.5, 2.0, 10_000);

        // 12 s is 2 pulses after the origin, halved, plus 2
        assert_eq!(transform.to_reference(&segment, 12_000), 3.0);
    }

    #[test]
    fn test_local_saturates_at_extremes() {
        let transform = Transform::identity(Timestamp::MAX);
        assert_eq!(transform.local(Timestamp::MIN), Timestamp::MIN);

        let transform = Transform::identity(-5);
        assert_eq!(transform.local(Timestamp::MAX), Timestamp::MAX);
        assert_eq!(transform.local(10), 15);
    }
}

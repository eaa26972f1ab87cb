//! Zoom capability of a video track.

/// Step used when the reported range is degenerate (`min == max`).
const DEGENERATE_STEP: f64 = 0.5;

/// Hardware-reported `{min, max, step}` zoom range of the active video track.
///
/// Discovered once per stream activation. A stream without one makes every
/// zoom request a no-op.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomCapability {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ZoomCapability {
    /// `true` when the range is finite and ordered; anything else is treated
    /// as "no zoom support".
    pub fn is_usable(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Clamp a requested zoom level into `[min, max]`.
    ///
    /// ```
    /// use visionally::device::ZoomCapability;
    ///
    /// let caps = ZoomCapability { min: 1.0, max: 4.0, step: 0.1 };
    /// assert_eq!(caps.clamp(10.0), 4.0);
    /// assert_eq!(caps.clamp(0.2), 1.0);
    /// assert_eq!(caps.clamp(2.5), 2.5);
    /// ```
    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min, self.max)
    }

    /// Amount one zoom-in / zoom-out command moves: a tenth of the range,
    /// or a fixed step when the range is degenerate.
    pub fn increment(&self) -> f64 {
        let span = (self.max - self.min) / 10.0;
        if span > 0.0 {
            span
        } else {
            DEGENERATE_STEP
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: f64, max: f64) -> ZoomCapability {
        ZoomCapability { min, max, step: 0.1 }
    }

    #[test]
    fn increment_is_a_tenth_of_the_range() {
        assert!((caps(1.0, 5.0).increment() - 0.4).abs() < 1e-9);
        assert!((caps(0.0, 10.0).increment() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_range_uses_fixed_step() {
        assert_eq!(caps(2.0, 2.0).increment(), DEGENERATE_STEP);
    }

    #[test]
    fn clamp_holds_for_arbitrary_requests() {
        let c = caps(1.0, 8.0);
        for z in [-100.0, 0.0, 0.999, 1.0, 3.3, 8.0, 8.001, 1e9] {
            let applied = c.clamp(z);
            assert_eq!(applied, z.max(1.0).min(8.0));
            assert!(applied >= c.min && applied <= c.max);
        }
    }

    #[test]
    fn unusable_ranges_are_detected() {
        assert!(caps(1.0, 5.0).is_usable());
        assert!(caps(3.0, 3.0).is_usable());
        assert!(!caps(5.0, 1.0).is_usable());
        assert!(!caps(f64::NAN, 1.0).is_usable());
        assert!(!caps(1.0, f64::INFINITY).is_usable());
    }
}

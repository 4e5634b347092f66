//! Easing curves
//!
//! Maps linear progress in `[0, 1]` to eased progress. In `power` naming,
//! quad is "power1" and cubic is "power2": `EaseOutCubic` is the
//! "power2.out" curve used by score count-ups.

use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    #[default]
    Linear,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
}

impl Easing {
    /// Apply the curve to `t`, clamped into `[0, 1]`
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseInQuad => t * t,
            Easing::EaseOutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::EaseInCubic => t * t * t,
            Easing::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Easing::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 7] = [
        Easing::Linear,
        Easing::EaseInQuad,
        Easing::EaseOutQuad,
        Easing::EaseInOutQuad,
        Easing::EaseInCubic,
        Easing::EaseOutCubic,
        Easing::EaseInOutCubic,
    ];

    #[test]
    fn test_endpoints_are_fixed() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-9, "{:?}", easing);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9, "{:?}", easing);
        }
    }

    #[test]
    fn test_ease_out_front_loads_progress() {
        assert!((Easing::EaseOutQuad.apply(0.5) - 0.75).abs() < 1e-9);
        assert!(Easing::EaseOutQuad.apply(0.25) > Easing::Linear.apply(0.25));
    }

    #[test]
    fn test_ease_out_cubic_matches_power2_out() {
        for t in [0.1, 0.25, 0.5, 0.9] {
            let expected = 1.0 - (1.0 - t) * (1.0 - t) * (1.0 - t);
            assert!((Easing::EaseOutCubic.apply(t) - expected).abs() < 1e-12);
        }
        assert!((Easing::EaseOutCubic.apply(0.5) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_input_is_clamped() {
        assert_eq!(Easing::EaseOutQuad.apply(-3.0), 0.0);
        assert_eq!(Easing::EaseOutQuad.apply(7.0), 1.0);
    }
}

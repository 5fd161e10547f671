use uom::si::acceleration::{meter_per_second_squared, standard_gravity};
use uom::si::angular_velocity::{radian_per_second, revolution_per_minute};
use uom::si::f32::{Acceleration, AngularVelocity, Velocity};
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

/// Smallest denominator allowed in ratios involving lengths, wheelbase or rpm.
pub const EPSILON: f32 = 1e-3;

/// Linear interpolation between `a` and `b` with `t` clamped to [0, 1].
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0., 1.)
}

/// Moves `current` towards `target` by at most `max_delta`.
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + delta.signum() * max_delta
    }
}

/// Critically damped approach of `current` to `target` with no carried velocity.
///
/// The closed form is the one used by game engines' `SmoothDamp` when the velocity
/// reference starts at zero each call. The result never overshoots `target`.
pub fn smooth_damp(current: f32, target: f32, smooth_time: f32, dt: f32) -> f32 {
    if dt <= 0. {
        return current;
    }
    let omega = 2. / smooth_time.max(1e-4);
    let x = omega * dt;
    let decay = 1. / (1. + x + 0.48 * x * x + 0.235 * x * x * x);
    target + (current - target) * (1. + x) * decay
}

pub fn kmh_from_mps(mps: f32) -> f32 {
    Velocity::new::<meter_per_second>(mps).get::<kilometer_per_hour>()
}

pub fn rpm_from_rad_per_sec(rad_per_sec: f32) -> f32 {
    AngularVelocity::new::<radian_per_second>(rad_per_sec).get::<revolution_per_minute>()
}

pub fn g_from_mps2(accel: f32) -> f32 {
    Acceleration::new::<meter_per_second_squared>(accel).get::<standard_gravity>()
}

/// Replaces NaN/infinite values with `fallback`.
pub fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_move_towards_reaches_target() {
        assert_eq!(move_towards(0., 10., 4.), 4.);
        assert_eq!(move_towards(8., 10., 4.), 10.);
        assert_eq!(move_towards(10., 0., 3.), 7.);
    }

    #[test]
    fn test_lerp_clamps_parameter() {
        assert_eq!(lerp(35., 8., 0.), 35.);
        assert_eq!(lerp(35., 8., 2.), 8.);
        assert!((lerp(1., 0.7, 0.5) - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_unit_conversions() {
        assert!((kmh_from_mps(10.) - 36.).abs() < 1e-3);
        assert!((g_from_mps2(9.80665) - 1.).abs() < 1e-4);
        let one_rev_per_sec = std::f32::consts::TAU;
        assert!((rpm_from_rad_per_sec(one_rev_per_sec) - 60.).abs() < 1e-3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_smooth_damp_never_overshoots(
            current in -10_000f32..10_000f32,
            target in -10_000f32..10_000f32,
            smooth_time in 0.01f32..1.0f32,
            dt in 0.001f32..0.1f32,
        ) {
            let next = smooth_damp(current, target, smooth_time, dt);
            let lo = current.min(target) - 1e-2;
            let hi = current.max(target) + 1e-2;
            prop_assert!(next >= lo && next <= hi);
        }
    }
}

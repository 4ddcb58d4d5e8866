//! Spring integrator
//!
//! Semi-implicit Euler over a damped harmonic oscillator. Frame deltas are
//! split into fixed substeps of at most [`SUBSTEP`] seconds, so the result is
//! stable under large or jittery frame times.
//!
//! Spring state is kept in `f64` [`Lanes`] and only narrowed to `f32` when a
//! value is read. In `f32` a 1 ms step of a slow spring far from zero can be
//! smaller than the spacing between representable values, which freezes the
//! position short of its goal.

use crate::config::SpringConfig;
use crate::value::Components;
use smallvec::SmallVec;

/// Longest integration step, in seconds
pub const SUBSTEP: f32 = 0.001;

/// Longest frame delta a single call integrates, in seconds
pub const MAX_DELTA: f32 = 1.0;

/// Settle thresholds never go below this many `f32` steps at the value's
/// magnitude; anything finer cannot be observed once narrowed
pub const PRECISION_ULPS: f64 = 4.0;

/// Integration state for one spring, one lane per component
pub type Lanes = SmallVec<[f64; 4]>;

/// Widen output components into integration lanes
pub fn widen(components: &[f32]) -> Lanes {
    components.iter().map(|&c| c as f64).collect()
}

/// Narrow integration lanes back into output components
pub fn narrow(lanes: &[f64]) -> Components {
    lanes.iter().map(|&c| c as f32).collect()
}

/// Largest absolute difference between two equally sized lane lists
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// `precision` raised to the `f32` resolution around `values` and `goals`
pub fn settle_precision(precision: f32, values: &[f64], goals: &[f64]) -> f64 {
    let magnitude = values
        .iter()
        .chain(goals)
        .map(|c| c.abs())
        .fold(0.0, f64::max);
    (precision as f64).max(PRECISION_ULPS * f32::EPSILON as f64 * magnitude)
}

/// Result of advancing a spring by one frame delta
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    /// Every component reached its goal with near-zero velocity
    pub settled: bool,
    /// Number of substeps actually integrated
    pub substeps: u32,
}

/// Check the two-part termination condition for every component
///
/// Position alone is not enough: a spring can pass within `precision` of the
/// goal while still moving fast, which shows up as a late visible jump.
pub fn is_settled(values: &[f64], velocities: &[f64], goals: &[f64], precision: f64) -> bool {
    values
        .iter()
        .zip(velocities)
        .zip(goals)
        .all(|((x, v), g)| (x - g).abs() < precision && v.abs() < precision)
}

/// Advance `values`/`velocities` toward `goals` by `dt` seconds
///
/// `dt` is capped at [`MAX_DELTA`]. On settle the values snap to the goals
/// and velocities are zeroed.
pub fn step(
    values: &mut [f64],
    velocities: &mut [f64],
    goals: &[f64],
    config: &SpringConfig,
    precision: f32,
    dt: f32,
) -> StepOutcome {
    debug_assert_eq!(values.len(), goals.len());
    debug_assert_eq!(velocities.len(), goals.len());

    if config.immediate {
        snap(values, velocities, goals);
        return StepOutcome {
            settled: true,
            substeps: 0,
        };
    }

    let precision = settle_precision(precision, values, goals);
    if dt.is_nan() || dt <= 0.0 {
        return StepOutcome {
            settled: is_settled(values, velocities, goals, precision),
            substeps: 0,
        };
    }

    let dt = dt.min(MAX_DELTA) as f64;
    let count = ((dt / SUBSTEP as f64).ceil() as u32).max(1);
    let h = dt / count as f64;
    let tension = config.tension as f64;
    let friction = config.friction as f64;
    let mass = config.mass as f64;

    for substep in 1..=count {
        for i in 0..values.len() {
            let displacement = values[i] - goals[i];
            let spring_force = -tension * displacement;
            let damping_force = -friction * velocities[i];
            let acceleration = (spring_force + damping_force) / mass;

            velocities[i] += acceleration * h;
            values[i] += velocities[i] * h;

            if config.clamp && crossed(displacement, values[i] - goals[i]) {
                values[i] = goals[i];
                velocities[i] = 0.0;
            }
        }

        if is_settled(values, velocities, goals, precision) {
            snap(values, velocities, goals);
            return StepOutcome {
                settled: true,
                substeps: substep,
            };
        }
    }

    StepOutcome {
        settled: false,
        substeps: count,
    }
}

/// Whether the displacement changed sign (or landed exactly on the goal)
fn crossed(before: f64, after: f64) -> bool {
    before != 0.0 && (after == 0.0 || after.signum() != before.signum())
}

fn snap(values: &mut [f64], velocities: &mut [f64], goals: &[f64]) {
    values.copy_from_slice(goals);
    velocities.fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    /// Frame on which the spring settles, counting from 1
    fn run_until_settled(config: &SpringConfig, from: f32, to: f32, precision: f32) -> u32 {
        let mut value = [from as f64];
        let mut velocity = [0.0];
        for frame in 1..=10_000 {
            let outcome = step(&mut value, &mut velocity, &[to as f64], config, precision, FRAME);
            if outcome.settled {
                return frame;
            }
        }
        panic!("spring from {from} to {to} did not settle");
    }

    #[test]
    fn test_default_config_converges_without_overshoot() {
        let config = SpringConfig::default();
        let mut value = [0.0];
        let mut velocity = [0.0];
        let mut frames = 0;

        loop {
            frames += 1;
            let outcome = step(&mut value, &mut velocity, &[100.0], &config, 0.01, FRAME);
            assert!(value[0] <= 100.01, "overshot to {}", value[0]);
            if outcome.settled {
                break;
            }
            assert!(frames < 600);
        }

        assert!((99.99..=100.01).contains(&value[0]));
        assert_eq!(velocity[0], 0.0);
        // Regression baseline for 0 -> 100 at 60fps
        assert_eq!(frames, 68);
    }

    #[test]
    fn test_large_magnitudes_reach_their_goal() {
        let config = SpringConfig::default();
        for (from, to, precision) in [
            (10_000.0, 10_000.5, 0.0005),
            (20_000.0, 20_003.0, 0.003),
            (1.0e6, 1.0e6 + 100.0, 0.01),
            (-5.0e5, -5.0e5 - 0.25, 0.00025),
        ] {
            let frames = run_until_settled(&config, from, to, precision);
            assert!(frames < 200, "{from} -> {to} took {frames} frames");
        }
    }

    #[test]
    fn test_precision_is_floored_at_f32_resolution() {
        let floor = settle_precision(1e-5, &[1.0e6], &[1.0e6 + 100.0]);
        assert!(floor > 0.4 && floor < 0.5);
        assert_eq!(settle_precision(0.01, &[0.0], &[100.0]), 0.01f32 as f64);
    }

    #[test]
    fn test_huge_delta_is_capped() {
        let config = SpringConfig::molasses();
        let mut value = [0.0];
        let mut velocity = [0.0];
        let outcome = step(&mut value, &mut velocity, &[100.0], &config, 0.01, 1.0e9);
        assert!(outcome.substeps <= 1_000);
        assert!(value[0].is_finite());
    }

    #[test]
    fn test_immediate_jumps_in_one_step() {
        let config = SpringConfig::default().with_immediate(true);
        let mut value = [0.0, 0.0];
        let mut velocity = [3.0, -3.0];
        let outcome = step(&mut value, &mut velocity, &[1e6, -5.0], &config, 0.01, 0.0);
        assert!(outcome.settled);
        assert_eq!(value, [1e6, -5.0]);
        assert_eq!(velocity, [0.0, 0.0]);
    }

    #[test]
    fn test_clamp_never_crosses_goal() {
        let config = SpringConfig::wobbly().with_clamp(true);
        let mut value = [0.0];
        let mut velocity = [0.0];
        for _ in 0..300 {
            step(&mut value, &mut velocity, &[100.0], &config, 0.01, FRAME);
            assert!(value[0] <= 100.0);
        }
        assert_eq!(value[0], 100.0);
    }

    #[test]
    fn test_unclamped_wobbly_overshoots() {
        let config = SpringConfig::wobbly();
        let mut value = [0.0];
        let mut velocity = [0.0];
        let mut peak = 0.0f64;
        for _ in 0..120 {
            step(&mut value, &mut velocity, &[100.0], &config, 0.01, FRAME);
            peak = peak.max(value[0]);
        }
        assert!(peak > 100.5);
    }

    #[test]
    fn test_finer_precision_never_settles_sooner() {
        let config = SpringConfig::wobbly();
        let mut previous = 0;
        for precision in [1.0, 0.1, 0.01, 0.001] {
            let frames = run_until_settled(&config, 0.0, 100.0, precision);
            assert!(frames >= previous);
            previous = frames;
        }
    }

    #[test]
    fn test_large_frame_delta_stays_stable() {
        let config = SpringConfig::stiff();
        let mut value = [0.0];
        let mut velocity = [0.0];
        for _ in 0..20 {
            step(&mut value, &mut velocity, &[1000.0], &config, 0.01, 0.25);
            assert!(value[0].is_finite());
            assert!(value[0] < 2000.0 && value[0] > -500.0);
        }
        assert_eq!(value[0], 1000.0);
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let config = SpringConfig::default();
        let mut value = [1.0];
        let mut velocity = [2.0];
        let outcome = step(&mut value, &mut velocity, &[5.0], &config, 0.01, 0.0);
        assert!(!outcome.settled);
        assert_eq!(outcome.substeps, 0);
        assert_eq!(value, [1.0]);
        assert_eq!(velocity, [2.0]);
    }

    #[test]
    fn test_vector_settles_only_when_all_components_rest() {
        let config = SpringConfig::default();
        let mut value = [0.0, 99.999];
        let mut velocity = [0.0, 0.0];
        let outcome = step(&mut value, &mut velocity, &[100.0, 100.0], &config, 0.01, FRAME);
        assert!(!outcome.settled);
        assert!(value[1] < 100.01);
    }
}

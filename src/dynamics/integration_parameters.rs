use crate::math::Real;
use na::RealField;

/// Parameters for a time-step of the physics engine.
///
/// Besides the timestep length and iteration counts, this holds the global tolerances shared
/// by every joint: the slops below which position errors are ignored, the largest correction
/// applied by a single position iteration, and the sleep thresholds.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct IntegrationParameters {
    /// The timestep length (default: `1.0 / 60.0`).
    pub dt: Real,
    /// Number of velocity iterations run by the joint solver at each step (default: `8`).
    pub velocity_iterations: usize,
    /// Maximum number of position iterations run by the joint solver at each step (default: `3`).
    pub position_iterations: usize,
    /// Whether the impulses found at the previous step seed the current one (default: `true`).
    pub warm_starting: bool,

    /// Linear position error the position solver won’t attempt to correct (default: `0.005`).
    pub linear_slop: Real,
    /// Angular position error the position solver won’t attempt to correct (default: `2°`).
    pub angular_slop: Real,
    /// Largest linear correction applied by one position iteration (default: `0.2`).
    ///
    /// This prevents overshoot.
    pub max_linear_correction: Real,
    /// Largest angular correction applied by one position iteration (default: `8°`).
    pub max_angular_correction: Real,
    /// Largest distance a body can travel during one step (default: `2.0`).
    ///
    /// Velocities exceeding this are scaled down before integrating positions.
    pub max_translation: Real,
    /// Largest angle a body can rotate by during one step (default: `π / 2`).
    pub max_rotation: Real,

    /// How long an island must remain still before falling asleep (default: `0.5`).
    pub time_to_sleep: Real,
    /// Linear velocity below which a body is considered still (default: `0.01`).
    pub linear_sleep_tolerance: Real,
    /// Angular velocity below which a body is considered still (default: `2°/s`).
    pub angular_sleep_tolerance: Real,
}

impl IntegrationParameters {
    /// The inverse of the time-stepping length, i.e. the steps per seconds (Hz).
    ///
    /// This is zero if `self.dt` is zero.
    #[inline(always)]
    pub fn inv_dt(&self) -> Real {
        if self.dt == 0.0 {
            0.0
        } else {
            1.0 / self.dt
        }
    }

    /// Sets the inverse time-stepping length (i.e. the frequency).
    ///
    /// This automatically recompute `self.dt`.
    #[inline]
    pub fn set_inv_dt(&mut self, inv_dt: Real) {
        if inv_dt == 0.0 {
            self.dt = 0.0
        } else {
            self.dt = 1.0 / inv_dt
        }
    }

    /// Parameters matching the default tolerances of the Box2D engine.
    pub fn box2d() -> Self {
        let degree = Real::pi() / 180.0;

        Self {
            dt: 1.0 / 60.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
            linear_slop: 0.005,
            angular_slop: 2.0 * degree,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 * degree,
            max_translation: 2.0,
            max_rotation: Real::frac_pi_2(),
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 * degree,
        }
    }

    /// The same parameters as [`Self::box2d`], without warm starting.
    pub fn box2d_without_warmstart() -> Self {
        Self {
            warm_starting: false,
            ..Self::box2d()
        }
    }
}

impl Default for IntegrationParameters {
    fn default() -> Self {
        Self::box2d()
    }
}

/// The per-step record handed to every joint by the island solver.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeStep {
    /// The length of this step.
    pub dt: Real,
    /// The inverse of `dt`, or zero if `dt` is zero.
    pub inv_dt: Real,
    /// `dt` multiplied by the inverse length of the previous step.
    ///
    /// Warm-starting impulses are scaled by this ratio, so that a change of timestep length
    /// does not apply the previous impulses with the wrong magnitude.
    pub dt_ratio: Real,
    /// Number of velocity iterations for this step.
    pub velocity_iterations: usize,
    /// Maximum number of position iterations for this step.
    pub position_iterations: usize,
    /// Whether the accumulated impulses are kept and re-applied during initialization.
    pub warm_starting: bool,
}

impl TimeStep {
    /// The record of a step of length `params.dt` following a step of inverse length `prev_inv_dt`.
    pub fn new(params: &IntegrationParameters, prev_inv_dt: Real) -> Self {
        Self {
            dt: params.dt,
            inv_dt: params.inv_dt(),
            dt_ratio: prev_inv_dt * params.dt,
            velocity_iterations: params.velocity_iterations,
            position_iterations: params.position_iterations,
            warm_starting: params.warm_starting,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{IntegrationParameters, TimeStep};
    use approx::assert_relative_eq;

    #[test]
    fn timestep_ratio_follows_previous_step() {
        let mut params = IntegrationParameters::default();
        params.set_inv_dt(30.0);
        let step = TimeStep::new(&params, 60.0);
        assert_relative_eq!(step.inv_dt, 30.0, epsilon = 1.0e-4);
        assert_relative_eq!(step.dt_ratio, 2.0, epsilon = 1.0e-5);

        params.dt = 0.0;
        assert_eq!(params.inv_dt(), 0.0);
        assert_eq!(TimeStep::new(&params, 60.0).dt_ratio, 0.0);
    }
}

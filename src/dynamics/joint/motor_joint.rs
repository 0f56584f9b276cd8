use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{IntegrationParameters, JointConstraint, RigidBody, TimeStep};
use crate::math::{Matrix2, Point, Real, Vector};
use crate::utils;

/// A joint driving the pose of its second body toward a target offset relative to its
/// first body, with a bounded force and torque.
///
/// The linear offset is the position of the second body's origin in the local frame of the
/// first body. The angular offset is the target relative angle.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct MotorJoint {
    linear_offset: Point<Real>,
    angular_offset: Real,
    max_force: Real,
    max_torque: Real,
    correction_factor: Real,

    linear_impulse: Vector<Real>,
    angular_impulse: Real,

    r1: Vector<Real>,
    r2: Vector<Real>,
    linear_error: Vector<Real>,
    angular_error: Real,
    linear_mass: Matrix2<Real>,
    angular_mass: Real,
}

impl Default for MotorJoint {
    fn default() -> Self {
        Self::new(Point::origin(), 0.0)
    }
}

impl MotorJoint {
    /// Creates a motor joint with the given target offsets.
    ///
    /// The maximum force and torque are `1.0`, and the correction factor `0.3`.
    pub fn new(linear_offset: Point<Real>, angular_offset: Real) -> Self {
        Self {
            linear_offset,
            angular_offset,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
            linear_impulse: Vector::zeros(),
            angular_impulse: 0.0,
            r1: Vector::zeros(),
            r2: Vector::zeros(),
            linear_error: Vector::zeros(),
            angular_error: 0.0,
            linear_mass: Matrix2::zeros(),
            angular_mass: 0.0,
        }
    }

    /// Creates a motor joint whose target is the current relative pose of the bodies.
    pub fn from_world(body1: Option<&RigidBody>, body2: &RigidBody) -> Self {
        let origin2 = Point::from(body2.position().translation.vector);
        match body1 {
            Some(body1) => Self::new(body1.local_point(&origin2), body2.angle() - body1.angle()),
            None => Self::new(origin2, body2.angle()),
        }
    }

    /// The target position of the second body's origin, in the local frame of the first body.
    pub fn linear_offset(&self) -> Point<Real> {
        self.linear_offset
    }

    /// Sets the target position of the second body's origin.
    pub fn set_linear_offset(&mut self, offset: Point<Real>) -> &mut Self {
        self.linear_offset = offset;
        self
    }

    /// The target relative angle.
    pub fn angular_offset(&self) -> Real {
        self.angular_offset
    }

    /// Sets the target relative angle.
    pub fn set_angular_offset(&mut self, offset: Real) -> &mut Self {
        self.angular_offset = offset;
        self
    }

    /// The maximum force applied to reach the linear offset.
    pub fn max_force(&self) -> Real {
        self.max_force
    }

    /// Sets the maximum force applied to reach the linear offset.
    pub fn set_max_force(&mut self, force: Real) -> &mut Self {
        self.max_force = force;
        self
    }

    /// The maximum torque applied to reach the angular offset.
    pub fn max_torque(&self) -> Real {
        self.max_torque
    }

    /// Sets the maximum torque applied to reach the angular offset.
    pub fn set_max_torque(&mut self, torque: Real) -> &mut Self {
        self.max_torque = torque;
        self
    }

    /// The fraction of the position error corrected at each step, in `[0, 1]`.
    pub fn correction_factor(&self) -> Real {
        self.correction_factor
    }

    /// Sets the fraction of the position error corrected at each step.
    pub fn set_correction_factor(&mut self, factor: Real) -> &mut Self {
        self.correction_factor = na::clamp(factor, 0.0, 1.0);
        self
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, p: Vector<Real>, angular: Real) {
        b1.apply_impulse(-p, &self.r1);
        b1.angvel -= b1.inv_inertia * angular;
        b2.apply_impulse(p, &self.r2);
        b2.angvel += b2.inv_inertia * angular;
    }
}

impl JointConstraint for MotorJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        _params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        // The anchors are the body origins.
        self.r1 = b1.arm(&Point::origin());
        self.r2 = b2.arm(&Point::origin());

        let k = utils::point_mass_matrix(
            b1.inv_mass,
            b1.inv_inertia,
            self.r1,
            b2.inv_mass,
            b2.inv_inertia,
            self.r2,
        );
        self.linear_mass = utils::inverse_or_zero(&k);
        self.angular_mass = utils::inv(b1.inv_inertia + b2.inv_inertia);

        self.linear_error = b2.center + self.r2
            - b1.center
            - self.r1
            - b1.world_vector(&self.linear_offset.coords);
        self.angular_error = b2.angle - b1.angle - self.angular_offset;

        if step.warm_starting {
            self.linear_impulse *= step.dt_ratio;
            self.angular_impulse *= step.dt_ratio;
            self.apply(&mut b1, &mut b2, self.linear_impulse, self.angular_impulse);
        } else {
            self.linear_impulse = Vector::zeros();
            self.angular_impulse = 0.0;
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();
        let bias_factor = step.inv_dt * self.correction_factor;

        {
            let cdot = b2.angvel - b1.angvel + bias_factor * self.angular_error;
            let impulse = -self.angular_mass * cdot;
            let old_impulse = self.angular_impulse;
            let max_impulse = step.dt * self.max_torque;
            self.angular_impulse = na::clamp(old_impulse + impulse, -max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;
            self.apply(&mut b1, &mut b2, Vector::zeros(), impulse);
        }

        {
            let cdot = b2.velocity_at(&self.r2) - b1.velocity_at(&self.r1)
                + self.linear_error * bias_factor;
            let impulse = -(self.linear_mass * cdot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = step.dt * self.max_force;
            if self.linear_impulse.norm_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }

            let impulse = self.linear_impulse - old_impulse;
            self.apply(&mut b1, &mut b2, impulse, 0.0);
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_position_constraints(
        &mut self,
        _params: &IntegrationParameters,
        _bodies: &mut JointBodies,
    ) -> bool {
        true
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        self.linear_impulse * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Real) -> Real {
        inv_dt * self.angular_impulse
    }
}

use crate::dynamics::joint::joint::local_point;
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{IntegrationParameters, JointConstraint, RigidBody, TimeStep};
use crate::math::{Matrix2, Point, Real, Vector};
use crate::utils;

/// A joint resisting the relative motion of two bodies, up to a maximum force and torque.
///
/// This is typically used for top-down friction, attaching a body to the ground.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FrictionJoint {
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    max_force: Real,
    max_torque: Real,

    linear_impulse: Vector<Real>,
    angular_impulse: Real,

    r1: Vector<Real>,
    r2: Vector<Real>,
    linear_mass: Matrix2<Real>,
    angular_mass: Real,
}

impl FrictionJoint {
    /// Creates a friction joint from its anchors, expressed in the local frame of each body.
    ///
    /// The maximum force and torque are zero: the joint does nothing until they are set.
    pub fn new(local_anchor1: Point<Real>, local_anchor2: Point<Real>) -> Self {
        Self {
            local_anchor1,
            local_anchor2,
            max_force: 0.0,
            max_torque: 0.0,
            linear_impulse: Vector::zeros(),
            angular_impulse: 0.0,
            r1: Vector::zeros(),
            r2: Vector::zeros(),
            linear_mass: Matrix2::zeros(),
            angular_mass: 0.0,
        }
    }

    /// Creates a friction joint acting at a world-space anchor.
    pub fn from_world(body1: Option<&RigidBody>, body2: &RigidBody, anchor: Point<Real>) -> Self {
        Self::new(local_point(body1, &anchor), body2.local_point(&anchor))
    }

    /// The anchor attached to the first body, in its local frame.
    pub fn local_anchor1(&self) -> Point<Real> {
        self.local_anchor1
    }

    /// The anchor attached to the second body, in its local frame.
    pub fn local_anchor2(&self) -> Point<Real> {
        self.local_anchor2
    }

    /// The maximum friction force.
    pub fn max_force(&self) -> Real {
        self.max_force
    }

    /// Sets the maximum friction force.
    pub fn set_max_force(&mut self, force: Real) -> &mut Self {
        self.max_force = force;
        self
    }

    /// The maximum friction torque.
    pub fn max_torque(&self) -> Real {
        self.max_torque
    }

    /// Sets the maximum friction torque.
    pub fn set_max_torque(&mut self, torque: Real) -> &mut Self {
        self.max_torque = torque;
        self
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, p: Vector<Real>, angular: Real) {
        b1.apply_impulse(-p, &self.r1);
        b1.angvel -= b1.inv_inertia * angular;
        b2.apply_impulse(p, &self.r2);
        b2.angvel += b2.inv_inertia * angular;
    }
}

impl JointConstraint for FrictionJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        _params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        self.r1 = b1.arm(&self.local_anchor1);
        self.r2 = b2.arm(&self.local_anchor2);

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

        {
            let cdot = b2.angvel - b1.angvel;
            let impulse = -self.angular_mass * cdot;
            let old_impulse = self.angular_impulse;
            let max_impulse = step.dt * self.max_torque;
            self.angular_impulse = na::clamp(old_impulse + impulse, -max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;
            self.apply(&mut b1, &mut b2, Vector::zeros(), impulse);
        }

        {
            let cdot = b2.velocity_at(&self.r2) - b1.velocity_at(&self.r1);
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

#[cfg(test)]
mod test {
    use super::FrictionJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{IntegrationParameters, JointConstraint};
    use crate::math::{Point, Vector};
    use approx::assert_relative_eq;

    #[test]
    fn slow_motion_is_stopped() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = FrictionJoint::new(Point::origin(), Point::origin());
        joint.set_max_force(100.0).set_max_torque(100.0);
        let mut b2 = body(0.0, 0.0, 0.0, 1.0, 1.0);
        b2.linvel = Vector::new(0.5, -0.5);
        b2.angvel = 0.5;
        let mut pair = Pair::fixed(b2);

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());

        let (_, b2) = pair.get();
        assert_relative_eq!(b2.linvel, Vector::zeros(), epsilon = 1.0e-6);
        assert_relative_eq!(b2.angvel, 0.0, epsilon = 1.0e-6);
        assert!(joint.solve_position_constraints(&params, &mut pair.bodies()));
    }

    #[test]
    fn fast_motion_is_only_slowed_down() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = FrictionJoint::new(Point::origin(), Point::origin());
        joint.set_max_force(6.0).set_max_torque(3.0);
        let mut b2 = body(0.0, 0.0, 0.0, 1.0, 1.0);
        b2.linvel = Vector::new(30.0, 40.0);
        b2.angvel = 10.0;
        let mut pair = Pair::fixed(b2);

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        for _ in 0..params.velocity_iterations {
            joint.solve_velocity_constraints(&step, &mut pair.bodies());
            assert!(joint.linear_impulse.norm() <= 6.0 * step.dt * (1.0 + 1.0e-5));
            assert!(joint.angular_impulse.abs() <= 3.0 * step.dt * (1.0 + 1.0e-5));
        }

        let (_, b2) = pair.get();
        // The force opposes the motion.
        let dv = 6.0 * step.dt;
        assert_relative_eq!(
            b2.linvel,
            Vector::new(30.0 - 0.6 * dv, 40.0 - 0.8 * dv),
            epsilon = 1.0e-4
        );
        assert_relative_eq!(b2.angvel, 10.0 - 3.0 * step.dt, epsilon = 1.0e-4);
        assert_relative_eq!(joint.reaction_torque(step.inv_dt), -3.0, epsilon = 1.0e-3);
    }
}

use crate::dynamics::solver::JointBodies;
use crate::dynamics::{IntegrationParameters, JointConstraint, RigidBody, TimeStep};
use crate::math::{Matrix2, Point, Real, Vector};
use crate::utils::{self, WCross};
use na::RealField;

/// A soft constraint dragging an anchor of a body toward a world-space target.
///
/// This joint must be attached to a fixed anchor: the target is expressed in world-space.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct MouseJoint {
    target: Point<Real>,
    local_anchor2: Point<Real>,
    max_force: Real,
    frequency: Real,
    damping_ratio: Real,

    impulse: Vector<Real>,

    r2: Vector<Real>,
    mass: Matrix2<Real>,
    c: Vector<Real>,
    beta: Real,
    gamma: Real,
}

impl MouseJoint {
    /// Creates a mouse joint dragging `local_anchor2`, given in the local frame of the body,
    /// toward `target`.
    ///
    /// The maximum force is zero, the frequency 5Hz, and the damping ratio 0.7.
    pub fn new(target: Point<Real>, local_anchor2: Point<Real>) -> Self {
        Self {
            target,
            local_anchor2,
            max_force: 0.0,
            frequency: 5.0,
            damping_ratio: 0.7,
            impulse: Vector::zeros(),
            r2: Vector::zeros(),
            mass: Matrix2::zeros(),
            c: Vector::zeros(),
            beta: 0.0,
            gamma: 0.0,
        }
    }

    /// Creates a mouse joint grabbing `body` at the world-space point `target`.
    pub fn from_world(body: &RigidBody, target: Point<Real>) -> Self {
        Self::new(target, body.local_point(&target))
    }

    /// The world-space target.
    pub fn target(&self) -> Point<Real> {
        self.target
    }

    /// Moves the world-space target.
    pub fn set_target(&mut self, target: Point<Real>) -> &mut Self {
        self.target = target;
        self
    }

    /// The dragged anchor, in the local frame of the body.
    pub fn local_anchor2(&self) -> Point<Real> {
        self.local_anchor2
    }

    /// The maximum force applied to the body.
    pub fn max_force(&self) -> Real {
        self.max_force
    }

    /// Sets the maximum force applied to the body.
    pub fn set_max_force(&mut self, force: Real) -> &mut Self {
        self.max_force = force;
        self
    }

    /// The response frequency, in Hertz.
    pub fn frequency(&self) -> Real {
        self.frequency
    }

    /// Sets the response frequency, in Hertz.
    pub fn set_frequency(&mut self, hz: Real) -> &mut Self {
        self.frequency = hz;
        self
    }

    /// The damping ratio, zero for no damping, one for critical damping.
    pub fn damping_ratio(&self) -> Real {
        self.damping_ratio
    }

    /// Sets the damping ratio.
    pub fn set_damping_ratio(&mut self, ratio: Real) -> &mut Self {
        self.damping_ratio = ratio;
        self
    }
}

impl JointConstraint for MouseJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        _params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (b1, mut b2) = bodies.pair();
        let mass = utils::inv(b2.inv_mass);

        let omega = Real::two_pi() * self.frequency;
        let damping = 2.0 * mass * self.damping_ratio * omega;
        let stiffness = mass * omega * omega;

        self.gamma = utils::inv(step.dt * (damping + step.dt * stiffness));
        self.beta = step.dt * stiffness * self.gamma;

        self.r2 = b2.arm(&self.local_anchor2);
        let mut k = utils::point_mass_matrix(
            0.0,
            0.0,
            Vector::zeros(),
            b2.inv_mass,
            b2.inv_inertia,
            self.r2,
        );
        k.m11 += self.gamma;
        k.m22 += self.gamma;
        self.mass = utils::inverse_or_zero(&k);

        self.c = b2.center + self.r2 - self.target;

        // Cheap rotational damping.
        b2.angvel *= 0.98;

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            b2.apply_impulse(self.impulse, &self.r2);
        } else {
            self.impulse = Vector::zeros();
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies) {
        let (b1, mut b2) = bodies.pair();
        let cdot = b2.linvel + b2.angvel.gcross(self.r2);
        let impulse = self.mass * -(cdot + self.c * self.beta + self.impulse * self.gamma);

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = step.dt * self.max_force;
        if self.impulse.norm_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.norm();
        }
        let impulse = self.impulse - old_impulse;

        b2.apply_impulse(impulse, &self.r2);
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
        self.impulse * inv_dt
    }

    fn reaction_torque(&self, _inv_dt: Real) -> Real {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::MouseJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{
        IntegrationParameters, Joint, JointConstraint, JointSet, RigidBodyBuilder, RigidBodySet,
    };
    use crate::math::{Point, Vector};
    use crate::pipeline::PhysicsPipeline;
    use approx::assert_relative_eq;

    #[test]
    fn impulse_is_clamped_by_the_max_force() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = MouseJoint::new(Point::new(100.0, 0.0), Point::origin());
        joint.set_max_force(50.0);
        let mut pair = Pair::fixed(body(0.0, 0.0, 0.0, 1.0, 1.0));

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        for _ in 0..params.velocity_iterations {
            joint.solve_velocity_constraints(&step, &mut pair.bodies());
            assert!(joint.impulse.norm() <= 50.0 * step.dt * (1.0 + 1.0e-5));
        }

        assert_relative_eq!(
            joint.reaction_force(step.inv_dt),
            Vector::new(50.0, 0.0),
            epsilon = 1.0e-3
        );
        assert!(joint.solve_position_constraints(&params, &mut pair.bodies()));
    }

    #[test]
    fn body_is_dragged_to_the_target() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let handle = bodies.insert(RigidBodyBuilder::new_dynamic().translation(1.0, 1.0));
        let mut mouse = MouseJoint::from_world(&bodies[handle], Point::new(1.0, 1.0));
        mouse.set_max_force(1000.0).set_target(Point::new(3.0, -1.0));
        let _ = joints.insert(Joint::fixed(handle, mouse), &mut bodies).unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        for _ in 0..300 {
            pipeline.step(&Vector::zeros(), &params, &mut bodies, &mut joints, &());
        }

        assert_relative_eq!(
            *bodies[handle].center_of_mass(),
            Point::new(3.0, -1.0),
            epsilon = 1.0e-2
        );
    }
}

use crate::dynamics::joint::joint::local_point;
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{IntegrationParameters, JointConstraint, RigidBody, TimeStep};
use crate::math::{Point, Real, Vector};
use crate::utils::{self, WCross};
use na::RealField;

/// A joint keeping two anchors at a given distance.
///
/// With a non-zero frequency, the joint behaves like a damped spring instead of a rigid rod.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct DistanceJoint {
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    length: Real,
    frequency: Real,
    damping_ratio: Real,

    impulse: Real,

    u: Vector<Real>,
    r1: Vector<Real>,
    r2: Vector<Real>,
    mass: Real,
    gamma: Real,
    bias: Real,
}

impl DistanceJoint {
    /// Creates a rigid distance joint from its anchors, expressed in the local frame of each
    /// body.
    pub fn new(local_anchor1: Point<Real>, local_anchor2: Point<Real>, length: Real) -> Self {
        Self {
            local_anchor1,
            local_anchor2,
            length,
            frequency: 0.0,
            damping_ratio: 0.0,
            impulse: 0.0,
            u: Vector::zeros(),
            r1: Vector::zeros(),
            r2: Vector::zeros(),
            mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    /// Creates a rigid distance joint between two world-space anchors, keeping their current
    /// distance.
    pub fn from_world(
        body1: Option<&RigidBody>,
        body2: &RigidBody,
        anchor1: Point<Real>,
        anchor2: Point<Real>,
    ) -> Self {
        Self::new(
            local_point(body1, &anchor1),
            body2.local_point(&anchor2),
            na::distance(&anchor1, &anchor2),
        )
    }

    /// The anchor attached to the first body, in its local frame.
    pub fn local_anchor1(&self) -> Point<Real> {
        self.local_anchor1
    }

    /// The anchor attached to the second body, in its local frame.
    pub fn local_anchor2(&self) -> Point<Real> {
        self.local_anchor2
    }

    /// The rest length.
    pub fn length(&self) -> Real {
        self.length
    }

    /// Sets the rest length.
    pub fn set_length(&mut self, length: Real) -> &mut Self {
        self.length = length;
        self
    }

    /// The mass-spring-damper frequency, in Hertz. Zero makes the joint rigid.
    pub fn frequency(&self) -> Real {
        self.frequency
    }

    /// Sets the mass-spring-damper frequency, in Hertz.
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

    /// The current distance between both anchors.
    pub fn current_length(&self, body1: &SolverBody, body2: &SolverBody) -> Real {
        na::distance(
            &body1.world_point(&self.local_anchor1),
            &body2.world_point(&self.local_anchor2),
        )
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, impulse: Real) {
        let p = self.u * impulse;
        b1.apply_impulse(-p, &self.r1);
        b2.apply_impulse(p, &self.r2);
    }
}

// The unit direction from the first anchor to the second one, and their distance.
fn direction(
    b1: &SolverBody,
    b2: &SolverBody,
    r1: &Vector<Real>,
    r2: &Vector<Real>,
    params: &IntegrationParameters,
) -> (Vector<Real>, Real) {
    let d = b2.center + r2 - b1.center - r1;
    let length = d.norm();
    if length > params.linear_slop {
        (d / length, length)
    } else {
        (Vector::zeros(), length)
    }
}

impl JointConstraint for DistanceJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        self.r1 = b1.arm(&self.local_anchor1);
        self.r2 = b2.arm(&self.local_anchor2);
        let (u, length) = direction(&b1, &b2, &self.r1, &self.r2, params);
        self.u = u;

        let cr1u = self.r1.gcross(u);
        let cr2u = self.r2.gcross(u);
        let mut inv_mass = b1.inv_mass
            + b1.inv_inertia * cr1u * cr1u
            + b2.inv_mass
            + b2.inv_inertia * cr2u * cr2u;
        self.mass = utils::inv(inv_mass);

        if self.frequency > 0.0 {
            let c = length - self.length;
            let omega = Real::two_pi() * self.frequency;
            let damping = 2.0 * self.mass * self.damping_ratio * omega;
            let stiffness = self.mass * omega * omega;

            self.gamma = utils::inv(step.dt * (damping + step.dt * stiffness));
            self.bias = c * step.dt * stiffness * self.gamma;
            inv_mass += self.gamma;
            self.mass = utils::inv(inv_mass);
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.apply(&mut b1, &mut b2, self.impulse);
        } else {
            self.impulse = 0.0;
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, _step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();
        let cdot = self
            .u
            .dot(&(b2.velocity_at(&self.r2) - b1.velocity_at(&self.r1)));
        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;
        self.apply(&mut b1, &mut b2, impulse);
        bodies.set_pair(&b1, &b2);
    }

    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool {
        if self.frequency > 0.0 {
            // Soft joints are not position-corrected.
            return true;
        }

        let (mut b1, mut b2) = bodies.pair();
        let r1 = b1.arm(&self.local_anchor1);
        let r2 = b2.arm(&self.local_anchor2);
        let (u, length) = direction(&b1, &b2, &r1, &r2, params);
        let c = na::clamp(
            length - self.length,
            -params.max_linear_correction,
            params.max_linear_correction,
        );

        let cr1u = r1.gcross(u);
        let cr2u = r2.gcross(u);
        let mass = utils::inv(
            b1.inv_mass + b1.inv_inertia * cr1u * cr1u + b2.inv_mass + b2.inv_inertia * cr2u * cr2u,
        );
        let p = u * (-mass * c);
        b1.apply_position_impulse(-p, &r1);
        b2.apply_position_impulse(p, &r2);
        bodies.set_pair(&b1, &b2);

        c.abs() < params.linear_slop
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        self.u * (self.impulse * inv_dt)
    }

    fn reaction_torque(&self, _inv_dt: Real) -> Real {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::DistanceJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{
        IntegrationParameters, Joint, JointConstraint, JointSet, RigidBodyBuilder, RigidBodySet,
    };
    use crate::math::{Point, Vector};
    use crate::pipeline::PhysicsPipeline;
    use approx::assert_relative_eq;

    #[test]
    fn rigid_joint_removes_the_separating_velocity() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = DistanceJoint::new(Point::new(0.2, 0.0), Point::new(0.0, 0.3), 2.0);
        let mut b1 = body(0.0, 0.0, 0.3, 1.0, 2.0);
        let mut b2 = body(2.0, 0.5, -0.4, 2.0, 1.0);
        b1.linvel = Vector::new(-1.0, 0.5);
        b2.linvel = Vector::new(3.0, 1.0);
        b2.angvel = 2.0;
        let mut pair = Pair::new(b1, b2);

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());

        let (b1, b2) = pair.get();
        let cdot = joint
            .u
            .dot(&(b2.velocity_at(&joint.r2) - b1.velocity_at(&joint.r1)));
        assert_relative_eq!(cdot, 0.0, epsilon = 1.0e-4);
        assert!(joint.impulse < 0.0);
    }

    #[test]
    fn position_correction_restores_the_length() {
        let params = IntegrationParameters::default();
        let mut joint = DistanceJoint::new(Point::origin(), Point::origin(), 1.0);
        let mut pair = Pair::new(body(0.0, 0.0, 0.0, 1.0, 1.0), body(1.5, 0.0, 0.0, 1.0, 1.0));

        let mut converged = false;
        for _ in 0..10 {
            if joint.solve_position_constraints(&params, &mut pair.bodies()) {
                converged = true;
                break;
            }
        }

        let (b1, b2) = pair.get();
        assert!(converged);
        assert_relative_eq!(joint.current_length(&b1, &b2), 1.0, epsilon = params.linear_slop);
        // Equal masses move by the same amount.
        assert_relative_eq!(b1.center.x, -(b2.center.x - 1.5), epsilon = 1.0e-5);
    }

    #[test]
    fn soft_joint_oscillates_around_its_rest_length() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let handle = bodies.insert(
            RigidBodyBuilder::new_dynamic()
                .translation(0.0, -1.0)
                .can_sleep(false),
        );
        let mut joint = DistanceJoint::new(Point::origin(), Point::origin(), 1.0);
        joint.set_frequency(2.0).set_damping_ratio(0.5);
        let _ = joints.insert(Joint::fixed(handle, joint), &mut bodies).unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        let mut max_length: f32 = 0.0;
        for _ in 0..600 {
            pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());
            max_length = max_length.max(-bodies[handle].center_of_mass().y);
        }

        // The spring stretches under the weight, then settles at the static elongation
        // g / ω² of a critically-stable spring.
        let omega = 2.0 * std::f32::consts::PI * 2.0;
        let elongation = 10.0 / (omega * omega);
        assert!(max_length > 1.0 + elongation);
        assert_relative_eq!(
            -bodies[handle].center_of_mass().y,
            1.0 + elongation,
            epsilon = 1.0e-2
        );
    }
}

use crate::dynamics::joint::joint::local_point;
use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{
    IntegrationParameters, JointConstraint, JointLimitState, RigidBody, TimeStep,
};
use crate::math::{Point, Real, Vector};
use crate::utils::{self, WCross};

/// The shortest length each side of a pulley can reach.
pub const MIN_PULLEY_LENGTH: Real = 2.0;

/// A joint hanging two bodies from ropes running over two fixed pulleys.
///
/// The total rope length is conserved: `length1 + ratio * length2 <= constant`. Each rope
/// is also individually bounded by a maximum length. Ropes can go slack: every constraint
/// is one-sided.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PulleyJoint {
    ground_anchor1: Point<Real>,
    ground_anchor2: Point<Real>,
    local_anchor1: Point<Real>,
    local_anchor2: Point<Real>,
    ratio: Real,
    constant: Real,
    max_length1: Real,
    max_length2: Real,

    impulse: Real,
    limit_impulse1: Real,
    limit_impulse2: Real,

    state: JointLimitState,
    limit_state1: JointLimitState,
    limit_state2: JointLimitState,

    u1: Vector<Real>,
    u2: Vector<Real>,
    r1: Vector<Real>,
    r2: Vector<Real>,
    pulley_mass: Real,
    limit_mass1: Real,
    limit_mass2: Real,
}

// The direction from a pulley to the rope end, and the rope length.
fn rope(
    body: &SolverBody,
    arm: &Vector<Real>,
    ground_anchor: &Point<Real>,
    params: &IntegrationParameters,
) -> (Vector<Real>, Real) {
    let u = body.center + arm - ground_anchor;
    let length = u.norm();
    if length > params.linear_slop {
        (u / length, length)
    } else {
        (Vector::zeros(), length)
    }
}

impl PulleyJoint {
    /// Creates a pulley joint.
    ///
    /// The ground anchors are the world-space positions of the pulleys; the local anchors
    /// are the rope ends, in the local frame of each body. `length1` and `length2` are the
    /// rope lengths defining the conserved total.
    pub fn new(
        ground_anchor1: Point<Real>,
        ground_anchor2: Point<Real>,
        local_anchor1: Point<Real>,
        local_anchor2: Point<Real>,
        length1: Real,
        length2: Real,
        ratio: Real,
    ) -> Self {
        let ratio = if ratio > 0.0 { ratio } else { 1.0 };
        let constant = length1 + ratio * length2;

        Self {
            ground_anchor1,
            ground_anchor2,
            local_anchor1,
            local_anchor2,
            ratio,
            constant,
            max_length1: constant - ratio * MIN_PULLEY_LENGTH,
            max_length2: (constant - MIN_PULLEY_LENGTH) / ratio,
            impulse: 0.0,
            limit_impulse1: 0.0,
            limit_impulse2: 0.0,
            state: JointLimitState::Inactive,
            limit_state1: JointLimitState::Inactive,
            limit_state2: JointLimitState::Inactive,
            u1: Vector::zeros(),
            u2: Vector::zeros(),
            r1: Vector::zeros(),
            r2: Vector::zeros(),
            pulley_mass: 0.0,
            limit_mass1: 0.0,
            limit_mass2: 0.0,
        }
    }

    /// Creates a pulley joint from world-space pulleys and rope ends, using the current rope
    /// lengths.
    pub fn from_world(
        body1: Option<&RigidBody>,
        body2: &RigidBody,
        ground_anchor1: Point<Real>,
        ground_anchor2: Point<Real>,
        anchor1: Point<Real>,
        anchor2: Point<Real>,
        ratio: Real,
    ) -> Self {
        Self::new(
            ground_anchor1,
            ground_anchor2,
            local_point(body1, &anchor1),
            body2.local_point(&anchor2),
            na::distance(&anchor1, &ground_anchor1),
            na::distance(&anchor2, &ground_anchor2),
            ratio,
        )
    }

    /// Lowers the maximum rope lengths. They can't exceed the bounds implied by the
    /// conserved total and [`MIN_PULLEY_LENGTH`].
    pub fn set_max_lengths(&mut self, max_length1: Real, max_length2: Real) -> &mut Self {
        self.max_length1 = max_length1.min(self.constant - self.ratio * MIN_PULLEY_LENGTH);
        self.max_length2 = max_length2.min((self.constant - MIN_PULLEY_LENGTH) / self.ratio);
        self
    }

    /// The world-space position of the first pulley.
    pub fn ground_anchor1(&self) -> Point<Real> {
        self.ground_anchor1
    }

    /// The world-space position of the second pulley.
    pub fn ground_anchor2(&self) -> Point<Real> {
        self.ground_anchor2
    }

    /// The rope end attached to the first body, in its local frame.
    pub fn local_anchor1(&self) -> Point<Real> {
        self.local_anchor1
    }

    /// The rope end attached to the second body, in its local frame.
    pub fn local_anchor2(&self) -> Point<Real> {
        self.local_anchor2
    }

    /// The pulley ratio.
    pub fn ratio(&self) -> Real {
        self.ratio
    }

    /// The conserved total length `length1 + ratio * length2`.
    pub fn constant(&self) -> Real {
        self.constant
    }

    /// The maximum length of the first rope.
    pub fn max_length1(&self) -> Real {
        self.max_length1
    }

    /// The maximum length of the second rope.
    pub fn max_length2(&self) -> Real {
        self.max_length2
    }

    /// The current length of the first rope.
    pub fn length1(&self, body1: &SolverBody) -> Real {
        na::distance(&body1.world_point(&self.local_anchor1), &self.ground_anchor1)
    }

    /// The current length of the second rope.
    pub fn length2(&self, body2: &SolverBody) -> Real {
        na::distance(&body2.world_point(&self.local_anchor2), &self.ground_anchor2)
    }

    fn apply1(&self, b1: &mut SolverBody, impulse: Real) {
        b1.apply_impulse(-self.u1 * impulse, &self.r1);
    }

    fn apply2(&self, b2: &mut SolverBody, impulse: Real) {
        b2.apply_impulse(-self.u2 * impulse, &self.r2);
    }
}

// A rope (or the whole pulley) is taut when it reaches its maximum length.
fn update_state(taut: bool, state: &mut JointLimitState, impulse: &mut Real) {
    if taut {
        if *state != JointLimitState::AtUpper {
            *impulse = 0.0;
        }
        *state = JointLimitState::AtUpper;
    } else {
        *state = JointLimitState::Inactive;
        *impulse = 0.0;
    }
}

impl JointConstraint for PulleyJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        self.r1 = b1.arm(&self.local_anchor1);
        self.r2 = b2.arm(&self.local_anchor2);
        let (u1, length1) = rope(&b1, &self.r1, &self.ground_anchor1, params);
        let (u2, length2) = rope(&b2, &self.r2, &self.ground_anchor2, params);
        self.u1 = u1;
        self.u2 = u2;

        let c = self.constant - length1 - self.ratio * length2;
        update_state(c <= 0.0, &mut self.state, &mut self.impulse);
        update_state(
            length1 >= self.max_length1,
            &mut self.limit_state1,
            &mut self.limit_impulse1,
        );
        update_state(
            length2 >= self.max_length2,
            &mut self.limit_state2,
            &mut self.limit_impulse2,
        );

        let cr1u1 = self.r1.gcross(u1);
        let cr2u2 = self.r2.gcross(u2);
        let inv_mass1 = b1.inv_mass + b1.inv_inertia * cr1u1 * cr1u1;
        let inv_mass2 = b2.inv_mass + b2.inv_inertia * cr2u2 * cr2u2;
        self.limit_mass1 = utils::inv(inv_mass1);
        self.limit_mass2 = utils::inv(inv_mass2);
        self.pulley_mass = utils::inv(inv_mass1 + self.ratio * self.ratio * inv_mass2);

        if step.warm_starting {
            self.impulse *= step.dt_ratio;
            self.limit_impulse1 *= step.dt_ratio;
            self.limit_impulse2 *= step.dt_ratio;
            self.apply1(&mut b1, self.impulse + self.limit_impulse1);
            self.apply2(&mut b2, self.ratio * self.impulse + self.limit_impulse2);
        } else {
            self.impulse = 0.0;
            self.limit_impulse1 = 0.0;
            self.limit_impulse2 = 0.0;
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_velocity_constraints(&mut self, _step: &TimeStep, bodies: &mut JointBodies) {
        let (mut b1, mut b2) = bodies.pair();

        if self.state == JointLimitState::AtUpper {
            let v1 = b1.velocity_at(&self.r1);
            let v2 = b2.velocity_at(&self.r2);
            let cdot = -self.u1.dot(&v1) - self.ratio * self.u2.dot(&v2);
            let impulse = -self.pulley_mass * cdot;
            let old_impulse = self.impulse;
            self.impulse = Real::max(0.0, self.impulse + impulse);
            let impulse = self.impulse - old_impulse;
            self.apply1(&mut b1, impulse);
            self.apply2(&mut b2, self.ratio * impulse);
        }

        if self.limit_state1 == JointLimitState::AtUpper {
            let cdot = -self.u1.dot(&b1.velocity_at(&self.r1));
            let impulse = -self.limit_mass1 * cdot;
            let old_impulse = self.limit_impulse1;
            self.limit_impulse1 = Real::max(0.0, self.limit_impulse1 + impulse);
            let impulse = self.limit_impulse1 - old_impulse;
            self.apply1(&mut b1, impulse);
        }

        if self.limit_state2 == JointLimitState::AtUpper {
            let cdot = -self.u2.dot(&b2.velocity_at(&self.r2));
            let impulse = -self.limit_mass2 * cdot;
            let old_impulse = self.limit_impulse2;
            self.limit_impulse2 = Real::max(0.0, self.limit_impulse2 + impulse);
            let impulse = self.limit_impulse2 - old_impulse;
            self.apply2(&mut b2, impulse);
        }

        bodies.set_pair(&b1, &b2);
    }

    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool {
        let (mut b1, mut b2) = bodies.pair();
        let max_correction = params.max_linear_correction;
        let mut linear_error: Real = 0.0;

        if self.state == JointLimitState::AtUpper {
            let r1 = b1.arm(&self.local_anchor1);
            let r2 = b2.arm(&self.local_anchor2);
            let (u1, length1) = rope(&b1, &r1, &self.ground_anchor1, params);
            let (u2, length2) = rope(&b2, &r2, &self.ground_anchor2, params);

            let c = self.constant - length1 - self.ratio * length2;
            linear_error = linear_error.max(-c);
            let c = na::clamp(c + params.linear_slop, -max_correction, 0.0);
            let impulse = -self.pulley_mass * c;

            b1.apply_position_impulse(-u1 * impulse, &r1);
            b2.apply_position_impulse(-u2 * (self.ratio * impulse), &r2);
        }

        if self.limit_state1 == JointLimitState::AtUpper {
            let r1 = b1.arm(&self.local_anchor1);
            let (u1, length1) = rope(&b1, &r1, &self.ground_anchor1, params);

            let c = self.max_length1 - length1;
            linear_error = linear_error.max(-c);
            let c = na::clamp(c + params.linear_slop, -max_correction, 0.0);
            let impulse = -self.limit_mass1 * c;
            b1.apply_position_impulse(-u1 * impulse, &r1);
        }

        if self.limit_state2 == JointLimitState::AtUpper {
            let r2 = b2.arm(&self.local_anchor2);
            let (u2, length2) = rope(&b2, &r2, &self.ground_anchor2, params);

            let c = self.max_length2 - length2;
            linear_error = linear_error.max(-c);
            let c = na::clamp(c + params.linear_slop, -max_correction, 0.0);
            let impulse = -self.limit_mass2 * c;
            b2.apply_position_impulse(-u2 * impulse, &r2);
        }

        bodies.set_pair(&b1, &b2);
        linear_error < params.linear_slop
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        self.u2 * (self.impulse * inv_dt)
    }

    fn reaction_torque(&self, _inv_dt: Real) -> Real {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::PulleyJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{
        IntegrationParameters, Joint, JointConstraint, JointLimitState, JointSet,
        RigidBodyBuilder, RigidBodySet,
    };
    use crate::math::{Point, Vector};
    use crate::pipeline::PhysicsPipeline;
    use approx::assert_relative_eq;

    fn hanging_pulley() -> PulleyJoint {
        PulleyJoint::new(
            Point::new(-1.0, 10.0),
            Point::new(1.0, 10.0),
            Point::origin(),
            Point::origin(),
            5.0,
            5.0,
            1.0,
        )
    }

    #[test]
    fn limits_derive_from_the_constant() {
        let mut joint = PulleyJoint::new(
            Point::origin(),
            Point::origin(),
            Point::origin(),
            Point::origin(),
            4.0,
            3.0,
            2.0,
        );
        assert_relative_eq!(joint.constant(), 10.0);
        assert_relative_eq!(joint.max_length1(), 6.0);
        assert_relative_eq!(joint.max_length2(), 4.0);

        joint.set_max_lengths(5.0, 100.0);
        assert_relative_eq!(joint.max_length1(), 5.0);
        assert_relative_eq!(joint.max_length2(), 4.0);
    }

    #[test]
    fn slack_rope_applies_no_impulse() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = hanging_pulley();
        let mut b1 = body(-1.0, 6.0, 0.0, 1.0, 1.0);
        b1.linvel = Vector::new(0.0, -1.0);
        let mut pair = Pair::new(b1, body(1.0, 6.0, 0.0, 1.0, 1.0));

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());

        assert_eq!(joint.state, JointLimitState::Inactive);
        assert_eq!(joint.impulse, 0.0);
        assert_eq!(pair.get().0.linvel, Vector::new(0.0, -1.0));
        assert!(joint.solve_position_constraints(&params, &mut pair.bodies()));
    }

    #[test]
    fn taut_rope_pulls_the_other_side() {
        let params = IntegrationParameters::default();
        let step = timestep(&params);
        let mut joint = hanging_pulley();
        let mut b1 = body(-1.0, 5.0, 0.0, 1.0, 1.0);
        b1.linvel = Vector::new(0.0, -1.0);
        let mut pair = Pair::new(b1, body(1.0, 5.0, 0.0, 1.0, 1.0));

        joint.init_velocity_constraints(&step, &params, &mut pair.bodies());
        joint.solve_velocity_constraints(&step, &mut pair.bodies());

        let (b1, b2) = pair.get();
        assert_eq!(joint.state, JointLimitState::AtUpper);
        assert!(joint.impulse > 0.0);
        // Equal masses: the falling body is slowed down by half, the other one lifted.
        assert_relative_eq!(b1.linvel, Vector::new(0.0, -0.5), epsilon = 1.0e-5);
        assert_relative_eq!(b2.linvel, Vector::new(0.0, 0.5), epsilon = 1.0e-5);
    }

    #[test]
    fn total_rope_length_is_conserved() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let heavy = bodies.insert(
            RigidBodyBuilder::new_dynamic()
                .translation(-1.0, 5.0)
                .mass(2.0),
        );
        let light = bodies.insert(RigidBodyBuilder::new_dynamic().translation(1.0, 5.0));
        let handle = joints
            .insert(Joint::new(heavy, light, hanging_pulley()), &mut bodies)
            .unwrap();

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        for _ in 0..60 {
            pipeline.step(&Vector::new(0.0, -10.0), &params, &mut bodies, &mut joints, &());

            let joint = &joints[handle];
            let (b1, b2) = joint.solver_bodies(&bodies).unwrap();
            let pulley = joint.params.as_pulley_joint().unwrap();
            let total = pulley.length1(&b1) + pulley.ratio() * pulley.length2(&b2);
            assert!(total <= pulley.constant() + 0.05);
        }

        // The heavy body goes down, the light one goes up.
        assert!(bodies[heavy].center_of_mass().y < 4.0);
        assert!(bodies[light].center_of_mass().y > 6.0);
    }
}

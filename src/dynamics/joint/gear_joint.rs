use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{
    IntegrationParameters, Joint, JointConstraint, JointError, JointHandle, JointParams,
    JointSet, RigidBodyHandle, RigidBodySet, TimeStep,
};
use crate::math::{Point, Real, Vector};
use crate::utils::{self, WCross};

/// The coordinate of a revolute or prismatic joint coupled by a gear.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
enum GearCoupling {
    /// The angle of a revolute joint.
    Revolute { reference_angle: Real },
    /// The translation of a prismatic joint.
    Prismatic {
        ground_anchor: Point<Real>,
        local_axis: Vector<Real>,
        local_anchor: Point<Real>,
    },
}

impl GearCoupling {
    fn from_joint(joint: &Joint) -> Result<Self, JointError> {
        match &joint.params {
            JointParams::RevoluteJoint(revolute) => Ok(GearCoupling::Revolute {
                reference_angle: revolute.reference_angle(),
            }),
            JointParams::PrismaticJoint(prismatic) => Ok(GearCoupling::Prismatic {
                ground_anchor: prismatic.local_anchor1(),
                local_axis: prismatic.local_axis1(),
                local_anchor: prismatic.local_anchor2(),
            }),
            _ => Err(JointError::UnsupportedGearJoint),
        }
    }

    fn coordinate(&self, ground: &SolverBody, body: &SolverBody) -> Real {
        match self {
            GearCoupling::Revolute { reference_angle } => {
                body.angle - ground.angle - reference_angle
            }
            GearCoupling::Prismatic {
                ground_anchor,
                local_axis,
                local_anchor,
            } => {
                let d = body.world_point(local_anchor) - ground.world_point(ground_anchor);
                ground.world_vector(local_axis).dot(&d)
            }
        }
    }

    // The (linear, angular) Jacobian of the coordinate, up to its sign.
    fn jacobian(&self, ground: &SolverBody, body: &SolverBody) -> (Vector<Real>, Real) {
        match self {
            GearCoupling::Revolute { .. } => (Vector::zeros(), 1.0),
            GearCoupling::Prismatic {
                local_axis,
                local_anchor,
                ..
            } => {
                let ug = ground.world_vector(local_axis);
                let r = body.arm(local_anchor);
                (ug, r.gcross(ug))
            }
        }
    }
}

/// A joint coupling the coordinates of two revolute or prismatic joints, such that
/// `coordinate1 + ratio * coordinate2` stays constant.
///
/// The first body of each coupled joint (its ground) must be static, or the joint must be
/// attached to a fixed anchor. The gear then acts on the second body of each coupled joint.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct GearJoint {
    body1: RigidBodyHandle,
    body2: RigidBodyHandle,
    ground1: Option<RigidBodyHandle>,
    ground2: Option<RigidBodyHandle>,
    coupling1: GearCoupling,
    coupling2: GearCoupling,
    ratio: Real,
    constant: Real,

    impulse: Real,

    linear1: Vector<Real>,
    angular1: Real,
    linear2: Vector<Real>,
    angular2: Real,
    mass: Real,
}

impl GearJoint {
    /// Couples the two given joints with the given ratio, keeping their current coordinates.
    pub fn from_joints(
        joint1: &Joint,
        joint2: &Joint,
        ratio: Real,
        bodies: &RigidBodySet,
    ) -> Result<Self, JointError> {
        let coupling1 = GearCoupling::from_joint(joint1)?;
        let coupling2 = GearCoupling::from_joint(joint2)?;

        let solver_body = |handle: Option<RigidBodyHandle>| -> Result<SolverBody, JointError> {
            match handle {
                Some(handle) => {
                    let rb = bodies.get(handle).ok_or(JointError::InvalidBody(handle))?;
                    Ok(SolverBody::from_rigid_body(rb))
                }
                None => Ok(SolverBody::ground()),
            }
        };

        for ground in [joint1.body1(), joint2.body1()].into_iter().flatten() {
            let rb = bodies.get(ground).ok_or(JointError::InvalidBody(ground))?;
            if !rb.is_static() {
                return Err(JointError::DynamicGearGround);
            }
        }

        let coordinate1 = coupling1.coordinate(
            &solver_body(joint1.body1())?,
            &solver_body(Some(joint1.body2()))?,
        );
        let coordinate2 = coupling2.coordinate(
            &solver_body(joint2.body1())?,
            &solver_body(Some(joint2.body2()))?,
        );

        Ok(Self {
            body1: joint1.body2(),
            body2: joint2.body2(),
            ground1: joint1.body1(),
            ground2: joint2.body1(),
            coupling1,
            coupling2,
            ratio,
            constant: coordinate1 + ratio * coordinate2,
            impulse: 0.0,
            linear1: Vector::zeros(),
            angular1: 0.0,
            linear2: Vector::zeros(),
            angular2: 0.0,
            mass: 0.0,
        })
    }

    /// Couples the two joints of `joints` with the given handles, see [`Self::from_joints`].
    pub fn from_joint_handles(
        joints: &JointSet,
        joint1: JointHandle,
        joint2: JointHandle,
        ratio: Real,
        bodies: &RigidBodySet,
    ) -> Result<Self, JointError> {
        let joint1 = joints.get(joint1).ok_or(JointError::InvalidJoint(joint1))?;
        let joint2 = joints.get(joint2).ok_or(JointError::InvalidJoint(joint2))?;
        Self::from_joints(joint1, joint2, ratio, bodies)
    }

    /// The body moved by the first coupled joint.
    pub fn body1(&self) -> RigidBodyHandle {
        self.body1
    }

    /// The body moved by the second coupled joint.
    pub fn body2(&self) -> RigidBodyHandle {
        self.body2
    }

    /// The grounds of both coupled joints, `None` standing for a fixed anchor.
    pub fn grounds(&self) -> [Option<RigidBodyHandle>; 2] {
        [self.ground1, self.ground2]
    }

    /// The gear ratio.
    pub fn ratio(&self) -> Real {
        self.ratio
    }

    /// Sets the gear ratio.
    pub fn set_ratio(&mut self, ratio: Real) -> &mut Self {
        self.ratio = ratio;
        self
    }

    /// The conserved quantity `coordinate1 + ratio * coordinate2`.
    pub fn constant(&self) -> Real {
        self.constant
    }

    /// The current value of `coordinate1 + ratio * coordinate2`.
    ///
    /// `ground1` and `ground2` are the grounds of the coupled joints.
    pub fn current_value(
        &self,
        ground1: &SolverBody,
        body1: &SolverBody,
        ground2: &SolverBody,
        body2: &SolverBody,
    ) -> Real {
        self.coupling1.coordinate(ground1, body1)
            + self.ratio * self.coupling2.coordinate(ground2, body2)
    }

    fn apply(&self, b1: &mut SolverBody, b2: &mut SolverBody, impulse: Real) {
        b1.linvel += self.linear1 * (b1.inv_mass * impulse);
        b1.angvel += b1.inv_inertia * impulse * self.angular1;
        b2.linvel += self.linear2 * (b2.inv_mass * impulse);
        b2.angvel += b2.inv_inertia * impulse * self.angular2;
    }
}

impl From<GearJoint> for Joint {
    fn from(gear: GearJoint) -> Joint {
        Joint::new(gear.body1, gear.body2, gear)
    }
}

impl JointConstraint for GearJoint {
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        _params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) {
        let (mut b1, mut b2) = bodies.pair();
        let ground1 = bodies.other(self.ground1);
        let ground2 = bodies.other(self.ground2);

        let (linear1, angular1) = self.coupling1.jacobian(&ground1, &b1);
        let (linear2, angular2) = self.coupling2.jacobian(&ground2, &b2);
        self.linear1 = -linear1;
        self.angular1 = -angular1;
        self.linear2 = -linear2 * self.ratio;
        self.angular2 = -angular2 * self.ratio;

        let k = b1.inv_mass * linear1.norm_squared()
            + b1.inv_inertia * angular1 * angular1
            + self.ratio
                * self.ratio
                * (b2.inv_mass * linear2.norm_squared() + b2.inv_inertia * angular2 * angular2);
        self.mass = utils::inv(k);

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
        let cdot = self.linear1.dot(&b1.linvel)
            + self.angular1 * b1.angvel
            + self.linear2.dot(&b2.linvel)
            + self.angular2 * b2.angvel;
        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply(&mut b1, &mut b2, impulse);
        bodies.set_pair(&b1, &b2);
    }

    /// Converges once `|C|` is below `linear_slop`, even when the coupled coordinates
    /// are angles.
    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool {
        let (mut b1, mut b2) = bodies.pair();
        let ground1 = bodies.other(self.ground1);
        let ground2 = bodies.other(self.ground2);

        let c = self.constant - self.current_value(&ground1, &b1, &ground2, &b2);
        let impulse = -self.mass * c;

        b1.center += self.linear1 * (b1.inv_mass * impulse);
        b1.angle += b1.inv_inertia * impulse * self.angular1;
        b2.center += self.linear2 * (b2.inv_mass * impulse);
        b2.angle += b2.inv_inertia * impulse * self.angular2;
        bodies.set_pair(&b1, &b2);

        c.abs() < params.linear_slop
    }

    fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        self.linear2 * (self.impulse * inv_dt)
    }

    fn reaction_torque(&self, inv_dt: Real) -> Real {
        inv_dt * self.impulse * self.angular2
    }
}

#[cfg(test)]
mod test {
    use super::GearJoint;
    use crate::dynamics::joint::test_utils::{body, timestep, Pair};
    use crate::dynamics::{
        DistanceJoint, IntegrationParameters, Joint, JointConstraint, JointError, JointSet,
        PrismaticJoint, RevoluteJoint, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
    };
    use crate::math::{Point, Vector};
    use crate::pipeline::PhysicsPipeline;
    use approx::assert_relative_eq;

    fn wheel(bodies: &mut RigidBodySet, x: f32) -> (RigidBodyHandle, Joint) {
        let handle = bodies.insert(
            RigidBodyBuilder::new_dynamic()
                .translation(x, 0.0)
                .can_sleep(false),
        );
        let joint = Joint::fixed(
            handle,
            RevoluteJoint::from_world(None, &bodies[handle], Point::new(x, 0.0)),
        );
        (handle, joint)
    }

    #[test]
    fn gear_couples_two_revolutes() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let (wheel1, revolute1) = wheel(&mut bodies, 0.0);
        let (wheel2, revolute2) = wheel(&mut bodies, 3.0);
        let gear = GearJoint::from_joints(&revolute1, &revolute2, 2.0, &bodies).unwrap();
        let _ = joints.insert(revolute1, &mut bodies).unwrap();
        let _ = joints.insert(revolute2, &mut bodies).unwrap();
        let _ = joints.insert(gear, &mut bodies).unwrap();

        bodies[wheel1].set_angvel(4.0, true);

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        for _ in 0..30 {
            pipeline.step(&Vector::zeros(), &params, &mut bodies, &mut joints, &());
            let w1 = bodies[wheel1].angvel();
            let w2 = bodies[wheel2].angvel();
            assert_relative_eq!(w1 + 2.0 * w2, 0.0, epsilon = 1.0e-3);

            let a1 = bodies[wheel1].angle();
            let a2 = bodies[wheel2].angle();
            assert_relative_eq!(a1 + 2.0 * a2, 0.0, epsilon = 2.0 * params.linear_slop);
        }

        // With unit inertias, the gear impulse `λ` solves `(4 - λ) + 2 * (-2 * λ) = 0`.
        assert_relative_eq!(bodies[wheel1].angvel(), 3.2, epsilon = 1.0e-3);
        assert_relative_eq!(bodies[wheel2].angvel(), -1.6, epsilon = 1.0e-3);
    }

    #[test]
    fn angular_error_converges_against_the_linear_slop() {
        let mut bodies = RigidBodySet::new();
        let (_, revolute1) = wheel(&mut bodies, 0.0);
        let (_, revolute2) = wheel(&mut bodies, 3.0);
        let mut gear = GearJoint::from_joints(&revolute1, &revolute2, 1.0, &bodies).unwrap();
        assert_eq!(gear.constant(), 0.0);

        let params = IntegrationParameters::default();
        let step = timestep(&params);
        // Within the angular slop, but twice the linear slop.
        let error = 2.0 * params.linear_slop;
        assert!(error < params.angular_slop);
        let mut pair = Pair::new(
            body(0.0, 0.0, error, 1.0, 1.0),
            body(3.0, 0.0, 0.0, 1.0, 1.0),
        );

        gear.init_velocity_constraints(&step, &params, &mut pair.bodies());
        assert!(!gear.solve_position_constraints(&params, &mut pair.bodies()));

        // Unit inertias share the correction evenly.
        let (b1, b2) = pair.get();
        assert_relative_eq!(b1.angle, params.linear_slop, epsilon = 1.0e-6);
        assert_relative_eq!(b2.angle, -params.linear_slop, epsilon = 1.0e-6);
        assert!(gear.solve_position_constraints(&params, &mut pair.bodies()));
    }

    #[test]
    fn gear_couples_a_revolute_and_a_prismatic() {
        let mut bodies = RigidBodySet::new();
        let mut joints = JointSet::new();
        let (wheel1, revolute) = wheel(&mut bodies, 0.0);
        let rack = bodies.insert(RigidBodyBuilder::new_dynamic().translation(0.0, -1.0));
        let prismatic = Joint::fixed(
            rack,
            PrismaticJoint::from_world(None, &bodies[rack], Point::new(0.0, -1.0), Vector::x()),
        );
        let gear = GearJoint::from_joints(&revolute, &prismatic, 1.0, &bodies).unwrap();
        let _ = joints.insert(revolute, &mut bodies).unwrap();
        let _ = joints.insert(prismatic, &mut bodies).unwrap();
        let _ = joints.insert(gear, &mut bodies).unwrap();

        bodies[rack].set_linvel(Vector::new(1.0, 0.0), true);

        let params = IntegrationParameters::default();
        let mut pipeline = PhysicsPipeline::new();
        for _ in 0..30 {
            pipeline.step(&Vector::zeros(), &params, &mut bodies, &mut joints, &());
        }

        // The rack moved right, turning the wheel clockwise.
        let translation = bodies[rack].center_of_mass().x;
        assert!(translation > 0.0);
        assert_relative_eq!(
            bodies[wheel1].angle() + translation,
            0.0,
            epsilon = 2.0 * params.linear_slop
        );
    }

    #[test]
    fn gear_construction_validates_the_coupled_joints() {
        let mut bodies = RigidBodySet::new();
        let (_, revolute) = wheel(&mut bodies, 0.0);
        let dynamic_ground = bodies.insert(RigidBodyBuilder::new_dynamic());
        let other = bodies.insert(RigidBodyBuilder::new_dynamic());

        let rod = DistanceJoint::new(Point::origin(), Point::origin(), 1.0);
        let distance = Joint::fixed(other, rod);
        assert_eq!(
            GearJoint::from_joints(&revolute, &distance, 1.0, &bodies),
            Err(JointError::UnsupportedGearJoint)
        );

        let on_dynamic = Joint::new(
            dynamic_ground,
            other,
            RevoluteJoint::new(Point::origin(), Point::origin()),
        );
        assert_eq!(
            GearJoint::from_joints(&revolute, &on_dynamic, 1.0, &bodies),
            Err(JointError::DynamicGearGround)
        );

        let mut joints = JointSet::new();
        let handle = joints.insert(revolute, &mut bodies).unwrap();
        let _ = joints.remove(handle, &mut bodies, false);
        assert_eq!(
            GearJoint::from_joint_handles(&joints, handle, handle, 1.0, &bodies),
            Err(JointError::InvalidJoint(handle))
        );
    }
}

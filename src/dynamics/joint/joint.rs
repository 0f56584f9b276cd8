use crate::dynamics::solver::{JointBodies, SolverBody};
use crate::dynamics::{
    DistanceJoint, FrictionJoint, GearJoint, IntegrationParameters, JointHandle, LineJoint,
    MotorJoint, MouseJoint, PrismaticJoint, PulleyJoint, RevoluteJoint, RigidBody,
    RigidBodyHandle, RigidBodySet, TimeStep, WeldJoint,
};
use crate::math::{Point, Real, Vector};
use arrayvec::ArrayVec;

/// The three-phase contract every joint fulfills during a timestep.
///
/// Once per step, the island solver calls `init_velocity_constraints`, then
/// `solve_velocity_constraints` once per velocity iteration, and finally
/// `solve_position_constraints` once per position iteration until every joint of the
/// island reports convergence.
pub trait JointConstraint {
    /// Computes the Jacobians and effective masses from the current pose of the bodies,
    /// updates the limit state, and warm-starts the bodies with the accumulated impulses.
    ///
    /// Without warm starting, the accumulated impulses are reset to zero instead.
    fn init_velocity_constraints(
        &mut self,
        step: &TimeStep,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    );

    /// Runs one sequential-impulse iteration, updating the velocities of both bodies.
    fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies);

    /// Runs one position-correction iteration, updating the pose of both bodies.
    ///
    /// Returns `true` if the position error was within the slops before the correction.
    fn solve_position_constraints(
        &mut self,
        params: &IntegrationParameters,
        bodies: &mut JointBodies,
    ) -> bool;

    /// The force applied by this joint on its second body during the last step.
    fn reaction_force(&self, inv_dt: Real) -> Vector<Real>;

    /// The torque applied by this joint on its second body during the last step.
    fn reaction_torque(&self, inv_dt: Real) -> Real;
}

/// Which boundary of a joint limit is currently enforced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum JointLimitState {
    /// The limit is disabled or the joint is strictly between its bounds.
    #[default]
    Inactive,
    /// The joint is at, or past, its lower bound.
    AtLower,
    /// The joint is at, or past, its upper bound.
    AtUpper,
    /// Both bounds are so close that the joint is locked.
    Equal,
}

impl JointLimitState {
    /// Updates this state from the current joint coordinate `value`.
    ///
    /// The limit `impulse` is reset whenever a bound starts being enforced and whenever the
    /// limit becomes inactive, and kept when the enforced bound did not change.
    pub(crate) fn update(
        &mut self,
        enabled: bool,
        value: Real,
        lower: Real,
        upper: Real,
        slop: Real,
        impulse: &mut Real,
    ) {
        let new_state = if !enabled {
            JointLimitState::Inactive
        } else if (upper - lower).abs() < 2.0 * slop {
            JointLimitState::Equal
        } else if value <= lower {
            JointLimitState::AtLower
        } else if value >= upper {
            JointLimitState::AtUpper
        } else {
            JointLimitState::Inactive
        };

        match new_state {
            JointLimitState::Inactive => *impulse = 0.0,
            JointLimitState::AtLower | JointLimitState::AtUpper if new_state != *self => {
                *impulse = 0.0
            }
            _ => {}
        }

        *self = new_state;
    }

    /// Clamps the accumulated limit impulse to the sign allowed by this state.
    #[inline]
    pub(crate) fn clamp_impulse(self, impulse: Real) -> Real {
        match self {
            JointLimitState::AtLower => impulse.max(0.0),
            JointLimitState::AtUpper => impulse.min(0.0),
            _ => impulse,
        }
    }
}

/// The position error of a translational limit, for the position solver.
///
/// Returns the clamped error to correct and the magnitude of the violation, or `None` if the
/// translation is strictly between the bounds.
pub(crate) fn linear_limit_error(
    translation: Real,
    lower: Real,
    upper: Real,
    params: &IntegrationParameters,
) -> Option<(Real, Real)> {
    let slop = params.linear_slop;
    let max = params.max_linear_correction;

    if (upper - lower).abs() < 2.0 * slop {
        Some((na::clamp(translation, -max, max), translation.abs()))
    } else if translation <= lower {
        Some((
            na::clamp(translation - lower + slop, -max, 0.0),
            lower - translation,
        ))
    } else if translation >= upper {
        Some((
            na::clamp(translation - upper - slop, 0.0, max),
            translation - upper,
        ))
    } else {
        None
    }
}

pub(crate) fn check_limits(lower: Real, upper: Real) -> Result<(), crate::dynamics::JointError> {
    if lower > upper {
        Err(crate::dynamics::JointError::InvalidLimits { lower, upper })
    } else {
        Ok(())
    }
}

/// The local-space coordinates of a world-space point, for the given side of a joint.
///
/// `None` stands for the world frame, in which case the point is returned unchanged.
pub(crate) fn local_point(body: Option<&RigidBody>, world_point: &Point<Real>) -> Point<Real> {
    body.map(|rb| rb.local_point(world_point))
        .unwrap_or(*world_point)
}

/// The local-space coordinates of a world-space vector, for the given side of a joint.
pub(crate) fn local_vector(body: Option<&RigidBody>, world_vector: &Vector<Real>) -> Vector<Real> {
    body.map(|rb| rb.local_vector(world_vector))
        .unwrap_or(*world_vector)
}

/// What a joint is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum JointAttachment {
    /// The joint constrains the relative motion of two bodies.
    ///
    /// Both handles may be equal, in which case the joint is never solved and has no
    /// effect.
    TwoBodies {
        /// The first body.
        body1: RigidBodyHandle,
        /// The second body.
        body2: RigidBodyHandle,
    },
    /// The joint constrains the motion of one body relative to the world.
    ///
    /// Every quantity the joint defines relative to its first body (anchor, axis, ...) is
    /// then expressed in world-space.
    FixedAnchor {
        /// The attached body, taking the place of the second body of the joint.
        body: RigidBodyHandle,
    },
}

impl JointAttachment {
    /// The first body, or `None` if this is the world frame.
    pub fn body1(&self) -> Option<RigidBodyHandle> {
        match self {
            JointAttachment::TwoBodies { body1, .. } => Some(*body1),
            JointAttachment::FixedAnchor { .. } => None,
        }
    }

    /// The second body.
    pub fn body2(&self) -> RigidBodyHandle {
        match self {
            JointAttachment::TwoBodies { body2, .. } => *body2,
            JointAttachment::FixedAnchor { body } => *body,
        }
    }

    /// Is this attached to the world frame?
    pub fn is_fixed_anchor(&self) -> bool {
        matches!(self, JointAttachment::FixedAnchor { .. })
    }
}

macro_rules! joint_params {
    ($($(#[$doc: meta])* $variant: ident, $as_ref: ident, $as_mut: ident;)*) => {
        #[derive(Clone, Debug, PartialEq)]
        #[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
        /// An enum grouping all possible types of joints.
        pub enum JointParams {
            $($(#[$doc])* $variant($variant),)*
        }

        impl JointParams {
            $(
                #[doc = concat!("Gets a reference to the underlying `", stringify!($variant), "`, if `self` is one.")]
                pub fn $as_ref(&self) -> Option<&$variant> {
                    if let JointParams::$variant(j) = self {
                        Some(j)
                    } else {
                        None
                    }
                }

                #[doc = concat!("Gets a mutable reference to the underlying `", stringify!($variant), "`, if `self` is one.")]
                pub fn $as_mut(&mut self) -> Option<&mut $variant> {
                    if let JointParams::$variant(j) = self {
                        Some(j)
                    } else {
                        None
                    }
                }
            )*
        }

        $(
            impl From<$variant> for JointParams {
                fn from(j: $variant) -> Self {
                    JointParams::$variant(j)
                }
            }
        )*

        impl JointConstraint for JointParams {
            fn init_velocity_constraints(
                &mut self,
                step: &TimeStep,
                params: &IntegrationParameters,
                bodies: &mut JointBodies,
            ) {
                match self {
                    $(JointParams::$variant(j) => j.init_velocity_constraints(step, params, bodies),)*
                }
            }

            fn solve_velocity_constraints(&mut self, step: &TimeStep, bodies: &mut JointBodies) {
                match self {
                    $(JointParams::$variant(j) => j.solve_velocity_constraints(step, bodies),)*
                }
            }

            fn solve_position_constraints(
                &mut self,
                params: &IntegrationParameters,
                bodies: &mut JointBodies,
            ) -> bool {
                match self {
                    $(JointParams::$variant(j) => j.solve_position_constraints(params, bodies),)*
                }
            }

            fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
                match self {
                    $(JointParams::$variant(j) => j.reaction_force(inv_dt),)*
                }
            }

            fn reaction_torque(&self, inv_dt: Real) -> Real {
                match self {
                    $(JointParams::$variant(j) => j.reaction_torque(inv_dt),)*
                }
            }
        }
    };
}

joint_params! {
    /// Allows a translation along one axis and any rotation.
    LineJoint, as_line_joint, as_line_joint_mut;
    /// Allows a translation along one axis only.
    PrismaticJoint, as_prismatic_joint, as_prismatic_joint_mut;
    /// Allows a rotation around a shared anchor only.
    RevoluteJoint, as_revolute_joint, as_revolute_joint_mut;
    /// Keeps two anchors at a fixed, possibly springy, distance.
    DistanceJoint, as_distance_joint, as_distance_joint_mut;
    /// Removes every relative degree of freedom.
    WeldJoint, as_weld_joint, as_weld_joint_mut;
    /// Resists relative motion up to a maximum force and torque.
    FrictionJoint, as_friction_joint, as_friction_joint_mut;
    /// Links two bodies through ropes running over two fixed pulleys.
    PulleyJoint, as_pulley_joint, as_pulley_joint_mut;
    /// Couples the coordinates of two revolute or prismatic joints.
    GearJoint, as_gear_joint, as_gear_joint_mut;
    /// Drags a body toward a world-space target.
    MouseJoint, as_mouse_joint, as_mouse_joint_mut;
    /// Drives the relative pose of two bodies toward a target offset.
    MotorJoint, as_motor_joint, as_motor_joint_mut;
}

impl JointParams {
    /// An integer identifier for each type of joint.
    pub fn type_id(&self) -> usize {
        match self {
            JointParams::LineJoint(_) => 0,
            JointParams::PrismaticJoint(_) => 1,
            JointParams::RevoluteJoint(_) => 2,
            JointParams::DistanceJoint(_) => 3,
            JointParams::WeldJoint(_) => 4,
            JointParams::FrictionJoint(_) => 5,
            JointParams::PulleyJoint(_) => 6,
            JointParams::GearJoint(_) => 7,
            JointParams::MouseJoint(_) => 8,
            JointParams::MotorJoint(_) => 9,
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
/// A joint attached to one or two bodies.
pub struct Joint {
    pub(crate) attachment: JointAttachment,
    /// The joint geometric parameters and impulse.
    pub params: JointParams,
    /// User-defined data associated to this joint.
    pub user_data: u128,
    /// The magnitude of reaction force above which this joint is removed from its set.
    pub break_force: Option<Real>,
    // A joint needs to know its handle to simplify its removal.
    pub(crate) handle: JointHandle,
}

impl Joint {
    /// A joint between `body1` and `body2`.
    pub fn new(
        body1: RigidBodyHandle,
        body2: RigidBodyHandle,
        params: impl Into<JointParams>,
    ) -> Self {
        Self::with_attachment(JointAttachment::TwoBodies { body1, body2 }, params)
    }

    /// A joint between `body` and the world frame.
    pub fn fixed(body: RigidBodyHandle, params: impl Into<JointParams>) -> Self {
        Self::with_attachment(JointAttachment::FixedAnchor { body }, params)
    }

    /// A joint with the given attachment.
    pub fn with_attachment(attachment: JointAttachment, params: impl Into<JointParams>) -> Self {
        Self {
            attachment,
            params: params.into(),
            user_data: 0,
            break_force: None,
            handle: JointHandle::invalid(),
        }
    }

    /// Sets the reaction force magnitude above which this joint breaks.
    pub fn break_force(mut self, force: Real) -> Self {
        self.break_force = Some(force);
        self
    }

    /// Sets the user-defined data associated to this joint.
    pub fn user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }

    /// The handle of this joint in its set.
    pub fn handle(&self) -> JointHandle {
        self.handle
    }

    /// What this joint is attached to.
    pub fn attachment(&self) -> &JointAttachment {
        &self.attachment
    }

    /// The first body, or `None` if this joint is attached to a fixed anchor.
    pub fn body1(&self) -> Option<RigidBodyHandle> {
        self.attachment.body1()
    }

    /// The second body.
    pub fn body2(&self) -> RigidBodyHandle {
        self.attachment.body2()
    }

    /// Every body this joint reads during a step: its attached bodies, plus the grounds of the
    /// joints coupled by a gear.
    pub fn attached_bodies(&self) -> ArrayVec<RigidBodyHandle, 4> {
        let mut result = ArrayVec::new();
        if let Some(body1) = self.body1() {
            result.push(body1);
        }
        result.push(self.body2());

        if let JointParams::GearJoint(gear) = &self.params {
            for ground in gear.grounds().into_iter().flatten() {
                if !result.contains(&ground) {
                    result.push(ground);
                }
            }
        }

        result
    }

    /// The current state of the bodies of this joint, with the world frame standing for a
    /// fixed anchor.
    ///
    /// Useful to query coordinates like [`LineJoint::joint_translation`] outside of a step.
    pub fn solver_bodies(&self, bodies: &RigidBodySet) -> Option<(SolverBody, SolverBody)> {
        let body1 = match self.body1() {
            Some(handle) => SolverBody::from_rigid_body(bodies.get(handle)?),
            None => SolverBody::ground(),
        };
        let body2 = SolverBody::from_rigid_body(bodies.get(self.body2())?);
        Some((body1, body2))
    }

    /// The force applied by this joint on its second body during the last step.
    pub fn reaction_force(&self, inv_dt: Real) -> Vector<Real> {
        self.params.reaction_force(inv_dt)
    }

    /// The torque applied by this joint on its second body during the last step.
    pub fn reaction_torque(&self, inv_dt: Real) -> Real {
        self.params.reaction_torque(inv_dt)
    }
}

#[cfg(test)]
mod test {
    use super::{linear_limit_error, JointLimitState};
    use crate::dynamics::IntegrationParameters;
    use approx::assert_relative_eq;

    #[test]
    fn limit_impulse_is_kept_only_on_the_same_bound() {
        let mut state = JointLimitState::Inactive;
        let mut impulse = 3.0;

        state.update(true, -2.0, -1.0, 1.0, 0.005, &mut impulse);
        assert_eq!(state, JointLimitState::AtLower);
        assert_eq!(impulse, 0.0);

        impulse = 2.0;
        state.update(true, -1.5, -1.0, 1.0, 0.005, &mut impulse);
        assert_eq!(state, JointLimitState::AtLower);
        assert_eq!(impulse, 2.0);

        state.update(true, 1.5, -1.0, 1.0, 0.005, &mut impulse);
        assert_eq!(state, JointLimitState::AtUpper);
        assert_eq!(impulse, 0.0);

        impulse = -1.0;
        state.update(true, 0.0, -1.0, 1.0, 0.005, &mut impulse);
        assert_eq!(state, JointLimitState::Inactive);
        assert_eq!(impulse, 0.0);

        impulse = 5.0;
        state.update(true, 0.0, 0.0, 0.009, 0.005, &mut impulse);
        assert_eq!(state, JointLimitState::Equal);
        assert_eq!(impulse, 5.0);

        state.update(false, -2.0, -1.0, 1.0, 0.005, &mut impulse);
        assert_eq!(state, JointLimitState::Inactive);
        assert_eq!(impulse, 0.0);
    }

    #[test]
    fn limit_impulse_sign_follows_state() {
        assert_eq!(JointLimitState::AtLower.clamp_impulse(-1.0), 0.0);
        assert_eq!(JointLimitState::AtLower.clamp_impulse(1.0), 1.0);
        assert_eq!(JointLimitState::AtUpper.clamp_impulse(1.0), 0.0);
        assert_eq!(JointLimitState::Equal.clamp_impulse(-1.0), -1.0);
    }

    #[test]
    fn limit_position_error_is_one_sided_and_clamped() {
        let params = IntegrationParameters::default();
        let (c, err) = linear_limit_error(-1.5, -1.0, 1.0, &params).unwrap();
        assert_relative_eq!(c, -params.max_linear_correction);
        assert_relative_eq!(err, 0.5);

        let (c, err) = linear_limit_error(1.1, -1.0, 1.0, &params).unwrap();
        assert_relative_eq!(c, 0.1 - params.linear_slop, epsilon = 1.0e-6);
        assert_relative_eq!(err, 0.1, epsilon = 1.0e-6);

        // Within the slop, the bound is not pushed back.
        let translation = -1.0 - params.linear_slop * 0.5;
        let (c, _) = linear_limit_error(translation, -1.0, 1.0, &params).unwrap();
        assert_eq!(c, 0.0);

        assert!(linear_limit_error(0.3, -1.0, 1.0, &params).is_none());
    }
}

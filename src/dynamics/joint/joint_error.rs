use crate::dynamics::{JointHandle, RigidBodyHandle};
use crate::math::Real;

/// Errors raised while configuring or inserting a joint.
///
/// The solver itself never fails; these only guard against malformed configurations.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq)]
pub enum JointError {
    /// A limit was configured with its lower bound above its upper bound.
    #[error("invalid joint limits: the lower bound {lower} exceeds the upper bound {upper}")]
    InvalidLimits {
        /// The rejected lower bound.
        lower: Real,
        /// The rejected upper bound.
        upper: Real,
    },
    /// A joint references a rigid-body that does not exist.
    #[error("the rigid-body {0:?} attached to the joint does not exist")]
    InvalidBody(RigidBodyHandle),
    /// A joint handle does not point to any joint.
    #[error("the joint {0:?} does not exist")]
    InvalidJoint(JointHandle),
    /// A gear joint can only couple revolute and prismatic joints.
    #[error("gear joints can only couple revolute and prismatic joints")]
    UnsupportedGearJoint,
    /// The first body of a joint coupled by a gear must not move.
    #[error("the first body of a joint coupled by a gear must be static or a fixed anchor")]
    DynamicGearGround,
    /// The joint only makes sense between a body and the world frame.
    #[error("this joint can only be attached to a fixed anchor")]
    FixedAnchorRequired,
}

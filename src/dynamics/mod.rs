//! Structures related to dynamics: bodies, joints, islands and the joint solver.

pub use self::integration_parameters::{IntegrationParameters, TimeStep};
pub use self::island_manager::{Island, IslandManager};
pub use self::joint::{
    DistanceJoint, FrictionJoint, GearJoint, Joint, JointAttachment, JointConstraint, JointError,
    JointHandle, JointLimitState, JointParams, JointSet, LineJoint, MotorJoint, MouseJoint,
    PrismaticJoint, PulleyJoint, RevoluteJoint, WeldJoint,
};
pub use self::rigid_body::{RigidBody, RigidBodyBuilder};
pub use self::rigid_body_components::*;
pub use self::rigid_body_set::RigidBodySet;

mod integration_parameters;
mod island_manager;
mod joint;
mod rigid_body;
mod rigid_body_components;
mod rigid_body_set;
pub mod solver;

pub use self::distance_joint::DistanceJoint;
pub use self::friction_joint::FrictionJoint;
pub use self::gear_joint::GearJoint;
pub use self::joint::{Joint, JointAttachment, JointConstraint, JointLimitState, JointParams};
pub use self::joint_error::JointError;
pub use self::joint_set::{JointHandle, JointSet};
pub use self::line_joint::LineJoint;
pub use self::motor_joint::MotorJoint;
pub use self::mouse_joint::MouseJoint;
pub use self::prismatic_joint::PrismaticJoint;
pub use self::pulley_joint::PulleyJoint;
pub use self::revolute_joint::RevoluteJoint;
pub use self::weld_joint::WeldJoint;

mod distance_joint;
mod friction_joint;
mod gear_joint;
mod joint;
mod joint_error;
mod joint_set;
mod line_joint;
mod motor_joint;
mod mouse_joint;
mod prismatic_joint;
mod pulley_joint;
mod revolute_joint;
mod weld_joint;

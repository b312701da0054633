pub mod angles;
pub mod joint;

pub use angles::{joint_angle, keypoint_angle, signed_joint_angle};
pub use joint::{AngleCalculator, Joint, Side, SignConvention, Signal};

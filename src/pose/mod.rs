pub mod frame;
pub mod keypoint;

pub use frame::{FrameRecord, FrameRef, TrackId};
pub use keypoint::{Keypoint, KeypointIndex, Pose};

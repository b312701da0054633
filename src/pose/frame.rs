use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::keypoint::Pose;

/// External tracker identity. Opaque: IDs may vanish, reappear and skip values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a video frame owned by the capture side (e.g. an index into its frame store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRef(pub u64);

/// One frame of pose-estimator output: every tracked subject with its keypoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    /// Seconds, monotonic within a stream.
    pub timestamp: f64,
    pub poses: BTreeMap<TrackId, Pose>,
    #[serde(default)]
    pub frame_ref: Option<FrameRef>,
}

impl FrameRecord {
    pub fn new(frame_index: u64, timestamp: f64) -> Self {
        Self {
            frame_index,
            timestamp,
            poses: BTreeMap::new(),
            frame_ref: None,
        }
    }

    pub fn with_pose(mut self, track_id: TrackId, pose: Pose) -> Self {
        self.poses.insert(track_id, pose);
        self
    }

    pub fn with_frame_ref(mut self, frame_ref: FrameRef) -> Self {
        self.frame_ref = Some(frame_ref);
        self
    }

    pub fn pose(&self, track_id: TrackId) -> Option<&Pose> {
        self.poses.get(&track_id)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.poses.keys().copied()
    }

    pub fn lowest_track_id(&self) -> Option<TrackId> {
        self.poses.keys().next().copied()
    }
}

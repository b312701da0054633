use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::angles::keypoint_angle;
use crate::config::AngleConfig;
use crate::pose::{KeypointIndex, Pose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    /// shoulder - hip - knee
    Hip,
    /// hip - knee - ankle
    Knee,
    /// shoulder - elbow - wrist
    Elbow,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::Hip, Joint::Knee, Joint::Elbow];

    /// (proximal, vertex, distal)
    pub fn keypoints(self, side: Side) -> (KeypointIndex, KeypointIndex, KeypointIndex) {
        use KeypointIndex::*;
        match (self, side) {
            (Joint::Hip, Side::Left) => (LeftShoulder, LeftHip, LeftKnee),
            (Joint::Hip, Side::Right) => (RightShoulder, RightHip, RightKnee),
            (Joint::Knee, Side::Left) => (LeftHip, LeftKnee, LeftAnkle),
            (Joint::Knee, Side::Right) => (RightHip, RightKnee, RightAnkle),
            (Joint::Elbow, Side::Left) => (LeftShoulder, LeftElbow, LeftWrist),
            (Joint::Elbow, Side::Right) => (RightShoulder, RightElbow, RightWrist),
        }
    }
}

/// A named angle signal, e.g. `left_knee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signal {
    pub side: Side,
    pub joint: Joint,
}

impl Signal {
    pub const fn new(side: Side, joint: Joint) -> Self {
        Self { side, joint }
    }

    pub fn name(&self) -> &'static str {
        match (self.side, self.joint) {
            (Side::Left, Joint::Hip) => "left_hip",
            (Side::Left, Joint::Knee) => "left_knee",
            (Side::Left, Joint::Elbow) => "left_elbow",
            (Side::Right, Joint::Hip) => "right_hip",
            (Side::Right, Joint::Knee) => "right_knee",
            (Side::Right, Joint::Elbow) => "right_elbow",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (side, joint) = s
            .split_once('_')
            .ok_or_else(|| format!("unknown signal '{s}'"))?;
        let side = match side {
            "left" => Side::Left,
            "right" => Side::Right,
            _ => return Err(format!("unknown side in signal '{s}'")),
        };
        let joint = match joint {
            "hip" => Joint::Hip,
            "knee" => Joint::Knee,
            "elbow" => Joint::Elbow,
            _ => return Err(format!("unknown joint in signal '{s}'")),
        };
        Ok(Signal::new(side, joint))
    }
}

impl TryFrom<String> for Signal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Signal> for String {
    fn from(signal: Signal) -> Self {
        signal.name().to_string()
    }
}

/// 符号付き角度の符号をどう解釈するか（関節ごとに設定）
///
/// 外積から得られる符号は画像上の向き（被験者がどちらを向いているか）に依存するため、
/// 関節ごとの意味付けは導出せず設定値として固定する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// 外積の符号をそのまま使う
    AsComputed,
    /// 外積の符号を反転する
    Inverted,
    /// 符号なし (0〜180°)
    Unsigned,
}

impl SignConvention {
    pub fn is_signed(self) -> bool {
        !matches!(self, SignConvention::Unsigned)
    }

    fn apply(self, angle: f64) -> f64 {
        match self {
            SignConvention::Inverted => -angle,
            SignConvention::AsComputed | SignConvention::Unsigned => angle,
        }
    }
}

/// Pose → 関節角度
#[derive(Debug, Clone)]
pub struct AngleCalculator {
    confidence_threshold: f32,
    hip: SignConvention,
    knee: SignConvention,
    elbow: SignConvention,
}

impl AngleCalculator {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            hip: SignConvention::Inverted,
            knee: SignConvention::AsComputed,
            elbow: SignConvention::Unsigned,
        }
    }

    pub fn from_config(config: &AngleConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            hip: config.hip_sign,
            knee: config.knee_sign,
            elbow: config.elbow_sign,
        }
    }

    pub fn with_convention(mut self, joint: Joint, convention: SignConvention) -> Self {
        match joint {
            Joint::Hip => self.hip = convention,
            Joint::Knee => self.knee = convention,
            Joint::Elbow => self.elbow = convention,
        }
        self
    }

    pub fn convention(&self, joint: Joint) -> SignConvention {
        match joint {
            Joint::Hip => self.hip,
            Joint::Knee => self.knee,
            Joint::Elbow => self.elbow,
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// 信頼度不足・退化ケースは None
    pub fn angle(&self, pose: &Pose, signal: Signal) -> Option<f64> {
        let (a, b, c) = signal.joint.keypoints(signal.side);
        let convention = self.convention(signal.joint);
        keypoint_angle(
            pose.get(a),
            pose.get(b),
            pose.get(c),
            self.confidence_threshold,
            convention.is_signed(),
        )
        .map(|angle| convention.apply(angle))
    }

    pub fn angles(&self, pose: &Pose, signals: &[Signal]) -> Vec<(Signal, Option<f64>)> {
        signals.iter().map(|&s| (s, self.angle(pose, s))).collect()
    }
}

impl Default for AngleCalculator {
    fn default() -> Self {
        Self::new(0.5)
    }
}

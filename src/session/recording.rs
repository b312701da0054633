//! Start/stop bounded recording of synchronized per-frame samples.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pose::FrameRef;

/// 記録対象トラックの1フレーム分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub frame_index: u64,
    pub timestamp: f64,
    pub hip_angle: Option<f64>,
    pub knee_angle: Option<f64>,
    /// 足首座標（ピクセル）。信頼度不足・トラック不在なら None
    pub ankle: Option<(f64, f64)>,
    pub frame_ref: Option<FrameRef>,
}

impl FrameSample {
    /// A frame where the recorded track was not measured at all.
    pub fn missing(frame_index: u64, timestamp: f64, frame_ref: Option<FrameRef>) -> Self {
        Self {
            frame_index,
            timestamp,
            hip_angle: None,
            knee_angle: None,
            ankle: None,
            frame_ref,
        }
    }
}

/// Export row, time relative to the first recorded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub frame_index: u64,
    pub time_s: f64,
    pub hip_angle: Option<f64>,
    pub knee_angle: Option<f64>,
    pub ankle_x: Option<f64>,
    pub ankle_y: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SessionData {
    name: String,
    started_at: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
    frames: Vec<FrameSample>,
}

/// Immutable result of `Recorder::stop`. Cloning shares the frames.
#[derive(Debug, Clone)]
pub struct SealedSession {
    inner: Arc<SessionData>,
}

impl Serialize for SealedSession {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl SealedSession {
    /// Seal an already collected frame list (replayed or synthetic data).
    pub fn from_frames(name: impl Into<String>, frames: Vec<FrameSample>) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionData {
                name: name.into(),
                started_at: now,
                stopped_at: now,
                frames,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn stopped_at(&self) -> DateTime<Utc> {
        self.inner.stopped_at
    }

    pub fn frames(&self) -> &[FrameSample] {
        &self.inner.frames
    }

    pub fn len(&self) -> usize {
        self.inner.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.frames.is_empty()
    }

    /// 記録時間（秒）
    pub fn duration(&self) -> f64 {
        match (self.inner.frames.first(), self.inner.frames.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// `(n - 1) / (t_last - t_first)`. None when timestamps do not span time.
    pub fn estimated_fps(&self) -> Option<f64> {
        let n = self.len();
        let duration = self.duration();
        if n < 2 || !(duration.is_finite() && duration > 0.0) {
            return None;
        }
        Some((n - 1) as f64 / duration)
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.inner.frames.iter().map(|f| f.timestamp).collect()
    }

    pub fn hip_angles(&self) -> Vec<Option<f64>> {
        self.inner.frames.iter().map(|f| f.hip_angle).collect()
    }

    pub fn knee_angles(&self) -> Vec<Option<f64>> {
        self.inner.frames.iter().map(|f| f.knee_angle).collect()
    }

    pub fn ankle_x(&self) -> Vec<Option<f64>> {
        self.inner.frames.iter().map(|f| f.ankle.map(|(x, _)| x)).collect()
    }

    pub fn ankle_y(&self) -> Vec<Option<f64>> {
        self.inner.frames.iter().map(|f| f.ankle.map(|(_, y)| y)).collect()
    }

    pub fn rows(&self) -> Vec<SessionRow> {
        let t0 = self.inner.frames.first().map_or(0.0, |f| f.timestamp);
        self.inner
            .frames
            .iter()
            .map(|f| SessionRow {
                frame_index: f.frame_index,
                time_s: f.timestamp - t0,
                hip_angle: f.hip_angle,
                knee_angle: f.knee_angle,
                ankle_x: f.ankle.map(|(x, _)| x),
                ankle_y: f.ankle.map(|(_, y)| y),
            })
            .collect()
    }
}

struct ActiveSession {
    name: String,
    started_at: DateTime<Utc>,
    frames: Vec<FrameSample>,
}

/// 同時に1セッションのみ記録
#[derive(Default)]
pub struct Recorder {
    active: Option<ActiveSession>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.name.as_str())
    }

    pub fn frame_count(&self) -> usize {
        self.active.as_ref().map_or(0, |s| s.frames.len())
    }

    pub fn start(&mut self, name: impl Into<String>) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(Error::SessionActive(active.name.clone()));
        }
        let name = name.into();
        info!("recording '{}' started", name);
        self.active = Some(ActiveSession {
            name,
            started_at: Utc::now(),
            frames: Vec::new(),
        });
        Ok(())
    }

    /// `Ok(false)` when nothing is recording.
    pub fn append(&mut self, sample: FrameSample) -> Result<bool> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        if !sample.timestamp.is_finite() {
            warn!(
                "recording '{}': frame {} rejected, timestamp {}",
                active.name, sample.frame_index, sample.timestamp
            );
            return Err(Error::NonFiniteTimestamp {
                frame_index: sample.frame_index,
            });
        }
        if let Some(last) = active.frames.last() {
            if sample.frame_index <= last.frame_index {
                warn!(
                    "recording '{}': frame {} rejected after frame {}",
                    active.name, sample.frame_index, last.frame_index
                );
                return Err(Error::FrameOutOfOrder {
                    last: last.frame_index,
                    got: sample.frame_index,
                });
            }
        }
        active.frames.push(sample);
        Ok(true)
    }

    pub fn stop(&mut self) -> Result<SealedSession> {
        let active = self.active.take().ok_or(Error::NoActiveSession)?;
        info!(
            "recording '{}' stopped with {} frames",
            active.name,
            active.frames.len()
        );
        Ok(SealedSession {
            inner: Arc::new(SessionData {
                name: active.name,
                started_at: active.started_at,
                stopped_at: Utc::now(),
                frames: active.frames,
            }),
        })
    }
}

//! Time-windowed angle history per `(track, signal)` for live plotting.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DisplayConfig;
use crate::error::Error;
use crate::kinematics::Signal;
use crate::pose::TrackId;

/// `value == None` は欠測（ゼロではない）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleSample {
    pub frame_index: u64,
    pub timestamp: f64,
    pub value: Option<f64>,
}

impl AngleSample {
    pub fn new(frame_index: u64, timestamp: f64, value: Option<f64>) -> Self {
        Self {
            frame_index,
            timestamp,
            value,
        }
    }
}

/// Copy handed to readers; the live buffer itself is never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub track_id: TrackId,
    pub signal: Signal,
    pub timestamps: Vec<f64>,
    pub values: Vec<Option<f64>>,
}

impl SeriesSnapshot {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Contiguous runs of measured values, split at gaps.
    pub fn segments(&self) -> Vec<Vec<(f64, f64)>> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        for (&t, v) in self.timestamps.iter().zip(&self.values) {
            match v {
                Some(v) => current.push((t, *v)),
                None => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }
}

pub struct RollingSeriesBuffer {
    window_secs: f64,
    series: HashMap<(TrackId, Signal), VecDeque<AngleSample>>,
}

impl RollingSeriesBuffer {
    pub fn new(window_secs: f64) -> Result<Self, Error> {
        if !(window_secs.is_finite() && window_secs > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "rolling window must be positive, got {window_secs}"
            )));
        }
        Ok(Self {
            window_secs,
            series: HashMap::new(),
        })
    }

    pub fn from_config(config: &DisplayConfig) -> Result<Self, Error> {
        Self::new(config.window_secs)
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// 追加して、最新サンプルから窓幅より古いものを捨てる。
    /// 既存の最新より古いもの、非有限のタイムスタンプは受け付けない (false)。
    pub fn push(&mut self, track_id: TrackId, signal: Signal, sample: AngleSample) -> bool {
        if !sample.timestamp.is_finite() {
            warn!(
                "dropping sample for {} {} with timestamp {}",
                track_id, signal, sample.timestamp
            );
            return false;
        }
        let buffer = self.series.entry((track_id, signal)).or_default();
        if let Some(last) = buffer.back() {
            if sample.timestamp < last.timestamp {
                warn!(
                    "dropping out-of-order sample for {} {}: {:.3}s < {:.3}s",
                    track_id, signal, sample.timestamp, last.timestamp
                );
                return false;
            }
        }
        buffer.push_back(sample);

        let oldest_allowed = sample.timestamp - self.window_secs;
        while buffer.front().is_some_and(|s| s.timestamp < oldest_allowed) {
            buffer.pop_front();
        }
        true
    }

    pub fn snapshot(&self, track_id: TrackId, signal: Signal) -> SeriesSnapshot {
        let (timestamps, values): (Vec<f64>, Vec<Option<f64>>) = self
            .series
            .get(&(track_id, signal))
            .map(|buf| buf.iter().map(|s| (s.timestamp, s.value)).unzip())
            .unwrap_or_default();
        SeriesSnapshot {
            track_id,
            signal,
            timestamps,
            values,
        }
    }

    pub fn latest(&self, track_id: TrackId, signal: Signal) -> Option<&AngleSample> {
        self.series.get(&(track_id, signal)).and_then(|buf| buf.back())
    }

    pub fn tracks(&self) -> BTreeSet<TrackId> {
        self.series.keys().map(|(id, _)| *id).collect()
    }

    /// 指定トラックの全バッファを破棄
    pub fn forget_track(&mut self, track_id: TrackId) -> usize {
        let before = self.series.len();
        self.series.retain(|(id, _), _| *id != track_id);
        before - self.series.len()
    }

    /// 窓幅以上更新のないバッファを破棄し、完全に消えたトラックを返す
    pub fn prune_stale(&mut self, now: f64) -> Vec<TrackId> {
        if !now.is_finite() {
            return Vec::new();
        }
        let oldest_allowed = now - self.window_secs;
        let before = self.tracks();
        self.series
            .retain(|_, buf| buf.back().is_some_and(|s| s.timestamp >= oldest_allowed));
        let after = self.tracks();
        before.difference(&after).copied().collect()
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }
}

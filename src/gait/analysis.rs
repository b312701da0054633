//! Offline gait analysis of a sealed recording.
//!
//! Pipeline: gap filling → zero-phase low-pass of the ankle trace →
//! footstrike detection (minima of ankle x) → stride segmentation →
//! 0–100 % normalization → mean/SD band per signal.

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::filter::{fill_gaps, lowpass_zero_phase};
use super::peaks::find_minima;
use super::spline::normalize_stride;
use crate::config::GaitConfig;
use crate::error::Error;
use crate::pose::FrameRef;
use crate::session::SealedSession;

#[derive(Debug, Clone, PartialEq)]
pub struct GaitParams {
    pub cutoff_hz: f64,
    pub min_spacing_secs: f64,
    pub prominence: f64,
    pub resample_points: usize,
    pub fallback_fps: f64,
    pub min_frames: usize,
}

impl GaitParams {
    pub fn from_config(config: &GaitConfig) -> Self {
        Self {
            cutoff_hz: config.cutoff_hz,
            min_spacing_secs: config.min_spacing_secs,
            prominence: config.prominence,
            resample_points: config.resample_points,
            fallback_fps: config.fallback_fps,
            min_frames: config.min_frames,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.cutoff_hz.is_finite() && self.cutoff_hz > 0.0) {
            return Err(Error::InvalidConfig("cutoff_hz must be positive".into()));
        }
        if !(self.min_spacing_secs.is_finite() && self.min_spacing_secs >= 0.0) {
            return Err(Error::InvalidConfig("min_spacing_secs must be non-negative".into()));
        }
        if !(self.prominence.is_finite() && self.prominence >= 0.0) {
            return Err(Error::InvalidConfig("prominence must be non-negative".into()));
        }
        if self.resample_points < 2 {
            return Err(Error::InvalidConfig("resample_points must be at least 2".into()));
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(Error::InvalidConfig("fallback_fps must be positive".into()));
        }
        Ok(())
    }

    /// 接地間の最小サンプル数（1以上）
    pub fn min_distance(&self, fs: f64) -> usize {
        ((self.min_spacing_secs * fs).floor() as usize).max(1)
    }
}

impl Default for GaitParams {
    fn default() -> Self {
        Self::from_config(&GaitConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GaitSignal {
    Hip,
    Knee,
    AnkleX,
    AnkleY,
}

/// 接地イベント
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footstrike {
    /// Position in the session's frame list
    pub sample: usize,
    pub frame_index: u64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stride {
    /// 1-based
    pub number: usize,
    pub start: Footstrike,
    /// Closing footstrike, also the first sample of the next stride
    pub end: Footstrike,
    pub duration_secs: f64,
    /// Sub-series from `start` to `end` inclusive (gap-filled; ankle filtered)
    pub series: BTreeMap<GaitSignal, Vec<f64>>,
    /// Resampled onto the 0–100 % grid
    pub normalized: BTreeMap<GaitSignal, Vec<f64>>,
    pub frame_refs: Vec<Option<FrameRef>>,
}

/// ストライド間の平均 ± SD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrideBand {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub stride_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrideTiming {
    pub durations_secs: Vec<f64>,
    pub mean_secs: f64,
    pub std_secs: f64,
    pub strides_per_minute: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsufficientReason {
    TooFewFrames { frames: usize, required: usize },
    NoAnkleData,
    TooFewFootstrikes { found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Complete,
    InsufficientData(InsufficientReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitReport {
    pub session_name: String,
    pub frame_count: usize,
    pub sample_rate_hz: f64,
    /// false when `fallback_fps` was used
    pub sample_rate_estimated: bool,
    pub status: AnalysisStatus,
    pub filtered_ankle_x: Vec<f64>,
    pub filtered_ankle_y: Vec<f64>,
    pub footstrikes: Vec<Footstrike>,
    pub strides: Vec<Stride>,
    pub bands: BTreeMap<GaitSignal, StrideBand>,
    pub timing: Option<StrideTiming>,
}

impl GaitReport {
    fn empty(session: &SealedSession, sample_rate_hz: f64, sample_rate_estimated: bool) -> Self {
        Self {
            session_name: session.name().to_string(),
            frame_count: session.len(),
            sample_rate_hz,
            sample_rate_estimated,
            status: AnalysisStatus::Complete,
            filtered_ankle_x: Vec::new(),
            filtered_ankle_y: Vec::new(),
            footstrikes: Vec::new(),
            strides: Vec::new(),
            bands: BTreeMap::new(),
            timing: None,
        }
    }

    fn insufficient(mut self, reason: InsufficientReason) -> Self {
        info!("gait analysis of '{}': insufficient data ({:?})", self.session_name, reason);
        self.status = AnalysisStatus::InsufficientData(reason);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.status == AnalysisStatus::Complete
    }

    pub fn footstrike_frames(&self) -> Vec<u64> {
        self.footstrikes.iter().map(|f| f.frame_index).collect()
    }

    pub fn band(&self, signal: GaitSignal) -> Option<&StrideBand> {
        self.bands.get(&signal)
    }
}

fn aggregate(curves: &[&Vec<f64>], points: usize) -> Option<StrideBand> {
    if curves.is_empty() {
        return None;
    }
    let flat: Vec<f64> = curves.iter().flat_map(|c| c.iter().copied()).collect();
    let matrix = Array2::from_shape_vec((curves.len(), points), flat).ok()?;
    let mean = matrix.mean_axis(Axis(0))?;
    let std = matrix.std_axis(Axis(0), 0.0);
    Some(StrideBand {
        mean: mean.to_vec(),
        std: std.to_vec(),
        stride_count: curves.len(),
    })
}

fn stride_timing(strides: &[Stride]) -> Option<StrideTiming> {
    let durations: Array1<f64> = strides.iter().map(|s| s.duration_secs).collect();
    let mean_secs = durations.mean()?;
    Some(StrideTiming {
        std_secs: durations.std(0.0),
        strides_per_minute: if mean_secs > 0.0 { 60.0 / mean_secs } else { 0.0 },
        mean_secs,
        durations_secs: durations.to_vec(),
    })
}

/// Pure function of a sealed session and its parameters.
#[derive(Debug, Clone, Default)]
pub struct GaitAnalyzer {
    params: GaitParams,
}

impl GaitAnalyzer {
    pub fn new(params: GaitParams) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn from_config(config: &GaitConfig) -> Result<Self, Error> {
        Self::new(GaitParams::from_config(config))
    }

    pub fn params(&self) -> &GaitParams {
        &self.params
    }

    pub fn analyze(&self, session: &SealedSession) -> GaitReport {
        let p = &self.params;
        let (fs, estimated) = match session.estimated_fps() {
            Some(fs) => (fs, true),
            None => (p.fallback_fps, false),
        };
        let mut report = GaitReport::empty(session, fs, estimated);

        if session.len() < p.min_frames {
            return report.insufficient(InsufficientReason::TooFewFrames {
                frames: session.len(),
                required: p.min_frames,
            });
        }
        let (Some(ankle_x), Some(ankle_y)) =
            (fill_gaps(&session.ankle_x()), fill_gaps(&session.ankle_y()))
        else {
            return report.insufficient(InsufficientReason::NoAnkleData);
        };

        report.filtered_ankle_x = lowpass_zero_phase(&ankle_x, p.cutoff_hz, fs);
        report.filtered_ankle_y = lowpass_zero_phase(&ankle_y, p.cutoff_hz, fs);

        let frames = session.frames();
        report.footstrikes = find_minima(&report.filtered_ankle_x, p.min_distance(fs), p.prominence)
            .into_iter()
            .map(|sample| Footstrike {
                sample,
                frame_index: frames[sample].frame_index,
                timestamp: frames[sample].timestamp,
            })
            .collect();
        info!(
            "gait analysis of '{}': {} footstrikes at {:.1} Hz",
            report.session_name,
            report.footstrikes.len(),
            fs
        );
        if report.footstrikes.len() < 2 {
            let found = report.footstrikes.len();
            return report.insufficient(InsufficientReason::TooFewFootstrikes { found });
        }

        let mut signals = BTreeMap::new();
        if let Some(hip) = fill_gaps(&session.hip_angles()) {
            signals.insert(GaitSignal::Hip, hip);
        }
        if let Some(knee) = fill_gaps(&session.knee_angles()) {
            signals.insert(GaitSignal::Knee, knee);
        }
        signals.insert(GaitSignal::AnkleX, report.filtered_ankle_x.clone());
        signals.insert(GaitSignal::AnkleY, report.filtered_ankle_y.clone());

        let timestamps = session.timestamps();
        report.strides = report
            .footstrikes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (start, end) = (pair[0], pair[1]);
                let range = start.sample..=end.sample;
                let ts = &timestamps[range.clone()];
                let series: BTreeMap<GaitSignal, Vec<f64>> = signals
                    .iter()
                    .map(|(&signal, values)| (signal, values[range.clone()].to_vec()))
                    .collect();
                let normalized = series
                    .iter()
                    .filter_map(|(&signal, values)| {
                        normalize_stride(ts, values, p.resample_points).map(|n| (signal, n))
                    })
                    .collect();
                Stride {
                    number: i + 1,
                    start,
                    end,
                    duration_secs: end.timestamp - start.timestamp,
                    series,
                    normalized,
                    frame_refs: frames[range].iter().map(|f| f.frame_ref).collect(),
                }
            })
            .collect();
        debug!("segmented {} strides", report.strides.len());

        for &signal in signals.keys() {
            let curves: Vec<&Vec<f64>> = report
                .strides
                .iter()
                .filter_map(|s| s.normalized.get(&signal))
                .collect();
            if let Some(band) = aggregate(&curves, p.resample_points) {
                report.bands.insert(signal, band);
            }
        }
        report.timing = stride_timing(&report.strides);
        report
    }
}

/// One-shot background analysis of a sealed session.
pub struct AnalysisJob {
    session_name: String,
    handle: JoinHandle<GaitReport>,
}

impl AnalysisJob {
    pub fn spawn(session: SealedSession, analyzer: GaitAnalyzer) -> anyhow::Result<Self> {
        let session_name = session.name().to_string();
        let handle = thread::Builder::new()
            .name(format!("gait-{}", session_name))
            .spawn(move || analyzer.analyze(&session))
            .context("failed to spawn gait analysis thread")?;
        Ok(Self {
            session_name,
            handle,
        })
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn join(self) -> anyhow::Result<GaitReport> {
        self.handle
            .join()
            .map_err(|_| anyhow!("gait analysis of '{}' panicked", self.session_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FrameSample;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const FPS: f64 = 30.0;

    fn session_from(
        n: usize,
        ankle_x: impl Fn(usize) -> Option<f64>,
        angle: impl Fn(usize) -> Option<f64>,
    ) -> SealedSession {
        let frames = (0..n)
            .map(|i| FrameSample {
                frame_index: 1000 + i as u64,
                timestamp: i as f64 / FPS,
                hip_angle: angle(i).map(|a| -0.5 * a),
                knee_angle: angle(i),
                ankle: ankle_x(i).map(|x| (x, 400.0 + (i % 30) as f64)),
                frame_ref: Some(FrameRef(i as u64)),
            })
            .collect();
        SealedSession::from_frames("test", frames)
    }

    /// Triangle wave with minima at 15, 45, 75, ...
    fn triangle(i: usize) -> f64 {
        let d = ((i + 15) % 30) as f64;
        300.0 + 4.0 * d.min(30.0 - d)
    }

    fn periodic_angle(i: usize) -> f64 {
        let phase = (i % 30) as f64 / 30.0;
        30.0 + 25.0 * (2.0 * PI * phase).sin() + 8.0 * (4.0 * PI * phase).cos()
    }

    #[test]
    fn test_params_validation() {
        assert!(GaitParams::default().validate().is_ok());
        let mut p = GaitParams::default();
        p.resample_points = 1;
        assert!(GaitAnalyzer::new(p).is_err());
        let mut p = GaitParams::default();
        p.cutoff_hz = 0.0;
        assert!(p.validate().is_err());
        assert_eq!(GaitParams::default().min_distance(30.0), 7);
        let mut p = GaitParams::default();
        p.min_spacing_secs = 0.0;
        assert_eq!(p.min_distance(30.0), 1);
    }

    #[test]
    fn test_sinusoid_footstrikes_recovered() {
        // Period 1 s, minima at 0.5, 1.5, ... 4.5 s
        let period = 1.0;
        let t0 = 0.5;
        let session = session_from(
            148,
            |i| {
                let t = i as f64 / FPS;
                Some(300.0 - 20.0 * (2.0 * PI * (t - t0) / period).cos())
            },
            |_| Some(10.0),
        );
        let report = GaitAnalyzer::default().analyze(&session);
        assert!(report.is_complete());
        assert_abs_diff_eq!(report.sample_rate_hz, FPS, epsilon = 1e-9);
        assert!(report.sample_rate_estimated);

        let expected: Vec<f64> = (0..5).map(|k| t0 + k as f64 * period).collect();
        assert_eq!(report.footstrikes.len(), expected.len());
        for (fs, t) in report.footstrikes.iter().zip(&expected) {
            assert!((fs.timestamp - t).abs() <= 1.0 / FPS + 1e-9, "{} vs {}", fs.timestamp, t);
        }
        assert_eq!(report.strides.len(), expected.len() - 1);

        let timing = report.timing.as_ref().unwrap();
        assert_abs_diff_eq!(timing.mean_secs, period, epsilon = 1.0 / FPS);
        assert_abs_diff_eq!(timing.strides_per_minute, 60.0, epsilon = 2.5);
    }

    #[test]
    fn test_identical_triangular_strides() {
        let session = session_from(120, |i| Some(triangle(i)), |i| Some(periodic_angle(i)));
        let report = GaitAnalyzer::default().analyze(&session);
        assert!(report.is_complete());
        assert_eq!(report.footstrike_frames(), vec![1015, 1045, 1075, 1105]);
        assert_eq!(report.strides.len(), 3);

        let first = &report.strides[0];
        assert_eq!(first.number, 1);
        assert_eq!(first.start.sample, 15);
        assert_eq!(first.end.sample, 45);
        assert_eq!(first.series[&GaitSignal::Knee].len(), 31);
        assert_eq!(first.frame_refs.len(), 31);
        assert_eq!(report.strides[1].start, first.end);

        for signal in [GaitSignal::Hip, GaitSignal::Knee] {
            let band = report.band(signal).unwrap();
            assert_eq!(band.stride_count, 3);
            assert_eq!(band.mean.len(), 101);
            let single = &first.normalized[&signal];
            for k in 0..101 {
                assert_abs_diff_eq!(band.mean[k], single[k], epsilon = 1e-9);
                assert_abs_diff_eq!(band.std[k], 0.0, epsilon = 1e-9);
            }
        }
        let ankle = report.band(GaitSignal::AnkleX).unwrap();
        for k in 0..101 {
            assert_abs_diff_eq!(ankle.std[k], 0.0, epsilon = 1e-4);
        }

        let timing = report.timing.unwrap();
        assert_abs_diff_eq!(timing.std_secs, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(timing.mean_secs, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let session = session_from(120, |i| Some(triangle(i)), |i| Some(periodic_angle(i)));
        let analyzer = GaitAnalyzer::default();
        let a = analyzer.analyze(&session);
        let b = analyzer.analyze(&session);
        assert_eq!(a, b);
    }

    #[test]
    fn test_standing_subject_is_insufficient() {
        let session = session_from(90, |_| Some(310.0), |_| Some(5.0));
        let report = GaitAnalyzer::default().analyze(&session);
        assert_eq!(
            report.status,
            AnalysisStatus::InsufficientData(InsufficientReason::TooFewFootstrikes { found: 0 })
        );
        assert!(report.strides.is_empty());
        assert!(report.bands.is_empty());
        assert!(report.timing.is_none());
        assert_eq!(report.filtered_ankle_x.len(), 90);
    }

    #[test]
    fn test_short_session_is_insufficient() {
        let session = session_from(10, |i| Some(triangle(i)), |_| None);
        let report = GaitAnalyzer::default().analyze(&session);
        assert_eq!(
            report.status,
            AnalysisStatus::InsufficientData(InsufficientReason::TooFewFrames {
                frames: 10,
                required: 30
            })
        );

        let empty = SealedSession::from_frames("empty", Vec::new());
        let report = GaitAnalyzer::default().analyze(&empty);
        assert!(!report.is_complete());
        assert!(!report.sample_rate_estimated);
        assert_eq!(report.sample_rate_hz, 30.0);
    }

    #[test]
    fn test_missing_ankle_is_insufficient() {
        let session = session_from(60, |_| None, |_| Some(5.0));
        let report = GaitAnalyzer::default().analyze(&session);
        assert_eq!(
            report.status,
            AnalysisStatus::InsufficientData(InsufficientReason::NoAnkleData)
        );
    }

    #[test]
    fn test_gaps_are_filled_before_analysis() {
        let session = session_from(
            120,
            |i| (i % 7 != 3).then(|| triangle(i)),
            |i| (i % 11 != 0).then(|| periodic_angle(i)),
        );
        let report = GaitAnalyzer::default().analyze(&session);
        assert!(report.is_complete());
        assert_eq!(report.footstrikes.len(), 4);
        assert!(report.band(GaitSignal::Knee).is_some());
    }

    #[test]
    fn test_unmeasured_angles_excluded() {
        let session = session_from(120, |i| Some(triangle(i)), |_| None);
        let report = GaitAnalyzer::default().analyze(&session);
        assert!(report.is_complete());
        assert!(report.band(GaitSignal::Knee).is_none());
        assert!(report.band(GaitSignal::Hip).is_none());
        assert!(report.band(GaitSignal::AnkleX).is_some());
        assert!(!report.strides[0].series.contains_key(&GaitSignal::Hip));
    }

    #[test]
    fn test_background_job() {
        let session = session_from(120, |i| Some(triangle(i)), |i| Some(periodic_angle(i)));
        let expected = GaitAnalyzer::default().analyze(&session);
        let job = AnalysisJob::spawn(session, GaitAnalyzer::default()).unwrap();
        assert_eq!(job.session_name(), "test");
        assert_eq!(job.join().unwrap(), expected);
    }
}

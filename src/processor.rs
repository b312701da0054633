//! Synchronous per-frame core.
//!
//! ```text
//! FrameRecord → TrackBinder → AngleCalculator ┬→ RollingSeriesBuffer (display)
//!                                             ├→ MovementStateMachine (squat)
//!                                             └→ Recorder (gait, while active)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::gait::{AnalysisJob, GaitAnalyzer, GaitReport};
use crate::kinematics::{AngleCalculator, Joint, Side, Signal};
use crate::pose::{FrameRecord, KeypointIndex, Pose, TrackId};
use crate::session::{FrameSample, Recorder, SealedSession};
use crate::tracker::{
    AngleSample, BindingPolicy, MovementEvent, MovementStateMachine, Role, RoleBindings,
    RollingSeriesBuffer, SeriesSnapshot, TrackBinder,
};

/// 表示用の1信号・1フレーム分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySample {
    pub signal: Signal,
    pub timestamp: f64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    pub frame_index: u64,
    pub timestamp: f64,
    pub bindings: RoleBindings,
    pub display: Vec<DisplaySample>,
    /// Flexion magnitude fed to the squat counter
    pub squat_angle: Option<f64>,
    pub events: Vec<MovementEvent>,
    pub repetitions: u32,
    /// Frame was appended to the active recording
    pub recorded: bool,
}

fn ankle_index(side: Side) -> KeypointIndex {
    match side {
        Side::Left => KeypointIndex::LeftAnkle,
        Side::Right => KeypointIndex::RightAnkle,
    }
}

pub struct FrameProcessor {
    calculator: AngleCalculator,
    binder: TrackBinder,
    rolling: RollingSeriesBuffer,
    display_signals: Vec<Signal>,
    squat_signal: Signal,
    squat: MovementStateMachine,
    recorder: Recorder,
    side: Side,
    analyzer: GaitAnalyzer,
}

impl FrameProcessor {
    /// 設定の検証に失敗したら処理を始めない
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            calculator: AngleCalculator::from_config(&config.angles),
            binder: TrackBinder::from_config(&config.binding),
            rolling: RollingSeriesBuffer::from_config(&config.display)?,
            display_signals: config.display.signals.clone(),
            squat_signal: config.squat.signal,
            squat: MovementStateMachine::from_config(&config.squat)?,
            recorder: Recorder::new(),
            side: config.angles.side,
            analyzer: GaitAnalyzer::from_config(&config.gait)?,
        })
    }

    fn angle_for(
        &self,
        frame: &FrameRecord,
        track: Option<TrackId>,
        signal: Signal,
    ) -> Option<f64> {
        let pose = frame.pose(track?)?;
        self.calculator.angle(pose, signal)
    }

    fn gait_sample(&self, frame: &FrameRecord, track: Option<TrackId>) -> FrameSample {
        let Some(pose) = track.and_then(|id| frame.pose(id)) else {
            return FrameSample::missing(frame.frame_index, frame.timestamp, frame.frame_ref);
        };
        FrameSample {
            frame_index: frame.frame_index,
            timestamp: frame.timestamp,
            hip_angle: self.calculator.angle(pose, Signal::new(self.side, Joint::Hip)),
            knee_angle: self.calculator.angle(pose, Signal::new(self.side, Joint::Knee)),
            ankle: self.ankle(pose),
            frame_ref: frame.frame_ref,
        }
    }

    fn ankle(&self, pose: &Pose) -> Option<(f64, f64)> {
        let kp = pose.get(ankle_index(self.side));
        kp.is_valid(self.calculator.confidence_threshold())
            .then(|| kp.position())
    }

    /// 非有限のタイムスタンプを持つフレームはどの状態にも反映しない
    pub fn process_frame(&mut self, frame: &FrameRecord) -> FrameOutput {
        if !frame.timestamp.is_finite() {
            warn!(
                "frame {} ignored, timestamp {}",
                frame.frame_index, frame.timestamp
            );
            return FrameOutput {
                frame_index: frame.frame_index,
                timestamp: frame.timestamp,
                bindings: self.binder.last(),
                display: Vec::new(),
                squat_angle: None,
                events: Vec::new(),
                repetitions: self.squat.repetitions(),
                recorded: false,
            };
        }

        let bindings = self.binder.resolve(frame);

        let display_track = bindings.display.track_id();
        let display: Vec<DisplaySample> = self
            .display_signals
            .iter()
            .map(|&signal| DisplaySample {
                signal,
                timestamp: frame.timestamp,
                value: self.angle_for(frame, bindings.display.present(), signal),
            })
            .collect();
        if let Some(id) = display_track {
            for sample in &display {
                self.rolling.push(
                    id,
                    sample.signal,
                    AngleSample::new(frame.frame_index, frame.timestamp, sample.value),
                );
            }
        }

        // Flexion depth regardless of which way the subject faces
        let squat_angle = self
            .angle_for(frame, bindings.squat.present(), self.squat_signal)
            .map(f64::abs);
        let events: Vec<MovementEvent> = self
            .squat
            .update(frame.frame_index, squat_angle)
            .into_iter()
            .collect();

        let recorded = if self.recorder.is_active() {
            let sample = self.gait_sample(frame, bindings.gait.present());
            match self.recorder.append(sample) {
                Ok(recorded) => recorded,
                Err(e) => {
                    warn!("frame {} not recorded: {}", frame.frame_index, e);
                    false
                }
            }
        } else {
            false
        };

        let pruned = self.rolling.prune_stale(frame.timestamp);
        if !pruned.is_empty() {
            debug!("evicted rolling buffers of tracks {:?}", pruned);
        }

        FrameOutput {
            frame_index: frame.frame_index,
            timestamp: frame.timestamp,
            bindings,
            display,
            squat_angle,
            events,
            repetitions: self.squat.repetitions(),
            recorded,
        }
    }

    pub fn start_recording(&mut self, name: impl Into<String>) -> Result<(), Error> {
        self.recorder.start(name)
    }

    pub fn stop_recording(&mut self) -> Result<SealedSession, Error> {
        self.recorder.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_active()
    }

    pub fn recorded_frames(&self) -> usize {
        self.recorder.frame_count()
    }

    pub fn bind(&mut self, role: Role, policy: BindingPolicy) {
        info!("{:?} binding policy set to {:?}", role, policy);
        self.binder.set_policy(role, policy);
    }

    pub fn bindings(&self) -> RoleBindings {
        self.binder.last()
    }

    /// Rolling history of the display-bound track.
    pub fn snapshot(&self, signal: Signal) -> Option<SeriesSnapshot> {
        let id = self.binder.last().display.track_id()?;
        Some(self.rolling.snapshot(id, signal))
    }

    pub fn snapshot_track(&self, track_id: TrackId, signal: Signal) -> SeriesSnapshot {
        self.rolling.snapshot(track_id, signal)
    }

    pub fn forget_track(&mut self, track_id: TrackId) -> usize {
        self.rolling.forget_track(track_id)
    }

    pub fn repetitions(&self) -> u32 {
        self.squat.repetitions()
    }

    pub fn reset_repetitions(&mut self) {
        self.squat.reset();
    }

    pub fn analyzer(&self) -> &GaitAnalyzer {
        &self.analyzer
    }

    pub fn analyze(&self, session: &SealedSession) -> GaitReport {
        self.analyzer.analyze(session)
    }

    /// Stop the recording and analyse it on a background thread.
    pub fn stop_and_analyze(&mut self) -> anyhow::Result<AnalysisJob> {
        let session = self.recorder.stop()?;
        AnalysisJob::spawn(session, self.analyzer.clone())
    }
}

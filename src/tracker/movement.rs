//! Multi-frame validated movement detection (squat repetitions and the like).
//!
//! ```text
//! IDLE --true--> CANDIDATE --true x validation_frames--> VALIDATED --false--> COOLDOWN --> IDLE
//!                    |                                                  (rep += 1)
//!                    +--false--> IDLE
//! ```
//!
//! A missing angle counts as `false`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SquatConfig;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementState {
    Idle,
    Candidate,
    Validated,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementEvent {
    /// 連続 `validation_frames` フレームで条件成立
    Validated { frame_index: u64 },
    /// 確定状態から抜けた（1回分完了）
    Repetition { count: u32, frame_index: u64 },
}

pub trait AnglePredicate {
    fn holds(&self, angle: f64) -> bool;
}

impl<F> AnglePredicate for F
where
    F: Fn(f64) -> bool,
{
    fn holds(&self, angle: f64) -> bool {
        self(angle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// angle >= threshold
    Above,
    /// angle <= threshold
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPredicate {
    pub threshold: f64,
    pub direction: ThresholdDirection,
}

impl ThresholdPredicate {
    pub fn new(threshold: f64, direction: ThresholdDirection) -> Self {
        Self {
            threshold,
            direction,
        }
    }
}

impl AnglePredicate for ThresholdPredicate {
    fn holds(&self, angle: f64) -> bool {
        match self.direction {
            ThresholdDirection::Above => angle >= self.threshold,
            ThresholdDirection::Below => angle <= self.threshold,
        }
    }
}

pub struct MovementStateMachine<P = ThresholdPredicate> {
    predicate: P,
    validation_frames: u32,
    state: MovementState,
    consecutive: u32,
    repetitions: u32,
}

impl MovementStateMachine<ThresholdPredicate> {
    /// 膝屈曲角しきい値によるスクワット判定
    pub fn from_config(config: &SquatConfig) -> Result<Self, Error> {
        Self::new(
            ThresholdPredicate::new(config.threshold_deg, config.direction),
            config.validation_frames,
        )
    }
}

impl<P: AnglePredicate> MovementStateMachine<P> {
    pub fn new(predicate: P, validation_frames: u32) -> Result<Self, Error> {
        if validation_frames == 0 {
            return Err(Error::InvalidConfig(
                "validation_frames must be at least 1".into(),
            ));
        }
        Ok(Self {
            predicate,
            validation_frames,
            state: MovementState::Idle,
            consecutive: 0,
            repetitions: 0,
        })
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn validation_frames(&self) -> u32 {
        self.validation_frames
    }

    pub fn update(&mut self, frame_index: u64, angle: Option<f64>) -> Option<MovementEvent> {
        if self.state == MovementState::Cooldown {
            self.state = MovementState::Idle;
            return None;
        }

        let holds = angle.is_some_and(|a| self.predicate.holds(a));
        match (self.state, holds) {
            (MovementState::Idle, true) | (MovementState::Candidate, true) => {
                self.state = MovementState::Candidate;
                self.consecutive += 1;
                if self.consecutive >= self.validation_frames {
                    self.state = MovementState::Validated;
                    debug!("movement validated at frame {}", frame_index);
                    return Some(MovementEvent::Validated { frame_index });
                }
                None
            }
            (MovementState::Candidate, false) => {
                self.state = MovementState::Idle;
                self.consecutive = 0;
                None
            }
            (MovementState::Validated, false) => {
                self.state = MovementState::Cooldown;
                self.consecutive = 0;
                self.repetitions += 1;
                info!("repetition #{} completed at frame {}", self.repetitions, frame_index);
                Some(MovementEvent::Repetition {
                    count: self.repetitions,
                    frame_index,
                })
            }
            (MovementState::Idle, false) | (MovementState::Validated, true) => None,
            (MovementState::Cooldown, _) => None,
        }
    }

    /// Back to IDLE with the repetition count cleared.
    pub fn reset(&mut self) {
        self.state = MovementState::Idle;
        self.consecutive = 0;
        self.repetitions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(validation_frames: u32) -> MovementStateMachine {
        MovementStateMachine::new(
            ThresholdPredicate::new(90.0, ThresholdDirection::Above),
            validation_frames,
        )
        .unwrap()
    }

    /// Feeds angles and collects emitted events.
    fn run(m: &mut MovementStateMachine, angles: &[Option<f64>]) -> Vec<MovementEvent> {
        angles
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| m.update(i as u64, a))
            .collect()
    }

    fn pattern(true_frames: usize, false_frames: usize) -> Vec<Option<f64>> {
        std::iter::repeat(Some(120.0))
            .take(true_frames)
            .chain(std::iter::repeat(Some(20.0)).take(false_frames))
            .collect()
    }

    #[test]
    fn test_zero_validation_frames_rejected() {
        assert!(MovementStateMachine::new(|a: f64| a > 0.0, 0).is_err());
    }

    #[test]
    fn test_short_hold_never_validates() {
        for v in 1..=6u32 {
            let mut m = machine(v);
            let events = run(&mut m, &pattern(v as usize - 1, 3));
            assert!(events.is_empty(), "validation_frames={v}");
            assert_eq!(m.repetitions(), 0);
            assert_eq!(m.state(), MovementState::Idle);
        }
    }

    #[test]
    fn test_exact_hold_validates_once_and_counts_once() {
        for v in 1..=6u32 {
            let mut m = machine(v);
            let events = run(&mut m, &pattern(v as usize, 3));
            let validated = events
                .iter()
                .filter(|e| matches!(e, MovementEvent::Validated { .. }))
                .count();
            let reps: Vec<_> = events
                .iter()
                .filter(|e| matches!(e, MovementEvent::Repetition { .. }))
                .collect();
            assert_eq!(validated, 1, "validation_frames={v}");
            assert_eq!(reps.len(), 1);
            assert_eq!(m.repetitions(), 1);
        }
    }

    #[test]
    fn test_state_sequence() {
        let mut m = machine(3);
        assert_eq!(m.update(0, Some(100.0)), None);
        assert_eq!(m.state(), MovementState::Candidate);
        assert_eq!(m.update(1, Some(100.0)), None);
        assert_eq!(m.consecutive(), 2);
        assert_eq!(m.update(2, Some(100.0)), Some(MovementEvent::Validated { frame_index: 2 }));
        assert_eq!(m.state(), MovementState::Validated);
        assert_eq!(m.update(3, Some(100.0)), None);
        assert_eq!(m.state(), MovementState::Validated);
        assert_eq!(
            m.update(4, Some(10.0)),
            Some(MovementEvent::Repetition { count: 1, frame_index: 4 })
        );
        assert_eq!(m.state(), MovementState::Cooldown);
        // Flicker on the debounce frame is ignored
        assert_eq!(m.update(5, Some(100.0)), None);
        assert_eq!(m.state(), MovementState::Idle);
    }

    #[test]
    fn test_missing_angle_counts_as_false() {
        let mut m = machine(3);
        let events = run(&mut m, &[Some(100.0), Some(100.0), None, Some(100.0), Some(100.0)]);
        assert!(events.is_empty());
        assert_eq!(m.state(), MovementState::Candidate);

        let mut m = machine(2);
        let events = run(&mut m, &[Some(100.0), Some(100.0), None]);
        assert_eq!(events.len(), 2);
        assert_eq!(m.repetitions(), 1);
    }

    #[test]
    fn test_multiple_repetitions() {
        let mut m = machine(3);
        let mut angles = Vec::new();
        for _ in 0..4 {
            angles.extend(pattern(5, 4));
        }
        let events = run(&mut m, &angles);
        assert_eq!(m.repetitions(), 4);
        assert_eq!(events.len(), 8);
        assert!(matches!(events.last(), Some(MovementEvent::Repetition { count: 4, .. })));
    }

    #[test]
    fn test_below_predicate_and_closure() {
        let mut m = MovementStateMachine::new(
            ThresholdPredicate::new(30.0, ThresholdDirection::Below),
            2,
        )
        .unwrap();
        assert_eq!(m.update(0, Some(25.0)), None);
        assert!(m.update(1, Some(30.0)).is_some());

        let mut m = MovementStateMachine::new(|a: f64| a.abs() > 45.0, 1).unwrap();
        assert_eq!(m.update(0, Some(-50.0)), Some(MovementEvent::Validated { frame_index: 0 }));
    }

    #[test]
    fn test_reset() {
        let mut m = machine(1);
        run(&mut m, &pattern(1, 1));
        assert_eq!(m.repetitions(), 1);
        m.reset();
        assert_eq!(m.repetitions(), 0);
        assert_eq!(m.state(), MovementState::Idle);
    }
}

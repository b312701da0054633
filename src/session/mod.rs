pub mod recording;

pub use recording::{FrameSample, Recorder, SealedSession, SessionRow};

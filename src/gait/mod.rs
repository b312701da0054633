pub mod analysis;
pub mod filter;
pub mod peaks;
pub mod spline;

pub use analysis::{
    AnalysisJob, AnalysisStatus, Footstrike, GaitAnalyzer, GaitParams, GaitReport, GaitSignal,
    InsufficientReason, Stride, StrideBand, StrideTiming,
};

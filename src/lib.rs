pub mod config;
pub mod error;
pub mod gait;
pub mod kinematics;
pub mod pose;
pub mod processor;
pub mod protocol;
pub mod session;
pub mod tracker;

pub use error::{Error, Result};

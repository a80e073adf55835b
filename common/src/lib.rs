//! Utilities shared by the workspace crates: the 2-D grid container and logging setup.

pub mod buffer2;
pub mod log_setup;

pub use buffer2::{mirror_index, Buffer2};
pub use log_setup::{setup_logging, LogSetupError};

//! LogVault Logs - Rotating file sink and logging pipeline lifecycle

mod error;
mod pipeline;
mod rotation;
mod writer;

pub use error::{LogError, Result, RotationError};
pub use pipeline::{build_subscriber, init, LoggingHandle};
pub use rotation::{RotationPolicy, RotationTrigger};
pub use writer::{LogWriter, RecordWriter};

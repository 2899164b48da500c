//! Channel Progress - Core Library
//!
//! Runs long channel-download operations on a background worker and reports
//! their progress, step changes and outcome to an observer living on the
//! controlling context (a GUI event loop, a terminal, or async code).

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use self::core::{
    config::{PhaseConfig, ProgressConfig},
    message_parser::MessageProgressParser,
    models::{
        AppError, AppResult, ChannelDownloadSummary, ErrorKind, OperationError, OperationResult,
        ProgressEvent, ProgressState,
    },
    observer::{ProgressObserver, TracingObserver},
    runner::{CancelToken, Operation, OperationRunner, ProgressSink, RunHandle, RunReport, RunState},
    step_sequencer::StepSequencer,
};

pub use utils::validation::{parse_channel_ref, ChannelRef};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library with default settings
pub fn init() -> anyhow::Result<()> {
    utils::logging::init_tracing();

    tracing::info!("📚 {} v{} initialized", NAME, VERSION);
    Ok(())
}

//! Core business logic module
//!
//! Progress state, step sequencing, message parsing and the operation runner
//! that bridges background work to a controlling-side observer.

pub mod config;
pub mod message_parser;
pub mod models;
pub mod observer;
pub mod runner;
pub mod step_sequencer;


#[cfg(test)]
mod runner_integration_tests;

// Re-export commonly used types
pub use config::{PhaseConfig, ProgressConfig};
pub use message_parser::{MessageProgressParser, ProgressPattern};
pub use observer::{ProgressObserver, TracingObserver};
pub use runner::{
    CancelToken, Operation, OperationRunner, ProgressSink, RunHandle, RunReport, RunState,
};
pub use step_sequencer::StepSequencer;

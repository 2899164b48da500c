//! Utility modules and helper functions
//!
//! Formatting, logging setup and channel identifier validation shared by the
//! library and the demo binary.

pub mod format;
pub mod logging;
pub mod validation;

// Re-export commonly used utilities
pub use format::*;
pub use logging::*;
pub use validation::*;

//! Instrumented harness for small Lua scripts on a constrained heap.
//!
//! Each run gets a fresh interpreter that is closed before the run returns. Heap samples are
//! taken at fixed checkpoints around allocation, library registration, execution and release.
//! A bounded wireless scan can be triggered as an independent step.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logger;
pub mod printer;
pub mod probe;
pub mod resolver;
pub mod scan;
pub mod telemetry;

pub use error::{RunError, ScanError};
pub use execution::{Harness, HarnessConfig, RunOutcome, RunReport, RunRequest, ScriptSource};
pub use probe::{MemoryProbe, TelemetrySample};
pub use resolver::{resolve, ResolvedPath};

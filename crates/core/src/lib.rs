//! Lua script pad core.
//!
//! # Architecture
//!
//! The core follows a strict separation:
//!
//! 1. **tokenizer** classifies raw source into style runs for the editor
//! 2. **ScriptExecutor** owns one run: interpreter, time bound, report
//! 3. **OutputSink** is the only place captured print output lives
//! 4. **Settings** selects the timeout and bounding strategy
//!
//! # Critical Rule
//!
//! **Scripts never touch host state directly.**
//!
//! The only bridge out of a running chunk is the captured `print`
//! primitive, which appends lines to a run-scoped sink. The interpreter
//! instance is created for one run and dropped on every exit path.
//!
//! # Safety Guarantees
//!
//! - **Sandboxed**: no OS/file/loader access from scripts
//! - **Bounded**: wall-clock timeout sampled at instruction granularity
//! - **Deterministic capture**: output lines in exact print-call order

pub mod config;
pub mod executor;
pub mod sink;
pub mod tokenizer;

pub use config::{Settings, DEFAULT_MAX_OUTPUT_LINES, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TIMEOUT};
pub use executor::{BoundStrategy, ExecutionResult, ExecutorConfig, RunStatus, ScriptExecutor, RETURN_HEADER};
pub use sink::OutputSink;
pub use tokenizer::{classify, RestyleGuard, StyleRun, TokenCategory};

//! Bounded Lua execution with deterministic output capture.
//!
//! # Architecture Notes
//!
//! The executor is intentionally isolated from the host: scripts see a
//! sandboxed global table and a captured `print`, nothing else. A fresh
//! `mlua::Lua` is created for every run and dropped on every exit path, so
//! no interpreter state survives between runs.
//!
//! Two bounding strategies share one contract and differ in guarantee:
//!
//! - [`BoundStrategy::CooperativeHook`] (default) samples a VM hook every
//!   `sample_interval` instructions and raises from inside the interpreter
//!   when the wall-clock budget is spent. Execution itself halts, even in a
//!   tight non-yielding loop, within one sample interval.
//! - [`BoundStrategy::BoundedWait`] runs the interpreter on a worker thread
//!   and bounds only the caller's wait. On expiry a cancel flag is set for
//!   the worker's hook to observe; the worker may run until its next sample
//!   point, but it owns its own sink and interpreter, so a straggler cannot
//!   touch a later run.

use mlua::{HookTriggers, Lua, MultiValue, Value, VmState};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_MAX_OUTPUT_LINES, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TIMEOUT};
use crate::sink::OutputSink;

/// Header line that delimits returned values from printed output.
pub const RETURN_HEADER: &str = "-- Return value(s) --";

/// First line of every failure report. Normal output can never start with
/// this because captured lines come only from the script's own prints.
const ERROR_PREFIX: &str = "Error executing script:";

/// How one run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    RuntimeFault,
    Timeout,
}

/// Outcome of one script run. Consumed once by the caller; the next run
/// starts from a clean slate regardless of what this one says.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub report: String,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    fn fault(message: &str) -> Self {
        Self {
            status: RunStatus::RuntimeFault,
            report: format!("{ERROR_PREFIX}\n{message}"),
        }
    }

    fn timed_out(timeout: Duration) -> Self {
        Self {
            status: RunStatus::Timeout,
            report: format!(
                "{ERROR_PREFIX}\nexecution timed out after {timeout:?} (suspected unbounded loop)"
            ),
        }
    }
}

/// Bounded-execution strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundStrategy {
    /// Interrupt from inside the VM at instruction granularity. Strong:
    /// execution halts within one sample interval of the deadline.
    #[default]
    #[serde(rename = "hook")]
    CooperativeHook,

    /// Run on a worker thread, bound the caller's wait. Weak: the caller is
    /// unblocked on time, the worker stops at its next cancel check.
    #[serde(rename = "wait")]
    BoundedWait,
}

/// Runtime configuration for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Wall-clock budget for one run, measured from run start
    pub timeout: Duration,
    /// Interpreter instructions between bound checks
    pub sample_interval: u32,
    pub strategy: BoundStrategy,
    /// Sink line cap; overflow adds a truncation notice to the report
    pub max_output_lines: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            strategy: BoundStrategy::CooperativeHook,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
        }
    }
}

/// Wall-clock deadline for one run.
#[derive(Debug, Clone, Copy)]
struct RunDeadline {
    start: Instant,
    budget: Duration,
}

impl RunDeadline {
    fn starting_now(budget: Duration) -> Self {
        Self { start: Instant::now(), budget }
    }

    fn exceeded(&self) -> bool {
        self.start.elapsed() > self.budget
    }
}

/// Executes one script at a time against a sandboxed interpreter.
///
/// Owns the output sink: it is cleared when `run` begins and drained into
/// the report when `run` ends. `run` never panics on script misbehavior and
/// never returns an error; every fault is flattened into the report.
pub struct ScriptExecutor {
    config: ExecutorConfig,
    output: Rc<RefCell<OutputSink>>,
}

impl ScriptExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let max_lines = config.max_output_lines;
        Self {
            config,
            output: Rc::new(RefCell::new(OutputSink::new(max_lines))),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one script to completion, fault, or timeout.
    pub fn run(&self, source: &str) -> ExecutionResult {
        self.output.borrow_mut().clear();

        match self.config.strategy {
            BoundStrategy::CooperativeHook => self.run_hooked(source),
            BoundStrategy::BoundedWait => self.run_bounded_wait(source),
        }
    }

    /// Cooperative-hook strategy: everything on the caller's stack, the
    /// deadline enforced from inside the interpreter.
    fn run_hooked(&self, source: &str) -> ExecutionResult {
        let deadline = RunDeadline::starting_now(self.config.timeout);
        let outcome = eval_chunk(
            source,
            &self.config,
            Rc::clone(&self.output),
            Some(deadline),
            None,
        );
        let (lines, truncated) = self.output.borrow_mut().take();
        build_report(outcome, lines, truncated, &self.config)
    }

    /// Bounded-wait strategy: interpreter on a worker thread, caller blocks
    /// up to the timeout. The worker gets its own sink and interpreter so a
    /// straggler that ignores cancellation cannot touch a later run.
    fn run_bounded_wait(&self, source: &str) -> ExecutionResult {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let config = self.config.clone();
        let source = source.to_string();

        let spawned = std::thread::Builder::new()
            .name("luapad-script".to_string())
            .spawn(move || {
                let sink = Rc::new(RefCell::new(OutputSink::new(config.max_output_lines)));
                let outcome = eval_chunk(&source, &config, Rc::clone(&sink), None, Some(worker_cancel));
                let (lines, truncated) = sink.borrow_mut().take();
                // The caller may have timed out and dropped the receiver
                let _ = tx.send(build_report(outcome, lines, truncated, &config));
            });
        if let Err(e) = spawned {
            return ExecutionResult::fault(&format!("failed to spawn script worker: {e}"));
        }

        match rx.recv_timeout(self.config.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                ExecutionResult::timed_out(self.config.timeout)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::warn!("script worker exited without a result");
                ExecutionResult::fault("script worker terminated unexpectedly")
            }
        }
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

/// What one interpreter invocation produced, before report formatting.
enum ChunkOutcome {
    Completed { values: Vec<String> },
    TimedOut,
    Faulted { message: String },
}

/// Run one chunk on a fresh interpreter. The instance lives exactly as long
/// as this call; hook, globals and print override die with it.
fn eval_chunk(
    source: &str,
    config: &ExecutorConfig,
    output: Rc<RefCell<OutputSink>>,
    deadline: Option<RunDeadline>,
    cancel: Option<Arc<AtomicBool>>,
) -> ChunkOutcome {
    let lua = Lua::new();

    if let Err(e) = install_sandbox(&lua, output) {
        return ChunkOutcome::Faulted {
            message: format!("failed to initialize interpreter: {e}"),
        };
    }

    let timed_out = Arc::new(AtomicBool::new(false));
    if deadline.is_some() || cancel.is_some() {
        let timed_out = Arc::clone(&timed_out);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(config.sample_interval),
            move |_lua, _debug| {
                if let Some(ref cancel) = cancel {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(mlua::Error::RuntimeError("execution cancelled".to_string()));
                    }
                }
                if let Some(ref deadline) = deadline {
                    if deadline.exceeded() {
                        timed_out.store(true, Ordering::Relaxed);
                        return Err(mlua::Error::RuntimeError(
                            "execution deadline exceeded".to_string(),
                        ));
                    }
                }
                Ok(VmState::Continue)
            },
        );
    }

    let result = lua.load(source).eval::<MultiValue>();
    lua.remove_hook();

    match result {
        Ok(values) => ChunkOutcome::Completed {
            values: values.iter().map(render_value).collect(),
        },
        Err(_) if timed_out.load(Ordering::Relaxed) => ChunkOutcome::TimedOut,
        Err(e) => ChunkOutcome::Faulted { message: format_fault(&e) },
    }
}

/// Replace `print` with the capturing primitive and strip every global that
/// reaches the OS, the filesystem, or the chunk loader. Kept: basic library,
/// `string`, `table`, `math`, `utf8`.
fn install_sandbox(lua: &Lua, output: Rc<RefCell<OutputSink>>) -> mlua::Result<()> {
    let print_fn = lua.create_function(move |_, args: MultiValue| {
        let parts: Vec<String> = args.iter().map(render_value).collect();
        output.borrow_mut().push(parts.join(" "));
        Ok(())
    })?;

    let globals = lua.globals();
    globals.set("print", print_fn)?;
    for name in ["os", "io", "debug", "package", "require", "loadfile", "dofile", "load"] {
        globals.set(name, Value::Nil)?;
    }
    Ok(())
}

fn build_report(
    outcome: ChunkOutcome,
    lines: Vec<String>,
    truncated: bool,
    config: &ExecutorConfig,
) -> ExecutionResult {
    match outcome {
        ChunkOutcome::Completed { values } => {
            let mut report = String::new();
            for line in &lines {
                report.push_str(line);
                report.push('\n');
            }
            if truncated {
                report.push_str(&format!(
                    "... output truncated ({} line limit)\n",
                    config.max_output_lines
                ));
            }
            if !values.is_empty() {
                if !report.is_empty() {
                    report.push('\n');
                }
                report.push_str(RETURN_HEADER);
                report.push('\n');
                for value in &values {
                    report.push_str(value);
                    report.push('\n');
                }
            }
            ExecutionResult { status: RunStatus::Success, report }
        }
        ChunkOutcome::TimedOut => ExecutionResult::timed_out(config.timeout),
        ChunkOutcome::Faulted { message } => ExecutionResult::fault(&message),
    }
}

/// Convert a Lua value to its display string. `nil` renders as the literal
/// `nil`, matching what the print primitive promises.
fn render_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => {
            // No trailing zeros for whole floats
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
        Value::String(s) => s
            .to_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "<invalid utf8>".to_string()),
        Value::Table(_) => "table".to_string(),
        Value::Function(_) => "function".to_string(),
        Value::Thread(_) => "thread".to_string(),
        Value::UserData(_) => "userdata".to_string(),
        Value::LightUserData(_) => "lightuserdata".to_string(),
        Value::Error(e) => format!("error: {}", e),
        _ => "<unknown>".to_string(),
    }
}

/// Format an interpreter fault for the report.
fn format_fault(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => strip_chunk_prefix(message).to_string(),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_fault(cause),
        other => other.to_string(),
    }
}

/// Strip the `[string "..."]:N:` chunk-name prefix mlua puts on syntax
/// errors; the user pasted the source, the chunk name tells them nothing.
fn strip_chunk_prefix(message: &str) -> &str {
    if let Some(rest) = message.strip_prefix("[string ") {
        if let Some(bracket) = rest.find("]:") {
            let after = &rest[bracket + 2..];
            if let Some(colon) = after.find(": ") {
                return &after[colon + 2..];
            }
        }
    }
    message
}

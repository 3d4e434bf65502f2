//! Execution context manager: one isolated interpreter per run, released on every path.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

mod bindings;
mod budget;
mod capabilities;
mod context;

pub use bindings::{BindingValue, Bindings};
pub use budget::RunBudget;
pub use capabilities::{Capabilities, UnknownCapability};
pub use context::ExecutionContext;

use crate::{
    error::RunError,
    probe::{MemoryProbe, TelemetrySample, DEFAULT_HEAP_CAPACITY},
    resolver::{resolve_with_capacity, DEFAULT_SCRIPT_ROOT, PATH_BUFFER_CAPACITY},
    telemetry::{Checkpoint, RunTelemetry},
};

/// Where a script body comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    Inline(String),
    /// Logical name under the script root.
    File(String),
}

/// Result of one run: the optional returned value, or the failure.
pub type RunOutcome = Result<Option<String>, RunError>;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub script_root: String,
    pub path_capacity: usize,
    pub heap_capacity: usize,
    pub capabilities: Capabilities,
    pub budget: RunBudget,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            script_root: DEFAULT_SCRIPT_ROOT.to_string(),
            path_capacity: PATH_BUFFER_CAPACITY,
            heap_capacity: DEFAULT_HEAP_CAPACITY,
            capabilities: Capabilities::all(),
            budget: RunBudget::default(),
        }
    }
}

/// A run as requested by the caller.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: ScriptSource,
    pub label: String,
    pub bindings: Bindings,
    /// Globals to read back after a successful run.
    pub read_back: Vec<String>,
}

impl RunRequest {
    pub fn new(source: ScriptSource, label: &str) -> Self {
        Self {
            source,
            label: label.to_string(),
            bindings: Bindings::new(),
            read_back: Vec::new(),
        }
    }

    pub fn inline(code: &str, label: &str) -> Self {
        Self::new(ScriptSource::Inline(code.to_string()), label)
    }

    pub fn file(name: &str, label: &str) -> Self {
        Self::new(ScriptSource::File(name.to_string()), label)
    }

    pub fn bind(mut self, name: &str, value: BindingValue) -> Self {
        self.bindings.set(name, value);
        self
    }

    pub fn read(mut self, name: &str) -> Self {
        self.read_back.push(name.to_string());
        self
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub label: String,
    pub outcome: RunOutcome,
    pub telemetry: Vec<TelemetrySample>,
    pub bindings: Bindings,
    /// `package.path` after extension, for file runs.
    pub search_path: Option<String>,
    /// Search path setup failure; the run continued without it.
    pub search_path_error: Option<String>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Default)]
struct RunExtras {
    bindings: Bindings,
    search_path: Option<String>,
    search_path_error: Option<String>,
}

/// Runs scripts one at a time against a probe.
pub struct Harness {
    config: HarnessConfig,
    probe: Box<dyn MemoryProbe>,
}

impl Harness {
    pub fn new(config: HarnessConfig, probe: impl MemoryProbe + 'static) -> Self {
        Self {
            config,
            probe: Box::new(probe),
        }
    }

    pub fn probe(&self) -> &dyn MemoryProbe {
        self.probe.as_ref()
    }

    pub fn run(&self, source: ScriptSource, label: &str) -> RunReport {
        self.run_request(RunRequest::new(source, label))
    }

    /// Drives one run to completion. The interpreter is closed before this returns, whatever
    /// the outcome.
    pub fn run_request(&self, request: RunRequest) -> RunReport {
        tracing::info!(run = %request.label, "Starting run");
        let mut telemetry = RunTelemetry::new(&request.label);
        let mut extras = RunExtras::default();
        telemetry.record(self.probe(), Checkpoint::Start);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.drive(&request, &mut telemetry, &mut extras)
        }))
        .unwrap_or_else(|payload| Err(RunError::Internal(panic_message(payload.as_ref()))));

        telemetry.record(self.probe(), Checkpoint::AfterRelease);
        match &outcome {
            Ok(value) => tracing::info!(run = %request.label, returned = ?value, "End of run"),
            Err(err) => {
                tracing::error!(run = %request.label, kind = err.kind(), "Run failed: {}", err)
            }
        }

        RunReport {
            label: request.label,
            outcome,
            telemetry: telemetry.into_samples(),
            bindings: extras.bindings,
            search_path: extras.search_path,
            search_path_error: extras.search_path_error,
        }
    }

    fn drive(
        &self,
        request: &RunRequest,
        telemetry: &mut RunTelemetry,
        extras: &mut RunExtras,
    ) -> RunOutcome {
        let resolved = match &request.source {
            ScriptSource::File(name) => Some(resolve_with_capacity(
                &self.config.script_root,
                name,
                self.config.path_capacity,
            )?),
            ScriptSource::Inline(_) => None,
        };

        let floor = self.config.budget.min_free_heap_bytes;
        if let Some(floor) = floor {
            let free = self.probe.stats().free_bytes;
            if free < floor {
                tracing::error!(free, floor, "free heap below floor, refusing to allocate");
                return Err(RunError::Allocation);
            }
        }

        let mut ctx = ExecutionContext::allocate(request.source.clone(), resolved.clone())?;
        telemetry.record(self.probe(), Checkpoint::AfterAllocation);

        ctx.register_capabilities(&self.config.capabilities)?;
        let free = telemetry
            .record(self.probe(), Checkpoint::AfterCapabilities)
            .free_bytes;
        if let Some(floor) = floor.filter(|floor| free < *floor) {
            return Err(RunError::BudgetExceeded(format!(
                "free heap {} below floor {} after capability registration",
                free, floor
            )));
        }

        if let Some(resolved) = &resolved {
            match ctx.extend_search_path(&resolved.search_path_suffix) {
                Ok(()) => extras.search_path = ctx.search_path().map(str::to_string),
                Err(err) => {
                    tracing::warn!(%err, "failed to extend package.path");
                    extras.search_path_error = Some(err.to_string());
                }
            }
        }

        ctx.inject(&request.bindings)?;
        ctx.apply_budget(&self.config.budget)?;

        let result = ctx.execute();
        tracing::debug!(used = ctx.used_memory(), "script finished");
        telemetry.record(self.probe(), Checkpoint::AfterExecution);

        if result.is_ok() && !request.read_back.is_empty() {
            extras.bindings = ctx.read_back(&request.read_back)?;
        }

        ctx.release();
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

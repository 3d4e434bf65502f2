//! Per-run resource ceilings.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use mlua::{HookTriggers, Lua, VmState};
use serde::{Deserialize, Serialize};

/// Instructions between two budget checks.
const HOOK_STRIDE: u64 = 1000;

/// Optional limits for a run. All unset means the run is only observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBudget {
    /// VM instructions, checked every [`HOOK_STRIDE`] instructions.
    pub max_instructions: Option<u64>,
    /// Bytes the script may allocate on top of the freshly configured context.
    pub max_memory_bytes: Option<usize>,
    /// Free heap below which a run is refused or aborted.
    pub min_free_heap_bytes: Option<usize>,
}

impl RunBudget {
    pub fn is_unbounded(&self) -> bool {
        self.max_instructions.is_none()
            && self.max_memory_bytes.is_none()
            && self.min_free_heap_bytes.is_none()
    }

    /// Installs the instruction hook and memory limit on `lua`.
    pub(crate) fn install(&self, lua: &Lua) -> mlua::Result<BudgetMeter> {
        let mut meter = BudgetMeter::default();

        if let Some(extra) = self.max_memory_bytes {
            lua.set_memory_limit(lua.used_memory().saturating_add(extra))?;
            meter.memory_limited = true;
        }

        if let Some(max) = self.max_instructions {
            let stride = HOOK_STRIDE.min(max.max(1));
            let executed = Arc::new(AtomicU64::new(0));
            let tripped = meter.instructions_exhausted.clone();
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(stride as u32),
                move |_lua, _debug| {
                    let total = executed.fetch_add(stride, Ordering::Relaxed) + stride;
                    if total > max {
                        tripped.store(true, Ordering::Relaxed);
                        return Err(mlua::Error::runtime(format!(
                            "instruction budget of {} exhausted",
                            max
                        )));
                    }
                    Ok(VmState::Continue)
                },
            );
        }

        Ok(meter)
    }
}

/// What an installed budget observed during execution.
#[derive(Debug, Default)]
pub(crate) struct BudgetMeter {
    instructions_exhausted: Arc<AtomicBool>,
    memory_limited: bool,
}

impl BudgetMeter {
    /// Returns the budget violation behind `err`, if any.
    pub(crate) fn violation(&self, err: &mlua::Error) -> Option<String> {
        if self.instructions_exhausted.load(Ordering::Relaxed) {
            return Some(err.to_string());
        }
        if self.memory_limited && is_memory_error(err) {
            return Some(format!("memory limit reached: {}", err));
        }
        None
    }
}

fn is_memory_error(err: &mlua::Error) -> bool {
    match err {
        mlua::Error::MemoryError(_) => true,
        mlua::Error::CallbackError { cause, .. } => is_memory_error(cause),
        _ => false,
    }
}

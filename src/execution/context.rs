//! One interpreter instance, scoped to a single run.

use std::fs;

use mlua::{Lua, LuaOptions, MultiValue, StdLib, Table, Value};

use super::{bindings::Bindings, budget::BudgetMeter, Capabilities, RunBudget, ScriptSource};
use crate::{
    error::RunError,
    resolver::{extend_search_path, ResolvedPath},
};

/// Exclusive owner of a Lua state. Dropping the context closes the state, so every exit
/// path out of a run releases it.
pub struct ExecutionContext {
    lua: Lua,
    source: ScriptSource,
    resolved: Option<ResolvedPath>,
    search_path: Option<String>,
    meter: BudgetMeter,
}

impl ExecutionContext {
    /// Creates a bare state (base library only).
    pub fn allocate(source: ScriptSource, resolved: Option<ResolvedPath>) -> Result<Self, RunError> {
        let lua = Lua::new_with(StdLib::NONE, LuaOptions::default()).map_err(|err| {
            tracing::error!(%err, "failed to create interpreter state");
            RunError::Allocation
        })?;
        Ok(Self {
            lua,
            source,
            resolved,
            search_path: None,
            meter: BudgetMeter::default(),
        })
    }

    pub fn register_capabilities(&self, capabilities: &Capabilities) -> Result<(), RunError> {
        self.lua
            .load_std_libs(capabilities.to_stdlib())
            .map_err(|err| {
                tracing::error!(%err, %capabilities, "failed to open standard libraries");
                RunError::Registration(err.to_string())
            })
    }

    /// Appends `suffix` to `package.path`. Fails when the package library is not open.
    pub fn extend_search_path(&mut self, suffix: &str) -> mlua::Result<()> {
        let package: Table = self.lua.globals().get("package")?;
        let existing: String = package.get("path")?;
        let extended = extend_search_path(&existing, suffix);
        package.set("path", extended.as_str())?;
        self.search_path = Some(extended);
        Ok(())
    }

    pub fn search_path(&self) -> Option<&str> {
        self.search_path.as_deref()
    }

    pub fn inject(&self, bindings: &Bindings) -> Result<(), RunError> {
        bindings
            .inject(&self.lua)
            .map_err(|err| RunError::ScriptRuntime(format!("binding injection failed: {}", err)))
    }

    pub fn apply_budget(&mut self, budget: &RunBudget) -> Result<(), RunError> {
        self.meter = budget
            .install(&self.lua)
            .map_err(|err| RunError::BudgetExceeded(err.to_string()))?;
        Ok(())
    }

    /// Loads and runs the source, returning the last returned value as a string.
    pub fn execute(&self) -> Result<Option<String>, RunError> {
        let chunk = match (&self.source, &self.resolved) {
            (ScriptSource::Inline(text), _) => self
                .lua
                .load(text.as_str())
                .set_name(format!("={}", chunk_label(text)))
                .into_function(),
            (ScriptSource::File(_), Some(resolved)) => {
                let path = &resolved.absolute_path;
                let bytes = fs::read(path).map_err(|err| {
                    RunError::ScriptLoad(format!("cannot open {}: {}", path, err))
                })?;
                self.lua.load(bytes).set_name(format!("@{}", path)).into_function()
            }
            (ScriptSource::File(name), None) => {
                return Err(RunError::ScriptLoad(format!("cannot open {}: unresolved", name)))
            }
        };
        let func = chunk.map_err(|err| self.classify(err, RunError::ScriptLoad))?;

        let values: MultiValue = func
            .call(())
            .map_err(|err| self.classify(err, RunError::ScriptRuntime))?;
        self.harvest(values)
            .map_err(|err| self.classify(err, RunError::ScriptRuntime))
    }

    pub fn read_back(&self, names: &[String]) -> Result<Bindings, RunError> {
        Bindings::read_back(&self.lua, names)
            .map_err(|err| RunError::ScriptRuntime(format!("binding read-back failed: {}", err)))
    }

    /// Bytes currently held by this state.
    pub fn used_memory(&self) -> usize {
        self.lua.used_memory()
    }

    /// Closes the state.
    pub fn release(self) {
        let used = self.lua.used_memory();
        drop(self);
        tracing::debug!(released = used, "interpreter state closed");
    }

    // Only the last value matters; the rest of the returned values are dropped.
    // No script code runs here: globals and metamethods are never consulted.
    fn harvest(&self, values: MultiValue) -> mlua::Result<Option<String>> {
        let value = match values.into_iter().last() {
            None | Some(Value::Nil) => return Ok(None),
            Some(value) => value,
        };
        Ok(Some(match value {
            Value::String(s) => s.to_string_lossy(),
            Value::Boolean(b) => b.to_string(),
            number @ (Value::Integer(_) | Value::Number(_)) => match self.lua.coerce_string(number)? {
                Some(s) => s.to_string_lossy(),
                None => return Ok(None),
            },
            other => format!("{}: {:p}", other.type_name(), other.to_pointer()),
        }))
    }

    fn classify(&self, err: mlua::Error, fallback: fn(String) -> RunError) -> RunError {
        match self.meter.violation(&err) {
            Some(msg) => RunError::BudgetExceeded(msg),
            None => fallback(err.to_string()),
        }
    }
}

/// First line of an inline chunk, shortened, for error locations.
fn chunk_label(text: &str) -> String {
    const MAX: usize = 40;
    let first = text.lines().next().unwrap_or_default().trim();
    if first.chars().count() > MAX {
        let short: String = first.chars().take(MAX).collect();
        format!("[string \"{}...\"]", short)
    } else {
        format!("[string \"{}\"]", first)
    }
}

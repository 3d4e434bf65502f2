//! Typed values the host injects into a context and reads back after a run.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use mlua::{Lua, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    /// A value with no host representation (table, function, ...), by Lua type name.
    Opaque { lua_type: String },
}

impl BindingValue {
    /// Reads a command-line literal: `nil`, `true`/`false`, integers, numbers, otherwise a
    /// string (surrounding quotes are stripped).
    pub fn parse(text: &str) -> Self {
        let t = text.trim();
        match t {
            "nil" => return BindingValue::Nil,
            "true" => return BindingValue::Bool(true),
            "false" => return BindingValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = t.parse::<i64>() {
            return BindingValue::Integer(i);
        }
        if t.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(n) = t.parse::<f64>() {
                return BindingValue::Number(n);
            }
        }
        let unquoted = t
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| t.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(t);
        BindingValue::Str(unquoted.to_string())
    }

    pub(crate) fn to_lua(&self, lua: &Lua) -> mlua::Result<Value> {
        Ok(match self {
            BindingValue::Nil | BindingValue::Opaque { .. } => Value::Nil,
            BindingValue::Bool(b) => Value::Boolean(*b),
            BindingValue::Integer(i) => Value::Integer(*i),
            BindingValue::Number(n) => Value::Number(*n),
            BindingValue::Str(s) => Value::String(lua.create_string(s)?),
        })
    }

    pub(crate) fn from_lua(value: &Value) -> Self {
        match value {
            Value::Nil => BindingValue::Nil,
            Value::Boolean(b) => BindingValue::Bool(*b),
            Value::Integer(i) => BindingValue::Integer(*i),
            Value::Number(n) => BindingValue::Number(*n),
            Value::String(s) => BindingValue::Str(s.to_string_lossy()),
            other => BindingValue::Opaque {
                lua_type: other.type_name().to_string(),
            },
        }
    }
}

/// Name-ordered binding table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, BindingValue>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: BindingValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BindingValue)> {
        self.0.iter()
    }

    /// Parses `NAME=VALUE` and inserts it.
    pub fn set_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", assignment))?;
        let name = name.trim();
        if !is_identifier(name) {
            return Err(anyhow!("'{}' is not a valid global name", name));
        }
        self.set(name, BindingValue::parse(value));
        Ok(())
    }

    pub(crate) fn inject(&self, lua: &Lua) -> mlua::Result<()> {
        let globals = lua.globals();
        for (name, value) in &self.0 {
            globals.set(name.as_str(), value.to_lua(lua)?)?;
        }
        Ok(())
    }

    pub(crate) fn read_back(lua: &Lua, names: &[String]) -> mlua::Result<Self> {
        let globals = lua.globals();
        let mut out = Bindings::new();
        for name in names {
            let value: Value = globals.get(name.as_str())?;
            out.set(name.clone(), BindingValue::from_lua(&value));
        }
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals() {
        assert_eq!(BindingValue::parse("42"), BindingValue::Integer(42));
        assert_eq!(BindingValue::parse("-2.5"), BindingValue::Number(-2.5));
        assert_eq!(BindingValue::parse("true"), BindingValue::Bool(true));
        assert_eq!(BindingValue::parse("nil"), BindingValue::Nil);
        assert_eq!(BindingValue::parse("inf"), BindingValue::Str("inf".into()));
        assert_eq!(BindingValue::parse("'42'"), BindingValue::Str("42".into()));
    }

    #[test]
    fn assignment_requires_identifier() {
        let mut b = Bindings::new();
        b.set_assignment("answer=42").unwrap();
        assert_eq!(b.get("answer"), Some(&BindingValue::Integer(42)));
        assert!(b.set_assignment("1bad=1").is_err());
        assert!(b.set_assignment("novalue").is_err());
    }
}

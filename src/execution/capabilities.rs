//! Standard library surface granted to a context.

use std::fmt;

use mlua::StdLib;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability '{0}' (expected one of: {known})", known = Capabilities::NAMES.join(", "))]
pub struct UnknownCapability(pub String);

/// Which standard libraries a context opens. The base library is always present; `debug`
/// is never offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub coroutine: bool,
    pub table: bool,
    pub io: bool,
    pub os: bool,
    pub string: bool,
    pub utf8: bool,
    pub math: bool,
    pub package: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl Capabilities {
    pub const NAMES: [&'static str; 8] =
        ["coroutine", "table", "io", "os", "string", "utf8", "math", "package"];

    pub const fn all() -> Self {
        Self {
            coroutine: true,
            table: true,
            io: true,
            os: true,
            string: true,
            utf8: true,
            math: true,
            package: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            coroutine: false,
            table: false,
            io: false,
            os: false,
            string: false,
            utf8: false,
            math: false,
            package: false,
        }
    }

    /// Parses `all`, `none`, or a comma separated list of library names.
    pub fn parse(list: &str) -> Result<Self, UnknownCapability> {
        let list = list.trim();
        if list.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let mut caps = Self::none();
        if list.is_empty() || list.eq_ignore_ascii_case("none") {
            return Ok(caps);
        }
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            *caps.flag_mut(name)? = true;
        }
        Ok(caps)
    }

    pub fn enabled(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .copied()
            .filter(|name| self.flag(name))
            .collect()
    }

    pub fn to_stdlib(&self) -> StdLib {
        let table = [
            (self.coroutine, StdLib::COROUTINE),
            (self.table, StdLib::TABLE),
            (self.io, StdLib::IO),
            (self.os, StdLib::OS),
            (self.string, StdLib::STRING),
            (self.utf8, StdLib::UTF8),
            (self.math, StdLib::MATH),
            (self.package, StdLib::PACKAGE),
        ];
        table
            .into_iter()
            .filter(|(on, _)| *on)
            .fold(StdLib::NONE, |acc, (_, lib)| acc | lib)
    }

    fn flag(&self, name: &str) -> bool {
        match name {
            "coroutine" => self.coroutine,
            "table" => self.table,
            "io" => self.io,
            "os" => self.os,
            "string" => self.string,
            "utf8" => self.utf8,
            "math" => self.math,
            "package" => self.package,
            _ => false,
        }
    }

    fn flag_mut(&mut self, name: &str) -> Result<&mut bool, UnknownCapability> {
        match name.to_ascii_lowercase().as_str() {
            "coroutine" => Ok(&mut self.coroutine),
            "table" => Ok(&mut self.table),
            "io" => Ok(&mut self.io),
            "os" => Ok(&mut self.os),
            "string" => Ok(&mut self.string),
            "utf8" => Ok(&mut self.utf8),
            "math" => Ok(&mut self.math),
            "package" => Ok(&mut self.package),
            _ => Err(UnknownCapability(name.to_string())),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled = self.enabled();
        if enabled.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&enabled.join(","))
        }
    }
}

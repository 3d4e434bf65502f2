use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::BaseDirs;

use crate::{
    execution::{Capabilities, HarnessConfig, RunBudget},
    probe::DEFAULT_HEAP_CAPACITY,
    resolver::{DEFAULT_SCRIPT_ROOT, PATH_BUFFER_CAPACITY},
    scan::{ScanConfig, DEFAULT_SCAN_CAPACITY, DEFAULT_SCAN_TIMEOUT},
};

/// Environment variables with this prefix override rc file values.
pub const ENV_PREFIX: &str = "LUA_HARNESS_";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Defaults, then `path` if it exists, then the environment.
    pub fn load_from(path: &Path) -> Self {
        let mut map = default_map();

        if path.exists() {
            if let Ok(file) = fs::File::open(path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(|l| l.ok()) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        for (k, v) in env::vars() {
            if let Some(key) = k.strip_prefix(ENV_PREFIX) {
                if is_config_key(key) {
                    map.insert(key.to_string(), v);
                }
            }
        }

        Self {
            inner: map,
            config_path: path.to_path_buf(),
        }
    }

    /// Defaults overlaid with `pairs`; no file or environment involved.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Self {
            inner: map,
            config_path: PathBuf::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    /// Non-negative integer, or `None` when the key is empty. Malformed values are errors.
    fn get_limit(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key).as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v
                .parse::<u64>()
                .map(Some)
                .with_context(|| format!("{} must be a byte or instruction count, got '{}'", key, v)),
        }
    }

    pub fn script_root(&self) -> String {
        self.get("SCRIPT_ROOT")
            .unwrap_or_else(|| DEFAULT_SCRIPT_ROOT.to_string())
    }

    pub fn harness(&self) -> Result<HarnessConfig> {
        let capabilities = Capabilities::parse(&self.get("CAPABILITIES").unwrap_or_default())
            .context("CAPABILITIES")?;
        Ok(HarnessConfig {
            script_root: self.script_root(),
            path_capacity: self.get_usize("PATH_CAPACITY").unwrap_or(PATH_BUFFER_CAPACITY),
            heap_capacity: self.get_usize("HEAP_CAPACITY").unwrap_or(DEFAULT_HEAP_CAPACITY),
            capabilities,
            budget: RunBudget {
                max_instructions: self.get_limit("MAX_INSTRUCTIONS")?,
                max_memory_bytes: self.get_limit("MAX_MEMORY")?.map(|v| v as usize),
                min_free_heap_bytes: self.get_limit("MIN_FREE_HEAP")?.map(|v| v as usize),
            },
        })
    }

    pub fn scan(&self) -> ScanConfig {
        ScanConfig {
            target_filter: self.get("SCAN_TARGET").filter(|v| !v.is_empty()),
            include_hidden: self.get_bool("SCAN_INCLUDE_HIDDEN"),
            capacity: self.get_usize("SCAN_CAPACITY").unwrap_or(DEFAULT_SCAN_CAPACITY),
            timeout: self
                .get_usize("SCAN_TIMEOUT_MS")
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(DEFAULT_SCAN_TIMEOUT),
        }
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "SCRIPT_ROOT",
        "PATH_CAPACITY",
        "HEAP_CAPACITY",
        "CAPABILITIES",
        "MAX_INSTRUCTIONS",
        "MAX_MEMORY",
        "MIN_FREE_HEAP",
        "SCAN_CAPACITY",
        "SCAN_TIMEOUT_MS",
        "SCAN_INCLUDE_HIDDEN",
        "SCAN_TARGET",
        "SCAN_FIXTURE",
        "LOG_LEVEL",
        "PRETTIFY_REPORT",
    ];

    KEYS.contains(&k)
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("lua_harness").join(".harnessrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    // Paths
    m.insert("SCRIPT_ROOT".into(), DEFAULT_SCRIPT_ROOT.into());
    m.insert("SCAN_FIXTURE".into(), String::new());

    // Numbers
    m.insert("PATH_CAPACITY".into(), PATH_BUFFER_CAPACITY.to_string());
    m.insert("HEAP_CAPACITY".into(), DEFAULT_HEAP_CAPACITY.to_string());
    m.insert("SCAN_CAPACITY".into(), DEFAULT_SCAN_CAPACITY.to_string());
    m.insert(
        "SCAN_TIMEOUT_MS".into(),
        DEFAULT_SCAN_TIMEOUT.as_millis().to_string(),
    );
    m.insert("MAX_INSTRUCTIONS".into(), String::new());
    m.insert("MAX_MEMORY".into(), String::new());
    m.insert("MIN_FREE_HEAP".into(), String::new());

    // Strings
    m.insert("CAPABILITIES".into(), "all".into());
    m.insert("LOG_LEVEL".into(), "info".into());

    // Bools as strings
    m.insert("SCAN_INCLUDE_HIDDEN".into(), "true".into());
    m.insert("PRETTIFY_REPORT".into(), "true".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = Config::from_pairs([]);
        let h = cfg.harness().unwrap();
        assert_eq!(h.script_root, "/assets");
        assert_eq!(h.path_capacity, 128);
        assert_eq!(h.capabilities, Capabilities::all());
        assert!(h.budget.is_unbounded());

        let s = cfg.scan();
        assert_eq!(s.capacity, 10);
        assert!(s.include_hidden);
        assert_eq!(s.target_filter, None);
    }

    #[test]
    fn rc_file_overrides_defaults() {
        let mut rc = tempfile::NamedTempFile::new().unwrap();
        writeln!(rc, "# harness settings").unwrap();
        writeln!(rc, "SCRIPT_ROOT = /data").unwrap();
        writeln!(rc, "CAPABILITIES=string,math").unwrap();
        writeln!(rc, "MAX_INSTRUCTIONS=5000").unwrap();
        writeln!(rc, "SCAN_INCLUDE_HIDDEN=false").unwrap();

        let cfg = Config::load_from(rc.path());
        let h = cfg.harness().unwrap();
        assert_eq!(h.script_root, "/data");
        assert!(h.capabilities.string && !h.capabilities.io);
        assert_eq!(h.budget.max_instructions, Some(5000));
        assert!(!cfg.scan().include_hidden);
    }

    #[test]
    fn malformed_limits_are_errors() {
        let cfg = Config::from_pairs([("MAX_MEMORY", "lots")]);
        assert!(cfg.harness().is_err());
        let cfg = Config::from_pairs([("CAPABILITIES", "debug")]);
        assert!(cfg.harness().is_err());
    }
}

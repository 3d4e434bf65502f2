use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "lua-harness", about = "Instrumented Lua script harness", version)]
#[command(group(ArgGroup::new("source").args(["inline", "file", "demo"]).multiple(false)))]
#[command(group(ArgGroup::new("hidden_switch").args(["hidden", "no_hidden"]).multiple(false)))]
#[command(group(ArgGroup::new("pretty_switch").args(["json", "text"]).multiple(false)))]
pub struct Cli {
    /// Run this Lua text directly.
    #[arg(short = 'e', long, value_name = "CODE")]
    pub inline: Option<String>,

    /// Run a script file from the script root.
    #[arg(short = 'f', long, value_name = "NAME")]
    pub file: Option<String>,

    /// Run the reference sequence: an inline script, fibonacci.lua and qr_code.lua.
    #[arg(long)]
    pub demo: bool,

    /// Descriptive run name used in logs and reports.
    #[arg(short = 'l', long)]
    pub label: Option<String>,

    /// Mounted script root (default /assets).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Inject a global before the run: NAME=VALUE.
    /// Can be used multiple times: --set answer=42 --set name=probe
    #[arg(long = "set", value_name = "NAME=VALUE", action = clap::ArgAction::Append)]
    pub set: Vec<String>,

    /// Read a global back after a successful run.
    #[arg(long = "read", value_name = "NAME", action = clap::ArgAction::Append)]
    pub read: Vec<String>,

    /// Standard libraries to open: all, none, or a list such as string,math,table.
    #[arg(long = "caps")]
    pub caps: Option<String>,

    /// Abort the script after about this many VM instructions.
    #[arg(long = "max-instructions")]
    pub max_instructions: Option<u64>,

    /// Bytes the script may allocate on top of the configured context.
    #[arg(long = "max-memory")]
    pub max_memory: Option<usize>,

    /// Refuse or abort runs when free heap drops below this many bytes.
    #[arg(long = "min-free-heap")]
    pub min_free_heap: Option<usize>,

    /// Size of the modelled device heap in bytes.
    #[arg(long = "heap-capacity")]
    pub heap_capacity: Option<usize>,

    /// Trigger a bounded wireless scan after the runs.
    #[arg(long)]
    pub scan: bool,

    /// JSON fixture describing the networks the simulated radio sees.
    #[arg(long = "scan-fixture")]
    pub scan_fixture: Option<PathBuf>,

    /// Only report this network (default: broadcast scan).
    #[arg(long = "scan-target")]
    pub scan_target: Option<String>,

    /// Maximum number of access points kept.
    #[arg(long = "scan-capacity")]
    pub scan_capacity: Option<usize>,

    /// Include hidden networks.
    #[arg(long)]
    pub hidden: bool,
    /// Skip hidden networks.
    #[arg(long = "no-hidden")]
    pub no_hidden: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
    /// Print the report as text.
    #[arg(long)]
    pub text: bool,

    /// Debug logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;

use lua_harness::{
    cli,
    config::Config,
    execution::{Bindings, Capabilities, Harness, RunRequest},
    logger::{self, LogLevel},
    printer::{self, JsonDocument, JsonRun, TextPrinter},
    probe::{AllocatorProbe, TrackingAllocator},
    scan::{ScanFixture, ScanSubsystem, SimulatedRadio},
};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new();

const DEMO_INLINE: &str = "answer = 42; print('The answer is: '..answer)";

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let mut cfg = Config::load();
    if let Some(root) = &args.root {
        cfg.set("SCRIPT_ROOT", root.to_string_lossy());
    }

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        cfg.get("LOG_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(LogLevel::Info)
    };
    logger::init_with_level(level);

    // CLI overrides config
    let mut harness_cfg = cfg.harness()?;
    if let Some(caps) = &args.caps {
        harness_cfg.capabilities = Capabilities::parse(caps).context("--caps")?;
    }
    if args.max_instructions.is_some() {
        harness_cfg.budget.max_instructions = args.max_instructions;
    }
    if args.max_memory.is_some() {
        harness_cfg.budget.max_memory_bytes = args.max_memory;
    }
    if args.min_free_heap.is_some() {
        harness_cfg.budget.min_free_heap_bytes = args.min_free_heap;
    }
    if let Some(capacity) = args.heap_capacity {
        harness_cfg.heap_capacity = capacity;
    }

    let mut scan_cfg = cfg.scan();
    if args.scan_target.is_some() {
        scan_cfg.target_filter = args.scan_target.clone();
    }
    if let Some(capacity) = args.scan_capacity {
        scan_cfg.capacity = capacity;
    }
    if args.hidden {
        scan_cfg.include_hidden = true;
    } else if args.no_hidden {
        scan_cfg.include_hidden = false;
    }

    let mut bindings = Bindings::new();
    for assignment in &args.set {
        bindings.set_assignment(assignment)?;
    }

    let requests: Vec<RunRequest> = if args.demo {
        vec![
            RunRequest::inline(DEMO_INLINE, "Simple Embedded Script"),
            RunRequest::file("fibonacci.lua", "Fibonacci Script from File"),
            RunRequest::file("qr_code.lua", "QR Code Script from File"),
        ]
    } else if let Some(code) = &args.inline {
        vec![RunRequest::inline(code, args.label.as_deref().unwrap_or("inline"))]
    } else if let Some(name) = &args.file {
        vec![RunRequest::file(name, args.label.as_deref().unwrap_or(name))]
    } else if args.scan {
        Vec::new()
    } else {
        bail!("Provide a script with --inline, --file or --demo (or --scan on its own)");
    };
    let requests: Vec<RunRequest> = requests
        .into_iter()
        .map(|mut r| {
            r.bindings = bindings.clone();
            r.read_back = args.read.clone();
            r
        })
        .collect();

    let probe = AllocatorProbe::calibrated(&GLOBAL, harness_cfg.heap_capacity);
    let harness = Harness::new(harness_cfg, probe);

    // runs are strictly sequential: each context is closed before the next is created
    let reports: Vec<_> = requests.into_iter().map(|r| harness.run_request(r)).collect();

    let scan_result = if args.scan || args.demo {
        let fixture = match args.scan_fixture.clone().or_else(|| cfg.get_path("SCAN_FIXTURE")) {
            Some(path) => ScanFixture::load(&path)?,
            None => ScanFixture::default(),
        };
        let mut subsystem = ScanSubsystem::new(SimulatedRadio::new(fixture));
        Some(subsystem.scan(&scan_cfg))
    } else {
        None
    };

    let json = if args.json {
        true
    } else if args.text {
        false
    } else {
        !cfg.get_bool("PRETTIFY_REPORT")
    };

    if json {
        let doc = JsonDocument {
            runs: reports.iter().map(JsonRun::from).collect(),
            scan: scan_result.as_ref().and_then(|r| r.as_ref().ok()),
            scan_error: scan_result
                .as_ref()
                .and_then(|r| r.as_ref().err())
                .map(|e| e.to_string()),
        };
        println!("{}", printer::to_json(&doc));
    } else {
        let out = TextPrinter {
            color: std::io::stdout().is_terminal(),
        };
        for report in &reports {
            out.print_run(report);
        }
        match &scan_result {
            Some(Ok(set)) => out.print_scan(set),
            Some(Err(err)) => out.print_error(&err.to_string()),
            None => {}
        }
    }

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    let scan_failed = matches!(scan_result, Some(Err(_)));
    if failed > 0 || scan_failed {
        std::process::exit(1);
    }
    Ok(())
}

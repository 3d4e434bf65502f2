//! Heap accounting across repeated runs. Kept to a single test so no other test thread
//! allocates while the counters are compared.

use lua_harness::{
    execution::{Harness, HarnessConfig},
    probe::{AllocatorProbe, TrackingAllocator},
    ScriptSource,
};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new();

const TOLERANCE: usize = 8 * 1024;

#[test]
fn repeated_runs_return_the_heap_to_baseline() {
    let harness = Harness::new(
        HarnessConfig::default(),
        AllocatorProbe::calibrated(&GLOBAL, 320 * 1024),
    );
    let scripts = [
        "answer = 42; return answer",
        "local t = {} for i = 1, 2000 do t[i] = tostring(i) end return #t",
        "error('expected failure')",
        "return +",
        "local s = string.rep('ab', 4096) return #s",
    ];

    // one-time lazy initialisation is not a leak
    drop(harness.run(ScriptSource::Inline(scripts[0].into()), "warm-up"));

    let before = GLOBAL.live_bytes();
    for round in 0..10 {
        for (i, code) in scripts.iter().enumerate() {
            let report = harness.run(ScriptSource::Inline((*code).into()), "leak check");
            assert_eq!(report.telemetry.len(), 5, "round {} script {}", round, i);

            // the context's memory is back once it is released
            let start = &report.telemetry[0];
            let released = &report.telemetry[4];
            assert!(
                released.free_bytes + TOLERANCE >= start.free_bytes,
                "run {} kept {} bytes",
                i,
                start.free_bytes - released.free_bytes
            );
            // the interpreter did use heap while it was alive
            assert!(report.telemetry[1].min_free_bytes_ever < start.free_bytes);
        }
    }
    let after = GLOBAL.live_bytes();

    assert!(
        after.abs_diff(before) <= TOLERANCE,
        "heap drifted by {} bytes over 50 runs",
        after.abs_diff(before)
    );
}

//! Per-run telemetry: probe samples taken at fixed checkpoints.

use serde::Serialize;

use crate::probe::{MemoryProbe, TelemetrySample};

/// Points in a run's lifecycle where the heap is sampled, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Start,
    AfterAllocation,
    AfterCapabilities,
    AfterExecution,
    AfterRelease,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 5] = [
        Checkpoint::Start,
        Checkpoint::AfterAllocation,
        Checkpoint::AfterCapabilities,
        Checkpoint::AfterExecution,
        Checkpoint::AfterRelease,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Checkpoint::Start => "Start of run",
            Checkpoint::AfterAllocation => "After context allocation",
            Checkpoint::AfterCapabilities => "After capability registration",
            Checkpoint::AfterExecution => "After executing script",
            Checkpoint::AfterRelease => "After context release",
        }
    }
}

/// Collects samples for one run. Read-only instrumentation.
#[derive(Debug, Clone)]
pub struct RunTelemetry {
    run_label: String,
    samples: Vec<TelemetrySample>,
    last: Option<Checkpoint>,
}

impl RunTelemetry {
    pub fn new(run_label: &str) -> Self {
        Self {
            run_label: run_label.to_string(),
            samples: Vec::with_capacity(Checkpoint::ALL.len()),
            last: None,
        }
    }

    /// Samples `probe` and logs the result. Checkpoints must arrive in order; an out of
    /// order or repeated checkpoint is ignored.
    pub fn record(&mut self, probe: &dyn MemoryProbe, checkpoint: Checkpoint) -> &TelemetrySample {
        if self.last.is_some_and(|last| checkpoint <= last) {
            tracing::warn!(run = %self.run_label, ?checkpoint, "checkpoint out of order, ignored");
        } else {
            let sample = probe.sample(checkpoint.label());
            tracing::info!(
                run = %self.run_label,
                free = sample.free_bytes,
                min_free = sample.min_free_bytes_ever,
                largest_block = sample.largest_free_block_bytes,
                "{}",
                sample.phase_label
            );
            self.samples.push(sample);
            self.last = Some(checkpoint);
        }
        // a sample was pushed on the first call at the latest
        &self.samples[self.samples.len() - 1]
    }

    pub fn run_label(&self) -> &str {
        &self.run_label
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<TelemetrySample> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::IdleProbe;

    #[test]
    fn records_checkpoints_in_order() {
        let probe = IdleProbe { capacity: 1024 };
        let mut t = RunTelemetry::new("basic");
        for cp in Checkpoint::ALL {
            t.record(&probe, cp);
        }
        let labels: Vec<_> = t.samples().iter().map(|s| s.phase_label.as_str()).collect();
        assert_eq!(
            labels,
            Checkpoint::ALL.iter().map(|c| c.label()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn ignores_repeated_checkpoint() {
        let probe = IdleProbe { capacity: 1024 };
        let mut t = RunTelemetry::new("dup");
        t.record(&probe, Checkpoint::Start);
        t.record(&probe, Checkpoint::AfterRelease);
        t.record(&probe, Checkpoint::AfterExecution);
        assert_eq!(t.samples().len(), 2);
        assert_eq!(t.run_label(), "dup");
    }
}

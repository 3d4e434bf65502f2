//! Heap probe: free bytes, low-water mark and largest free block.
//!
//! On the host the numbers come from [`TrackingAllocator`], a counting wrapper around the
//! system allocator. [`AllocatorProbe`] maps its counters onto a device-sized heap window so
//! samples read like the ones a microcontroller allocator would report.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Heap window modelled by default: a few hundred kilobytes of device SRAM.
pub const DEFAULT_HEAP_CAPACITY: usize = 320 * 1024;

/// Raw allocator counters, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub free_bytes: usize,
    pub min_free_bytes_ever: usize,
    pub largest_free_block_bytes: usize,
}

/// One checkpoint snapshot. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetrySample {
    pub free_bytes: usize,
    pub min_free_bytes_ever: usize,
    pub largest_free_block_bytes: usize,
    pub phase_label: String,
}

pub trait MemoryProbe {
    /// Current counters. Must not allocate and must not fail.
    fn stats(&self) -> HeapStats;

    fn sample(&self, phase_label: &str) -> TelemetrySample {
        let stats = self.stats();
        TelemetrySample {
            free_bytes: stats.free_bytes,
            min_free_bytes_ever: stats.min_free_bytes_ever,
            largest_free_block_bytes: stats.largest_free_block_bytes,
            phase_label: phase_label.to_string(),
        }
    }
}

/// Counting global allocator.
///
/// Install it with `#[global_allocator]` in the binary (or a test binary); the counters stay
/// at zero otherwise.
pub struct TrackingAllocator {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl TrackingAllocator {
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn live_bytes(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Restarts the high-water mark from the current live count.
    pub fn reset_peak(&self) {
        self.peak.store(self.live_bytes(), Ordering::Relaxed);
    }

    fn grow(&self, size: usize) {
        let now = self.live.fetch_add(size, Ordering::Relaxed) + size;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    fn shrink(&self, size: usize) {
        self.live.fetch_sub(size, Ordering::Relaxed);
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        self.shrink(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                self.grow(new_size - layout.size());
            } else {
                self.shrink(layout.size() - new_size);
            }
        }
        new_ptr
    }
}

/// Probe over a [`TrackingAllocator`], relative to a calibration baseline.
pub struct AllocatorProbe {
    allocator: &'static TrackingAllocator,
    capacity: usize,
    baseline: usize,
}

impl AllocatorProbe {
    /// Takes the current live count as the empty-heap baseline and restarts the peak.
    pub fn calibrated(allocator: &'static TrackingAllocator, capacity: usize) -> Self {
        allocator.reset_peak();
        Self {
            allocator,
            capacity,
            baseline: allocator.live_bytes(),
        }
    }
}

impl MemoryProbe for AllocatorProbe {
    fn stats(&self) -> HeapStats {
        let used = self.allocator.live_bytes().saturating_sub(self.baseline);
        let peak = self.allocator.peak_bytes().saturating_sub(self.baseline);
        let free = self.capacity.saturating_sub(used);
        HeapStats {
            free_bytes: free,
            min_free_bytes_ever: self.capacity.saturating_sub(peak).min(free),
            // the system allocator exposes no fragmentation map
            largest_free_block_bytes: free,
        }
    }
}

/// Probe for builds without a tracking allocator: reports an untouched heap.
#[derive(Debug, Clone, Copy)]
pub struct IdleProbe {
    pub capacity: usize,
}

impl MemoryProbe for IdleProbe {
    fn stats(&self) -> HeapStats {
        HeapStats {
            free_bytes: self.capacity,
            min_free_bytes_ever: self.capacity,
            largest_free_block_bytes: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Not installed as the global allocator: driven by hand.
    static COUNTER: TrackingAllocator = TrackingAllocator::new();

    #[test]
    fn probe_tracks_window_and_low_water_mark() {
        COUNTER.grow(1000);
        let probe = AllocatorProbe::calibrated(&COUNTER, 4096);
        assert_eq!(probe.stats().free_bytes, 4096);

        COUNTER.grow(3000);
        COUNTER.shrink(2000);
        let stats = probe.stats();
        assert_eq!(stats.free_bytes, 3096);
        assert_eq!(stats.min_free_bytes_ever, 1096);
        assert_eq!(stats.largest_free_block_bytes, 3096);

        // usage beyond the window saturates instead of wrapping
        COUNTER.grow(10_000);
        let stats = probe.stats();
        assert_eq!(stats.free_bytes, 0);
        assert_eq!(stats.min_free_bytes_ever, 0);

        let sample = probe.sample("after");
        assert_eq!(sample.phase_label, "after");
        assert_eq!(sample.free_bytes, 0);
    }

    #[test]
    fn idle_probe_reports_full_heap() {
        let sample = IdleProbe { capacity: 512 }.sample("start");
        assert_eq!(sample.free_bytes, 512);
        assert_eq!(sample.min_free_bytes_ever, 512);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of stream health for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDiagnostics {
    pub callback_count: u64,
    pub frames_processed: u64,
    pub samples_captured: u64,
    /// Samples refused by the capture buffer (cap reached or buffer busy).
    pub dropped_samples: u64,
    /// Blocks skipped entirely because the capture buffer was contended.
    pub skipped_blocks: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub stream_errors: u64,
    pub mode_switches: u64,
    /// Frames written to the reference output, if one is attached.
    pub frames_rendered: u64,
}

impl StreamDiagnostics {
    pub fn xruns(&self) -> u64 {
        self.overruns + self.underruns
    }
}

/// Lock-free counters written from the callback thread.
#[derive(Debug, Default)]
pub struct StreamCounters {
    callback_count: AtomicU64,
    frames_processed: AtomicU64,
    samples_captured: AtomicU64,
    dropped_samples: AtomicU64,
    skipped_blocks: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    stream_errors: AtomicU64,
    mode_switches: AtomicU64,
    frames_rendered: AtomicU64,
}

impl StreamCounters {
    #[inline]
    pub fn record_block(&self, frames: u64, captured: u64, dropped: u64) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        self.frames_processed.fetch_add(frames, Ordering::Relaxed);
        self.samples_captured.fetch_add(captured, Ordering::Relaxed);
        if dropped > 0 {
            self.dropped_samples.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_skipped(&self, frames: u64, samples: u64) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        self.frames_processed.fetch_add(frames, Ordering::Relaxed);
        self.skipped_blocks.fetch_add(1, Ordering::Relaxed);
        self.dropped_samples.fetch_add(samples, Ordering::Relaxed);
    }

    /// Returns the new total so callers can rate-limit logging.
    pub fn record_overrun(&self) -> u64 {
        self.overruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_underrun(&self) -> u64 {
        self.underruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_stream_error(&self) -> u64 {
        self.stream_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_mode_switch(&self) {
        self.mode_switches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_render(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamDiagnostics {
        StreamDiagnostics {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            samples_captured: self.samples_captured.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            skipped_blocks: self.skipped_blocks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            mode_switches: self.mode_switches.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.callback_count,
            &self.frames_processed,
            &self.samples_captured,
            &self.dropped_samples,
            &self.skipped_blocks,
            &self.overruns,
            &self.underruns,
            &self.stream_errors,
            &self.mode_switches,
            &self.frames_rendered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let counters = StreamCounters::default();
        counters.record_block(48, 48, 0);
        counters.record_block(48, 40, 8);
        counters.record_skipped(48, 48);
        assert_eq!(counters.record_overrun(), 1);
        assert_eq!(counters.record_underrun(), 1);

        let snap = counters.snapshot();
        assert_eq!(snap.callback_count, 3);
        assert_eq!(snap.frames_processed, 144);
        assert_eq!(snap.samples_captured, 88);
        assert_eq!(snap.dropped_samples, 56);
        assert_eq!(snap.skipped_blocks, 1);
        assert_eq!(snap.xruns(), 2);

        counters.reset();
        assert_eq!(counters.snapshot(), StreamDiagnostics::default());
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Streaming statistics
//!
//! Counters are fed from pipeline taps running on streaming threads, so the
//! hot path is a pair of atomic adds. Timing data sits behind its own small
//! mutex, independent of the configuration lock.

use crate::constants::{stats as limits, timing};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::info;

struct Timing {
    start: Instant,
    started_at: DateTime<Utc>,
    first_capture: Option<Instant>,
    target_framerate: u32,
}

/// Accumulates byte and frame counts for the current pipeline
pub struct StatsCollector {
    total_bytes: AtomicU64,
    frame_count: AtomicU64,
    captured_frames: AtomicU64,
    timing: Mutex<Timing>,
}

/// Point-in-time view of the statistics, as served by `/stats`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_bytes: u64,
    pub frame_count: u64,
    pub current_bitrate_kbps: f64,
    pub elapsed_seconds: f64,
    pub framerate: f64,
    pub target_framerate: u32,
    pub framerate_efficiency_percent: f64,
    pub started_at: String,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            captured_frames: AtomicU64::new(0),
            timing: Mutex::new(Timing {
                start: Instant::now(),
                started_at: Utc::now(),
                first_capture: None,
                target_framerate: 0,
            }),
        }
    }

    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Zero all counters and start a new measurement window
    pub fn reset(&self, target_framerate: u32) {
        let mut timing = self.timing();
        self.total_bytes.store(0, Ordering::Relaxed);
        self.frame_count.store(0, Ordering::Relaxed);
        self.captured_frames.store(0, Ordering::Relaxed);
        timing.start = Instant::now();
        timing.started_at = Utc::now();
        timing.first_capture = None;
        timing.target_framerate = target_framerate;
    }

    /// Account one transmitted data unit of `size` bytes
    pub fn record_transmit(&self, size: usize) {
        let bytes = self.total_bytes.fetch_add(size as u64, Ordering::Relaxed) + size as u64;
        let frames = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;

        if frames % timing::STATS_LOG_INTERVAL == 0 {
            let elapsed = self.timing().start.elapsed().as_secs_f64();
            info!(
                frames,
                bytes,
                bitrate_kbps = bitrate_kbps(bytes, elapsed),
                "Streaming"
            );
        }
    }

    /// Account one frame leaving the capture stage
    pub fn record_capture(&self) {
        let captured = self.captured_frames.fetch_add(1, Ordering::Relaxed) + 1;
        if captured == 1 {
            let mut timing = self.timing();
            if timing.first_capture.is_none() {
                timing.first_capture = Some(Instant::now());
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Snapshot with derived values computed as of `now`
    pub fn snapshot_at(&self, now: Instant) -> StatsSnapshot {
        let timing = self.timing();
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);
        let frame_count = self.frame_count.load(Ordering::Relaxed);
        let captured = self.captured_frames.load(Ordering::Relaxed);

        let elapsed = now.saturating_duration_since(timing.start).as_secs_f64();
        let since_first = timing
            .first_capture
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        let fps = framerate(captured, since_first);

        StatsSnapshot {
            total_bytes,
            frame_count,
            current_bitrate_kbps: bitrate_kbps(total_bytes, elapsed),
            elapsed_seconds: elapsed,
            framerate: fps,
            target_framerate: timing.target_framerate,
            framerate_efficiency_percent: efficiency(fps, timing.target_framerate),
            started_at: timing.started_at.to_rfc3339(),
        }
    }
}

/// Average bitrate in kbps; zero when no time has elapsed
pub fn bitrate_kbps(total_bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (total_bytes as f64 * 8.0) / (elapsed_secs * 1000.0)
}

/// Capture framerate measured from the first captured frame
pub fn framerate(captured: u64, secs_since_first: f64) -> f64 {
    if captured < 2 || secs_since_first <= 0.0 {
        return 0.0;
    }
    (captured - 1) as f64 / secs_since_first
}

/// Measured framerate as a percentage of the target, capped
pub fn efficiency(framerate: f64, target: u32) -> f64 {
    if target == 0 {
        return 0.0;
    }
    (framerate / f64::from(target) * 100.0).min(limits::FRAMERATE_EFFICIENCY_CAP)
}

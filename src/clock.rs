use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{Result, SchedulerError};

/// Converts between musical beats and seconds for one tempo.
#[derive(Debug, Clone, Copy)]
pub struct TempoClock {
    bps: f64,
}

impl TempoClock {
    pub fn new(bpm: f64) -> Result<Self> {
        let mut clock = Self { bps: 1.0 };
        clock.set_bpm(bpm)?;
        Ok(clock)
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SchedulerError::InvalidBpm(bpm));
        }
        self.bps = bpm / 60.0;
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.bps * 60.0
    }

    pub fn bps(&self) -> f64 {
        self.bps
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats / self.bps
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.bps
    }
}

impl Default for TempoClock {
    /// 60 bpm, one beat per second.
    fn default() -> Self {
        Self { bps: 1.0 }
    }
}

/// Shared monotonic time reference for all scheduling math.
pub trait ClockSource: Send + Sync {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Wall clock, measured from process-local origin.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for offline rendering and tests. Stores the
/// current time as f64 bits in an atomic.
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(t: f64) -> Self {
        Self {
            bits: AtomicU64::new(t.to_bits()),
        }
    }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

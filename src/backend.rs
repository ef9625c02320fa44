use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::synth::Wave;

/// Opaque handle to one sound-generating voice owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceKind {
    Oscillator { wave: Wave },
    Sample { sample: String, offset: f64 },
}

/// Everything the backend needs to create and time one voice. The
/// engine never touches signal data; node wiring is the backend's job.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSpec {
    pub kind: VoiceKind,
    pub start_at: f64,
    /// Natural stop time; `None` for open-ended (live) voices.
    pub stop_at: Option<f64>,
}

/// Addressable parameter of a voice chain. Each variant maps onto one
/// stage of the backend's per-voice node chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Frequency,
    Detune,
    /// Per-key envelope gain.
    Gain,
    Pan,
    Lowpass,
    Highpass,
    /// Static per-oscillator mix stage.
    MixGain,
    MixPan,
    /// Choke-fade stage of a drum voice.
    CutGain,
    /// Row-level gain of a drum voice.
    RowGain,
}

/// Timed parameter/lifecycle commands issued to the sound backend.
pub trait VoiceSink: Send + Sync {
    fn create_voice(&self, spec: &VoiceSpec) -> VoiceHandle;

    /// Schedules a linear curve through `points` starting at `at` and
    /// spanning `duration` seconds.
    fn schedule_ramp(&self, handle: VoiceHandle, param: Param, points: &[f64], at: f64, duration: f64);

    fn stop_voice(&self, handle: VoiceHandle, at: f64);

    /// Single-point ramp: pin `param` to `value` at `at`.
    fn set_value(&self, handle: VoiceHandle, param: Param, value: f64, at: f64) {
        self.schedule_ramp(handle, param, &[value], at, 0.0);
    }
}

/// Backend stub: scheduling proceeds logically, no sound is produced.
pub struct NullSink {
    next: AtomicU64,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSink for NullSink {
    fn create_voice(&self, _spec: &VoiceSpec) -> VoiceHandle {
        VoiceHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn schedule_ramp(&self, _: VoiceHandle, _: Param, _: &[f64], _: f64, _: f64) {}

    fn stop_voice(&self, _: VoiceHandle, _: f64) {}
}

/// One recorded backend command.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Created {
        handle: VoiceHandle,
        spec: VoiceSpec,
    },
    Ramp {
        handle: VoiceHandle,
        param: Param,
        points: Vec<f64>,
        at: f64,
        duration: f64,
    },
    Stopped {
        handle: VoiceHandle,
        at: f64,
    },
}

/// Records every command for headless inspection of the scheduling
/// core, without an audio backend.
pub struct MemorySink {
    next: AtomicU64,
    calls: Mutex<Vec<SinkCall>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn take(&self) -> Vec<SinkCall> {
        std::mem::take(&mut self.calls.lock())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSink for MemorySink {
    fn create_voice(&self, spec: &VoiceSpec) -> VoiceHandle {
        let handle = VoiceHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.calls.lock().push(SinkCall::Created {
            handle,
            spec: spec.clone(),
        });
        handle
    }

    fn schedule_ramp(&self, handle: VoiceHandle, param: Param, points: &[f64], at: f64, duration: f64) {
        self.calls.lock().push(SinkCall::Ramp {
            handle,
            param,
            points: points.to_vec(),
            at,
            duration,
        });
    }

    fn stop_voice(&self, handle: VoiceHandle, at: f64) {
        self.calls.lock().push(SinkCall::Stopped { handle, at });
    }
}

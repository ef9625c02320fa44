use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::filter::{highpass_hz, lowpass_hz};
use super::{Wave, midi_to_hz};
use crate::backend::{Param, VoiceHandle, VoiceKind, VoiceSink, VoiceSpec};
use crate::clock::ClockSource;
use crate::error::{Result, SchedulerError};
use crate::timing::{Tick, TimerQueue};

/// One started note activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(pub u64);

/// One captured performance block of a note. Consecutive linked
/// blocks of the same key describe a legato transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteBlock {
    /// Block start, in beats.
    pub when: f64,
    /// Block length, in beats.
    pub duration: f64,
    /// Midi key number.
    pub key: u8,
    pub gain: f64,
    pub pan: f64,
    /// Normalized cutoffs in `[0, 1]`.
    pub lowpass: f64,
    pub highpass: f64,
    /// Envelope times, in beats.
    pub attack: f64,
    pub release: f64,
}

/// Linear ramp segment linking two consecutive blocks, in seconds
/// relative to the first block. Filter pairs are pre-mapped to Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variation {
    pub start: f64,
    pub duration: f64,
    pub key: (u8, u8),
    pub gain: (f64, f64),
    pub pan: (f64, f64),
    pub lowpass: (f64, f64),
    pub highpass: (f64, f64),
}

/// Fully resolved note activation: base parameters from the first
/// block plus the inter-block ramps, all in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceKey {
    pub when: f64,
    pub offset: f64,
    /// `None` for an open-ended (live) key.
    pub duration: Option<f64>,
    pub key: u8,
    pub gain: f64,
    pub pan: f64,
    pub lowpass_hz: f64,
    pub highpass_hz: f64,
    pub attack: f64,
    pub release: f64,
    pub variations: Vec<Variation>,
}

/// Builds the envelope/variation plan for one activation spanning
/// `blocks`. Attack and release are tempo-scaled with a floor that
/// keeps ramps from collapsing to zero length.
pub fn build_key(
    blocks: &[NoteBlock],
    when: f64,
    offset: f64,
    duration: Option<f64>,
    bps: f64,
    nyquist: f64,
    ramp_floor: f64,
) -> Result<VoiceKey> {
    let first = blocks.first().ok_or(SchedulerError::EmptyKey)?;
    let last = blocks.last().ok_or(SchedulerError::EmptyKey)?;
    let origin = first.when;

    let mut variations = Vec::with_capacity(blocks.len().saturating_sub(1));
    for pair in blocks.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let start = (prev.when - origin + prev.duration) / bps;
        variations.push(Variation {
            start,
            duration: (next.when - origin) / bps - start,
            key: (prev.key, next.key),
            gain: (prev.gain, next.gain),
            pan: (prev.pan, next.pan),
            lowpass: (
                lowpass_hz(prev.lowpass, nyquist),
                lowpass_hz(next.lowpass, nyquist),
            ),
            highpass: (
                highpass_hz(prev.highpass, nyquist),
                highpass_hz(next.highpass, nyquist),
            ),
        });
    }

    Ok(VoiceKey {
        when,
        offset,
        duration,
        key: first.key,
        gain: first.gain,
        pan: first.pan,
        lowpass_hz: lowpass_hz(first.lowpass, nyquist),
        highpass_hz: highpass_hz(first.highpass, nyquist),
        attack: (first.attack / bps).max(ramp_floor),
        release: (last.release / bps).max(ramp_floor),
        variations,
    })
}

/// Schedules the gain envelope of one key voice.
///
/// The attack ramp is suppressed when the first variation already
/// occupies the note entry, and the generic release gives way to a
/// variation covering the release window.
pub fn schedule_gain_envelope(key: &VoiceKey, sink: &dyn VoiceSink, handle: VoiceHandle) {
    let entered_mid_phrase = key
        .variations
        .first()
        .is_some_and(|va| va.start <= key.offset);
    if !entered_mid_phrase {
        if key.offset < 1e-4 {
            sink.set_value(handle, Param::Gain, 0.0, key.when);
            sink.schedule_ramp(handle, Param::Gain, &[0.0, key.gain], key.when, key.attack);
        } else {
            // Cut into, no audible attack.
            sink.set_value(handle, Param::Gain, key.gain, key.when);
        }
    }
    if let Some(duration) = key.duration {
        if duration - key.attack >= key.release {
            let release_at = key.when + duration - key.release;
            let last = key.variations.last();
            let window_free = last
                .is_none_or(|va| key.when - key.offset + va.start + va.duration < release_at);
            if window_free {
                let gain_end = last.map_or(key.gain, |va| va.gain.1);
                sink.schedule_ramp(handle, Param::Gain, &[gain_end, 0.0], release_at, key.release);
            }
        }
    }
}

/// Schedules the ramps of every variation that still lies ahead of
/// `now`; elapsed variations are skipped.
pub fn schedule_variations(key: &VoiceKey, sink: &dyn VoiceSink, handle: VoiceHandle, now: f64) {
    for va in &key.variations {
        let at = key.when - key.offset + va.start;
        if at > now && va.duration > 0.0 {
            sink.schedule_ramp(
                handle,
                Param::Frequency,
                &[midi_to_hz(va.key.0), midi_to_hz(va.key.1)],
                at,
                va.duration,
            );
            sink.schedule_ramp(handle, Param::Pan, &[va.pan.0, va.pan.1], at, va.duration);
            sink.schedule_ramp(handle, Param::Gain, &[va.gain.0, va.gain.1], at, va.duration);
            sink.schedule_ramp(
                handle,
                Param::Lowpass,
                &[va.lowpass.0, va.lowpass.1],
                at,
                va.duration,
            );
            sink.schedule_ramp(
                handle,
                Param::Highpass,
                &[va.highpass.0, va.highpass.1],
                at,
                va.duration,
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscConfig {
    pub wave: Wave,
    pub gain: f64,
    pub pan: f64,
    /// Semitones; sent to the backend in cents.
    pub detune: f64,
}

/// Live mutation of one oscillator, applied synchronously to every
/// started key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OscParam {
    Gain(f64),
    Pan(f64),
    Detune(f64),
}

struct StartedKey {
    key: VoiceKey,
    voices: BTreeMap<String, VoiceHandle>,
}

/// Per-voice envelope/variation engine: turns note activations into
/// timed backend commands, one voice per configured oscillator.
pub struct Synth {
    oscillators: BTreeMap<String, OscConfig>,
    started: BTreeMap<KeyId, StartedKey>,
    next_key: u64,
    bps: f64,
    nyquist: f64,
    ramp_floor: f64,
    sink: Option<Arc<dyn VoiceSink>>,
    clock: Arc<dyn ClockSource>,
    timers: TimerQueue<KeyId>,
}

impl Synth {
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            oscillators: BTreeMap::new(),
            started: BTreeMap::new(),
            next_key: 0,
            bps: 1.0,
            nyquist: 24_000.0,
            ramp_floor: 0.005,
            sink: None,
            clock,
            timers: TimerQueue::new(),
        }
    }

    /// Without a sink the engine stays headless: state and timers
    /// update, no backend commands are emitted.
    pub fn set_sink(&mut self, sink: Option<Arc<dyn VoiceSink>>) {
        self.sink = sink;
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SchedulerError::InvalidBpm(bpm));
        }
        self.bps = bpm / 60.0;
        Ok(())
    }

    pub fn set_sample_rate(&mut self, rate: f64) {
        self.nyquist = rate / 2.0;
    }

    pub fn nyquist(&self) -> f64 {
        self.nyquist
    }

    pub fn add_osc(&mut self, id: &str, config: OscConfig) {
        self.oscillators.insert(id.to_string(), config);
        let mut spawned = Vec::new();
        for (key_id, started) in &self.started {
            if let Some(handle) = self.spawn_voice(&started.key, &config) {
                spawned.push((*key_id, handle));
            }
        }
        for (key_id, handle) in spawned {
            if let Some(started) = self.started.get_mut(&key_id) {
                started.voices.insert(id.to_string(), handle);
            }
        }
    }

    pub fn remove_osc(&mut self, id: &str) {
        self.oscillators.remove(id);
        let now = self.clock.now();
        for started in self.started.values_mut() {
            if let Some(handle) = started.voices.remove(id) {
                if let Some(sink) = self.sink.as_deref() {
                    sink.stop_voice(handle, now);
                }
            }
        }
    }

    /// Explicit mutation API: updates the stored oscillator and pins
    /// the new value on every started key right away.
    pub fn set_osc_param(&mut self, id: &str, param: OscParam) -> Result<()> {
        let config = self
            .oscillators
            .get_mut(id)
            .ok_or(SchedulerError::UnknownOsc)?;
        let (backend_param, value) = match param {
            OscParam::Gain(v) => {
                config.gain = v;
                (Param::MixGain, v)
            }
            OscParam::Pan(v) => {
                config.pan = v;
                (Param::MixPan, v)
            }
            OscParam::Detune(v) => {
                config.detune = v;
                (Param::Detune, v * 100.0)
            }
        };
        if let Some(sink) = self.sink.as_deref() {
            let now = self.clock.now();
            for started in self.started.values() {
                if let Some(handle) = started.voices.get(id) {
                    sink.set_value(*handle, backend_param, value, now);
                }
            }
        }
        Ok(())
    }

    /// Starts one activation spanning `blocks`. `duration` of `None`
    /// means open-ended (a held live key).
    pub fn start_key(
        &mut self,
        blocks: &[NoteBlock],
        when: f64,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<KeyId> {
        let key = build_key(
            blocks,
            when,
            offset,
            duration,
            self.bps,
            self.nyquist,
            self.ramp_floor,
        )?;
        self.next_key += 1;
        let id = KeyId(self.next_key);

        let mut voices = BTreeMap::new();
        for (osc_id, config) in &self.oscillators {
            if let Some(handle) = self.spawn_voice(&key, config) {
                voices.insert(osc_id.clone(), handle);
            }
        }
        debug!(key = id.0, voices = voices.len(), when, "key started");
        self.started.insert(id, StartedKey { key, voices });
        Ok(id)
    }

    /// Finite keys tear down at once; open-ended keys get a short
    /// fade before the deferred teardown.
    pub fn stop_key(&mut self, id: KeyId) -> Result<()> {
        let Some(started) = self.started.get(&id) else {
            error!(key = id.0, "stop_key: invalid id");
            return Err(SchedulerError::UnknownKey(id));
        };
        if started.key.duration.is_some() {
            self.teardown(id);
        } else {
            let now = self.clock.now();
            if let Some(sink) = self.sink.as_deref() {
                let gain = started.key.gain;
                for handle in started.voices.values() {
                    sink.schedule_ramp(*handle, Param::Gain, &[gain, 0.1], now + 0.01, 0.02);
                }
            }
            self.timers.arm(now + 0.033, id);
        }
        Ok(())
    }

    pub fn stop_all_keys(&mut self) {
        let ids: Vec<KeyId> = self.started.keys().copied().collect();
        for id in ids {
            let _ = self.stop_key(id);
        }
    }

    pub fn started_keys(&self) -> usize {
        self.started.len()
    }

    fn teardown(&mut self, id: KeyId) {
        if let Some(started) = self.started.remove(&id) {
            let now = self.clock.now();
            if let Some(sink) = self.sink.as_deref() {
                for handle in started.voices.values() {
                    sink.stop_voice(*handle, now);
                }
            }
        }
    }

    fn spawn_voice(&self, key: &VoiceKey, config: &OscConfig) -> Option<VoiceHandle> {
        let sink = self.sink.as_deref()?;
        let at = key.when - key.offset;
        let spec = VoiceSpec {
            kind: VoiceKind::Oscillator { wave: config.wave },
            start_at: key.when,
            stop_at: key.duration.map(|d| key.when + d),
        };
        let handle = sink.create_voice(&spec);
        sink.set_value(handle, Param::Frequency, midi_to_hz(key.key), at);
        sink.set_value(handle, Param::Detune, config.detune * 100.0, at);
        sink.set_value(handle, Param::Pan, key.pan, at);
        sink.set_value(handle, Param::Lowpass, key.lowpass_hz, at);
        sink.set_value(handle, Param::Highpass, key.highpass_hz, at);
        sink.set_value(handle, Param::MixGain, config.gain, at);
        sink.set_value(handle, Param::MixPan, config.pan, at);
        schedule_gain_envelope(key, sink, handle);
        schedule_variations(key, sink, handle, self.clock.now());
        Some(handle)
    }
}

impl Tick for Synth {
    fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    fn poll(&mut self, now: f64) {
        while let Some((_, id)) = self.timers.pop_due(now) {
            self.teardown(id);
        }
    }
}

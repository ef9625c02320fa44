use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Param, VoiceHandle, VoiceKind, VoiceSink, VoiceSpec};
use crate::clock::ClockSource;
use crate::events::RowHook;
use crate::timing::{Tick, TimerId, TimerQueue};

/// One playing drum-row occurrence; ids grow monotonically and are
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// Resolves persisted row/pattern data; lives outside this core.
pub trait RowSource: Send + Sync {
    /// Natural duration of the pattern assigned to the row.
    fn pattern_duration(&self, row: &str) -> Option<f64>;
    /// Natural duration of the row's audio buffer.
    fn buffer_duration(&self, row: &str) -> Option<f64>;
    fn sample(&self, row: &str) -> Option<String>;
    fn gain(&self, row: &str) -> f64;
    /// Semitones.
    fn detune(&self, row: &str) -> f64;
    fn enabled(&self, row: &str) -> bool;
}

/// Live mutation of one row, applied to every sounding instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowParam {
    Toggle(bool),
    Gain(f64),
    Detune(f64),
}

enum RowNotice {
    Start(String),
    Cut(String),
}

struct Instance {
    row: String,
    when: f64,
    end_at: f64,
    voice: Option<VoiceHandle>,
    start_timer: Option<TimerId>,
    cut_timer: Option<TimerId>,
}

/// Tracks currently-sounding drum-row instances and applies choke
/// cuts: a new cutting hit forcibly truncates conflicting earlier
/// instances on the same row with a short fade.
///
/// Instances expire lazily: the full registry is swept on every
/// `start_instance` call instead of arming one timer per instance.
pub struct DrumRows {
    started: BTreeMap<InstanceId, Instance>,
    next_id: u64,
    cut_fade: f64,
    source: Option<Arc<dyn RowSource>>,
    sink: Option<Arc<dyn VoiceSink>>,
    clock: Arc<dyn ClockSource>,
    timers: TimerQueue<RowNotice>,
    on_drum_start: Option<RowHook>,
    on_drum_cut: Option<RowHook>,
}

impl DrumRows {
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            started: BTreeMap::new(),
            next_id: 0,
            cut_fade: 0.001,
            source: None,
            sink: None,
            clock,
            timers: TimerQueue::new(),
            on_drum_start: None,
            on_drum_cut: None,
        }
    }

    pub fn set_sink(&mut self, sink: Option<Arc<dyn VoiceSink>>) {
        self.sink = sink;
    }

    pub fn set_source(&mut self, source: Arc<dyn RowSource>) {
        self.source = Some(source);
    }

    pub fn set_cut_fade(&mut self, fade: f64) {
        self.cut_fade = fade;
    }

    pub fn set_on_drum_start(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        self.on_drum_start = Some(Box::new(hook));
    }

    pub fn set_on_drum_cut(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        self.on_drum_cut = Some(Box::new(hook));
    }

    pub fn pattern_duration(&self, row: &str) -> Option<f64> {
        self.source.as_ref().and_then(|s| s.pattern_duration(row))
    }

    pub fn instance_count(&self) -> usize {
        self.started.len()
    }

    pub fn instance_end(&self, id: InstanceId) -> Option<f64> {
        self.started.get(&id).map(|inst| inst.end_at)
    }

    /// Registers and voices one hit, then sweeps the registry for
    /// instances whose window has fully elapsed.
    pub fn start_instance(
        &mut self,
        row: &str,
        when: f64,
        offset: f64,
        duration: Option<f64>,
    ) -> InstanceId {
        self.start_inner(row, when, offset, duration, false)
    }

    /// Immediate hit at the clock's current time, held for the row's
    /// natural buffer length.
    pub fn start_live(&mut self, row: &str) -> InstanceId {
        let now = self.clock.now();
        self.start_inner(row, now, 0.0, None, true)
    }

    fn start_inner(
        &mut self,
        row: &str,
        when: f64,
        offset: f64,
        duration: Option<f64>,
        live: bool,
    ) -> InstanceId {
        let now = self.clock.now();
        let natural = self
            .source
            .as_ref()
            .and_then(|s| s.buffer_duration(row));
        let duration = duration.or(natural).unwrap_or(0.0);

        self.next_id += 1;
        let id = InstanceId(self.next_id);

        let voice = self.spawn_voice(row, when, offset, duration, now);
        let start_timer = self
            .on_drum_start
            .is_some()
            .then(|| self.timers.arm(when, RowNotice::Start(row.to_string())));

        self.started.insert(
            id,
            Instance {
                row: row.to_string(),
                when,
                end_at: when + duration,
                voice,
                start_timer,
                cut_timer: None,
            },
        );
        debug!(row, when, duration, live, "drum instance started");

        // Lazy expiry sweep.
        let expired: Vec<InstanceId> = self
            .started
            .iter()
            .filter(|(_, inst)| inst.end_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.finalize(id);
        }
        id
    }

    fn spawn_voice(
        &self,
        row: &str,
        when: f64,
        offset: f64,
        duration: f64,
        now: f64,
    ) -> Option<VoiceHandle> {
        let sink = self.sink.as_deref()?;
        let source = self.source.as_ref()?;
        let sample = source.sample(row)?;
        let spec = VoiceSpec {
            kind: VoiceKind::Sample { sample, offset },
            start_at: when,
            stop_at: Some(when + duration),
        };
        let handle = sink.create_voice(&spec);
        sink.set_value(handle, Param::Detune, source.detune(row) * 100.0, now);
        let gain = if source.enabled(row) {
            source.gain(row)
        } else {
            0.0
        };
        sink.set_value(handle, Param::RowGain, gain, now);
        Some(handle)
    }

    /// A cutting hit lands at `at`: every conflicting earlier
    /// instance on `row` is shortened to `at`, faded to silence over
    /// the fixed cut fade ending at `at`, and hard-stopped right
    /// after. The pre-cut notification fires one fade ahead of `at`.
    pub fn cut(&mut self, row: &str, at: f64) {
        let fade = self.cut_fade;
        let fade_start = at - fade;
        let mut notices = Vec::new();
        let mut ramps = Vec::new();

        for (id, inst) in self.started.iter_mut() {
            if inst.row != row || inst.when >= fade_start || inst.end_at <= at {
                continue;
            }
            inst.end_at = at;
            if let Some(voice) = inst.voice {
                ramps.push(voice);
            }
            if self.on_drum_cut.is_some() {
                if let Some(old) = inst.cut_timer.take() {
                    self.timers.cancel(old);
                }
                notices.push(*id);
            }
            debug!(row, at, "drum instance cut");
        }

        if let Some(sink) = self.sink.as_deref() {
            for voice in ramps {
                sink.schedule_ramp(voice, Param::CutGain, &[1.0, 0.0], fade_start, fade);
                sink.stop_voice(voice, at + fade);
            }
        }
        for id in notices {
            let timer = self.timers.arm(fade_start, RowNotice::Cut(row.to_string()));
            if let Some(inst) = self.started.get_mut(&id) {
                inst.cut_timer = Some(timer);
            }
        }
    }

    /// Idempotent. Removal proceeds when forced, when the window has
    /// fully elapsed, or when the instance has not started yet; an
    /// unforced stop of a sounding instance is a guarded no-op (the
    /// caller raced the natural end).
    pub fn stop_instance(&mut self, id: InstanceId, force: bool) {
        let Some(inst) = self.started.get(&id) else {
            warn!(instance = id.0, "stop of an already-removed instance");
            return;
        };
        let now = self.clock.now();
        if force || inst.end_at <= now || inst.when >= now {
            self.finalize(id);
        }
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<InstanceId> = self.started.keys().copied().collect();
        for id in ids {
            self.finalize(id);
        }
    }

    /// Force-stops every instance of the row (live or scheduled).
    pub fn stop_row(&mut self, row: &str) {
        let ids: Vec<InstanceId> = self
            .started
            .iter()
            .filter(|(_, inst)| inst.row == row)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.finalize(id);
        }
    }

    /// A removed row leaves no sounding instances behind.
    pub fn remove_row(&mut self, row: &str) {
        self.stop_row(row);
    }

    /// Explicit mutation API: applies the new row value to every
    /// sounding instance right away.
    pub fn set_row_param(&mut self, row: &str, param: RowParam) {
        let Some(sink) = self.sink.as_deref() else {
            return;
        };
        let now = self.clock.now();
        let (backend_param, value) = match param {
            RowParam::Toggle(on) => {
                let gain = self.source.as_ref().map_or(0.0, |s| s.gain(row));
                (Param::RowGain, if on { gain } else { 0.0 })
            }
            RowParam::Gain(v) => (Param::RowGain, v),
            RowParam::Detune(v) => (Param::Detune, v * 100.0),
        };
        for inst in self.started.values() {
            if inst.row == row {
                if let Some(voice) = inst.voice {
                    sink.set_value(voice, backend_param, value, now);
                }
            }
        }
    }

    fn finalize(&mut self, id: InstanceId) {
        if let Some(inst) = self.started.remove(&id) {
            if let Some(timer) = inst.start_timer {
                self.timers.cancel(timer);
            }
            if let Some(timer) = inst.cut_timer {
                self.timers.cancel(timer);
            }
            if let Some(voice) = inst.voice {
                if let Some(sink) = self.sink.as_deref() {
                    sink.stop_voice(voice, self.clock.now());
                }
            }
        }
    }
}

impl Tick for DrumRows {
    fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    fn poll(&mut self, now: f64) {
        while let Some((_, notice)) = self.timers.pop_due(now) {
            match notice {
                RowNotice::Start(row) => {
                    if let Some(hook) = self.on_drum_start.as_mut() {
                        hook(&row);
                    }
                }
                RowNotice::Cut(row) => {
                    if let Some(hook) = self.on_drum_cut.as_mut() {
                        hook(&row);
                    }
                }
            }
        }
    }
}

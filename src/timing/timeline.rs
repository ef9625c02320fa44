use std::sync::Arc;

use tracing::debug;

use super::item::{TimelineItem, clip_to_window};
use super::timers::{Tick, TimerId, TimerQueue};
use crate::clock::{ClockSource, TempoClock};
use crate::error::Result;
use crate::events::{EndedHook, StartHook, StartedId, StopHook};

/// Flat timeline scheduler: clips a list of time-stamped items to a
/// requested playback window and emits start/stop notifications at
/// the right absolute clock times.
pub struct Timeline<P> {
    tempo: TempoClock,
    clock: Arc<dyn ClockSource>,
    items: Vec<TimelineItem<P>>,
    duration: f64,
    active: Vec<(StartedId, usize)>,
    next_started: u64,
    timers: TimerQueue<()>,
    completion: Option<TimerId>,
    streaming: bool,
    on_start: Option<StartHook<P>>,
    on_stop: Option<StopHook>,
    on_ended: Option<EndedHook>,
}

impl<P> Timeline<P> {
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            tempo: TempoClock::default(),
            clock,
            items: Vec::new(),
            duration: 0.0,
            active: Vec::new(),
            next_started: 0,
            timers: TimerQueue::new(),
            completion: None,
            streaming: true,
            on_start: None,
            on_stop: None,
            on_ended: None,
        }
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        self.tempo.set_bpm(bpm)?;
        self.update_duration();
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    /// Replaces the scheduled items wholesale.
    pub fn set_items(&mut self, items: Vec<TimelineItem<P>>) -> Result<()> {
        for item in &items {
            item.timing.validate()?;
        }
        self.items = items;
        self.update_duration();
        Ok(())
    }

    pub fn items(&self) -> &[TimelineItem<P>] {
        &self.items
    }

    /// Total natural length in seconds: the latest item end.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.completion.is_some() || !self.active.is_empty()
    }

    /// Streaming on: the completion timer is delivered by the
    /// wall-clock driver. Off: the deadline is withheld from the
    /// driver and completion fires through explicit `poll` calls with
    /// a simulated clock, producing the same ordering and timestamps.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub fn set_on_start(&mut self, hook: impl FnMut(StartedId, &TimelineItem<P>, f64, f64, f64) + Send + 'static) {
        self.on_start = Some(Box::new(hook));
    }

    pub fn set_on_stop(&mut self, hook: impl FnMut(StartedId) + Send + 'static) {
        self.on_stop = Some(Box::new(hook));
    }

    pub fn set_on_ended(&mut self, hook: impl FnMut() + Send + 'static) {
        self.on_ended = Some(Box::new(hook));
    }

    /// Schedules every item overlapping the window
    /// `[offset, offset + duration)`, clipped, then arms one
    /// completion timer for the window. Returns the window length.
    ///
    /// `when` defaults to the clock's current time, `offset` to 0,
    /// `duration` to the timeline's own duration.
    pub fn start(&mut self, when: Option<f64>, offset: Option<f64>, duration: Option<f64>) -> f64 {
        if self.is_playing() {
            self.stop();
        }
        let when = when.unwrap_or_else(|| self.clock.now());
        let offset = offset.unwrap_or(0.0);
        let duration = duration.unwrap_or(self.duration);

        let mut on_start = self.on_start.take();
        for index in 0..self.items.len() {
            let item = &self.items[index];
            let start = item.timing.start_seconds(&self.tempo) - offset;
            let item_offset = item.timing.offset_seconds(&self.tempo);
            let item_duration = item.timing.duration_seconds(&self.tempo).unwrap_or(0.0);

            if let Some((start, item_offset, item_duration)) =
                clip_to_window(start, item_offset, item_duration, duration)
            {
                self.next_started += 1;
                let id = StartedId(self.next_started);
                self.active.push((id, index));
                if let Some(hook) = on_start.as_mut() {
                    hook(id, item, when + start, item_offset, item_duration);
                }
            }
        }
        self.on_start = on_start;

        debug!(active = self.active.len(), duration, "timeline started");
        self.completion = Some(self.timers.arm(when + duration, ()));
        duration
    }

    /// Beat-denominated window, converted through the timeline tempo.
    pub fn start_beats(
        &mut self,
        when: Option<f64>,
        offset: Option<f64>,
        duration: Option<f64>,
    ) -> f64 {
        self.start(
            when.map(|b| self.tempo.beats_to_seconds(b)),
            offset.map(|b| self.tempo.beats_to_seconds(b)),
            duration.map(|b| self.tempo.beats_to_seconds(b)),
        )
    }

    /// Cancels the completion timer, emits `on_stop` for every active
    /// item and fires the completion signal immediately. Calling twice
    /// has no additional effect.
    pub fn stop(&mut self) {
        if !self.is_playing() {
            return;
        }
        if let Some(id) = self.completion.take() {
            self.timers.cancel(id);
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.completion = None;
        let mut on_stop = self.on_stop.take();
        for (id, _) in self.active.drain(..) {
            if let Some(hook) = on_stop.as_mut() {
                hook(id);
            }
        }
        self.on_stop = on_stop;
        if let Some(hook) = self.on_ended.as_mut() {
            hook();
        }
        debug!("timeline ended");
    }
}

impl<P> Timeline<P> {
    fn update_duration(&mut self) {
        self.duration = self
            .items
            .iter()
            .map(|item| {
                item.timing.start_seconds(&self.tempo)
                    + item.timing.duration_seconds(&self.tempo).unwrap_or(0.0)
            })
            .fold(0.0, f64::max);
    }
}

impl<P> Tick for Timeline<P> {
    fn next_deadline(&self) -> Option<f64> {
        if self.streaming {
            self.timers.next_deadline()
        } else {
            None
        }
    }

    fn poll(&mut self, now: f64) {
        while self.timers.pop_due(now).is_some() {
            self.finish();
        }
    }
}

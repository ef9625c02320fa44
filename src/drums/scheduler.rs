use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::rows::{DrumRows, InstanceId};
use crate::clock::ClockSource;
use crate::error::Result;
use crate::events::StartedId;
use crate::timing::{ItemTiming, Tick, Timeline, TimelineItem};

/// Payload of one scheduled drum hit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DrumHit {
    pub row: String,
}

/// Binds a flat timeline of drum hits to a shared choke-group
/// registry: timeline starts become row instances, timeline stops
/// release them unforced so a natural end is never raced.
pub struct DrumsTimeline {
    timeline: Timeline<DrumHit>,
    rows: Arc<Mutex<DrumRows>>,
    started: Arc<Mutex<HashMap<StartedId, InstanceId>>>,
}

impl DrumsTimeline {
    pub fn new(rows: Arc<Mutex<DrumRows>>, clock: Arc<dyn ClockSource>) -> Self {
        let mut timeline = Timeline::new(clock);
        let started: Arc<Mutex<HashMap<StartedId, InstanceId>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let hook_rows = rows.clone();
        let hook_started = started.clone();
        timeline.set_on_start(
            move |id, item: &TimelineItem<DrumHit>, when, offset, duration| {
                let instance = hook_rows.lock().start_instance(
                    &item.payload.row,
                    when,
                    offset,
                    Some(duration),
                );
                hook_started.lock().insert(id, instance);
            },
        );

        let hook_rows = rows.clone();
        let hook_started = started.clone();
        timeline.set_on_stop(move |id| {
            if let Some(instance) = hook_started.lock().remove(&id) {
                hook_rows.lock().stop_instance(instance, false);
            }
        });

        Self {
            timeline,
            rows,
            started,
        }
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        self.timeline.set_bpm(bpm)
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.timeline.set_streaming(streaming);
    }

    /// Replaces the scheduled hits. A hit without an explicit
    /// duration gets its row's pattern duration; offsets are pinned
    /// to zero, a drum always sounds from its head.
    pub fn set_hits(&mut self, hits: Vec<(String, ItemTiming)>) -> Result<()> {
        let rows = self.rows.lock();
        let items = hits
            .into_iter()
            .map(|(row, timing)| {
                let timing = match timing.duration_is_set() {
                    true => timing,
                    false => match rows.pattern_duration(&row) {
                        Some(duration) => timing.with_duration(duration),
                        None => timing,
                    },
                }
                .with_offset(0.0);
                TimelineItem::new(DrumHit { row }, timing)
            })
            .collect();
        drop(rows);
        self.timeline.set_items(items)
    }

    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }

    pub fn start(&mut self, when: Option<f64>, offset: Option<f64>, duration: Option<f64>) -> f64 {
        self.timeline.start(when, offset, duration)
    }

    pub fn stop(&mut self) {
        self.timeline.stop();
        self.started.lock().clear();
    }
}

/// Only the timeline's own completion timer; the shared `DrumRows`
/// registers with the driver separately.
impl Tick for DrumsTimeline {
    fn next_deadline(&self) -> Option<f64> {
        self.timeline.next_deadline()
    }

    fn poll(&mut self, now: f64) {
        self.timeline.poll(now);
    }
}

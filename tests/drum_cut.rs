use std::sync::Arc;

use parking_lot::Mutex;

use beatline::{DrumRows, ManualClock, MemorySink, Param, RowSource, SinkCall, Tick};

struct Kit;

impl RowSource for Kit {
    fn pattern_duration(&self, _row: &str) -> Option<f64> {
        Some(1.0)
    }

    fn buffer_duration(&self, _row: &str) -> Option<f64> {
        Some(4.0)
    }

    fn sample(&self, row: &str) -> Option<String> {
        Some(format!("{row}.wav"))
    }

    fn gain(&self, _row: &str) -> f64 {
        0.9
    }

    fn detune(&self, _row: &str) -> f64 {
        0.0
    }

    fn enabled(&self, _row: &str) -> bool {
        true
    }
}

fn rows_with_sink(clock: Arc<ManualClock>) -> (DrumRows, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let mut rows = DrumRows::new(clock);
    rows.set_source(Arc::new(Kit));
    rows.set_sink(Some(sink.clone()));
    (rows, sink)
}

#[test]
fn cut_shortens_fades_and_stops() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut rows, sink) = rows_with_sink(clock);

    let id = rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.cut("hat", 2.0);

    assert_eq!(rows.instance_end(id), Some(2.0));
    let calls = sink.calls();
    let fade = calls
        .iter()
        .find_map(|call| match call {
            SinkCall::Ramp {
                param: Param::CutGain,
                points,
                at,
                duration,
                ..
            } => Some((points.clone(), *at, *duration)),
            _ => None,
        })
        .expect("cut fade missing");
    assert_eq!(fade.0, vec![1.0, 0.0]);
    assert!((fade.1 - 1.999).abs() < 1e-12);
    assert!((fade.2 - 0.001).abs() < 1e-12);
    assert!(
        calls
            .iter()
            .any(|call| matches!(call, SinkCall::Stopped { at, .. } if (*at - 2.001).abs() < 1e-12))
    );
}

#[test]
fn cut_spares_fresh_and_finished_instances() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut rows, _) = rows_with_sink(clock);

    // Ends before the cut lands.
    let finished = rows.start_instance("hat", 0.0, 0.0, Some(1.5));
    // Started inside the fade window of the cutting hit.
    let fresh = rows.start_instance("hat", 1.9995, 0.0, Some(1.0));
    // Different row entirely.
    let other = rows.start_instance("kick", 0.0, 0.0, Some(4.0));

    rows.cut("hat", 2.0);
    assert_eq!(rows.instance_end(finished), Some(1.5));
    assert_eq!(rows.instance_end(fresh), Some(2.9995));
    assert_eq!(rows.instance_end(other), Some(4.0));
}

#[test]
fn cut_instances_never_dangle_past_the_next_sweep() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut rows, _) = rows_with_sink(clock.clone());

    let cut_id = rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.cut("hat", 2.0);
    assert_eq!(rows.instance_count(), 1);

    // The shortened window has elapsed by the next start; the sweep
    // removes it.
    clock.set(3.0);
    let live = rows.start_instance("hat", 3.0, 0.0, Some(1.0));
    assert_eq!(rows.instance_end(cut_id), None);
    assert_eq!(rows.instance_end(live), Some(4.0));
    assert_eq!(rows.instance_count(), 1);
}

#[test]
fn precut_notice_fires_one_fade_early() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut rows, _) = rows_with_sink(clock);

    let cuts = Arc::new(Mutex::new(Vec::new()));
    let hook = cuts.clone();
    rows.set_on_drum_cut(move |row| hook.lock().push(row.to_string()));

    rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.cut("hat", 2.0);

    rows.poll(1.9);
    assert!(cuts.lock().is_empty());
    rows.poll(1.999);
    assert_eq!(cuts.lock().as_slice(), &["hat".to_string()]);
}

#[test]
fn start_notice_fires_at_the_hit() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut rows, _) = rows_with_sink(clock);

    let hits = Arc::new(Mutex::new(Vec::new()));
    let hook = hits.clone();
    rows.set_on_drum_start(move |row| hook.lock().push(row.to_string()));

    rows.start_instance("kick", 1.0, 0.0, Some(1.0));
    rows.poll(0.5);
    assert!(hits.lock().is_empty());
    rows.poll(1.0);
    assert_eq!(hits.lock().as_slice(), &["kick".to_string()]);
}

#[test]
fn unforced_stop_respects_the_race_guard() {
    let clock = Arc::new(ManualClock::new(1.0));
    let (mut rows, _) = rows_with_sink(clock.clone());

    // Sounding right now: an unforced stop must not kill it.
    let sounding = rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.stop_instance(sounding, false);
    assert_eq!(rows.instance_count(), 1);

    // Not started yet: removal proceeds.
    let pending = rows.start_instance("hat", 2.0, 0.0, Some(1.0));
    rows.stop_instance(pending, false);
    assert_eq!(rows.instance_end(pending), None);

    // Fully elapsed: removal proceeds.
    clock.set(10.0);
    rows.stop_instance(sounding, false);
    assert_eq!(rows.instance_count(), 0);

    // Already removed: harmless no-op.
    rows.stop_instance(sounding, false);
    rows.stop_instance(sounding, true);
}

#[test]
fn forced_stop_and_row_teardown() {
    let clock = Arc::new(ManualClock::new(1.0));
    let (mut rows, _) = rows_with_sink(clock);

    let a = rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.start_instance("hat", 0.5, 0.0, Some(4.0));
    rows.start_instance("kick", 0.0, 0.0, Some(4.0));

    rows.stop_instance(a, true);
    assert_eq!(rows.instance_count(), 2);

    rows.remove_row("hat");
    assert_eq!(rows.instance_count(), 1);

    rows.stop_all();
    assert_eq!(rows.instance_count(), 0);
}

#[test]
fn live_hits_use_the_natural_buffer_length() {
    let clock = Arc::new(ManualClock::new(2.0));
    let (mut rows, _) = rows_with_sink(clock);

    let id = rows.start_live("hat");
    assert_eq!(rows.instance_end(id), Some(6.0));
    rows.stop_row("hat");
    assert_eq!(rows.instance_count(), 0);
}

#[test]
fn row_mutation_reaches_every_sounding_instance() {
    let clock = Arc::new(ManualClock::new(0.5));
    let (mut rows, sink) = rows_with_sink(clock);

    rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.start_instance("hat", 0.2, 0.0, Some(4.0));
    sink.take();

    rows.set_row_param("hat", beatline::RowParam::Gain(0.4));
    let updates = sink
        .calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                SinkCall::Ramp {
                    param: Param::RowGain,
                    points,
                    ..
                } if points.as_slice() == [0.4]
            )
        })
        .count();
    assert_eq!(updates, 2);
}

#[test]
fn headless_registry_still_tracks_cuts() {
    let clock = Arc::new(ManualClock::new(0.0));
    let mut rows = DrumRows::new(clock);

    let id = rows.start_instance("hat", 0.0, 0.0, Some(4.0));
    rows.cut("hat", 2.0);
    assert_eq!(rows.instance_end(id), Some(2.0));
}

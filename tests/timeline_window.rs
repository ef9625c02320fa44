use std::sync::Arc;

use parking_lot::Mutex;

use beatline::{ItemTiming, ManualClock, Tick, Timeline, TimelineItem};

type Starts = Arc<Mutex<Vec<(u32, f64, f64, f64)>>>;

fn collecting(clock: Arc<ManualClock>) -> (Timeline<u32>, Starts, Arc<Mutex<u32>>, Arc<Mutex<u32>>) {
    let mut timeline = Timeline::new(clock);
    let starts: Starts = Arc::new(Mutex::new(Vec::new()));
    let stops = Arc::new(Mutex::new(0));
    let ended = Arc::new(Mutex::new(0));

    let hook = starts.clone();
    timeline.set_on_start(move |_, item: &TimelineItem<u32>, when, offset, duration| {
        hook.lock().push((item.payload, when, offset, duration));
    });
    let hook = stops.clone();
    timeline.set_on_stop(move |_| *hook.lock() += 1);
    let hook = ended.clone();
    timeline.set_on_ended(move || *hook.lock() += 1);

    (timeline, starts, stops, ended)
}

#[test]
fn leading_clip_consumes_item_offset() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut timeline, starts, _, _) = collecting(clock);

    timeline
        .set_items(vec![TimelineItem::new(
            1,
            ItemTiming::seconds(-2.0).with_duration(5.0),
        )])
        .unwrap();

    timeline.start(Some(10.0), Some(0.0), None);
    assert_eq!(starts.lock().as_slice(), &[(1, 10.0, 2.0, 3.0)]);
}

#[test]
fn trailing_clip_truncates_and_excludes() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut timeline, starts, _, _) = collecting(clock);

    timeline
        .set_items(vec![
            TimelineItem::new(1, ItemTiming::seconds(1.0).with_duration(5.0)),
            TimelineItem::new(2, ItemTiming::seconds(4.0).with_duration(5.0)),
        ])
        .unwrap();

    timeline.start(Some(0.0), Some(0.0), Some(3.0));
    assert_eq!(starts.lock().as_slice(), &[(1, 1.0, 0.0, 2.0)]);
}

#[test]
fn beat_items_resolve_through_tempo() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut timeline, starts, _, _) = collecting(clock);

    timeline.set_bpm(120.0).unwrap();
    timeline
        .set_items(vec![TimelineItem::new(
            1,
            ItemTiming::beats(2.0).with_duration(4.0),
        )])
        .unwrap();

    assert!((timeline.duration() - 3.0).abs() < 1e-12);
    timeline.start(Some(0.0), None, None);
    assert_eq!(starts.lock().as_slice(), &[(1, 1.0, 0.0, 2.0)]);

    // The beat-denominated entry point converts the whole window.
    starts.lock().clear();
    timeline.stop();
    timeline.start_beats(Some(0.0), Some(2.0), Some(4.0));
    assert_eq!(starts.lock().as_slice(), &[(1, 0.0, 0.0, 2.0)]);
}

#[test]
fn starts_are_emitted_in_item_order_before_return() {
    let clock = Arc::new(ManualClock::new(5.0));
    let (mut timeline, starts, _, _) = collecting(clock);

    timeline
        .set_items(vec![
            TimelineItem::new(3, ItemTiming::seconds(2.0).with_duration(1.0)),
            TimelineItem::new(1, ItemTiming::seconds(0.0).with_duration(1.0)),
            TimelineItem::new(2, ItemTiming::seconds(1.0).with_duration(1.0)),
        ])
        .unwrap();

    // `when` defaults to the clock's current time.
    timeline.start(None, None, None);
    let got: Vec<u32> = starts.lock().iter().map(|(p, ..)| *p).collect();
    assert_eq!(got, [3, 1, 2]);
    let when: Vec<f64> = starts.lock().iter().map(|(_, w, ..)| *w).collect();
    assert_eq!(when, [7.0, 5.0, 6.0]);
}

#[test]
fn completion_fires_stop_for_every_active_item() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut timeline, _, stops, ended) = collecting(clock.clone());
    timeline.set_streaming(false);

    timeline
        .set_items(vec![
            TimelineItem::new(1, ItemTiming::seconds(0.0).with_duration(1.0)),
            TimelineItem::new(2, ItemTiming::seconds(1.0).with_duration(2.0)),
        ])
        .unwrap();

    timeline.start(Some(0.0), None, None);
    assert!(timeline.is_playing());

    // Offline rendering: completion is analytic, driven by poll, and
    // withheld from the wall-clock driver.
    assert_eq!(timeline.next_deadline(), None);
    clock.set(2.9);
    timeline.poll(2.9);
    assert_eq!(*stops.lock(), 0);

    clock.set(3.0);
    timeline.poll(3.0);
    assert_eq!(*stops.lock(), 2);
    assert_eq!(*ended.lock(), 1);
    assert!(!timeline.is_playing());
}

#[test]
fn stop_is_immediate_and_idempotent() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut timeline, _, stops, ended) = collecting(clock);

    timeline
        .set_items(vec![
            TimelineItem::new(1, ItemTiming::seconds(0.0).with_duration(4.0)),
            TimelineItem::new(2, ItemTiming::seconds(1.0).with_duration(1.0)),
        ])
        .unwrap();

    timeline.start(Some(0.0), None, None);
    timeline.stop();
    assert_eq!(*stops.lock(), 2);
    assert_eq!(*ended.lock(), 1);

    // Second stop has nothing left to notify.
    timeline.stop();
    assert_eq!(*stops.lock(), 2);
    assert_eq!(*ended.lock(), 1);

    // The canceled completion timer never fires.
    timeline.poll(100.0);
    assert_eq!(*ended.lock(), 1);
}

#[test]
fn malformed_items_are_rejected() {
    let clock = Arc::new(ManualClock::new(0.0));
    let (mut timeline, _, _, _) = collecting(clock);

    assert!(
        timeline
            .set_items(vec![TimelineItem::new(
                1,
                ItemTiming::seconds(0.0).with_offset(-1.0)
            )])
            .is_err()
    );
    assert!(
        timeline
            .set_items(vec![TimelineItem::new(
                1,
                ItemTiming::beats(0.0).with_duration(-2.0)
            )])
            .is_err()
    );
}

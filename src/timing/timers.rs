use std::collections::{BTreeMap, HashMap};

/// Identifies one armed timeout; never reused within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeKey(f64);

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Ordered set of pending timeouts keyed by absolute fire time.
///
/// All completion, pre-cut and teardown timers in the crate live in
/// queues of this shape, serviced by explicit `poll` calls or by the
/// streaming driver. No host timer primitive is involved, so the same
/// queue runs against a wall clock or a simulated one.
pub struct TimerQueue<T> {
    pending: BTreeMap<(TimeKey, u64), T>,
    armed_at: HashMap<u64, TimeKey>,
    next_id: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            armed_at: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn arm(&mut self, at: f64, payload: T) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert((TimeKey(at), id), payload);
        self.armed_at.insert(id, TimeKey(at));
        TimerId(id)
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let at = self.armed_at.remove(&id.0)?;
        self.pending.remove(&(at, id.0))
    }

    /// Earliest pending fire time.
    pub fn next_deadline(&self) -> Option<f64> {
        self.pending.keys().next().map(|(at, _)| at.0)
    }

    /// Removes and returns the earliest timer that is due at `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(TimerId, T)> {
        let (at, id) = *self.pending.keys().next()?;
        if at.0 > now {
            return None;
        }
        let payload = self.pending.remove(&(at, id))?;
        self.armed_at.remove(&id);
        Some((TimerId(id), payload))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.armed_at.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything the streaming driver can service.
pub trait Tick {
    /// Next absolute time this component needs a wake-up, if any.
    fn next_deadline(&self) -> Option<f64>;

    /// Fire everything due at `now`.
    fn poll(&mut self, now: f64);
}

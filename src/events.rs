//! Notification hooks the surrounding application registers to drive
//! actual sound and UI. All hooks fire synchronously on the timeline
//! thread; start notifications of one `start()` call arrive in item
//! order before the call returns.

use crate::timing::{GroupId, TimelineItem, VoiceId};

/// One started occurrence on a flat timeline; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StartedId(pub u64);

pub type StartHook<P> = Box<dyn FnMut(StartedId, &TimelineItem<P>, f64, f64, f64) + Send>;
pub type StopHook = Box<dyn FnMut(StartedId) + Send>;
pub type EndedHook = Box<dyn FnMut() + Send>;

pub type LeafStartHook = Box<dyn FnMut(VoiceId, f64, f64, f64) + Send>;
pub type LeafStopHook = Box<dyn FnMut(VoiceId) + Send>;
pub type GroupEndedHook = Box<dyn FnMut(GroupId) + Send>;

pub type RowHook = Box<dyn FnMut(&str) + Send>;

mod group;
mod item;
mod timeline;
mod timers;

pub use group::{GroupArena, GroupId, GroupItem, GroupPayload, PatternSource, VoiceId};
pub use item::{ItemTiming, TimelineItem, clip_to_window};
pub use timeline::Timeline;
pub use timers::{Tick, TimerId, TimerQueue};

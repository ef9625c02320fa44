//! Event-scheduling core of a music sequencer: a hierarchical
//! tempo-relative timeline scheduler (flat timelines plus nested
//! composition groups forming a DAG of shared sub-patterns), the
//! per-voice envelope/variation math for legato notes, and the
//! choke-group cut logic for drum rows.
//!
//! Sound rendering stays outside: the core only issues timed
//! parameter/lifecycle commands through [`backend::VoiceSink`], and
//! runs headless without one.

pub mod backend;
pub mod clock;
pub mod config;
pub mod drums;
pub mod engine;
pub mod error;
pub mod events;
pub mod synth;
pub mod timing;

pub use backend::{MemorySink, NullSink, Param, SinkCall, VoiceHandle, VoiceKind, VoiceSink, VoiceSpec};
pub use clock::{ClockSource, ManualClock, SystemClock, TempoClock};
pub use config::{ConfigError, EngineConfig};
pub use drums::{DrumHit, DrumRows, DrumsTimeline, InstanceId, RowParam, RowSource};
pub use engine::{DriverCommand, DriverHandle, SharedTick, spawn_driver};
pub use error::{Result, SchedulerError};
pub use events::StartedId;
pub use synth::{KeyId, NoteBlock, OscConfig, OscParam, Synth, Variation, VoiceKey, Wave};
pub use timing::{
    GroupArena, GroupId, GroupItem, GroupPayload, ItemTiming, PatternSource, Tick, Timeline,
    TimelineItem, VoiceId,
};

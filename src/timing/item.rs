use serde::{Deserialize, Serialize};

use crate::clock::TempoClock;
use crate::error::{Result, SchedulerError};

/// Timing of one scheduled item. Exactly one representation is
/// present: tempo-relative beats, or tempo-independent seconds. A
/// single timeline can mix both, so tempo-locked material and
/// fixed-time overlays live side by side without reparenting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemTiming {
    Beats {
        when: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        duration: Option<f64>,
    },
    Seconds {
        when: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        duration: Option<f64>,
    },
}

impl ItemTiming {
    pub fn beats(when: f64) -> Self {
        Self::Beats {
            when,
            offset: 0.0,
            duration: None,
        }
    }

    pub fn seconds(when: f64) -> Self {
        Self::Seconds {
            when,
            offset: 0.0,
            duration: None,
        }
    }

    pub fn with_duration(self, duration: f64) -> Self {
        match self {
            Self::Beats { when, offset, .. } => Self::Beats {
                when,
                offset,
                duration: Some(duration),
            },
            Self::Seconds { when, offset, .. } => Self::Seconds {
                when,
                offset,
                duration: Some(duration),
            },
        }
    }

    pub fn with_offset(self, offset: f64) -> Self {
        match self {
            Self::Beats {
                when, duration, ..
            } => Self::Beats {
                when,
                offset,
                duration,
            },
            Self::Seconds {
                when, duration, ..
            } => Self::Seconds {
                when,
                offset,
                duration,
            },
        }
    }

    pub fn duration_is_set(&self) -> bool {
        match self {
            Self::Beats { duration, .. } | Self::Seconds { duration, .. } => duration.is_some(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (when, offset, duration) = match self {
            Self::Beats {
                when,
                offset,
                duration,
            }
            | Self::Seconds {
                when,
                offset,
                duration,
            } => (*when, *offset, *duration),
        };
        if !when.is_finite() {
            return Err(SchedulerError::MalformedItem("non-finite start"));
        }
        if !offset.is_finite() || offset < 0.0 {
            return Err(SchedulerError::MalformedItem("offset must be >= 0"));
        }
        if let Some(d) = duration {
            if !d.is_finite() || d <= 0.0 {
                return Err(SchedulerError::MalformedItem("duration must be > 0"));
            }
        }
        Ok(())
    }

    pub fn start_seconds(&self, clock: &TempoClock) -> f64 {
        match self {
            Self::Beats { when, .. } => clock.beats_to_seconds(*when),
            Self::Seconds { when, .. } => *when,
        }
    }

    pub fn offset_seconds(&self, clock: &TempoClock) -> f64 {
        match self {
            Self::Beats { offset, .. } => clock.beats_to_seconds(*offset),
            Self::Seconds { offset, .. } => *offset,
        }
    }

    pub fn duration_seconds(&self, clock: &TempoClock) -> Option<f64> {
        match self {
            Self::Beats { duration, .. } => duration.map(|d| clock.beats_to_seconds(d)),
            Self::Seconds { duration, .. } => *duration,
        }
    }

    pub fn start_beats(&self, clock: &TempoClock) -> f64 {
        match self {
            Self::Beats { when, .. } => *when,
            Self::Seconds { when, .. } => clock.seconds_to_beats(*when),
        }
    }

    pub fn duration_beats(&self, clock: &TempoClock) -> Option<f64> {
        match self {
            Self::Beats { duration, .. } => *duration,
            Self::Seconds { duration, .. } => duration.map(|d| clock.seconds_to_beats(d)),
        }
    }
}

/// One entry of a flat timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineItem<P> {
    pub payload: P,
    pub timing: ItemTiming,
}

impl<P> TimelineItem<P> {
    pub fn new(payload: P, timing: ItemTiming) -> Self {
        Self { payload, timing }
    }
}

/// Clips an item to a playback window of `window_len` seconds.
///
/// `start` is the item start already shifted by the window offset.
/// A negative start eats into the item's own offset; an end past the
/// window is truncated. Returns `None` when nothing of the item
/// remains inside `[0, window_len)`.
pub fn clip_to_window(
    start: f64,
    offset: f64,
    duration: f64,
    window_len: f64,
) -> Option<(f64, f64, f64)> {
    let mut start = start;
    let mut offset = offset;
    let mut duration = duration;

    if start < 0.0 {
        offset -= start;
        duration += start;
        start = 0.0;
    }
    let overflow = start + duration - window_len;
    if overflow > 0.0 {
        duration -= overflow;
    }
    if duration > 0.0 {
        Some((start, offset, duration))
    } else {
        None
    }
}

mod rows;
mod scheduler;

pub use rows::{DrumRows, InstanceId, RowParam, RowSource};
pub use scheduler::{DrumHit, DrumsTimeline};

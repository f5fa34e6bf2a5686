//! Target-account tracking: polling loop, change detection, notifications.

mod change;
mod position_tracker;

pub use position_tracker::{
    PositionTracker, SnapshotSource, TrackerListener, TrackerStatus, MIN_POLL_INTERVAL,
};

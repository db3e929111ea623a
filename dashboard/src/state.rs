use crate::changes::ChangeSet;
use crate::highlight::FULL_OPACITY;
use crate::model::{LastReading, SensorField, Snapshot};
use serde::Serialize;

/// Everything the view renders from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardState {
    pub loading: bool,
    pub connected: bool,
    pub snapshot: Option<Snapshot>,
    /// Stored on every push but not rendered.
    pub last_reading: Option<LastReading>,
    /// Fields currently highlighted as changed.
    pub changed: ChangeSet,
    pub opacity: f32,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            loading: true,
            connected: false,
            snapshot: None,
            last_reading: None,
            changed: ChangeSet::default(),
            opacity: FULL_OPACITY,
        }
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_highlighted(&self, field: SensorField) -> bool {
        self.changed.contains(field)
    }

    /// Snapshot to display, if the connection currently allows showing one.
    pub fn visible_snapshot(&self) -> Option<&Snapshot> {
        if self.connected {
            self.snapshot.as_ref()
        } else {
            None
        }
    }
}

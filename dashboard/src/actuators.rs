use crate::model::{Actuator, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorChange {
    pub actuator: Actuator,
    pub active: bool,
}

/// Reports actuators whose on/off state flipped between snapshots.
#[derive(Debug, Default)]
pub struct ActuatorWatcher {
    previous: Option<[bool; 3]>,
}

impl ActuatorWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: &Snapshot) -> Vec<ActuatorChange> {
        let current = Actuator::ALL.map(|actuator| actuator.is_active(snapshot));
        let Some(previous) = self.previous.replace(current) else {
            return Vec::new();
        };

        Actuator::ALL
            .iter()
            .zip(previous.iter().zip(current.iter()))
            .filter(|(_, (before, after))| before != after)
            .map(|(actuator, (_, after))| ActuatorChange {
                actuator: *actuator,
                active: *after,
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

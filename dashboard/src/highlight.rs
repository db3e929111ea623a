use crate::changes::ChangeSet;
use std::time::{Duration, Instant};

pub const FULL_OPACITY: f32 = 1.0;
pub const DIM_OPACITY: f32 = 0.3;

/// Opacity targets of the blink, each reached at the end of its step.
const BLINK_STEPS: [f32; 4] = [DIM_OPACITY, FULL_OPACITY, DIM_OPACITY, FULL_OPACITY];
pub const STEP_DURATION: Duration = Duration::from_millis(200);
/// How long the changed cards stay marked after the blink finishes.
pub const CLEAR_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Blinking { step: usize },
    Lingering,
}

/// Transient blink applied to the cards of changed sensor fields.
#[derive(Debug)]
pub struct Highlight {
    changed: ChangeSet,
    opacity: f32,
    phase: Phase,
    deadline: Option<Instant>,
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            changed: ChangeSet::default(),
            opacity: FULL_OPACITY,
            phase: Phase::Idle,
            deadline: None,
        }
    }
}

impl Highlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the blink for `changed`, restarting any sequence in flight.
    pub fn start(&mut self, changed: ChangeSet, now: Instant) {
        if changed.is_empty() {
            return;
        }
        self.changed = changed;
        self.opacity = FULL_OPACITY;
        self.phase = Phase::Blinking { step: 0 };
        self.deadline = Some(now + STEP_DURATION);
    }

    /// When the next step is due, if the highlight is active.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Applies every step due at `now`. Returns true when anything visible changed.
    pub fn advance(&mut self, now: Instant) -> bool {
        let mut updated = false;

        while let Some(deadline) = self.deadline {
            if now < deadline {
                break;
            }
            updated = true;

            match self.phase {
                Phase::Blinking { step } => {
                    self.opacity = BLINK_STEPS[step];
                    let next = step + 1;
                    if next < BLINK_STEPS.len() {
                        self.phase = Phase::Blinking { step: next };
                        self.deadline = Some(deadline + STEP_DURATION);
                    } else {
                        self.phase = Phase::Lingering;
                        self.deadline = Some(deadline + CLEAR_DELAY);
                    }
                }
                Phase::Lingering | Phase::Idle => self.clear(),
            }
        }

        updated
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn changed(&self) -> &ChangeSet {
        &self.changed
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

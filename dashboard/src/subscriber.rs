use crate::actuators::{ActuatorChange, ActuatorWatcher};
use crate::changes::ChangeDetector;
use crate::highlight::Highlight;
use crate::metrics::{
    CONNECTED, FIELD_CHANGES_TOTAL, READINGS_TOTAL, SNAPSHOTS_TOTAL, SUBSCRIPTION_ERRORS_TOTAL,
};
use crate::model::{LastReading, Snapshot};
use crate::rtdb::{StoreClient, Subscription, ValueEvent};
use crate::state::DashboardState;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The two live subscriptions of a mounted dashboard and their event feeds.
pub struct Mounted {
    primary: Subscription,
    secondary: Subscription,
    pub primary_rx: mpsc::Receiver<ValueEvent>,
    pub secondary_rx: mpsc::Receiver<ValueEvent>,
}

impl Mounted {
    /// Releases both subscriptions.
    pub async fn unmount(self) {
        info!(
            "Releasing subscriptions to {} and {}",
            self.primary.path(),
            self.secondary.path()
        );
        self.primary.unsubscribe().await;
        self.secondary.unsubscribe().await;
    }
}

pub fn mount(client: &StoreClient, data_path: &str, reading_path: &str) -> Mounted {
    let (primary_tx, primary_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (secondary_tx, secondary_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    info!("Subscribing to {} and {}", data_path, reading_path);

    Mounted {
        primary: client.on_value(data_path, primary_tx),
        secondary: client.on_value(reading_path, secondary_tx),
        primary_rx,
        secondary_rx,
    }
}

/// Result of handling one primary push.
#[derive(Debug, Default)]
pub struct Update {
    pub redraw: bool,
    pub actuator_changes: Vec<ActuatorChange>,
}

/// Applies subscription pushes to the presentation state.
#[derive(Debug)]
pub struct SnapshotSubscriber {
    state: DashboardState,
    detector: ChangeDetector,
    highlight: Option<Highlight>,
    watcher: Option<ActuatorWatcher>,
}

impl SnapshotSubscriber {
    pub fn new(highlight: bool, watch_actuators: bool) -> Self {
        Self {
            state: DashboardState::new(),
            detector: ChangeDetector::new(),
            highlight: highlight.then(Highlight::new),
            watcher: watch_actuators.then(ActuatorWatcher::new),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn on_primary(&mut self, event: ValueEvent, now: Instant) -> Update {
        self.state.loading = false;

        let snapshot = match event {
            ValueEvent::Value(snapshot) => snapshot,
            ValueEvent::Cancelled(e) => {
                error!("Error fetching data: {}", e);
                SUBSCRIPTION_ERRORS_TOTAL.inc();
                self.set_connected(false);
                return Update {
                    redraw: true,
                    ..Default::default()
                };
            }
        };

        if !snapshot.exists() {
            warn!("No document at {}", snapshot.path());
            self.set_connected(false);
            return Update {
                redraw: true,
                ..Default::default()
            };
        }

        // Fields decode leniently; only a non-object root fails, and it still
        // counts as a live document with nothing readable in it.
        let decoded: Snapshot = snapshot.decode().unwrap_or_else(|e| {
            warn!("Document at {} is not an object: {}", snapshot.path(), e);
            Snapshot::default()
        });

        SNAPSHOTS_TOTAL.inc();
        debug!("Received data: {:?}", decoded);

        let changes = self.detector.observe(&decoded);
        if !changes.is_empty() {
            FIELD_CHANGES_TOTAL.inc_by(changes.len() as f64);
            debug!("Changed fields: {:?}", changes.names());

            if let Some(highlight) = self.highlight.as_mut() {
                highlight.start(changes, now);
                self.sync_highlight();
            }
        }

        let actuator_changes = match self.watcher.as_mut() {
            Some(watcher) => watcher.observe(&decoded),
            None => Vec::new(),
        };

        self.state.snapshot = Some(decoded);
        self.set_connected(true);

        Update {
            redraw: true,
            actuator_changes,
        }
    }

    /// Returns true when the state changed.
    pub fn on_secondary(&mut self, event: ValueEvent) -> bool {
        match event {
            ValueEvent::Value(snapshot) if snapshot.exists() => {
                let reading = snapshot.decode::<LastReading>().unwrap_or_else(|e| {
                    warn!("Reading at {} is not an object: {}", snapshot.path(), e);
                    LastReading::default()
                });
                READINGS_TOTAL.inc();
                debug!("Received last reading: {:?}", reading);
                self.state.last_reading = Some(reading);
                true
            }
            ValueEvent::Value(_) => false,
            ValueEvent::Cancelled(e) => {
                warn!("Last reading subscription ended: {}", e);
                SUBSCRIPTION_ERRORS_TOTAL.inc();
                false
            }
        }
    }

    /// When the highlight animation next needs a tick.
    pub fn highlight_deadline(&self) -> Option<Instant> {
        self.highlight.as_ref().and_then(Highlight::deadline)
    }

    /// Advances the highlight animation. Returns true when a redraw is needed.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        let updated = self
            .highlight
            .as_mut()
            .is_some_and(|highlight| highlight.advance(now));
        if updated {
            self.sync_highlight();
        }
        updated
    }

    /// Drops everything received, as on unmount.
    pub fn reset(&mut self) {
        self.state = DashboardState::new();
        self.detector.reset();
        if let Some(highlight) = self.highlight.as_mut() {
            highlight.clear();
        }
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.reset();
        }
        CONNECTED.set(0.0);
    }

    fn sync_highlight(&mut self) {
        if let Some(highlight) = self.highlight.as_ref() {
            self.state.changed = highlight.changed().clone();
            self.state.opacity = highlight.opacity();
        }
    }

    fn set_connected(&mut self, connected: bool) {
        self.state.connected = connected;
        CONNECTED.set(if connected { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::highlight::{DIM_OPACITY, STEP_DURATION};
    use crate::model::{Actuator, SensorField};
    use crate::rtdb::DataSnapshot;
    use serde_json::{json, Value};

    fn push(value: Value) -> ValueEvent {
        ValueEvent::Value(DataSnapshot::new("invernadero/datos", value))
    }

    fn reading(value: Value) -> ValueEvent {
        ValueEvent::Value(DataSnapshot::new("invernadero/ultima_lectura", value))
    }

    #[test]
    fn test_starts_loading_and_disconnected() {
        let subscriber = SnapshotSubscriber::new(true, false);
        assert!(subscriber.state().loading);
        assert!(!subscriber.state().connected);
        assert!(subscriber.state().snapshot.is_none());
    }

    #[test]
    fn test_existing_document_connects() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        let update = subscriber.on_primary(
            push(json!({ "sensores": { "temperatura": 20.5 } })),
            Instant::now(),
        );

        let state = subscriber.state();
        assert!(update.redraw);
        assert!(!state.loading);
        assert!(state.connected);
        assert_eq!(
            state.snapshot.as_ref().and_then(|s| SensorField::Temperature.read(s)),
            Some(20.5)
        );
        assert!(state.changed.is_empty());
    }

    #[test]
    fn test_missing_document_keeps_last_snapshot() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(json!({ "sensores": { "luz": 100 } })), Instant::now());
        subscriber.on_primary(push(Value::Null), Instant::now());

        let state = subscriber.state();
        assert!(!state.connected);
        assert!(state.snapshot.is_some());
        assert!(state.visible_snapshot().is_none());
    }

    #[test]
    fn test_first_push_missing_stops_loading() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(Value::Null), Instant::now());

        assert!(!subscriber.state().loading);
        assert!(!subscriber.state().connected);
    }

    #[test]
    fn test_subscription_error_disconnects() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(json!({ "timestamp": "t" })), Instant::now());
        subscriber.on_primary(
            ValueEvent::Cancelled(Error::PermissionDenied("invernadero/datos".to_string())),
            Instant::now(),
        );

        assert!(!subscriber.state().loading);
        assert!(!subscriber.state().connected);
    }

    #[test]
    fn test_wrong_typed_field_still_connects() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(
            push(json!({ "sensores": { "temperatura": "24.5", "humedad": 55 } })),
            Instant::now(),
        );

        let state = subscriber.state();
        assert!(state.connected);
        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!(SensorField::Temperature.read(snapshot), None);
        assert_eq!(SensorField::Humidity.read(snapshot), Some(55.0));
    }

    #[test]
    fn test_float_timestamp_still_connects() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(
            push(json!({ "sensores": { "humedad": 55 }, "timestamp_millis": 1740823200000.0 })),
            Instant::now(),
        );

        let state = subscriber.state();
        assert!(state.connected);
        assert_eq!(
            state.snapshot.as_ref().and_then(|s| s.timestamp_millis),
            Some(1_740_823_200_000)
        );
    }

    #[test]
    fn test_broken_section_is_stored_as_absent() {
        let start = Instant::now();
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(json!({ "sensores": { "luz": 1 } })), start);
        subscriber.on_primary(push(json!({ "sensores": "broken" })), start);

        let state = subscriber.state();
        assert!(state.connected);
        assert!(state.snapshot.as_ref().unwrap().sensors.is_none());
        assert!(state.is_highlighted(SensorField::Light));
    }

    #[test]
    fn test_non_object_document_still_connects() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(json!(42)), Instant::now());

        assert!(subscriber.state().connected);
        assert_eq!(subscriber.state().snapshot, Some(Snapshot::default()));
    }

    #[test]
    fn test_change_starts_highlight() {
        let start = Instant::now();
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(json!({ "sensores": { "humedad": 50 } })), start);
        subscriber.on_primary(push(json!({ "sensores": { "humedad": 52 } })), start);

        assert!(subscriber.state().is_highlighted(SensorField::Humidity));
        assert_eq!(subscriber.highlight_deadline(), Some(start + STEP_DURATION));

        assert!(subscriber.on_tick(start + STEP_DURATION));
        assert_eq!(subscriber.state().opacity, DIM_OPACITY);
    }

    #[test]
    fn test_plain_variant_never_highlights() {
        let start = Instant::now();
        let mut subscriber = SnapshotSubscriber::new(false, false);
        subscriber.on_primary(push(json!({ "sensores": { "humedad": 50 } })), start);
        subscriber.on_primary(push(json!({ "sensores": { "humedad": 52 } })), start);

        assert!(subscriber.state().changed.is_empty());
        assert!(subscriber.highlight_deadline().is_none());
        assert!(!subscriber.on_tick(start + STEP_DURATION));
    }

    #[test]
    fn test_actuator_changes_reported_when_watching() {
        let mut subscriber = SnapshotSubscriber::new(true, true);
        subscriber.on_primary(push(json!({ "actuadores": { "bomba": false } })), Instant::now());
        let update =
            subscriber.on_primary(push(json!({ "actuadores": { "bomba": true } })), Instant::now());

        assert_eq!(update.actuator_changes.len(), 1);
        assert_eq!(update.actuator_changes[0].actuator, Actuator::Pump);
        assert!(update.actuator_changes[0].active);
        assert!(subscriber.state().changed.is_empty());
    }

    #[test]
    fn test_secondary_reading_stored() {
        let mut subscriber = SnapshotSubscriber::new(true, false);

        assert!(!subscriber.on_secondary(reading(Value::Null)));
        assert!(subscriber.on_secondary(reading(json!({ "temperatura": 19.0, "bomba_activa": true }))));
        assert!(!subscriber.on_secondary(ValueEvent::Cancelled(Error::AuthRevoked)));

        let state = subscriber.state();
        assert_eq!(state.last_reading.as_ref().unwrap().temperature, Some(19.0));
        assert!(state.loading);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut subscriber = SnapshotSubscriber::new(true, false);
        subscriber.on_primary(push(json!({ "sensores": { "luz": 1 } })), Instant::now());
        subscriber.on_secondary(reading(json!({ "luz": 1 })));
        subscriber.reset();

        assert_eq!(subscriber.state(), &DashboardState::new());
        let update = subscriber.on_primary(push(json!({ "sensores": { "luz": 9 } })), Instant::now());
        assert!(update.redraw);
        assert!(subscriber.state().changed.is_empty());
    }
}

use crate::model::{SensorField, Snapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Sensor fields whose value differs between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeSet<SensorField>);

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: SensorField) -> bool {
        self.0.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = SensorField> + '_ {
        self.0.iter().copied()
    }

    /// Device keys of the changed fields.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(SensorField::key).collect()
    }
}

impl FromIterator<SensorField> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = SensorField>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compares the tracked sensor fields of two snapshots.
///
/// A field counts as changed when the values are not equal, which includes
/// one side being absent. Actuators and thresholds are ignored.
pub fn diff(previous: &Snapshot, next: &Snapshot) -> ChangeSet {
    SensorField::ALL
        .iter()
        .copied()
        .filter(|field| field.read(previous) != field.read(next))
        .collect()
}

/// Holds the last seen snapshot and diffs each new one against it.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Option<Snapshot>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fields that changed since the previous call.
    ///
    /// The first observation only records a baseline and reports nothing.
    /// The baseline is replaced on every call, changed or not.
    pub fn observe(&mut self, snapshot: &Snapshot) -> ChangeSet {
        let Some(previous) = self.previous.replace(snapshot.clone()) else {
            debug!("Recorded baseline snapshot");
            return ChangeSet::default();
        };

        diff(&previous, snapshot)
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Actuators, Sensors, Thresholds};

    fn snapshot(temperature: Option<f64>, humidity: Option<f64>) -> Snapshot {
        Snapshot {
            sensors: Some(Sensors {
                temperature,
                humidity,
                feels_like: Some(24.0),
                pressure: Some(1012.5),
                altitude: Some(80.0),
                light: Some(500.0),
            }),
            ..Default::default()
        }
    }

    fn with_field(field: SensorField, value: Option<f64>) -> Snapshot {
        let mut snap = snapshot(Some(21.0), Some(55.0));
        let sensors = snap.sensors.as_mut().unwrap();
        match field {
            SensorField::Temperature => sensors.temperature = value,
            SensorField::Humidity => sensors.humidity = value,
            SensorField::Light => sensors.light = value,
            SensorField::Pressure => sensors.pressure = value,
            SensorField::FeelsLike => sensors.feels_like = value,
            SensorField::Altitude => sensors.altitude = value,
        }
        snap
    }

    #[test]
    fn test_first_observation_is_empty() {
        let mut detector = ChangeDetector::new();
        assert!(detector.observe(&snapshot(Some(30.0), None)).is_empty());

        let mut detector = ChangeDetector::new();
        assert!(detector.observe(&Snapshot::default()).is_empty());
    }

    #[test]
    fn test_identical_snapshots_report_nothing() {
        let mut detector = ChangeDetector::new();
        detector.observe(&snapshot(Some(21.0), Some(55.0)));
        assert!(detector.observe(&snapshot(Some(21.0), Some(55.0))).is_empty());
    }

    #[test]
    fn test_each_field_detected() {
        let base = snapshot(Some(21.0), Some(55.0));

        for field in SensorField::ALL {
            let current = field.read(&base).unwrap();
            let changed = diff(&base, &with_field(field, Some(current + 1.0)));
            assert_eq!(changed.iter().collect::<Vec<_>>(), vec![field]);

            let unchanged = diff(&base, &with_field(field, Some(current)));
            assert!(!unchanged.contains(field));
        }
    }

    #[test]
    fn test_present_versus_absent_is_a_change() {
        let base = snapshot(Some(21.0), Some(55.0));

        for field in SensorField::ALL {
            assert!(diff(&base, &with_field(field, None)).contains(field));
            assert!(diff(&with_field(field, None), &base).contains(field));
        }

        let no_sensors = Snapshot::default();
        assert_eq!(diff(&no_sensors, &base).len(), SensorField::ALL.len());
    }

    #[test]
    fn test_actuators_and_thresholds_ignored() {
        let base = snapshot(Some(21.0), Some(55.0));
        let mut next = base.clone();
        next.actuators = Some(Actuators {
            pump: Some(true),
            fan: Some(true),
            light: Some(false),
        });
        next.thresholds = Some(Thresholds {
            humidity: Some(40.0),
            temperature: Some(30.0),
            light: Some(200.0),
        });
        next.timestamp = Some("later".to_string());
        next.timestamp_millis = Some(42);

        assert!(diff(&base, &next).is_empty());
    }

    #[test]
    fn test_baseline_replaced_unconditionally() {
        let mut detector = ChangeDetector::new();
        let a = snapshot(Some(21.0), Some(55.0));
        let b = snapshot(Some(22.0), Some(55.0));

        detector.observe(&a);
        assert_eq!(detector.observe(&b).names(), vec!["temperatura"]);
        assert!(detector.observe(&b).is_empty());
        assert_eq!(detector.observe(&a).names(), vec!["temperatura"]);
    }

    #[test]
    fn test_reset_restores_first_observation() {
        let mut detector = ChangeDetector::new();
        detector.observe(&snapshot(Some(21.0), Some(55.0)));
        detector.reset();
        assert!(detector.observe(&snapshot(Some(35.0), None)).is_empty());
    }
}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Full document the greenhouse device publishes on the primary path.
///
/// Every field is optional: the device only writes the keys it has. A
/// missing key, an explicit `null` and a value of the wrong type all decode
/// as `None`, so one bad leaf never discards the rest of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "sensores", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Sensors>,
    #[serde(rename = "actuadores", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub actuators: Option<Actuators>,
    #[serde(rename = "umbrales", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis", skip_serializing_if = "Option::is_none")]
    pub timestamp_millis: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    #[serde(rename = "temperatura", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "humedad", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(rename = "sensacion_termica", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    #[serde(rename = "presion", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(rename = "altitud", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(rename = "luz", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuators {
    #[serde(rename = "bomba", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub pump: Option<bool>,
    #[serde(rename = "ventilador", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fan: Option<bool>,
    #[serde(rename = "luz", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub light: Option<bool>,
}

/// Trigger values configured on the device. Displayed, never evaluated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(rename = "humedad", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(rename = "temperatura", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "luz", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,
}

/// Summary document published on the secondary path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastReading {
    #[serde(rename = "temperatura", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "humedad", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(rename = "luz", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,
    #[serde(rename = "bomba_activa", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub pump_active: Option<bool>,
    #[serde(rename = "ventilador_activo", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fan_active: Option<bool>,
    #[serde(rename = "luz_activa", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub light_active: Option<bool>,
}

/// Decodes a field, reading a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Epoch milliseconds. The store hands JS numbers back as doubles, so an
/// integral float is accepted too.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Number(n) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    }))
}

/// Numeric sensor fields tracked by the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorField {
    #[serde(rename = "temperatura")]
    Temperature,
    #[serde(rename = "humedad")]
    Humidity,
    #[serde(rename = "luz")]
    Light,
    #[serde(rename = "presion")]
    Pressure,
    #[serde(rename = "sensacion_termica")]
    FeelsLike,
    #[serde(rename = "altitud")]
    Altitude,
}

impl SensorField {
    pub const ALL: [SensorField; 6] = [
        SensorField::Temperature,
        SensorField::Humidity,
        SensorField::Light,
        SensorField::Pressure,
        SensorField::FeelsLike,
        SensorField::Altitude,
    ];

    /// Key used by the device for this field.
    pub fn key(self) -> &'static str {
        match self {
            SensorField::Temperature => "temperatura",
            SensorField::Humidity => "humedad",
            SensorField::Light => "luz",
            SensorField::Pressure => "presion",
            SensorField::FeelsLike => "sensacion_termica",
            SensorField::Altitude => "altitud",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SensorField::Temperature => "Temperatura",
            SensorField::Humidity => "Humedad",
            SensorField::Light => "Luz",
            SensorField::Pressure => "Presión",
            SensorField::FeelsLike => "Sensación Térmica",
            SensorField::Altitude => "Altitud",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            SensorField::Temperature | SensorField::FeelsLike => "🌡️",
            SensorField::Humidity => "💧",
            SensorField::Light => "☀️",
            SensorField::Pressure => "🌀",
            SensorField::Altitude => "⛰️",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorField::Temperature | SensorField::FeelsLike => "°C",
            SensorField::Humidity => "%",
            SensorField::Light => " lx",
            SensorField::Pressure => " hPa",
            SensorField::Altitude => " m",
        }
    }

    /// Decimal places shown on the dashboard card.
    pub fn precision(self) -> usize {
        match self {
            SensorField::Light | SensorField::Altitude => 0,
            _ => 1,
        }
    }

    pub fn read(self, snapshot: &Snapshot) -> Option<f64> {
        let sensors = snapshot.sensors.as_ref()?;
        match self {
            SensorField::Temperature => sensors.temperature,
            SensorField::Humidity => sensors.humidity,
            SensorField::Light => sensors.light,
            SensorField::Pressure => sensors.pressure,
            SensorField::FeelsLike => sensors.feels_like,
            SensorField::Altitude => sensors.altitude,
        }
    }
}

/// Physical outputs driven by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actuator {
    #[serde(rename = "bomba")]
    Pump,
    #[serde(rename = "ventilador")]
    Fan,
    #[serde(rename = "luz")]
    Light,
}

impl Actuator {
    pub const ALL: [Actuator; 3] = [Actuator::Pump, Actuator::Fan, Actuator::Light];

    pub fn key(self) -> &'static str {
        match self {
            Actuator::Pump => "bomba",
            Actuator::Fan => "ventilador",
            Actuator::Light => "luz",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Actuator::Pump => "Bomba",
            Actuator::Fan => "Ventilador",
            Actuator::Light => "Luz",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Actuator::Pump => "💧",
            Actuator::Fan => "🌬️",
            Actuator::Light => "💡",
        }
    }

    /// Status word, gendered to match the Spanish noun.
    pub fn status(self, active: bool) -> &'static str {
        match (self, active) {
            (Actuator::Fan, true) => "ACTIVO",
            (Actuator::Fan, false) => "INACTIVO",
            (_, true) => "ACTIVA",
            (_, false) => "INACTIVA",
        }
    }

    /// Reported state; an absent key counts as off.
    pub fn is_active(self, snapshot: &Snapshot) -> bool {
        let Some(actuators) = snapshot.actuators.as_ref() else {
            return false;
        };
        let state = match self {
            Actuator::Pump => actuators.pump,
            Actuator::Fan => actuators.fan,
            Actuator::Light => actuators.light,
        };
        state.unwrap_or(false)
    }
}

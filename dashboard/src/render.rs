//! Plain-text rendering of the dashboard.

use crate::highlight::FULL_OPACITY;
use crate::model::{Actuator, SensorField, Snapshot, Thresholds};
use crate::state::DashboardState;
use chrono::{Local, TimeZone};
use std::fmt;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

pub fn render(state: &DashboardState, data_path: &str) -> String {
    DashboardView { state, data_path }.to_string()
}

/// Text view of the dashboard state.
pub struct DashboardView<'a> {
    pub state: &'a DashboardState,
    pub data_path: &'a str,
}

impl fmt::Display for DashboardView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state;
        if state.loading {
            return writeln!(f, "Conectando con Firebase...");
        }

        writeln!(f, "Dashboard ESP32")?;
        writeln!(
            f,
            "{}",
            if state.connected {
                "● Conectado"
            } else {
                "● Desconectado"
            }
        )?;

        if let Some(updated) = state
            .snapshot
            .as_ref()
            .and_then(|s| s.timestamp_millis)
            .and_then(format_millis)
        {
            writeln!(f, "Última actualización: {}", updated)?;
        }

        match state.visible_snapshot() {
            Some(snapshot) => {
                write_sensors(f, state, snapshot)?;
                write_actuators(f, snapshot)?;
                if let Some(thresholds) = snapshot.thresholds.as_ref() {
                    write_thresholds(f, thresholds)?;
                }
                Ok(())
            }
            None => {
                writeln!(f)?;
                writeln!(
                    f,
                    "No hay datos disponibles. Asegúrate de que tu ESP32 esté enviando datos a Firebase."
                )?;
                writeln!(f, "Ruta esperada: {}", self.data_path)
            }
        }
    }
}

fn write_sensors(
    f: &mut fmt::Formatter<'_>,
    state: &DashboardState,
    snapshot: &Snapshot,
) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "Sensores Ambientales")?;

    for field in SensorField::ALL {
        let value = field
            .read(snapshot)
            .map(|v| format!("{:.*}", field.precision(), v))
            .unwrap_or_else(|| "--".to_string());
        let card = format!("{} {}: {}{}", field.icon(), field.label(), value, field.unit());

        if !state.is_highlighted(field) {
            writeln!(f, "  {}", card)?;
        } else if state.opacity < FULL_OPACITY {
            writeln!(f, "» {}{}{}", DIM, card, RESET)?;
        } else {
            writeln!(f, "» {}", card)?;
        }
    }
    Ok(())
}

fn write_actuators(f: &mut fmt::Formatter<'_>, snapshot: &Snapshot) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "Estado de Actuadores")?;

    for actuator in Actuator::ALL {
        writeln!(
            f,
            "  {} {}: {}",
            actuator.icon(),
            actuator.label(),
            actuator.status(actuator.is_active(snapshot))
        )?;
    }
    Ok(())
}

fn write_thresholds(f: &mut fmt::Formatter<'_>, thresholds: &Thresholds) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "Umbrales Configurados")?;
    writeln!(f, "  💧 Humedad: {}%", format_threshold(thresholds.humidity))?;
    writeln!(f, "  🌡️ Temperatura: {}°C", format_threshold(thresholds.temperature))?;
    writeln!(f, "  ☀️ Luz: {} lx", format_threshold(thresholds.light))
}

fn format_threshold(value: Option<f64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "--".to_string())
}

fn format_millis(millis: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%d/%m/%Y %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeSet;
    use crate::highlight::DIM_OPACITY;
    use crate::model::{Actuators, Sensors};

    fn connected(snapshot: Snapshot) -> DashboardState {
        DashboardState {
            loading: false,
            connected: true,
            snapshot: Some(snapshot),
            ..Default::default()
        }
    }

    fn sample() -> Snapshot {
        Snapshot {
            sensors: Some(Sensors {
                temperature: Some(24.46),
                humidity: Some(61.0),
                feels_like: None,
                pressure: Some(1013.25),
                altitude: Some(119.6),
                light: Some(840.4),
            }),
            actuators: Some(Actuators {
                pump: Some(true),
                fan: Some(false),
                light: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_loading_view() {
        let out = render(&DashboardState::default(), "invernadero/datos");
        assert_eq!(out, "Conectando con Firebase...\n");
    }

    #[test]
    fn test_disconnected_view_names_path() {
        let mut state = connected(sample());
        state.connected = false;

        let out = render(&state, "invernadero/datos");
        assert!(out.contains("● Desconectado"));
        assert!(out.contains("Ruta esperada: invernadero/datos"));
        assert!(!out.contains("Sensores Ambientales"));
    }

    #[test]
    fn test_connected_view_values() {
        let out = render(&connected(sample()), "invernadero/datos");

        assert!(out.contains("● Conectado"));
        assert!(out.contains("  🌡️ Temperatura: 24.5°C"));
        assert!(out.contains("  💧 Humedad: 61.0%"));
        assert!(out.contains("  🌡️ Sensación Térmica: --°C"));
        assert!(out.contains("  🌀 Presión: 1013.2 hPa") || out.contains("  🌀 Presión: 1013.3 hPa"));
        assert!(out.contains("  ⛰️ Altitud: 120 m"));
        assert!(out.contains("  ☀️ Luz: 840 lx"));
        assert!(out.contains("  💧 Bomba: ACTIVA"));
        assert!(out.contains("  🌬️ Ventilador: INACTIVO"));
        assert!(out.contains("  💡 Luz: INACTIVA"));
        assert!(!out.contains("Umbrales Configurados"));
        assert!(!out.contains("Última actualización"));
    }

    #[test]
    fn test_thresholds_section() {
        let mut snapshot = sample();
        snapshot.thresholds = Some(Thresholds {
            humidity: Some(40.0),
            temperature: Some(30.5),
            light: None,
        });

        let out = render(&connected(snapshot), "invernadero/datos");
        assert!(out.contains("Umbrales Configurados"));
        assert!(out.contains("  💧 Humedad: 40%"));
        assert!(out.contains("  🌡️ Temperatura: 30.5°C"));
        assert!(out.contains("  ☀️ Luz: -- lx"));
    }

    #[test]
    fn test_highlighted_cards() {
        let mut state = connected(sample());
        state.changed = [SensorField::Humidity].into_iter().collect::<ChangeSet>();

        let out = render(&state, "invernadero/datos");
        assert!(out.contains("» 💧 Humedad: 61.0%"));
        assert!(out.contains("  🌡️ Temperatura"));

        state.opacity = DIM_OPACITY;
        let out = render(&state, "invernadero/datos");
        assert!(out.contains(&format!("» {}💧 Humedad: 61.0%{}", DIM, RESET)));
    }

    #[test]
    fn test_view_writes_into_any_formatter() {
        let state = connected(sample());
        let view = DashboardView {
            state: &state,
            data_path: "invernadero/datos",
        };

        assert_eq!(format!("{}", view), render(&state, "invernadero/datos"));
        assert!(view.to_string().ends_with("  💡 Luz: INACTIVA\n"));
    }

    #[test]
    fn test_last_update_line() {
        let mut snapshot = sample();
        snapshot.timestamp_millis = Some(1_700_000_000_000);

        let out = render(&connected(snapshot), "invernadero/datos");
        assert!(out.contains("Última actualización: "));
    }
}

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensores {
    pub temperatura: f64,
    pub humedad: f64,
    pub sensacion_termica: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presion: Option<f64>,
    pub altitud: f64,
    pub luz: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Actuadores {
    pub bomba: bool,
    pub ventilador: bool,
    pub luz: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Umbrales {
    pub humedad: f64,
    pub temperatura: f64,
    pub luz: f64,
}

/// Document the device writes to the data path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datos {
    pub sensores: Sensores,
    pub actuadores: Actuadores,
    pub umbrales: Umbrales,
    pub timestamp: String,
    pub timestamp_millis: i64,
}

/// Summary the device writes to the last-reading path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltimaLectura {
    pub temperatura: f64,
    pub humedad: f64,
    pub luz: f64,
    pub bomba_activa: bool,
    pub ventilador_activo: bool,
    pub luz_activa: bool,
}

/// Fake greenhouse controller: drifting sensors, threshold-driven actuators.
#[derive(Debug, Clone)]
pub struct GreenhouseDevice {
    sensores: Sensores,
    actuadores: Actuadores,
    umbrales: Umbrales,
}

impl Default for GreenhouseDevice {
    fn default() -> Self {
        Self {
            sensores: Sensores {
                temperatura: 24.0,
                humedad: 55.0,
                sensacion_termica: 24.5,
                presion: Some(1013.0),
                altitud: 120.0,
                luz: 600.0,
            },
            actuadores: Actuadores::default(),
            umbrales: Umbrales {
                humedad: 40.0,
                temperatura: 30.0,
                luz: 300.0,
            },
        }
    }
}

impl GreenhouseDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the device by one reading.
    pub fn step(&mut self, rng: &mut impl Rng) {
        let s = &mut self.sensores;

        s.temperatura = if rng.gen_bool(0.03) {
            rng.gen_range(10.0..40.0) // 3% spikes
        } else {
            (s.temperatura + rng.gen_range(-0.4..0.4)).clamp(5.0, 45.0)
        };
        s.humedad = (s.humedad + rng.gen_range(-1.5..1.5)).clamp(10.0, 95.0);
        s.luz = (s.luz + rng.gen_range(-40.0..40.0)).clamp(0.0, 2000.0);
        s.altitud = (s.altitud + rng.gen_range(-0.5..0.5)).clamp(100.0, 140.0);

        // The pressure sensor occasionally drops out
        s.presion = if rng.gen_bool(0.02) {
            None
        } else {
            let base = s.presion.unwrap_or(1013.0);
            Some((base + rng.gen_range(-0.3..0.3)).clamp(980.0, 1040.0))
        };

        s.sensacion_termica = s.temperatura + (s.humedad - 40.0) * 0.05;

        self.actuadores = Actuadores {
            bomba: s.humedad < self.umbrales.humedad,
            ventilador: s.temperatura > self.umbrales.temperatura,
            luz: s.luz < self.umbrales.luz,
        };
    }

    pub fn datos(&self) -> Datos {
        let now = Utc::now();
        Datos {
            sensores: self.sensores.clone(),
            actuadores: self.actuadores,
            umbrales: self.umbrales.clone(),
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            timestamp_millis: now.timestamp_millis(),
        }
    }

    pub fn ultima_lectura(&self) -> UltimaLectura {
        UltimaLectura {
            temperatura: self.sensores.temperatura,
            humedad: self.sensores.humedad,
            luz: self.sensores.luz,
            bomba_activa: self.actuadores.bomba,
            ventilador_activo: self.actuadores.ventilador,
            luz_activa: self.actuadores.luz,
        }
    }
}

//! Génération de trames capteurs : phase normale puis montée en température.

use rand::Rng;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Critical,
}

/// Trames d'un véhicule : `normal_frames` trames saines, puis critique jusqu'à l'arrêt
pub struct TelemetryGenerator<R> {
    rng: R,
    normal_frames: u64,
    sent: u64,
}

impl<R: Rng> TelemetryGenerator<R> {
    pub fn new(rng: R, normal_frames: u64) -> Self {
        Self { rng, normal_frames, sent: 0 }
    }

    pub fn phase(&self) -> Phase {
        if self.sent < self.normal_frames {
            Phase::Normal
        } else {
            Phase::Critical
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn next_frame(&mut self) -> Map<String, Value> {
        let phase = self.phase();
        self.sent += 1;

        let (temp, rpm, speed) = match phase {
            Phase::Normal => (
                self.rng.gen_range(85.0..=95.0),
                self.rng.gen_range(2000..=3000),
                self.rng.gen_range(40..=60),
            ),
            Phase::Critical => (
                self.rng.gen_range(110.0..=125.0),
                self.rng.gen_range(4500..=5000),
                self.rng.gen_range(20..=30),
            ),
        };
        let battery: f64 = self.rng.gen_range(12.2..=12.8);

        let mut frame = Map::new();
        frame.insert("engine_temp".into(), json!(round1(temp)));
        frame.insert("rpm".into(), json!(rpm));
        frame.insert("speed".into(), json!(speed));
        frame.insert("battery_voltage".into(), json!(round1(battery)));
        frame
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

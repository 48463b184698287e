/*!
Builders de trames capteurs et de verdicts pour les tests

Produisent le JSON brut tel qu'un véhicule l'envoie, ou les valeurs typées
du kernel, sans répéter les littéraux dans chaque test.
*/

use agentx_kernel::models::{CustomerRecord, Issue, IssueSeverity, SensorFrame, Severity, Verdict};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Trame capteurs côté véhicule
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    vehicle_id: String,
    readings: Map<String, Value>,
}

impl FrameBuilder {
    pub fn new(vehicle_id: &str) -> Self {
        Self { vehicle_id: vehicle_id.to_string(), readings: Map::new() }
    }

    pub fn engine_temp(self, celsius: f64) -> Self {
        self.field("engine_temp", serde_json::json!(celsius))
    }

    pub fn rpm(self, rpm: u32) -> Self {
        self.field("rpm", serde_json::json!(rpm))
    }

    pub fn speed(self, kmh: u32) -> Self {
        self.field("speed", serde_json::json!(kmh))
    }

    pub fn battery_voltage(self, volts: f64) -> Self {
        self.field("battery_voltage", serde_json::json!(volts))
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.readings.insert(key.to_string(), value);
        self
    }

    /// Texte JSON tel qu'envoyé sur la socket
    pub fn to_json(&self) -> String {
        Value::Object(self.readings.clone()).to_string()
    }

    pub fn build(self) -> SensorFrame {
        SensorFrame::new(self.vehicle_id, OffsetDateTime::now_utc(), self.readings)
    }
}

/// Verdict de diagnostic scripté
#[derive(Debug, Clone)]
pub struct VerdictBuilder {
    severity: Severity,
    risk_score: u8,
    issues: Vec<Issue>,
}

impl VerdictBuilder {
    pub fn normal() -> Self {
        Self { severity: Severity::Normal, risk_score: 0, issues: Vec::new() }
    }

    pub fn warning(risk_score: u8) -> Self {
        Self { severity: Severity::Warning, risk_score, issues: Vec::new() }
    }

    pub fn critical(risk_score: u8) -> Self {
        Self { severity: Severity::Critical, risk_score, issues: Vec::new() }
    }

    /// Issue dont la sévérité suit celle du verdict
    pub fn issue(mut self, description: &str) -> Self {
        self.issues.push(Issue::new(description, self.severity.into()));
        self
    }

    pub fn issue_with(mut self, description: &str, severity: IssueSeverity) -> Self {
        self.issues.push(Issue::new(description, severity));
        self
    }

    /// Verdict tel quel, sans normalisation (le kernel s'en charge)
    pub fn build(self) -> Verdict {
        Verdict { severity: self.severity, risk_score: self.risk_score, issues: self.issues }
    }
}

pub fn customer(customer_id: &str, name: &str, vehicle_model: &str) -> CustomerRecord {
    CustomerRecord {
        customer_id: customer_id.to_string(),
        name: name.to_string(),
        preferred_language: "English".to_string(),
        vehicle_model: vehicle_model.to_string(),
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Clés toujours réécrites côté serveur (jamais reprises de la source)
const SERVER_OWNED_KEYS: [&str; 5] = ["vehicle_id", "vehicleId", "timestamp", "received_at", "receivedAt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    /// WARNING et CRITICAL déclenchent le workflow d'alerte
    pub fn is_alert_worthy(self) -> bool {
        self != Severity::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

impl From<Severity> for IssueSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Normal => IssueSeverity::Low,
            Severity::Warning => IssueSeverity::Medium,
            Severity::Critical => IssueSeverity::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub description: String,
    pub severity: IssueSeverity,
}

impl Issue {
    pub fn new(description: impl Into<String>, severity: IssueSeverity) -> Self {
        Self { description: description.into(), severity }
    }
}

/// Résultat du diagnostic d'une trame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub severity: Severity,
    #[serde(default)]
    pub risk_score: u8,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl Verdict {
    /// Verdict de repli quand le port de diagnostic échoue ou expire
    pub fn fallback() -> Self {
        Self { severity: Severity::Normal, risk_score: 0, issues: Vec::new() }
    }

    pub fn alert(severity: Severity, risk_score: u8, issues: Vec<Issue>) -> Self {
        Self { severity, risk_score, issues }.normalized()
    }

    /// Rétablit l'invariant NORMAL <=> aucune issue, risque borné à 0..=100
    pub fn normalized(mut self) -> Self {
        if self.severity.is_alert_worthy() {
            self.risk_score = self.risk_score.min(100);
            if self.issues.is_empty() {
                self.issues.push(Issue::new("Unspecified anomaly", self.severity.into()));
            }
        } else {
            self.risk_score = 0;
            self.issues.clear();
        }
        self
    }

    pub fn first_issue(&self) -> Option<&Issue> {
        self.issues.first()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a flat JSON object")]
    NotAnObject,
}

/// Trame capteur d'un véhicule, horodatée à la réception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    vehicle_id: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    received_at: OffsetDateTime,
    #[serde(flatten)]
    readings: Map<String, Value>,
}

impl SensorFrame {
    pub fn new(vehicle_id: impl Into<String>, received_at: OffsetDateTime, mut readings: Map<String, Value>) -> Self {
        for key in SERVER_OWNED_KEYS {
            readings.remove(key);
        }
        Self { vehicle_id: vehicle_id.into(), received_at, readings }
    }

    /// Parse un message texte entrant ; l'identité et l'horodatage viennent du serveur
    pub fn parse(vehicle_id: &str, raw: &str, received_at: OffsetDateTime) -> Result<Self, FrameError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(readings) => Ok(Self::new(vehicle_id, received_at, readings)),
            _ => Err(FrameError::NotAnObject),
        }
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn received_at(&self) -> OffsetDateTime {
        self.received_at
    }

    pub fn readings(&self) -> &Map<String, Value> {
        &self.readings
    }

    /// Valeur brute d'un champ, en acceptant l'alias camelCase (engine_temp / engineTemp)
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.readings
            .get(key)
            .or_else(|| self.readings.get(&camel_case(key)))
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(Value::as_f64)
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub name: String,
    pub preferred_language: String,
    pub vehicle_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub vehicle_id: String,
    pub diagnosis: Verdict,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

impl AlertRecord {
    pub fn new(vehicle_id: impl Into<String>, diagnosis: Verdict, timestamp: OffsetDateTime) -> Self {
        Self { vehicle_id: vehicle_id.into(), diagnosis, timestamp, appointment_id: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    PendingConfirmation,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub vehicle_id: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub slot_time: String,
    pub issue_type: Option<String>,
    pub risk_score: Option<u8>,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: String,
    #[serde(flatten)]
    pub request: AppointmentRequest,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Signal de défaut récurrent remonté vers la fabrication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingSignal {
    pub vehicle_model: String,
    pub issue_type: String,
    pub frequency: f64,
}

// Messages sortants vers le véhicule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleReply {
    Ok {
        status: Severity,
        temp: Option<Value>,
    },
    Alert {
        diagnosis: Verdict,
        message: String,
        appointment_booked: bool,
    },
}

// Messages diffusés aux dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DashboardEvent {
    NewAlert {
        vehicle_id: String,
        diagnosis: Verdict,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        audio: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        appointment_id: Option<String>,
    },
}

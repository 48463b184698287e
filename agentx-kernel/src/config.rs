use crate::models::CustomerRecord;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::Path, time::Duration};
use tokio::fs;
use tracing::{error, warn};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: SocketAddr,
    pub pipeline: PipelineConf,
    pub alerts: AlertConf,
    pub rules: RulesConf,
    pub directory: DirectoryConf,
    pub store: StoreConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConf {
    /// Attente max du port de diagnostic ; absent = pas de borne
    pub diagnosis_timeout_ms: Option<u64>,
    pub dashboard_send_timeout_ms: u64,
    /// Attente max pour déposer une réponse dans la file d'un véhicule
    pub vehicle_send_timeout_ms: u64,
    pub outbound_buffer: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AlertConf {
    pub default_slot: String,
    pub manufacturing_risk_threshold: u8,
    pub manufacturing_frequency: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RulesConf {
    pub engine_temp_warning: f64,
    pub engine_temp_critical: f64,
    pub rpm_warning: f64,
    pub battery_voltage_low: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DirectoryConf {
    pub customers: HashMap<String, CustomerRecord>,
    pub default_customer: Option<CustomerRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConf {
    pub telemetry_retention: usize,
    /// Taille max des journaux d'alertes, de RDV et de signaux fabrication
    pub alert_retention: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            pipeline: PipelineConf::default(),
            alerts: AlertConf::default(),
            rules: RulesConf::default(),
            directory: DirectoryConf::default(),
            store: StoreConf::default(),
        }
    }
}

impl Default for PipelineConf {
    fn default() -> Self {
        Self {
            diagnosis_timeout_ms: Some(5_000),
            dashboard_send_timeout_ms: 250,
            vehicle_send_timeout_ms: 1_000,
            outbound_buffer: 64,
        }
    }
}

impl PipelineConf {
    pub fn diagnosis_timeout(&self) -> Option<Duration> {
        self.diagnosis_timeout_ms.map(Duration::from_millis)
    }

    pub fn dashboard_send_timeout(&self) -> Duration {
        Duration::from_millis(self.dashboard_send_timeout_ms)
    }

    pub fn vehicle_send_timeout(&self) -> Duration {
        Duration::from_millis(self.vehicle_send_timeout_ms)
    }
}

impl Default for AlertConf {
    fn default() -> Self {
        Self {
            default_slot: "Tomorrow 10:00 AM".into(),
            manufacturing_risk_threshold: 60,
            manufacturing_frequency: 0.15,
        }
    }
}

impl Default for RulesConf {
    fn default() -> Self {
        Self {
            engine_temp_warning: 100.0,
            engine_temp_critical: 110.0,
            rpm_warning: 4500.0,
            battery_voltage_low: 11.8,
        }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self { telemetry_retention: 10_000, alert_retention: 1_000 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

pub async fn read_config(path: &Path) -> Result<KernelConfig, ConfigError> {
    let txt = fs::read_to_string(path).await?;
    parse_config(&txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("AGENTX_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        read_config(Path::new(&path)).await.unwrap_or_else(|e| {
            error!(%path, "{e}, using defaults");
            KernelConfig::default()
        })
    } else {
        warn!(%path, "no config file, using defaults");
        KernelConfig::default()
    };

    if let Ok(listen) = std::env::var("AGENTX_LISTEN") {
        match listen.parse() {
            Ok(addr) => cfg.listen = addr,
            Err(e) => warn!(%listen, "ignoring AGENTX_LISTEN: {e}"),
        }
    }
    cfg
}

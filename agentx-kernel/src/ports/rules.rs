//! Moteur de règles à seuils : implémentation par défaut du port de diagnostic.

use super::{DiagnosisPort, PortError};
use crate::config::RulesConf;
use crate::models::{Issue, IssueSeverity, SensorFrame, Severity, Verdict};
use async_trait::async_trait;

pub struct RuleDiagnosis {
    rules: RulesConf,
}

struct Finding {
    issue: Issue,
    severity: Severity,
    risk: u32,
}

impl RuleDiagnosis {
    pub fn new(rules: RulesConf) -> Self {
        Self { rules }
    }

    fn findings(&self, frame: &SensorFrame) -> Vec<Finding> {
        let mut out = Vec::new();

        if let Some(temp) = frame.number("engine_temp") {
            if temp >= self.rules.engine_temp_critical {
                out.push(Finding {
                    issue: Issue::new("Engine Overheating", IssueSeverity::High),
                    severity: Severity::Critical,
                    // 70 au seuil critique, +1 par degré au-delà, borné à 100
                    risk: (70.0 + (temp - self.rules.engine_temp_critical).max(0.0)).min(100.0) as u32,
                });
            } else if temp >= self.rules.engine_temp_warning {
                out.push(Finding {
                    issue: Issue::new("Engine Running Hot", IssueSeverity::Medium),
                    severity: Severity::Warning,
                    risk: 35,
                });
            }
        }

        if let Some(rpm) = frame.number("rpm") {
            if rpm > self.rules.rpm_warning {
                out.push(Finding {
                    issue: Issue::new("Sustained High RPM", IssueSeverity::Medium),
                    severity: Severity::Warning,
                    risk: 15,
                });
            }
        }

        if let Some(volts) = frame.number("battery_voltage") {
            if volts < self.rules.battery_voltage_low {
                out.push(Finding {
                    issue: Issue::new("Low Battery Voltage", IssueSeverity::Low),
                    severity: Severity::Warning,
                    risk: 10,
                });
            }
        }

        out
    }
}

#[async_trait]
impl DiagnosisPort for RuleDiagnosis {
    async fn evaluate(&self, frame: &SensorFrame) -> Result<Verdict, PortError> {
        let findings = self.findings(frame);
        let Some(severity) = findings.iter().map(|f| f.severity).max() else {
            return Ok(Verdict::fallback());
        };
        let risk = findings.iter().fold(0u32, |acc, f| acc.saturating_add(f.risk)).min(100) as u8;
        let issues = findings.into_iter().map(|f| f.issue).collect();
        Ok(Verdict::alert(severity, risk, issues))
    }

    fn name(&self) -> &'static str {
        "rule-diagnosis"
    }
}

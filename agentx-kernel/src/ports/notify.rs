use super::{NotificationPort, PortError};
use crate::models::{CustomerRecord, Issue};
use async_trait::async_trait;
use tracing::info;

/// Script statique ; la synthèse vocale se contente de tracer l'appel (pas d'audio)
#[derive(Debug, Default)]
pub struct TemplateNotifier;

impl TemplateNotifier {
    pub fn new() -> Self {
        Self
    }
}

pub fn render_script(customer: Option<&CustomerRecord>, issues: &[Issue]) -> String {
    let name = customer.map(|c| c.name.as_str()).unwrap_or("valued customer");
    let model = customer.map(|c| c.vehicle_model.as_str()).unwrap_or("vehicle");
    let detected = if issues.is_empty() {
        "an anomaly".to_string()
    } else {
        issues
            .iter()
            .map(|i| i.description.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("Hello {name}, this is AgentX. We detected {detected} in your {model}. Please keep an eye on your phone for a service appointment.")
}

#[async_trait]
impl NotificationPort for TemplateNotifier {
    async fn compose_message(&self, customer: Option<&CustomerRecord>, issues: &[Issue]) -> Result<String, PortError> {
        Ok(render_script(customer, issues))
    }

    async fn synthesize_voice(&self, text: &str) -> Result<Option<Vec<u8>>, PortError> {
        info!(message = %text, "call delivered to customer");
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "template-notifier"
    }
}

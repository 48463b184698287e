use super::{DirectoryPort, PortError};
use crate::config::DirectoryConf;
use crate::models::CustomerRecord;
use async_trait::async_trait;
use std::collections::HashMap;

/// Annuaire statique : clients par véhicule + client par défaut optionnel
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    customers: HashMap<String, CustomerRecord>,
    default_customer: Option<CustomerRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &DirectoryConf) -> Self {
        Self {
            customers: cfg.customers.clone(),
            default_customer: cfg.default_customer.clone(),
        }
    }

    pub fn with_customer(mut self, vehicle_id: &str, customer: CustomerRecord) -> Self {
        self.customers.insert(vehicle_id.to_string(), customer);
        self
    }

    pub fn with_default(mut self, customer: CustomerRecord) -> Self {
        self.default_customer = Some(customer);
        self
    }
}

#[async_trait]
impl DirectoryPort for StaticDirectory {
    async fn resolve_customer(&self, vehicle_id: &str) -> Result<CustomerRecord, PortError> {
        self.customers
            .get(vehicle_id)
            .or(self.default_customer.as_ref())
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("no customer for vehicle {vehicle_id}")))
    }

    fn name(&self) -> &'static str {
        "static-directory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: &str) -> CustomerRecord {
        CustomerRecord {
            customer_id: id.into(),
            name: "Test".into(),
            preferred_language: "English".into(),
            vehicle_model: "Model".into(),
        }
    }

    #[tokio::test]
    async fn test_specific_customer_wins_over_default() {
        let dir = StaticDirectory::new()
            .with_customer("V1", customer("C1"))
            .with_default(customer("C0"));
        assert_eq!(dir.resolve_customer("V1").await.unwrap().customer_id, "C1");
        assert_eq!(dir.resolve_customer("V9").await.unwrap().customer_id, "C0");
    }

    #[tokio::test]
    async fn test_unknown_vehicle_without_default() {
        let dir = StaticDirectory::new();
        assert!(matches!(dir.resolve_customer("V2").await, Err(PortError::NotFound(_))));
    }
}

//! Health check module
//! Reports the payment store and gateway wiring for `/health`.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

use crate::database::{PaymentStore, StoreError};

const STORE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Degraded still serves traffic; only Unhealthy fails readiness.
    pub fn is_serving(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn PaymentStore>,
    gateway_configured: bool,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn PaymentStore>, gateway_configured: bool) -> Self {
        Self {
            store,
            gateway_configured,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let store_key = format!("store:{}", self.store.backend());
        match timeout(STORE_CHECK_TIMEOUT, check_store_health(self.store.as_ref())).await {
            Ok(Ok(response_time)) => {
                debug!(response_time_ms = response_time, "store health check ok");
                health_status
                    .checks
                    .insert(store_key, ComponentHealth::up(Some(response_time)));
            }
            Ok(Err(e)) => {
                error!(error = %e, "store health check failed");
                health_status
                    .checks
                    .insert(store_key, ComponentHealth::down(Some(e.to_string())));
                health_status.status = HealthState::Unhealthy;
            }
            Err(_) => {
                error!("store health check timed out");
                health_status
                    .checks
                    .insert(store_key, ComponentHealth::down(Some("Timeout".to_string())));
                health_status.status = HealthState::Unhealthy;
            }
        }

        // Without a gateway key, polling and gateway-mode checkout are off
        // but donor and admin flows still work.
        let gateway = if self.gateway_configured {
            ComponentHealth::up(None)
        } else {
            if health_status.status == HealthState::Healthy {
                health_status.status = HealthState::Degraded;
            }
            ComponentHealth::warning(None, Some("UPI gateway not configured".to_string()))
        };
        health_status.checks.insert("gateway".to_string(), gateway);

        health_status
    }
}

pub async fn check_store_health(store: &dyn PaymentStore) -> Result<u128, StoreError> {
    let start = Instant::now();
    store.health_check().await?;
    Ok(start.elapsed().as_millis())
}

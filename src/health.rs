//! Health check module
//! Reports the state of the reservation store and the reconciliation worker

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::error;

use crate::database::repository::ReservationStore;

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

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
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
    store: Arc<dyn ReservationStore>,
    reconciliation_enabled: bool,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn ReservationStore>, reconciliation_enabled: bool) -> Self {
        Self {
            store,
            reconciliation_enabled,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut state = HealthState::Healthy;

        let start = Instant::now();
        match timeout(Duration::from_secs(5), self.store.health_check()).await {
            Ok(Ok(())) => {
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::up(Some(start.elapsed().as_millis())),
                );
            }
            Ok(Err(e)) => {
                state = HealthState::Unhealthy;
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::down(Some(e.to_string())),
                );
                error!("Storage health check failed: {}", e);
            }
            Err(_) => {
                state = HealthState::Unhealthy;
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Storage health check timed out");
            }
        }

        // Without the poller, bookings only settle through callbacks.
        let reconciliation = if self.reconciliation_enabled {
            ComponentHealth::up(None)
        } else {
            if state == HealthState::Healthy {
                state = HealthState::Degraded;
            }
            ComponentHealth::warning(None, Some("reconciliation disabled".to_string()))
        };
        health_status
            .checks
            .insert("reconciliation".to_string(), reconciliation);

        health_status.status = state;
        health_status
    }
}

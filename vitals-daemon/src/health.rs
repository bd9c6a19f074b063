//! Daemon health tracking, surfaced on `/healthz`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health of one subsystem or of the daemon as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Aggregated health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub subsystems: BTreeMap<String, SubsystemHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsystemHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Tracks per-subsystem status; the overall status is the worst of them.
#[derive(Clone, Default)]
pub struct HealthChecker {
    subsystems: Arc<RwLock<BTreeMap<String, SubsystemHealth>>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status of one subsystem, registering it on first use.
    pub async fn set(&self, name: &str, status: HealthStatus, message: Option<String>) {
        self.subsystems
            .write()
            .await
            .insert(name.to_string(), SubsystemHealth { status, message });
    }

    pub async fn get_health(&self) -> HealthReport {
        let subsystems = self.subsystems.read().await.clone();
        let status = if subsystems.values().any(|s| s.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if subsystems.values().any(|s| s.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        HealthReport { status, version: env!("CARGO_PKG_VERSION"), subsystems }
    }

    pub async fn is_ready(&self) -> bool {
        self.get_health().await.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_worst_subsystem_wins() {
        let checker = HealthChecker::new();
        assert!(checker.is_ready().await);

        checker.set("collector", HealthStatus::Healthy, None).await;
        checker.set("storage", HealthStatus::Healthy, None).await;
        assert_eq!(checker.get_health().await.status, HealthStatus::Healthy);

        checker
            .set("storage", HealthStatus::Degraded, Some("store errors".to_string()))
            .await;
        assert_eq!(checker.get_health().await.status, HealthStatus::Degraded);
        assert!(!checker.is_ready().await);

        checker.set("collector", HealthStatus::Unhealthy, None).await;
        assert_eq!(checker.get_health().await.status, HealthStatus::Unhealthy);
    }
}

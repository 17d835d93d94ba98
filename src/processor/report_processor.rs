use crate::alerts::AlertManager;
use crate::error::AlertError;
use crate::models::{AlertType, NewAlert};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

/// Incident report published by a stand panic button or POS terminal.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReport {
    pub reporter_id: String,
    pub stand_id: Option<String>,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub longitude: Option<f64>,
}

impl IncidentReport {
    /// Coordinates are folded into the free-text location.
    pub fn into_new_alert(self) -> NewAlert {
        let coords = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(format!("{:.6},{:.6}", lat, lng)),
            _ => None,
        };
        let location = match (self.location, coords) {
            (Some(place), Some(coords)) => Some(format!("{} ({})", place, coords)),
            (place, coords) => place.or(coords),
        };

        NewAlert {
            reporter_id: self.reporter_id,
            stand_id: self.stand_id,
            alert_type: self.alert_type,
            title: self.title,
            description: self.description,
            location,
            sla_target_minutes: None,
            auto_escalate: None,
        }
    }
}

pub async fn process_report(manager: &AlertManager, payload: &[u8]) -> anyhow::Result<()> {
    // 1. Parse JSON
    let report: IncidentReport = match serde_json::from_slice(payload) {
        Ok(r) => r,
        Err(e) => {
            warn!("Failed to parse incident report: {}", e);
            return Ok(());
        }
    };

    // 2. Raise the alert
    let reporter = report.reporter_id.clone();
    match manager.create(report.into_new_alert()).await {
        Ok(alert) => {
            info!("Report from {} raised alert {}", reporter, alert.id);
            Ok(())
        }
        Err(AlertError::Validation(reason)) => {
            warn!("Dropping report from {}: {}", reporter, reason);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{NotificationRouter, ResponderDirectory};
    use crate::db::InMemoryIncidentStore;
    use crate::hub::ConnectionRegistry;
    use std::sync::Arc;

    fn manager() -> AlertManager {
        let store = Arc::new(InMemoryIncidentStore::new());
        let directory = Arc::new(ResponderDirectory::new(store.clone()));
        let router = NotificationRouter::new(store.clone(), ConnectionRegistry::new(), directory);
        AlertManager::new(store, router)
    }

    #[test]
    fn test_coordinates_accept_strings_and_numbers() {
        let json = r#"{
            "reporterId": "pos-12",
            "standId": "stand-4",
            "alertType": "medical",
            "title": "Panic button",
            "description": "Pressed at register",
            "latitude": "19.302900",
            "longitude": -99.150400
        }"#;
        let report: IncidentReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.latitude, Some(19.3029));
        assert_eq!(report.longitude, Some(-99.1504));

        let alert = report.into_new_alert();
        assert_eq!(alert.location.as_deref(), Some("19.302900,-99.150400"));
    }

    #[test]
    fn test_blank_coordinates_are_ignored() {
        let json = r#"{
            "reporterId": "pos-12",
            "alertType": "fire",
            "title": "Smoke",
            "description": "Kitchen",
            "location": "Stand 4",
            "latitude": "",
            "longitude": ""
        }"#;
        let report: IncidentReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.into_new_alert().location.as_deref(), Some("Stand 4"));
    }

    #[tokio::test]
    async fn test_valid_report_raises_alert() {
        let manager = manager();
        let payload = br#"{"reporterId":"pos-3","alertType":"security","title":"Fight","description":"Line at stand 9"}"#;
        process_report(&manager, payload).await.unwrap();

        let active = manager.active_alerts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].reporter_id, "pos-3");
        assert_eq!(active[0].alert_type, AlertType::Security);
    }

    #[tokio::test]
    async fn test_malformed_reports_are_dropped() {
        let manager = manager();
        process_report(&manager, b"not json").await.unwrap();
        process_report(
            &manager,
            br#"{"reporterId":"pos-3","alertType":"volcano","title":"x","description":"y"}"#,
        )
        .await
        .unwrap();
        process_report(
            &manager,
            br#"{"reporterId":"pos-3","alertType":"fire","title":"","description":"y"}"#,
        )
        .await
        .unwrap();

        assert!(manager.active_alerts().await.unwrap().is_empty());
    }
}

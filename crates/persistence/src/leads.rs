//! Lead logging
//!
//! A lead is the person a call is placed to, captured when the call is
//! initiated. Logging is best-effort and never blocks call setup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PersistenceError, SupabaseClient};

/// Call target metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub name: String,
    pub phone: String,
    pub property_type: String,
    pub location_area: String,
    pub callback_offer: Option<String>,
    pub call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        property_type: impl Into<String>,
        location_area: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            property_type: property_type.into(),
            location_area: location_area.into(),
            callback_offer: None,
            call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_callback_offer(mut self, offer: Option<String>) -> Self {
        self.callback_offer = offer.filter(|o| !o.trim().is_empty());
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// Writes leads to the leads table, or nowhere when disabled
#[derive(Clone)]
pub struct LeadLogger {
    target: Option<(SupabaseClient, String)>,
}

impl LeadLogger {
    pub fn new(client: SupabaseClient, table: String) -> Self {
        Self {
            target: Some((client, table)),
        }
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Insert a lead; a disabled logger accepts and drops it
    pub async fn log_lead(&self, lead: &Lead) -> Result<(), PersistenceError> {
        let Some((client, table)) = &self.target else {
            tracing::debug!(phone = %lead.phone, "Lead logging disabled, skipping");
            return Ok(());
        };
        client.insert(table, lead).await?;
        tracing::info!(call_id = ?lead.call_id, table = %table, "Lead logged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trifivend_config::RecorderConfig;

    fn lead() -> Lead {
        Lead::new("Dana", "+15551234567", "condo", "Brickell").with_call_id("CA1")
    }

    #[test]
    fn test_lead_serialization() {
        let row = serde_json::to_value(lead().with_callback_offer(Some("Tuesday 3pm".to_string())))
            .unwrap();
        assert_eq!(row["name"], "Dana");
        assert_eq!(row["phone"], "+15551234567");
        assert_eq!(row["property_type"], "condo");
        assert_eq!(row["location_area"], "Brickell");
        assert_eq!(row["callback_offer"], "Tuesday 3pm");
        assert_eq!(row["call_id"], "CA1");
        assert!(row["created_at"].is_string());
    }

    #[test]
    fn test_blank_callback_offer_dropped() {
        let lead = lead().with_callback_offer(Some("  ".to_string()));
        assert_eq!(lead.callback_offer, None);
    }

    #[tokio::test]
    async fn test_disabled_logger_accepts() {
        let logger = LeadLogger::disabled();
        assert!(!logger.is_enabled());
        assert!(logger.log_lead(&lead()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_backend_errors() {
        let config = RecorderConfig {
            enabled: true,
            url: "http://127.0.0.1:9".to_string(),
            api_key: "service-key".to_string(),
            ..RecorderConfig::default()
        };
        let logger = LeadLogger::new(SupabaseClient::new(&config).unwrap(), "leads".to_string());
        assert!(matches!(
            logger.log_lead(&lead()).await,
            Err(PersistenceError::Request(_))
        ));
    }
}

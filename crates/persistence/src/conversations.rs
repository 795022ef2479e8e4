//! Conversation turn recorder

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trifivend_core::ConversationRecorder;

use crate::SupabaseClient;

/// One recorded exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub user_input: String,
    pub bot_reply: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(call_id: &str, user_input: &str, bot_reply: &str) -> Self {
        Self {
            call_id: Some(call_id.to_string()).filter(|id| !id.is_empty()),
            user_input: user_input.to_string(),
            bot_reply: bot_reply.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Records turns into the conversations table
pub struct SupabaseRecorder {
    client: SupabaseClient,
    table: String,
}

impl SupabaseRecorder {
    pub fn new(client: SupabaseClient, table: String) -> Self {
        Self { client, table }
    }
}

#[async_trait]
impl ConversationRecorder for SupabaseRecorder {
    async fn record(&self, call_id: &str, caller_utterance: &str, reply_text: &str) -> trifivend_core::Result<()> {
        let row = ConversationRecord::new(call_id, caller_utterance, reply_text);
        self.client.insert(&self.table, &row).await?;
        tracing::debug!(call_id = %call_id, table = %self.table, "Turn recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use trifivend_config::RecorderConfig;

    type Captured = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// Local PostgREST stand-in answering every insert with `status`
    async fn serve(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/rest/v1/:table",
                post(
                    move |State(captured): State<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        let key = headers
                            .get("apikey")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        captured.lock().push((key, body));
                        status
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    fn recorder(url: &str) -> SupabaseRecorder {
        let config = RecorderConfig {
            enabled: true,
            url: url.to_string(),
            api_key: "service-key".to_string(),
            ..RecorderConfig::default()
        };
        SupabaseRecorder::new(SupabaseClient::new(&config).unwrap(), "conversations".to_string())
    }

    #[test]
    fn test_record_serialization() {
        let row = serde_json::to_value(ConversationRecord::new("CA1", "hi", "there")).unwrap();
        assert_eq!(row["call_id"], "CA1");
        assert_eq!(row["user_input"], "hi");
        assert_eq!(row["bot_reply"], "there");
        assert!(row["timestamp"].is_string());

        let anonymous = serde_json::to_value(ConversationRecord::new("", "hi", "there")).unwrap();
        assert!(anonymous.get("call_id").is_none());
    }

    #[tokio::test]
    async fn test_record_posts_row() {
        let (url, captured) = serve(StatusCode::CREATED).await;
        recorder(&url).record("CA1", "hi", "there").await.unwrap();

        let captured = captured.lock();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "service-key");
        assert_eq!(captured[0].1["user_input"], "hi");
        assert_eq!(captured[0].1["bot_reply"], "there");
    }

    #[tokio::test]
    async fn test_rejected_insert_is_recorder_error() {
        let (url, _) = serve(StatusCode::UNAUTHORIZED).await;
        let err = recorder(&url).record("CA1", "hi", "there").await.unwrap_err();
        assert!(matches!(err, trifivend_core::Error::Recorder(ref msg) if msg.contains("401")));
    }
}

use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

/// Why a webhook payload was stored or skipped. Webhook callers always get
/// a definitive outcome within the request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IngestReason {
    MessageCreated,
    MessageUpdated,
    NoRecordMatch,
    NormalizationFailed,
    SyncDisabled,
}

/// Result of the synchronous webhook entry point.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestOutcome {
    pub stored: bool,
    pub message_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub reason: IngestReason,
}

impl IngestOutcome {
    pub fn skipped(reason: IngestReason) -> IngestOutcome {
        IngestOutcome {
            stored: false,
            message_id: None,
            conversation_id: None,
            reason,
        }
    }

    pub fn stored(message_id: Uuid, conversation_id: Uuid, reason: IngestReason) -> IngestOutcome {
        IngestOutcome {
            stored: true,
            message_id: Some(message_id),
            conversation_id: Some(conversation_id),
            reason,
        }
    }
}

/// Bounds for one batch sync invocation. A full historical sync runs as a
/// series of bounded calls; idempotent upserts make re-runs safe.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncOptions {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    pub days_back: Option<u32>,
}

fn default_max_messages() -> usize {
    500
}

impl Default for SyncOptions {
    fn default() -> SyncOptions {
        SyncOptions {
            max_messages: default_max_messages(),
            days_back: None,
        }
    }
}

/// Summary returned by the batch sync path. One bad message never aborts
/// the batch; it lands in `errors`/`error_details` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SyncSummary {
    pub messages_synced: usize,
    pub messages_created: usize,
    pub messages_updated: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
}

impl SyncSummary {
    pub fn record_error(&mut self, detail: String) {
        self.errors += 1;
        self.error_details.push(detail);
    }
}

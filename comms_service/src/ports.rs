//! The seams between the ingestion core and its collaborators. The record
//! store, provider client and real-time publisher are external systems we
//! only consume; the comms repo is our own persistence, abstracted so the
//! pipeline can be exercised against an in-memory implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use models_comms::channel::{Channel, ChannelType};
use models_comms::conversation::Conversation;
use models_comms::identifier::Identifier;
use models_comms::links::{RecordCommunicationLink, RecordRef};
use models_comms::message::{Message, MessageUpdate, ParticipantRole};
use models_comms::participant::Participant;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use uuid::Uuid;

/// All identifiers collected from one batch, grouped by namespace for the
/// single OR-combined participant fetch.
#[derive(Debug, Default, Clone)]
pub struct IdentifierBatch {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub linkedin_urns: Vec<String>,
    pub provider_ids: Vec<String>,
}

impl IdentifierBatch {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
            && self.phones.is_empty()
            && self.linkedin_urns.is_empty()
            && self.provider_ids.is_empty()
    }
}

/// One membership row touch inside a store plan.
#[derive(Debug, Clone)]
pub struct MembershipUpsert {
    pub conversation_id: Uuid,
    pub participant_id: Uuid,
    pub role: ParticipantRole,
    pub provider_participant_id: String,
    /// True when this participant sent the message being stored.
    pub sent_message: bool,
    pub message_at: Option<DateTime<Utc>>,
}

/// Everything one message-store sequence writes, prepared up front so the
/// adapter can run the creates, memberships and links inside one
/// transaction. Updates are applied individually outside it so one
/// malformed update cannot abort the rest of a batch.
#[derive(Debug, Default)]
pub struct StorePlan {
    pub channel_id: Uuid,
    pub conversation_id: Uuid,
    pub creates: Vec<Message>,
    pub updates: Vec<MessageUpdate>,
    pub memberships: Vec<MembershipUpsert>,
    pub links: Vec<RecordCommunicationLink>,
}

#[derive(Debug, Default)]
pub struct StoreOutcome {
    pub created: usize,
    pub updated: usize,
    /// (message id, error) pairs for updates that failed individually.
    pub update_errors: Vec<(Uuid, String)>,
}

pub trait CommsRepo: Send + Sync {
    fn fetch_channel_by_account(
        &self,
        account_id: &str,
        channel_type: ChannelType,
    ) -> impl Future<Output = Result<Option<Channel>>> + Send;

    fn fetch_channel(
        &self,
        channel_id: Uuid,
    ) -> impl Future<Output = Result<Option<Channel>>> + Send;

    fn fetch_conversation(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Option<Conversation>>> + Send;

    fn get_or_create_conversation(
        &self,
        conversation: Conversation,
    ) -> impl Future<Output = Result<Conversation>> + Send;

    fn fetch_participants_by_identifiers(
        &self,
        batch: &IdentifierBatch,
    ) -> impl Future<Output = Result<Vec<Participant>>> + Send;

    fn fetch_participant_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> impl Future<Output = Result<Option<Participant>>> + Send;

    fn insert_participants(
        &self,
        participants: &[Participant],
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_participant_name(
        &self,
        participant_id: Uuid,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fills identifier namespaces a later message revealed; existing
    /// values are never overwritten.
    fn backfill_participant_identifiers(
        &self,
        participant_id: Uuid,
        email: &str,
        phone: &str,
        linkedin_urn: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn persist_record_link(
        &self,
        participant_id: Uuid,
        record_id: Uuid,
        confidence: f64,
        method: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn persist_secondary_record_link(
        &self,
        participant_id: Uuid,
        record_id: Uuid,
        confidence: f64,
        method: &str,
        pipeline: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn find_message_by_tracking_id(
        &self,
        channel_id: Uuid,
        tracking_id: &str,
    ) -> impl Future<Output = Result<Option<Message>>> + Send;

    fn find_message_by_external_id(
        &self,
        conversation_id: Uuid,
        external_message_id: &str,
    ) -> impl Future<Output = Result<Option<Message>>> + Send;

    fn find_existing_external_ids(
        &self,
        conversation_id: Uuid,
        external_ids: &HashSet<String>,
    ) -> impl Future<Output = Result<HashMap<String, Uuid>>> + Send;

    fn execute_store_plan(
        &self,
        plan: StorePlan,
    ) -> impl Future<Output = Result<StoreOutcome>> + Send;

    fn delete_message(&self, message_id: Uuid) -> impl Future<Output = Result<bool>> + Send;

    fn fetch_conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Message>>> + Send;

    fn apply_message_update(
        &self,
        update: &MessageUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Recomputes the cached aggregates for a conversation and its channel
    /// by re-query. Called exactly once per webhook message or per sync
    /// batch, never per bulk item.
    fn recompute_aggregates(
        &self,
        channel_id: Uuid,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Identifier sets for the record store's batch-friendly lookup.
#[derive(Debug, Default, Clone)]
pub struct RecordIdentifierQuery {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
}

/// The CRM's generic record store. External collaborator; lookups only.
pub trait RecordStore: Send + Sync {
    fn find_records_by_identifiers(
        &self,
        query: &RecordIdentifierQuery,
    ) -> impl Future<Output = Result<Vec<RecordRef>>> + Send;

    fn find_company_records_by_domain(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<RecordRef>>> + Send;
}

/// One page of raw provider messages.
#[derive(Debug, Default)]
pub struct ProviderPage {
    pub messages: Vec<JsonValue>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub account_id: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
}

/// What the provider returns for an accepted send. `provider_id` is the
/// platform's provisional identifier; the authoritative one arrives later
/// via webhook.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub id: String,
    pub provider_id: String,
    pub tracking_id: String,
}

/// Wire-level provider API access. External collaborator.
pub trait ProviderClient: Send + Sync {
    fn fetch_messages(
        &self,
        account_id: &str,
        thread_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<ProviderPage>> + Send;

    fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> impl Future<Output = Result<SendReceipt>> + Send;

    fn fetch_attendee_names(
        &self,
        account_id: &str,
        channel_type: ChannelType,
    ) -> impl Future<Output = Result<HashMap<String, String>>> + Send;
}

/// Downstream real-time update fan-out. Fire-and-forget: failures are
/// logged by callers and never fail an ingestion transaction.
pub trait RealtimePublisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        payload: &JsonValue,
    ) -> impl Future<Output = Result<()>> + Send;
}

//! In-memory implementations of the ports, mirroring the Postgres
//! adapter's semantics (conflict-ignore inserts, role precedence,
//! derived-aggregate recompute) closely enough to exercise the pipeline
//! end to end.

use crate::ports::{
    CommsRepo, IdentifierBatch, ProviderClient, ProviderPage, RealtimePublisher,
    RecordIdentifierQuery, RecordStore, SendMessageRequest, SendReceipt, StoreOutcome, StorePlan,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use models_comms::channel::{Channel, ChannelType};
use models_comms::conversation::{infer_conversation_type, Conversation};
use models_comms::identifier::Identifier;
use models_comms::links::{RecordCommunicationLink, RecordCommunicationProfile, RecordRef};
use models_comms::message::{
    ConversationParticipant, Message, MessageUpdate, ParticipantRole,
};
use models_comms::participant::Participant;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    channels: Vec<Channel>,
    conversations: Vec<Conversation>,
    participants: Vec<Participant>,
    messages: Vec<Message>,
    memberships: Vec<ConversationParticipant>,
    links: Vec<RecordCommunicationLink>,
    profiles: HashMap<Uuid, RecordCommunicationProfile>,
}

#[derive(Default)]
pub struct InMemoryRepo {
    state: Mutex<State>,
}

impl InMemoryRepo {
    pub fn seed_channel(&self, channel_type: ChannelType, account_id: &str) -> Channel {
        let now = Utc::now();
        let channel = Channel {
            id: Uuid::now_v7(),
            account_id: account_id.to_string(),
            channel_type,
            name: None,
            is_sync_active: true,
            message_count: 0,
            last_message_at: None,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().channels.push(channel.clone());
        channel
    }

    pub fn seed_channel_with_metadata(
        &self,
        channel_type: ChannelType,
        account_id: &str,
        metadata: JsonValue,
    ) -> Channel {
        let channel = self.seed_channel(channel_type, account_id);
        let mut state = self.state.lock().unwrap();
        let stored = state
            .channels
            .iter_mut()
            .find(|c| c.id == channel.id)
            .unwrap();
        stored.metadata = metadata;
        stored.clone()
    }

    pub fn set_sync_active(&self, channel_id: Uuid, is_active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == channel_id) {
            channel.is_sync_active = is_active;
        }
    }

    pub fn seed_participant(&self, participant: Participant) {
        self.state.lock().unwrap().participants.push(participant);
    }

    pub fn participant_count(&self) -> usize {
        self.state.lock().unwrap().participants.len()
    }

    pub fn participant_by_id(&self, id: Uuid) -> Option<Participant> {
        self.state
            .lock()
            .unwrap()
            .participants
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().unwrap().conversations.clone()
    }

    pub fn memberships(&self) -> Vec<ConversationParticipant> {
        self.state.lock().unwrap().memberships.clone()
    }

    pub fn links(&self) -> Vec<RecordCommunicationLink> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn profile(&self, record_id: Uuid) -> Option<RecordCommunicationProfile> {
        self.state.lock().unwrap().profiles.get(&record_id).cloned()
    }

    fn matches_identifier(participant: &Participant, identifier: &Identifier) -> bool {
        match identifier {
            Identifier::Email(email) => !email.is_empty() && participant.email == *email,
            Identifier::Phone(phone) => !phone.is_empty() && participant.phone == *phone,
            Identifier::LinkedinUrn(urn) => {
                !urn.is_empty() && participant.linkedin_member_urn == *urn
            }
            Identifier::ProviderId(id) => participant.provider_id() == Some(id.as_str()),
        }
    }
}

impl CommsRepo for InMemoryRepo {
    async fn fetch_channel_by_account(
        &self,
        account_id: &str,
        channel_type: ChannelType,
    ) -> Result<Option<Channel>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.account_id == account_id && c.channel_type == channel_type)
            .cloned())
    }

    async fn fetch_channel(&self, channel_id: Uuid) -> Result<Option<Channel>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.id == channel_id)
            .cloned())
    }

    async fn fetch_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn get_or_create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation> {
        let mut state = self.state.lock().unwrap();
        if !conversation.external_thread_id.is_empty() {
            if let Some(existing) = state.conversations.iter().find(|c| {
                c.channel_id == conversation.channel_id
                    && c.external_thread_id == conversation.external_thread_id
            }) {
                return Ok(existing.clone());
            }
        }
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn fetch_participants_by_identifiers(
        &self,
        batch: &IdentifierBatch,
    ) -> Result<Vec<Participant>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .participants
            .iter()
            .filter(|p| {
                (!p.email.is_empty() && batch.emails.contains(&p.email))
                    || (!p.phone.is_empty() && batch.phones.contains(&p.phone))
                    || (!p.linkedin_member_urn.is_empty()
                        && batch.linkedin_urns.contains(&p.linkedin_member_urn))
                    || p.provider_id()
                        .is_some_and(|id| batch.provider_ids.contains(&id.to_string()))
            })
            .cloned()
            .collect())
    }

    async fn fetch_participant_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Participant>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .participants
            .iter()
            .find(|p| Self::matches_identifier(p, identifier))
            .cloned())
    }

    async fn insert_participants(&self, to_insert: &[Participant]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for participant in to_insert {
            // conflict-ignore on any overlapping identifier
            let conflicts = state.participants.iter().any(|existing| {
                participant
                    .identifiers()
                    .iter()
                    .any(|id| Self::matches_identifier(existing, id))
            });
            if !conflicts {
                state.participants.push(participant.clone());
            }
        }
        Ok(())
    }

    async fn update_participant_name(&self, participant_id: Uuid, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
        {
            participant.name = name.to_string();
        }
        Ok(())
    }

    async fn backfill_participant_identifiers(
        &self,
        participant_id: Uuid,
        email: &str,
        phone: &str,
        linkedin_urn: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
        {
            if participant.email.is_empty() {
                participant.email = email.to_string();
            }
            if participant.phone.is_empty() {
                participant.phone = phone.to_string();
            }
            if participant.linkedin_member_urn.is_empty() {
                participant.linkedin_member_urn = linkedin_urn.to_string();
            }
        }
        Ok(())
    }

    async fn persist_record_link(
        &self,
        participant_id: Uuid,
        record_id: Uuid,
        confidence: f64,
        method: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
        {
            participant.record_id = Some(record_id);
            participant.resolution_confidence = confidence;
            participant.resolution_method = method.to_string();
            participant.resolved_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn persist_secondary_record_link(
        &self,
        participant_id: Uuid,
        record_id: Uuid,
        confidence: f64,
        method: &str,
        pipeline: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(participant) = state
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
        {
            participant.secondary_record_id = Some(record_id);
            participant.secondary_confidence = confidence;
            participant.secondary_resolution_method = method.to_string();
            participant.secondary_pipeline = pipeline.to_string();
        }
        Ok(())
    }

    async fn find_message_by_tracking_id(
        &self,
        channel_id: Uuid,
        tracking_id: &str,
    ) -> Result<Option<Message>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.channel_id == channel_id && m.tracking_id() == Some(tracking_id))
            .cloned())
    }

    async fn find_message_by_external_id(
        &self,
        conversation_id: Uuid,
        external_message_id: &str,
    ) -> Result<Option<Message>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| {
                m.conversation_id == Some(conversation_id)
                    && m.external_message_id == external_message_id
            })
            .cloned())
    }

    async fn find_existing_external_ids(
        &self,
        conversation_id: Uuid,
        external_ids: &HashSet<String>,
    ) -> Result<HashMap<String, Uuid>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == Some(conversation_id)
                    && external_ids.contains(&m.external_message_id)
            })
            .map(|m| (m.external_message_id.clone(), m.id))
            .collect())
    }

    async fn execute_store_plan(&self, plan: StorePlan) -> Result<StoreOutcome> {
        let mut outcome = StoreOutcome::default();
        let mut state = self.state.lock().unwrap();

        for message in &plan.creates {
            let conflict = !message.external_message_id.is_empty()
                && state.messages.iter().any(|m| {
                    m.conversation_id == message.conversation_id
                        && m.external_message_id == message.external_message_id
                });
            if conflict {
                continue;
            }
            state.messages.push(message.clone());
            outcome.created += 1;
        }

        for membership in &plan.memberships {
            let existing = state.memberships.iter_mut().find(|m| {
                m.conversation_id == membership.conversation_id
                    && m.participant_id == membership.participant_id
            });
            let newly_created = match existing {
                Some(row) => {
                    row.role = ParticipantRole::most_specific(row.role, membership.role);
                    row.is_active = true;
                    row.left_at = None;
                    if membership.sent_message {
                        row.message_count += 1;
                    }
                    row.last_message_at = row.last_message_at.max(membership.message_at);
                    false
                }
                None => {
                    state.memberships.push(ConversationParticipant {
                        conversation_id: membership.conversation_id,
                        participant_id: membership.participant_id,
                        role: membership.role,
                        is_active: true,
                        message_count: if membership.sent_message { 1 } else { 0 },
                        last_message_at: membership.message_at,
                        last_read_at: None,
                        unread_count: 0,
                        provider_participant_id: membership.provider_participant_id.clone(),
                        left_at: None,
                    });
                    true
                }
            };

            if let Some(participant) = state
                .participants
                .iter_mut()
                .find(|p| p.id == membership.participant_id)
            {
                if membership.sent_message {
                    participant.total_messages += 1;
                }
                if newly_created {
                    participant.total_conversations += 1;
                }
                let seen = membership.message_at.unwrap_or_else(Utc::now);
                participant.last_seen = participant.last_seen.max(Some(seen));
            }
        }

        let messages_delta = plan.creates.len() as i64;
        let last_message_at = plan
            .creates
            .iter()
            .map(Message::effective_timestamp)
            .max();
        let mut by_record: HashMap<Uuid, Vec<&RecordCommunicationLink>> = HashMap::new();
        for link in &plan.links {
            by_record.entry(link.record_id).or_default().push(link);
        }
        for (record_id, record_links) in by_record {
            let count_before = state
                .links
                .iter()
                .filter(|l| l.record_id == record_id && l.conversation_id == plan.conversation_id)
                .count();

            let mut any_created = false;
            for link in record_links {
                let exists = state.links.iter().any(|l| {
                    l.record_id == link.record_id
                        && l.conversation_id == link.conversation_id
                        && l.participant_id == link.participant_id
                });
                if !exists {
                    state.links.push(link.clone());
                    any_created = true;
                }
            }

            let new_conversation = count_before == 0 && any_created;
            if new_conversation || messages_delta > 0 {
                let profile = state
                    .profiles
                    .entry(record_id)
                    .or_insert(RecordCommunicationProfile {
                        record_id,
                        total_conversations: 0,
                        total_messages: 0,
                        last_message_at: None,
                        updated_at: Utc::now(),
                    });
                if new_conversation {
                    profile.total_conversations += 1;
                }
                profile.total_messages += messages_delta;
                profile.last_message_at = profile.last_message_at.max(last_message_at);
                profile.updated_at = Utc::now();
            }
        }

        for update in &plan.updates {
            match apply_update(&mut state, update) {
                Ok(()) => outcome.updated += 1,
                Err(e) => outcome.update_errors.push((update.id, format!("{e}"))),
            }
        }

        Ok(outcome)
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != message_id);
        Ok(state.messages.len() < before)
    }

    async fn fetch_conversation_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == Some(conversation_id))
            .cloned()
            .collect();
        messages.sort_by_key(Message::effective_timestamp);
        Ok(messages)
    }

    async fn apply_message_update(&self, update: &MessageUpdate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        apply_update(&mut state, update)
    }

    async fn recompute_aggregates(&self, channel_id: Uuid, conversation_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let conversation_messages: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == Some(conversation_id))
            .collect();
        let participant_count = state
            .memberships
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.is_active)
            .count() as i64;

        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conversation.message_count = conversation_messages.len() as i64;
            conversation.last_message_at = conversation_messages
                .iter()
                .map(|m| m.effective_timestamp())
                .max();
            conversation.participant_count = participant_count;
            conversation.conversation_type =
                infer_conversation_type(participant_count, &conversation.metadata);
            conversation.updated_at = Utc::now();
        }

        let channel_messages: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .collect();
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == channel_id) {
            channel.message_count = channel_messages.len() as i64;
            channel.last_message_at = channel_messages
                .iter()
                .map(|m| m.effective_timestamp())
                .max();
            channel.updated_at = Utc::now();
        }

        Ok(())
    }
}

fn apply_update(state: &mut State, update: &MessageUpdate) -> Result<()> {
    let message = state
        .messages
        .iter_mut()
        .find(|m| m.id == update.id)
        .ok_or_else(|| anyhow!("no message {}", update.id))?;

    if let Some(external_id) = &update.external_message_id {
        message.external_message_id = external_id.clone();
    }
    if let Some(status) = update.status {
        message.status = status;
    }
    if message.sender_participant_id.is_none() {
        message.sender_participant_id = update.sender_participant_id;
    }
    if message.contact_record_id.is_none() {
        message.contact_record_id = update.contact_record_id;
    }
    if let Some(sent_at) = update.sent_at {
        message.sent_at = Some(sent_at);
    }
    if let Some(metadata) = &update.metadata {
        message.metadata = metadata.clone();
    }
    message.updated_at = Utc::now();
    Ok(())
}

// --- record store doubles ---

#[derive(Default)]
pub struct StaticRecordStore {
    email_records: HashMap<String, RecordRef>,
    phone_records: HashMap<String, RecordRef>,
    domain_records: HashMap<String, RecordRef>,
}

fn record(title: &str) -> RecordRef {
    RecordRef {
        id: Uuid::now_v7(),
        pipeline: "contacts".to_string(),
        title: title.to_string(),
    }
}

impl StaticRecordStore {
    pub fn empty() -> StaticRecordStore {
        StaticRecordStore::default()
    }

    pub fn with_phone_record(phone: &str) -> StaticRecordStore {
        let mut store = StaticRecordStore::default();
        store
            .phone_records
            .insert(phone.to_string(), record("Phone Contact"));
        store
    }

    pub fn with_email_record(email: &str) -> StaticRecordStore {
        let mut store = StaticRecordStore::default();
        store
            .email_records
            .insert(email.to_string(), record("Email Contact"));
        store
    }

    pub fn with_email_and_domain_records(email: &str, domain: &str) -> StaticRecordStore {
        let mut store = StaticRecordStore::with_email_record(email);
        let mut company = record("Company");
        company.pipeline = "companies".to_string();
        store.domain_records.insert(domain.to_string(), company);
        store
    }

    pub fn phone_record_id(&self, phone: &str) -> Option<Uuid> {
        self.phone_records.get(phone).map(|r| r.id)
    }

    pub fn email_record_id(&self, email: &str) -> Option<Uuid> {
        self.email_records.get(email).map(|r| r.id)
    }
}

impl RecordStore for StaticRecordStore {
    async fn find_records_by_identifiers(
        &self,
        query: &RecordIdentifierQuery,
    ) -> Result<Vec<RecordRef>> {
        let mut matches = Vec::new();
        for email in &query.emails {
            if let Some(record) = self.email_records.get(email) {
                matches.push(record.clone());
            }
        }
        for phone in &query.phones {
            if let Some(record) = self.phone_records.get(phone) {
                matches.push(record.clone());
            }
        }
        Ok(matches)
    }

    async fn find_company_records_by_domain(&self, domain: &str) -> Result<Vec<RecordRef>> {
        Ok(self
            .domain_records
            .get(domain)
            .cloned()
            .into_iter()
            .collect())
    }
}

pub struct FailingRecordStore;

impl RecordStore for FailingRecordStore {
    async fn find_records_by_identifiers(
        &self,
        _query: &RecordIdentifierQuery,
    ) -> Result<Vec<RecordRef>> {
        Err(anyhow!("record store unavailable"))
    }

    async fn find_company_records_by_domain(&self, _domain: &str) -> Result<Vec<RecordRef>> {
        Err(anyhow!("record store unavailable"))
    }
}

// --- provider / publisher doubles ---

#[derive(Default)]
pub struct ScriptedProvider {
    pub messages: Vec<JsonValue>,
    pub attendee_names: HashMap<String, String>,
    pub receipt: Option<SendReceipt>,
}

impl ProviderClient for ScriptedProvider {
    async fn fetch_messages(
        &self,
        _account_id: &str,
        _thread_id: Option<&str>,
        limit: usize,
        _cursor: Option<&str>,
    ) -> Result<ProviderPage> {
        Ok(ProviderPage {
            messages: self.messages.iter().take(limit).cloned().collect(),
            next_cursor: None,
        })
    }

    async fn send_message(&self, _request: &SendMessageRequest) -> Result<SendReceipt> {
        self.receipt
            .clone()
            .ok_or_else(|| anyhow!("no scripted receipt"))
    }

    async fn fetch_attendee_names(
        &self,
        _account_id: &str,
        _channel_type: ChannelType,
    ) -> Result<HashMap<String, String>> {
        Ok(self.attendee_names.clone())
    }
}

#[derive(Default)]
pub struct NullPublisher;

impl RealtimePublisher for NullPublisher {
    async fn publish(&self, _topic: &str, _payload: &JsonValue) -> Result<()> {
        Ok(())
    }
}

//! The outbound send path. The provider accepts the send and returns a
//! provisional id plus a client tracking id; we persist a provisional
//! message immediately so the conversation shows the send before any
//! webhook confirmation, and so the confirmation dedups against it by
//! tracking id.

use crate::ingest::dedup::PROVISIONAL_EXTERNAL_ID;
use crate::linking::comm_links::plan_record_links;
use crate::linking::record_linker::LinkPolicy;
use crate::linking::storage_gate::should_store;
use crate::ports::{
    CommsRepo, MembershipUpsert, ProviderClient, RecordStore, SendMessageRequest, StorePlan,
};
use anyhow::anyhow;
use chrono::Utc;
use models_comms::channel::ChannelType;
use models_comms::identifier::Identifier;
use models_comms::ingest::{IngestOutcome, IngestReason};
use models_comms::message::{
    metadata_keys, Message, MessageDirection, MessageStatus, ParticipantRole,
};
use models_comms::participant::Participant;
use models_comms::pubsub::{FailureReason, ProcessingError};
use serde_json::json;
use uuid::Uuid;

/// Sends a message through the provider and stores the provisional row.
#[tracing::instrument(skip(repo, records, provider, policy, request))]
pub async fn send_message<R, S, P>(
    repo: &R,
    records: &S,
    provider: &P,
    policy: &LinkPolicy,
    channel_type: ChannelType,
    request: SendMessageRequest,
) -> Result<IngestOutcome, ProcessingError>
where
    R: CommsRepo,
    S: RecordStore,
    P: ProviderClient,
{
    let channel = repo
        .fetch_channel_by_account(&request.account_id, channel_type)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?
        .ok_or_else(|| {
            ProcessingError::non_retryable(
                FailureReason::ChannelNotFound,
                anyhow!("No {channel_type} channel for account {}", request.account_id),
            )
        })?;

    let receipt = provider
        .send_message(&request)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::ProviderApiFailed, e))?;

    // resolve the recipients; the send is only persisted when at least one
    // of them is CRM-relevant
    let mut recipients: Vec<(Participant, ParticipantRole)> = Vec::new();
    for to in &request.to {
        let Some(identifier) = Identifier::classify(to) else {
            continue;
        };
        let participant = match repo
            .fetch_participant_by_identifier(&identifier)
            .await
            .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?
        {
            Some(existing) => existing,
            None => {
                let created = Participant::from_identifier(&identifier, "");
                repo.insert_participants(std::slice::from_ref(&created))
                    .await
                    .map_err(|e| {
                        ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e)
                    })?;
                created
            }
        };
        recipients.push((participant, ParticipantRole::Recipient));
    }

    let mut participants: Vec<Participant> =
        recipients.iter().map(|(p, _)| p.clone()).collect();
    let store_decision = should_store(repo, records, policy, &mut participants)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::RecordStoreLookupFailed, e))?;
    if !store_decision {
        return Ok(IngestOutcome::skipped(IngestReason::NoRecordMatch));
    }

    let thread_id = request
        .thread_id
        .clone()
        .unwrap_or_else(|| receipt.provider_id.clone());
    let mut conversation_seed = crate::ingest::webhook::conversation_from_message(
        &channel,
        &provisional_normalized(channel_type, &request, &thread_id),
    );
    conversation_seed.subject = request.subject.clone();
    let conversation = repo
        .get_or_create_conversation(conversation_seed)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    let now = Utc::now();
    let message = Message {
        id: Uuid::now_v7(),
        channel_id: channel.id,
        conversation_id: Some(conversation.id),
        external_message_id: receipt.provider_id.clone(),
        direction: MessageDirection::Outbound,
        content: request.body.clone(),
        subject: request.subject.clone(),
        contact_email: String::new(),
        contact_phone: String::new(),
        sender_participant_id: None,
        contact_record_id: participants.iter().find_map(|p| p.record_id),
        status: MessageStatus::Sent,
        sent_at: Some(now),
        received_at: None,
        created_at: now,
        updated_at: now,
        metadata: {
            let mut metadata = serde_json::Map::new();
            metadata.insert(
                metadata_keys::TRACKING_ID.to_string(),
                json!(receipt.tracking_id),
            );
            metadata.insert(PROVISIONAL_EXTERNAL_ID.to_string(), json!(true));
            metadata.insert("send_receipt_id".to_string(), json!(receipt.id));
            serde_json::Value::Object(metadata)
        },
    };
    let message_id = message.id;

    let memberships: Vec<MembershipUpsert> = participants
        .iter()
        .map(|participant| MembershipUpsert {
            conversation_id: conversation.id,
            participant_id: participant.id,
            role: ParticipantRole::Recipient,
            provider_participant_id: String::new(),
            sent_message: false,
            message_at: Some(now),
        })
        .collect();

    let plan = StorePlan {
        channel_id: channel.id,
        conversation_id: conversation.id,
        creates: vec![message],
        updates: Vec::new(),
        memberships,
        links: plan_record_links(conversation.id, &participants, false),
    };

    repo.execute_store_plan(plan)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;
    repo.recompute_aggregates(channel.id, conversation.id)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    Ok(IngestOutcome::stored(
        message_id,
        conversation.id,
        IngestReason::MessageCreated,
    ))
}

/// A minimal normalized view of the send, used only to seed the
/// conversation row.
fn provisional_normalized(
    channel_type: ChannelType,
    request: &SendMessageRequest,
    thread_id: &str,
) -> models_comms::normalized::NormalizedMessage {
    let mut normalized = models_comms::normalized::NormalizedMessage::new(channel_type);
    normalized.external_thread_id = thread_id.to_string();
    normalized.subject = request.subject.clone();
    normalized
}

//! The synchronous webhook entry point. One raw payload in, one definitive
//! outcome back within the request cycle: stored (created or updated),
//! skipped, or failed normalization.

use crate::ingest::dedup::{plan_message_action, MessageAction};
use crate::linking::comm_links::plan_record_links;
use crate::linking::record_linker::LinkPolicy;
use crate::linking::storage_gate::should_store;
use crate::normalize;
use crate::ports::{CommsRepo, MembershipUpsert, RealtimePublisher, RecordStore, StorePlan};
use crate::resolution::resolver::{identify_sender_participant, resolve_recipients};
use anyhow::anyhow;
use models_comms::channel::{Channel, ChannelType};
use models_comms::conversation::{
    infer_conversation_type, Conversation, ConversationPriority, ConversationStatus,
};
use models_comms::ingest::{IngestOutcome, IngestReason};
use models_comms::message::{metadata_keys, ParticipantRole};
use models_comms::normalized::{AccountContext, NormalizedMessage};
use models_comms::participant::Participant;
use models_comms::pubsub::{FailureReason, ProcessingError};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use uuid::Uuid;

/// Processes one webhook payload end to end: normalize, resolve
/// participants, gate on record relevance, store with dedup, link, and
/// publish. The full store-plus-link sequence runs as one transaction in
/// the repo adapter.
#[tracing::instrument(skip(repo, records, publisher, policy, raw_payload))]
pub async fn ingest_webhook_event<R, S, B>(
    repo: &R,
    records: &S,
    publisher: &B,
    policy: &LinkPolicy,
    channel_type: ChannelType,
    account_id: &str,
    raw_payload: &JsonValue,
) -> Result<IngestOutcome, ProcessingError>
where
    R: CommsRepo,
    S: RecordStore,
    B: RealtimePublisher,
{
    let channel = repo
        .fetch_channel_by_account(account_id, channel_type)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?
        .ok_or_else(|| {
            ProcessingError::non_retryable(
                FailureReason::ChannelNotFound,
                anyhow!("No {channel_type} channel for account {account_id}"),
            )
        })?;

    if !channel.is_sync_active {
        return Ok(IngestOutcome::skipped(IngestReason::SyncDisabled));
    }

    let account = account_context(&channel);

    let mut normalized = match normalize::normalize(raw_payload, channel_type, &account) {
        Ok(normalized) => normalized,
        Err(e) => {
            tracing::warn!(error = %e, "Normalization failed; payload skipped");
            return Ok(IngestOutcome::skipped(IngestReason::NormalizationFailed));
        }
    };
    normalized
        .metadata
        .insert(metadata_keys::WEBHOOK_PROCESSED.to_string(), json!(true));

    let sender = identify_sender_participant(repo, &normalized)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;
    let recipients = resolve_recipients(repo, &normalized)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    // gate on record relevance before persisting anything conversation-level
    let mut participants: Vec<Participant> = sender
        .iter()
        .cloned()
        .chain(recipients.iter().map(|(p, _)| p.clone()))
        .collect();
    let store_decision = should_store(repo, records, policy, &mut participants)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::RecordStoreLookupFailed, e))?;
    if !store_decision {
        return Ok(IngestOutcome::skipped(IngestReason::NoRecordMatch));
    }

    let conversation = repo
        .get_or_create_conversation(conversation_from_message(&channel, &normalized))
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    let sender = sender.map(|p| refreshed(&participants, p));
    let action = plan_message_action(
        repo,
        &channel,
        conversation.id,
        &normalized,
        sender.as_ref(),
    )
    .await
    .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    let reason = match &action {
        MessageAction::Create(_) => IngestReason::MessageCreated,
        MessageAction::Update(_) => IngestReason::MessageUpdated,
    };

    let mut memberships = plan_memberships(
        conversation.id,
        &normalized,
        sender.as_ref(),
        &recipients
            .into_iter()
            .map(|(p, role)| (refreshed(&participants, p), role))
            .collect::<Vec<_>>(),
    );
    if matches!(action, MessageAction::Update(_)) {
        // a second delivery of an existing message is not a new message
        // event; memberships are ensured but counters stay put
        for membership in &mut memberships {
            membership.sent_message = false;
        }
    }

    let links = plan_record_links(conversation.id, &participants, false);

    let mut plan = StorePlan {
        channel_id: channel.id,
        conversation_id: conversation.id,
        memberships,
        links,
        ..Default::default()
    };
    let message_id = match action {
        MessageAction::Create(message) => {
            let id = message.id;
            plan.creates.push(message);
            id
        }
        MessageAction::Update(update) => {
            let id = update.id;
            plan.updates.push(update);
            id
        }
    };

    let outcome = repo
        .execute_store_plan(plan)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;
    if let Some((failed_id, error)) = outcome.update_errors.first() {
        return Err(ProcessingError::retryable(
            FailureReason::DatabaseQueryFailed,
            anyhow!("Failed to update message {failed_id}: {error}"),
        ));
    }

    repo.recompute_aggregates(channel.id, conversation.id)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    publish_update(publisher, conversation.id, Some(message_id)).await;

    Ok(IngestOutcome::stored(message_id, conversation.id, reason))
}

/// The connected account's own identity, read from the channel row.
pub(crate) fn account_context(channel: &Channel) -> AccountContext {
    let field = |key: &str| {
        channel
            .metadata
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    AccountContext {
        account_id: channel.account_id.clone(),
        account_email: field("account_email"),
        account_phone: field("account_phone"),
        provider_account_id: field("provider_account_id"),
    }
}

/// A fresh conversation row for a message's thread key. Group/broadcast
/// flags ride along so the type inference sees them.
pub(crate) fn conversation_from_message(
    channel: &Channel,
    normalized: &NormalizedMessage,
) -> Conversation {
    let mut metadata = serde_json::Map::new();
    for flag in ["is_group", "is_broadcast", "is_channel"] {
        if let Some(value) = normalized.metadata.get(flag) {
            metadata.insert(flag.to_string(), value.clone());
        }
    }
    let metadata = JsonValue::Object(metadata);

    let now = chrono::Utc::now();
    Conversation {
        id: Uuid::now_v7(),
        channel_id: channel.id,
        external_thread_id: normalized.external_thread_id.clone(),
        subject: normalized.subject.clone(),
        status: ConversationStatus::Active,
        priority: ConversationPriority::Normal,
        conversation_type: infer_conversation_type(2, &metadata),
        message_count: 0,
        participant_count: 0,
        last_message_at: None,
        primary_record_id: None,
        metadata,
        created_at: now,
        updated_at: now,
    }
}

/// Membership rows for one message: the sender plus each recipient, deduped
/// to the most specific role when one participant appears in several
/// positions (a self-addressed message stays `sender`).
pub(crate) fn plan_memberships(
    conversation_id: Uuid,
    normalized: &NormalizedMessage,
    sender: Option<&Participant>,
    recipients: &[(Participant, ParticipantRole)],
) -> Vec<MembershipUpsert> {
    let mut by_participant: HashMap<Uuid, MembershipUpsert> = HashMap::new();

    if let Some(sender) = sender {
        by_participant.insert(
            sender.id,
            MembershipUpsert {
                conversation_id,
                participant_id: sender.id,
                role: ParticipantRole::Sender,
                provider_participant_id: normalized.sender.provider_id.clone(),
                sent_message: true,
                message_at: normalized.sent_at,
            },
        );
    }

    for (participant, role) in recipients {
        by_participant
            .entry(participant.id)
            .and_modify(|existing| {
                existing.role = ParticipantRole::most_specific(existing.role, *role);
            })
            .or_insert(MembershipUpsert {
                conversation_id,
                participant_id: participant.id,
                role: *role,
                provider_participant_id: String::new(),
                sent_message: false,
                message_at: normalized.sent_at,
            });
    }

    by_participant.into_values().collect()
}

/// Swaps a pre-gate participant clone for its post-gate state, which may
/// carry a record link found during the gate.
fn refreshed(participants: &[Participant], participant: Participant) -> Participant {
    participants
        .iter()
        .find(|p| p.id == participant.id)
        .cloned()
        .unwrap_or(participant)
}

/// Best-effort real-time fan-out. Failures are logged and swallowed; they
/// never fail the ingestion transaction.
pub(crate) async fn publish_update<B: RealtimePublisher>(
    publisher: &B,
    conversation_id: Uuid,
    message_id: Option<Uuid>,
) {
    let topic = format!("conversations/{conversation_id}");
    let payload = json!({
        "conversation_id": conversation_id,
        "message_id": message_id,
    });
    if let Err(e) = publisher.publish(&topic, &payload).await {
        tracing::error!(error = ?e, %conversation_id, "Failed to publish realtime update");
    }
}

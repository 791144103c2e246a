//! The asynchronous batch sync path. Processes many raw messages for one
//! conversation per invocation: one identifier-extraction pass, one cache
//! build, one existence check, bulk-inserted creates, individually isolated
//! updates, and exactly one aggregate recompute at the end.

use crate::ingest::dedup::{build_message, plan_update};
use crate::linking::comm_links::plan_record_links;
use crate::linking::record_linker::LinkPolicy;
use crate::linking::storage_gate::should_store;
use crate::normalize;
use crate::ports::{
    CommsRepo, MembershipUpsert, ProviderClient, RealtimePublisher, RecordStore, StorePlan,
};
use crate::resolution::cache::{build_cache, ParticipantCache};
use crate::resolution::identifiers::extract_identifiers;
use anyhow::anyhow;
use chrono::{Duration, Utc};
use models_comms::channel::Channel;
use models_comms::conversation::Conversation;
use models_comms::identifier::Identifier;
use models_comms::ingest::{SyncOptions, SyncSummary};
use models_comms::message::ParticipantRole;
use models_comms::normalized::NormalizedMessage;
use models_comms::participant::Participant;
use models_comms::pubsub::{FailureReason, ProcessingError};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Syncs one conversation from the provider. Per-item failures are
/// recorded in the summary and never abort the batch; only setup failures
/// (unknown conversation, database loss) propagate.
#[tracing::instrument(skip(repo, records, provider, publisher, policy), fields(%conversation_id))]
pub async fn sync_conversation<R, S, P, B>(
    repo: &R,
    records: &S,
    provider: &P,
    publisher: &B,
    policy: &LinkPolicy,
    conversation_id: Uuid,
    options: SyncOptions,
) -> Result<SyncSummary, ProcessingError>
where
    R: CommsRepo,
    S: RecordStore,
    P: ProviderClient,
    B: RealtimePublisher,
{
    let conversation = repo
        .fetch_conversation(conversation_id)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?
        .ok_or_else(|| {
            ProcessingError::non_retryable(
                FailureReason::ConversationNotFound,
                anyhow!("No conversation {conversation_id}"),
            )
        })?;

    let channel = repo
        .fetch_channel(conversation.channel_id)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?
        .ok_or_else(|| {
            ProcessingError::non_retryable(
                FailureReason::ChannelNotFound,
                anyhow!("No channel {} for conversation", conversation.channel_id),
            )
        })?;

    let mut summary = SyncSummary::default();
    if !channel.is_sync_active {
        return Ok(summary);
    }

    let page = provider
        .fetch_messages(
            &channel.account_id,
            Some(&conversation.external_thread_id),
            options.max_messages,
            None,
        )
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::ProviderApiFailed, e))?;

    let normalized = normalize_batch(&channel, &page.messages, &options, &mut summary);
    summary.messages_synced = normalized.len();
    if normalized.is_empty() {
        return Ok(summary);
    }

    // one extraction pass + one cache build for the whole batch
    let mut maps = extract_identifiers(&normalized);
    match provider
        .fetch_attendee_names(&channel.account_id, channel.channel_type)
        .await
    {
        Ok(directory) => maps.apply_attendee_names(&directory),
        Err(e) => {
            tracing::warn!(error = ?e, "Attendee directory unavailable; using message names");
        }
    }
    let cache = build_cache(repo, &maps)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    let mut participants = batch_participants(&cache, &normalized);
    let store_decision = should_store(repo, records, policy, &mut participants)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::RecordStoreLookupFailed, e))?;
    if !store_decision {
        tracing::info!("No participant in batch resolved to a record; nothing stored");
        return Ok(summary);
    }
    let by_id: HashMap<Uuid, &Participant> =
        participants.iter().map(|p| (p.id, p)).collect();

    // one existence check, then partition into create/update lists
    let external_ids: HashSet<String> = normalized
        .iter()
        .map(|m| m.external_message_id.clone())
        .filter(|id| !id.is_empty())
        .collect();
    let existing = repo
        .find_existing_external_ids(conversation.id, &external_ids)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    let mut plan = StorePlan {
        channel_id: channel.id,
        conversation_id: conversation.id,
        ..Default::default()
    };

    for message in &normalized {
        let sender = cache
            .get_for_message(message)
            .and_then(|p| by_id.get(&p.id))
            .copied();

        match find_existing(repo, &channel, &conversation, message, &existing).await {
            Ok(Some(existing_message)) => {
                plan.updates
                    .push(plan_update(&existing_message, message, sender));
            }
            Ok(None) => {
                plan.creates
                    .push(build_message(&channel, conversation.id, message, sender));
                plan.memberships
                    .extend(message_memberships(&cache, conversation.id, message, &by_id));
            }
            Err(e) => {
                summary.record_error(format!(
                    "existence check failed for '{}': {e:#}",
                    message.external_message_id
                ));
            }
        }
    }

    plan.links = plan_record_links(conversation.id, &participants, true);

    let outcome = repo
        .execute_store_plan(plan)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    summary.messages_created = outcome.created;
    summary.messages_updated = outcome.updated;
    for (message_id, error) in outcome.update_errors {
        summary.record_error(format!("update failed for message {message_id}: {error}"));
    }

    // aggregates recomputed exactly once per batch
    repo.recompute_aggregates(channel.id, conversation.id)
        .await
        .map_err(|e| ProcessingError::retryable(FailureReason::DatabaseQueryFailed, e))?;

    crate::ingest::webhook::publish_update(publisher, conversation.id, None).await;

    Ok(summary)
}

/// Normalizes the raw batch. Malformed payloads become synthetic FAILED
/// messages (stored so the failure is visible in the thread) and count as
/// errors in the summary; they never abort the batch.
fn normalize_batch(
    channel: &Channel,
    raw_messages: &[serde_json::Value],
    options: &SyncOptions,
    summary: &mut SyncSummary,
) -> Vec<NormalizedMessage> {
    let account = crate::ingest::webhook::account_context(channel);
    let cutoff = options
        .days_back
        .map(|days| Utc::now() - Duration::days(days as i64));

    let mut normalized = Vec::with_capacity(raw_messages.len());
    for raw in raw_messages {
        match normalize::normalize(raw, channel.channel_type, &account) {
            Ok(message) => {
                if let (Some(cutoff), Some(sent_at)) = (cutoff, message.sent_at) {
                    if sent_at < cutoff {
                        continue;
                    }
                }
                normalized.push(message);
            }
            Err(e) => {
                summary.record_error(format!("normalization failed: {e}"));
                normalized.push(NormalizedMessage::failure(channel.channel_type, raw, &e));
            }
        }
    }
    normalized
}

/// The distinct participants involved in a batch, in post-gate state.
fn batch_participants(
    cache: &ParticipantCache,
    normalized: &[NormalizedMessage],
) -> Vec<Participant> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut participants = Vec::new();

    for message in normalized {
        if let Some(participant) = cache.get_for_message(message) {
            if seen.insert(participant.id) {
                participants.push(participant.clone());
            }
        }
        for recipient in message
            .to
            .iter()
            .chain(message.cc.iter())
            .chain(message.bcc.iter())
        {
            if let Some(identifier) = Identifier::email(&recipient.email) {
                if let Some(participant) = cache.get(&identifier) {
                    if seen.insert(participant.id) {
                        participants.push(participant.clone());
                    }
                }
            }
        }
    }

    participants
}

/// Dedup lookup for one batch item: tracking id first, then the
/// existence-map hit from the up-front query.
async fn find_existing<R: CommsRepo>(
    repo: &R,
    channel: &Channel,
    conversation: &Conversation,
    message: &NormalizedMessage,
    existing: &HashMap<String, Uuid>,
) -> anyhow::Result<Option<models_comms::message::Message>> {
    if let Some(tracking_id) = message.tracking_id() {
        if let Some(found) = repo
            .find_message_by_tracking_id(channel.id, tracking_id)
            .await?
        {
            return Ok(Some(found));
        }
    }

    if existing.contains_key(&message.external_message_id) {
        return repo
            .find_message_by_external_id(conversation.id, &message.external_message_id)
            .await;
    }

    Ok(None)
}

fn message_memberships(
    cache: &ParticipantCache,
    conversation_id: Uuid,
    message: &NormalizedMessage,
    by_id: &HashMap<Uuid, &Participant>,
) -> Vec<MembershipUpsert> {
    let sender = cache
        .get_for_message(message)
        .and_then(|p| by_id.get(&p.id))
        .copied();

    let mut recipients: Vec<(Participant, ParticipantRole)> = Vec::new();
    let groups = [
        (&message.to, ParticipantRole::Recipient),
        (&message.cc, ParticipantRole::Cc),
        (&message.bcc, ParticipantRole::Bcc),
    ];
    for (list, role) in groups {
        for recipient in list.iter() {
            if let Some(identifier) = Identifier::email(&recipient.email) {
                if let Some(participant) = cache.get(&identifier) {
                    recipients.push((participant.clone(), role));
                }
            }
        }
    }

    crate::ingest::webhook::plan_memberships(conversation_id, message, sender, &recipients)
}

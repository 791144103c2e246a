//! Cleanup utility for probable duplicates the hot-path dedup cannot
//! catch: the same logical message stored twice in one conversation under
//! two id formats (a bracketed Message-ID from one delivery path and an
//! opaque platform id from another). The platform-id row is kept and the
//! bracketed row's data merged in.

use crate::ingest::dedup::{is_bracketed_message_id, merge_metadata};
use crate::ports::CommsRepo;
use anyhow::Result;
use models_comms::message::{Message, MessageUpdate};
use std::collections::HashMap;
use uuid::Uuid;

/// Scans one conversation for content+direction duplicates with differing
/// id formats and reconciles each pair. Returns the number of rows merged
/// away.
#[tracing::instrument(skip(repo), fields(%conversation_id))]
pub async fn reconcile_duplicate_messages<R: CommsRepo>(
    repo: &R,
    conversation_id: Uuid,
) -> Result<usize> {
    let messages = repo.fetch_conversation_messages(conversation_id).await?;

    // same conversation + same content + same direction marks a probable
    // duplicate pair
    let mut groups: HashMap<(String, String), Vec<&Message>> = HashMap::new();
    for message in &messages {
        if message.content.is_empty() {
            continue;
        }
        groups
            .entry((message.content.clone(), message.direction.to_string()))
            .or_default()
            .push(message);
    }

    let mut merged = 0usize;
    let mut channel_id = None;

    for group in groups.values() {
        if group.len() < 2 {
            continue;
        }

        let keeper = group
            .iter()
            .find(|m| !is_bracketed_message_id(&m.external_message_id));
        let duplicate = group
            .iter()
            .find(|m| is_bracketed_message_id(&m.external_message_id));

        let (Some(keeper), Some(duplicate)) = (keeper, duplicate) else {
            continue;
        };

        tracing::info!(
            keeper_id = %keeper.id,
            duplicate_id = %duplicate.id,
            "Reconciling duplicate message pair"
        );

        let incoming = duplicate
            .metadata
            .as_object()
            .cloned()
            .unwrap_or_default();
        let update = MessageUpdate {
            id: keeper.id,
            metadata: Some(merge_metadata(&keeper.metadata, &incoming)),
            ..Default::default()
        };
        repo.apply_message_update(&update).await?;
        repo.delete_message(duplicate.id).await?;

        channel_id = Some(keeper.channel_id);
        merged += 1;
    }

    if let Some(channel_id) = channel_id {
        repo.recompute_aggregates(channel_id, conversation_id).await?;
    }

    Ok(merged)
}

//! The Postgres implementation of the CommsRepo port, delegating to
//! comms_db_client. The store plan runs creates, memberships, links and
//! counter updates in one transaction; updates are applied individually
//! afterwards so one malformed update cannot abort a batch.

use crate::ports::{CommsRepo, IdentifierBatch, StoreOutcome, StorePlan};
use anyhow::{Context, Result};
use chrono::Utc;
use comms_db_client::conversation_participants::upsert::{
    upsert_membership, UpsertMembershipOptions,
};
use comms_db_client::{channels, conversations, links, messages, participants, profiles};
use models_comms::channel::{Channel, ChannelType};
use models_comms::conversation::Conversation;
use models_comms::identifier::Identifier;
use models_comms::links::RecordCommunicationLink;
use models_comms::message::{Message, MessageUpdate};
use models_comms::participant::Participant;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgCommsRepo {
    pool: PgPool,
}

impl PgCommsRepo {
    pub fn new(pool: PgPool) -> PgCommsRepo {
        PgCommsRepo { pool }
    }
}

impl CommsRepo for PgCommsRepo {
    async fn fetch_channel_by_account(
        &self,
        account_id: &str,
        channel_type: ChannelType,
    ) -> Result<Option<Channel>> {
        channels::get::fetch_channel_by_account(&self.pool, account_id, channel_type).await
    }

    async fn fetch_channel(&self, channel_id: Uuid) -> Result<Option<Channel>> {
        channels::get::fetch_channel_by_id(&self.pool, channel_id).await
    }

    async fn fetch_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        conversations::get::fetch_by_id(&self.pool, conversation_id).await
    }

    async fn get_or_create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation> {
        conversations::insert::get_or_create(&self.pool, conversation).await
    }

    async fn fetch_participants_by_identifiers(
        &self,
        batch: &IdentifierBatch,
    ) -> Result<Vec<Participant>> {
        participants::get::fetch_by_identifiers(
            &self.pool,
            &batch.emails,
            &batch.phones,
            &batch.linkedin_urns,
            &batch.provider_ids,
        )
        .await
    }

    async fn fetch_participant_by_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<Participant>> {
        participants::get::fetch_by_identifier(&self.pool, identifier).await
    }

    async fn insert_participants(&self, to_insert: &[Participant]) -> Result<()> {
        participants::insert::insert_participants(&self.pool, to_insert).await
    }

    async fn update_participant_name(&self, participant_id: Uuid, name: &str) -> Result<()> {
        participants::update::update_name(&self.pool, participant_id, name).await
    }

    async fn backfill_participant_identifiers(
        &self,
        participant_id: Uuid,
        email: &str,
        phone: &str,
        linkedin_urn: &str,
    ) -> Result<()> {
        participants::update::backfill_identifiers(
            &self.pool,
            participant_id,
            email,
            phone,
            linkedin_urn,
        )
        .await
    }

    async fn persist_record_link(
        &self,
        participant_id: Uuid,
        record_id: Uuid,
        confidence: f64,
        method: &str,
    ) -> Result<()> {
        participants::update::update_record_link(
            &self.pool,
            participant_id,
            record_id,
            confidence,
            method,
        )
        .await
    }

    async fn persist_secondary_record_link(
        &self,
        participant_id: Uuid,
        record_id: Uuid,
        confidence: f64,
        method: &str,
        pipeline: &str,
    ) -> Result<()> {
        participants::update::update_secondary_record_link(
            &self.pool,
            participant_id,
            record_id,
            confidence,
            method,
            pipeline,
        )
        .await
    }

    async fn find_message_by_tracking_id(
        &self,
        channel_id: Uuid,
        tracking_id: &str,
    ) -> Result<Option<Message>> {
        messages::get::fetch_by_tracking_id(&self.pool, channel_id, tracking_id).await
    }

    async fn find_message_by_external_id(
        &self,
        conversation_id: Uuid,
        external_message_id: &str,
    ) -> Result<Option<Message>> {
        messages::get::fetch_by_external_id(&self.pool, conversation_id, external_message_id)
            .await
    }

    async fn find_existing_external_ids(
        &self,
        conversation_id: Uuid,
        external_ids: &HashSet<String>,
    ) -> Result<HashMap<String, Uuid>> {
        messages::get::find_existing_external_ids(&self.pool, conversation_id, external_ids).await
    }

    #[tracing::instrument(skip_all, fields(
        creates = plan.creates.len(), updates = plan.updates.len()
    ))]
    async fn execute_store_plan(&self, plan: StorePlan) -> Result<StoreOutcome> {
        let mut outcome = StoreOutcome::default();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin store transaction")?;

        outcome.created = messages::insert::bulk_insert_messages(&mut tx, &plan.creates)
            .await
            .context("Failed to insert messages")?;

        for membership in &plan.memberships {
            let created = upsert_membership(
                &mut *tx,
                UpsertMembershipOptions {
                    conversation_id: membership.conversation_id,
                    participant_id: membership.participant_id,
                    role: membership.role,
                    provider_participant_id: &membership.provider_participant_id,
                    sent_message: membership.sent_message,
                    message_at: membership.message_at,
                },
            )
            .await
            .context("Failed to upsert membership")?;

            let messages_delta = if membership.sent_message { 1 } else { 0 };
            let conversations_delta = if created { 1 } else { 0 };
            if messages_delta != 0 || conversations_delta != 0 {
                participants::update::touch_activity(
                    &mut *tx,
                    membership.participant_id,
                    membership.message_at.unwrap_or_else(Utc::now),
                    messages_delta,
                    conversations_delta,
                )
                .await
                .context("Failed to update participant activity")?;
            }
        }

        apply_links(&mut tx, &plan).await?;

        tx.commit()
            .await
            .context("Failed to commit store transaction")?;

        // updates run individually so one failure doesn't abort the rest
        for update in &plan.updates {
            match messages::update::apply_message_update(&self.pool, update).await {
                Ok(()) => outcome.updated += 1,
                Err(e) => {
                    tracing::error!(message_id = %update.id, error = ?e, "Message update failed");
                    outcome.update_errors.push((update.id, format!("{e:#}")));
                }
            }
        }

        Ok(outcome)
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<bool> {
        messages::delete::delete_message(&self.pool, message_id).await
    }

    async fn fetch_conversation_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        messages::get::fetch_conversation_messages(&self.pool, conversation_id).await
    }

    async fn apply_message_update(&self, update: &MessageUpdate) -> Result<()> {
        messages::update::apply_message_update(&self.pool, update).await
    }

    async fn recompute_aggregates(&self, channel_id: Uuid, conversation_id: Uuid) -> Result<()> {
        conversations::update::recompute_aggregates(&self.pool, conversation_id).await?;
        channels::update::recompute_channel_aggregates(&self.pool, channel_id).await
    }
}

/// Ensures the plan's record links and keeps profile counters in step:
/// the conversation counter moves only on the first link for a (record,
/// conversation) pair, the message counter moves by the batch's created
/// message count.
async fn apply_links(tx: &mut sqlx::PgConnection, plan: &StorePlan) -> Result<()> {
    if plan.links.is_empty() {
        return Ok(());
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
        let count_before =
            links::upsert::count_links_for_pair(&mut *tx, record_id, plan.conversation_id)
                .await
                .context("Failed to count record links")?;

        let mut any_created = false;
        for link in record_links {
            if links::upsert::ensure_link(&mut *tx, link)
                .await
                .context("Failed to ensure record link")?
            {
                any_created = true;
            }
        }

        let new_conversation = count_before == 0 && any_created;
        if new_conversation || messages_delta > 0 {
            profiles::update::bump_profile(
                &mut *tx,
                record_id,
                new_conversation,
                messages_delta,
                last_message_at,
            )
            .await
            .context("Failed to bump record profile")?;
        }
    }

    Ok(())
}

//! End-to-end pipeline tests over the in-memory repo: storage gating,
//! idempotent ingestion across dedup paths, role precedence, aggregate
//! correctness, and the outbound-send reconciliation flow.

use crate::ingest::dedup::PROVISIONAL_EXTERNAL_ID;
use crate::ingest::reconcile::reconcile_duplicate_messages;
use crate::ingest::send::send_message;
use crate::ingest::sync::sync_conversation;
use crate::ingest::webhook::ingest_webhook_event;
use crate::linking::record_linker::LinkPolicy;
use crate::ports::{CommsRepo, SendMessageRequest, SendReceipt};
use crate::testing::{InMemoryRepo, NullPublisher, ScriptedProvider, StaticRecordStore};
use models_comms::channel::ChannelType;
use models_comms::ingest::{IngestReason, SyncOptions};
use models_comms::message::{metadata_keys, MessageDirection, ParticipantRole};
use serde_json::json;

fn whatsapp_payload() -> serde_json::Value {
    json!({
        "from": "27849977040@s.whatsapp.net",
        "text": "hi",
        "timestamp": "2024-01-01T10:00:00Z"
    })
}

#[tokio::test]
async fn test_scenario_a_no_record_match_stores_nothing() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Whatsapp, "acc_wa");
    let records = StaticRecordStore::empty();

    let outcome = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &whatsapp_payload(),
    )
    .await
    .unwrap();

    assert!(!outcome.stored);
    assert_eq!(outcome.reason, IngestReason::NoRecordMatch);

    // the participant was still created, with the normalized phone
    assert_eq!(repo.participant_count(), 1);
    let participant = repo
        .fetch_participant_by_identifier(&models_comms::identifier::Identifier::Phone(
            "27849977040".to_string(),
        ))
        .await
        .unwrap()
        .expect("participant should exist");
    assert_eq!(participant.phone, "27849977040");

    // but nothing conversation-level was persisted
    assert!(repo.messages().is_empty());
    assert!(repo.conversations().is_empty());
}

#[tokio::test]
async fn test_scenario_b_record_match_stores_message() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Whatsapp, "acc_wa");
    let records = StaticRecordStore::with_phone_record("27849977040");
    let record_id = records.phone_record_id("27849977040").unwrap();

    let outcome = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &whatsapp_payload(),
    )
    .await
    .unwrap();

    assert!(outcome.stored);
    assert_eq!(outcome.reason, IngestReason::MessageCreated);

    let messages = repo.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, MessageDirection::Inbound);
    assert_eq!(messages[0].contact_phone, "27849977040");

    let memberships = repo.memberships();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].role, ParticipantRole::Sender);

    let links = repo.links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].record_id, record_id);
    assert_eq!(links[0].match_type, models_comms::links::MatchType::Phone);
    assert!(links[0].is_primary);

    // profile counters moved for the first conversation and message
    let profile = repo.profile(record_id).unwrap();
    assert_eq!(profile.total_conversations, 1);
    assert_eq!(profile.total_messages, 1);
}

#[tokio::test]
async fn test_storage_gate_reevaluated_after_record_created() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Whatsapp, "acc_wa");

    let empty = StaticRecordStore::empty();
    let first = ingest_webhook_event(
        &repo,
        &empty,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &whatsapp_payload(),
    )
    .await
    .unwrap();
    assert!(!first.stored);

    // the record appears later; re-ingesting the same payload stores it
    let with_record = StaticRecordStore::with_phone_record("27849977040");
    let second = ingest_webhook_event(
        &repo,
        &with_record,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &whatsapp_payload(),
    )
    .await
    .unwrap();
    assert!(second.stored);
    assert_eq!(repo.messages().len(), 1);
    // no duplicate participant from the second pass
    assert_eq!(repo.participant_count(), 1);
}

#[tokio::test]
async fn test_idempotent_ingestion_by_external_id() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Whatsapp, "acc_wa");
    let records = StaticRecordStore::with_phone_record("27849977040");

    let payload = json!({
        "from": "27849977040@s.whatsapp.net",
        "id": "wamid.1",
        "text": "hi",
        "timestamp": "2024-01-01T10:00:00Z"
    });

    let first = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &payload,
    )
    .await
    .unwrap();
    assert_eq!(first.reason, IngestReason::MessageCreated);

    let second = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &payload,
    )
    .await
    .unwrap();
    assert_eq!(second.reason, IngestReason::MessageUpdated);

    assert_eq!(repo.messages().len(), 1);
    // the duplicate delivery is not a new message event for the profile
    let record_id = records.phone_record_id("27849977040").unwrap();
    assert_eq!(repo.profile(record_id).unwrap().total_messages, 1);
}

#[tokio::test]
async fn test_role_precedence_to_and_cc() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Email, "acc_mail");
    let records = StaticRecordStore::with_email_record("dual@acme.com");

    let payload = json!({
        "from": "sender@other.com",
        "to": [{"email": "dual@acme.com", "name": "Dual"}],
        "cc": ["dual@acme.com"],
        "subject": "hello",
        "text": "hi",
        "message_id": "<m1@mail>",
        "thread_id": "t1"
    });

    ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Email,
        "acc_mail",
        &payload,
    )
    .await
    .unwrap();

    let memberships = repo.memberships();
    let dual = repo
        .fetch_participant_by_identifier(&models_comms::identifier::Identifier::Email(
            "dual@acme.com".to_string(),
        ))
        .await
        .unwrap()
        .unwrap();
    let membership = memberships
        .iter()
        .find(|m| m.participant_id == dual.id)
        .unwrap();
    assert_eq!(membership.role, ParticipantRole::Recipient);
}

#[tokio::test]
async fn test_scenario_c_outbound_send_then_webhook_confirmation() {
    let repo = InMemoryRepo::default();
    repo.seed_channel_with_metadata(
        ChannelType::Email,
        "acc_mail",
        json!({"account_email": "me@acme.com"}),
    );
    let records = StaticRecordStore::with_email_record("them@acme.com");
    let provider = ScriptedProvider {
        receipt: Some(SendReceipt {
            id: "snd_1".to_string(),
            provider_id: "provisional_123".to_string(),
            tracking_id: "t1".to_string(),
        }),
        ..Default::default()
    };

    let sent = send_message(
        &repo,
        &records,
        &provider,
        &LinkPolicy::default(),
        ChannelType::Email,
        SendMessageRequest {
            account_id: "acc_mail".to_string(),
            to: vec!["them@acme.com".to_string()],
            subject: "Quote".to_string(),
            body: "Here is the quote.".to_string(),
            thread_id: Some("t1".to_string()),
        },
    )
    .await
    .unwrap();
    assert!(sent.stored);
    assert_eq!(repo.messages().len(), 1);
    assert_eq!(repo.messages()[0].external_message_id, "provisional_123");

    // the webhook reports the same send under its Gmail-style id
    let webhook_payload = json!({
        "from": "me@acme.com",
        "to": ["them@acme.com"],
        "subject": "Quote",
        "text": "Here is the quote.",
        "message_id": "<gmail-id@mail.com>",
        "thread_id": "t1",
        "tracking_id": "t1"
    });
    let confirmed = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Email,
        "acc_mail",
        &webhook_payload,
    )
    .await
    .unwrap();
    assert_eq!(confirmed.reason, IngestReason::MessageUpdated);

    // exactly one message, upgraded to the authoritative id
    let messages = repo.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].external_message_id, "<gmail-id@mail.com>");
    assert_eq!(messages[0].direction, MessageDirection::Outbound);

    // metadata holds both the send receipt and the raw webhook payload,
    // and the provisional marker is gone
    let metadata = &messages[0].metadata;
    assert_eq!(
        metadata.get("send_receipt_id").and_then(|v| v.as_str()),
        Some("snd_1")
    );
    assert_eq!(
        metadata.get(metadata_keys::CHANNEL_SPECIFIC_DATA),
        Some(&webhook_payload)
    );
    assert!(metadata.get(PROVISIONAL_EXTERNAL_ID).is_none());
}

#[tokio::test]
async fn test_sync_batch_creates_and_updates() {
    let repo = InMemoryRepo::default();
    let channel = repo.seed_channel(ChannelType::Whatsapp, "acc_wa");
    let records = StaticRecordStore::with_phone_record("27849977040");

    // webhook stores the first message, then a historical sync replays it
    // plus two older ones
    let first = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &json!({
            "from": "27849977040@s.whatsapp.net",
            "id": "wamid.3",
            "chat_id": "27849977040",
            "text": "latest",
            "timestamp": "2024-01-03T10:00:00Z"
        }),
    )
    .await
    .unwrap();
    let conversation_id = first.conversation_id.unwrap();

    let provider = ScriptedProvider {
        messages: vec![
            json!({
                "from": "27849977040@s.whatsapp.net",
                "id": "wamid.1",
                "chat_id": "27849977040",
                "text": "oldest",
                "timestamp": "2024-01-01T10:00:00Z"
            }),
            json!({
                "from": "27849977040@s.whatsapp.net",
                "id": "wamid.2",
                "chat_id": "27849977040",
                "text": "middle",
                "timestamp": "2024-01-02T10:00:00Z"
            }),
            json!({
                "from": "27849977040@s.whatsapp.net",
                "id": "wamid.3",
                "chat_id": "27849977040",
                "text": "latest",
                "timestamp": "2024-01-03T10:00:00Z"
            }),
        ],
        ..Default::default()
    };

    let summary = sync_conversation(
        &repo,
        &records,
        &provider,
        &NullPublisher,
        &LinkPolicy::default(),
        conversation_id,
        SyncOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.messages_synced, 3);
    assert_eq!(summary.messages_created, 2);
    assert_eq!(summary.messages_updated, 1);
    assert_eq!(summary.errors, 0);

    // ordering for display follows provider event time, not arrival order
    let ordered = repo.fetch_conversation_messages(conversation_id).await.unwrap();
    let contents: Vec<&str> = ordered.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["oldest", "middle", "latest"]);

    // aggregates recomputed from the full message set
    let conversation = repo
        .fetch_conversation(conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.message_count, 3);
    assert_eq!(
        conversation.last_message_at,
        ordered.last().map(|m| m.effective_timestamp())
    );

    let channel_after = repo.fetch_channel(channel.id).await.unwrap().unwrap();
    assert_eq!(channel_after.message_count, 3);
}

#[tokio::test]
async fn test_aggregates_correct_after_delete() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Whatsapp, "acc_wa");
    let records = StaticRecordStore::with_phone_record("27849977040");

    let mut conversation_id = None;
    for (id, ts) in [("wamid.1", "2024-01-01T10:00:00Z"), ("wamid.2", "2024-01-02T10:00:00Z")] {
        let outcome = ingest_webhook_event(
            &repo,
            &records,
            &NullPublisher,
            &LinkPolicy::default(),
            ChannelType::Whatsapp,
            "acc_wa",
            &json!({
                "from": "27849977040@s.whatsapp.net",
                "id": id,
                "chat_id": "27849977040",
                "text": "hi",
                "timestamp": ts
            }),
        )
        .await
        .unwrap();
        conversation_id = outcome.conversation_id;
    }
    let conversation_id = conversation_id.unwrap();
    let channel_id = repo.conversations()[0].channel_id;

    // delete the newest message and recompute
    let newest = repo
        .fetch_conversation_messages(conversation_id)
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert!(repo.delete_message(newest.id).await.unwrap());
    repo.recompute_aggregates(channel_id, conversation_id)
        .await
        .unwrap();

    let conversation = repo
        .fetch_conversation(conversation_id)
        .await
        .unwrap()
        .unwrap();
    let remaining = repo
        .fetch_conversation_messages(conversation_id)
        .await
        .unwrap();
    assert_eq!(conversation.message_count, remaining.len() as i64);
    assert_eq!(
        conversation.last_message_at,
        remaining.iter().map(|m| m.effective_timestamp()).max()
    );
}

#[tokio::test]
async fn test_reconcile_merges_bracketed_duplicate() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Email, "acc_mail");
    let records = StaticRecordStore::with_email_record("them@acme.com");

    // same logical message stored under two id formats
    let base = json!({
        "from": "them@acme.com",
        "subject": "hello",
        "text": "identical content",
        "thread_id": "t1"
    });
    let mut platform = base.clone();
    platform["message_id"] = json!("platform_opaque_1");
    let mut bracketed = base.clone();
    bracketed["message_id"] = json!("<msg-id@mail.com>");

    let first = ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Email,
        "acc_mail",
        &platform,
    )
    .await
    .unwrap();
    ingest_webhook_event(
        &repo,
        &records,
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Email,
        "acc_mail",
        &bracketed,
    )
    .await
    .unwrap();
    assert_eq!(repo.messages().len(), 2);

    let conversation_id = first.conversation_id.unwrap();
    let merged = reconcile_duplicate_messages(&repo, conversation_id)
        .await
        .unwrap();
    assert_eq!(merged, 1);

    let messages = repo.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].external_message_id, "platform_opaque_1");
}

#[tokio::test]
async fn test_sync_disabled_channel_skips() {
    let repo = InMemoryRepo::default();
    let channel = repo.seed_channel(ChannelType::Whatsapp, "acc_wa");
    repo.set_sync_active(channel.id, false);

    let outcome = ingest_webhook_event(
        &repo,
        &StaticRecordStore::with_phone_record("27849977040"),
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &whatsapp_payload(),
    )
    .await
    .unwrap();

    assert!(!outcome.stored);
    assert_eq!(outcome.reason, IngestReason::SyncDisabled);
    assert_eq!(repo.participant_count(), 0);
}

#[tokio::test]
async fn test_malformed_payload_returns_definitive_outcome() {
    let repo = InMemoryRepo::default();
    repo.seed_channel(ChannelType::Whatsapp, "acc_wa");

    let outcome = ingest_webhook_event(
        &repo,
        &StaticRecordStore::empty(),
        &NullPublisher,
        &LinkPolicy::default(),
        ChannelType::Whatsapp,
        "acc_wa",
        &json!({"text": "no sender at all"}),
    )
    .await
    .unwrap();

    assert!(!outcome.stored);
    assert_eq!(outcome.reason, IngestReason::NormalizationFailed);
}

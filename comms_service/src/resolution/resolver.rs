//! Single-message participant resolution: the slower fallback the webhook
//! path uses instead of building a batch cache.

use crate::ports::CommsRepo;
use crate::resolution::identifiers::{sender_identifier_candidates, sender_name};
use anyhow::Result;
use comms_utils::{clean_display_name, is_generic_email};
use models_comms::identifier::Identifier;
use models_comms::message::ParticipantRole;
use models_comms::normalized::NormalizedMessage;
use models_comms::participant::{is_name_upgrade, Participant};
use std::collections::HashMap;
use uuid::Uuid;

/// Resolves (or lazily creates) the participant behind a message's sender.
/// Candidates are tried in priority order; the first database hit wins. A
/// hit also gets its name upgraded and any newly revealed identifier
/// backfilled while the row is in hand.
#[tracing::instrument(skip_all)]
pub async fn identify_sender_participant<R: CommsRepo>(
    repo: &R,
    message: &NormalizedMessage,
) -> Result<Option<Participant>> {
    let candidates = sender_identifier_candidates(message);
    if candidates.is_empty() {
        return Ok(None);
    }

    let name = eligible_sender_name(message);

    for identifier in &candidates {
        if let Some(mut participant) = repo.fetch_participant_by_identifier(identifier).await? {
            if is_name_upgrade(&participant.name, &name, identifier.value()) {
                repo.update_participant_name(participant.id, &name).await?;
                participant.name = name.clone();
            }

            let reveal_email = participant.email.is_empty() && !message.sender.email.is_empty();
            let reveal_phone = participant.phone.is_empty() && !message.sender.phone.is_empty();
            let reveal_urn = participant.linkedin_member_urn.is_empty()
                && !message.sender.linkedin_urn.is_empty();
            if reveal_email || reveal_phone || reveal_urn {
                repo.backfill_participant_identifiers(
                    participant.id,
                    &message.sender.email,
                    &message.sender.phone,
                    &message.sender.linkedin_urn,
                )
                .await?;
                if reveal_email {
                    participant.email = message.sender.email.clone();
                }
                if reveal_phone {
                    participant.phone = message.sender.phone.clone();
                }
                if reveal_urn {
                    participant.linkedin_member_urn = message.sender.linkedin_urn.clone();
                }
            }

            return Ok(Some(participant));
        }
    }

    // no match anywhere: create from the full sender identity
    let mut participant = Participant::from_identifier(&candidates[0], &name);
    if participant.email.is_empty() {
        participant.email = message.sender.email.clone();
    }
    if participant.phone.is_empty() {
        participant.phone = message.sender.phone.clone();
    }
    if participant.linkedin_member_urn.is_empty() {
        participant.linkedin_member_urn = message.sender.linkedin_urn.clone();
    }

    repo.insert_participants(std::slice::from_ref(&participant))
        .await?;

    Ok(Some(participant))
}

/// Resolves every recipient to a participant with its most specific role.
/// A recipient appearing in several lists keeps the highest-precedence
/// role (to > cc > bcc).
#[tracing::instrument(skip_all)]
pub async fn resolve_recipients<R: CommsRepo>(
    repo: &R,
    message: &NormalizedMessage,
) -> Result<Vec<(Participant, ParticipantRole)>> {
    let mut resolved: HashMap<Uuid, (Participant, ParticipantRole)> = HashMap::new();

    let groups = [
        (&message.to, ParticipantRole::Recipient),
        (&message.cc, ParticipantRole::Cc),
        (&message.bcc, ParticipantRole::Bcc),
    ];

    for (recipients, role) in groups {
        for recipient in recipients.iter() {
            let Some(identifier) = Identifier::email(&recipient.email) else {
                continue;
            };

            let participant = match repo.fetch_participant_by_identifier(&identifier).await? {
                Some(existing) => existing,
                None => {
                    let name = if is_generic_email(&recipient.email) {
                        String::new()
                    } else {
                        clean_display_name(&recipient.name)
                    };
                    let created = Participant::from_identifier(&identifier, &name);
                    repo.insert_participants(std::slice::from_ref(&created))
                        .await?;
                    created
                }
            };

            resolved
                .entry(participant.id)
                .and_modify(|(_, existing_role)| {
                    *existing_role = ParticipantRole::most_specific(*existing_role, role);
                })
                .or_insert((participant, role));
        }
    }

    Ok(resolved.into_values().collect())
}

fn eligible_sender_name(message: &NormalizedMessage) -> String {
    if !message.sender.email.is_empty() && is_generic_email(&message.sender.email) {
        return String::new();
    }
    clean_display_name(&sender_name(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRepo;
    use models_comms::channel::ChannelType;
    use models_comms::normalized::NormalizedRecipient;

    #[tokio::test]
    async fn test_creates_sender_with_all_identifiers() {
        let repo = InMemoryRepo::default();
        let mut message = NormalizedMessage::new(ChannelType::Whatsapp);
        message.sender.phone = "27849977040".to_string();
        message.sender.email = "jane@acme.com".to_string();
        message.sender.name = "Jane".to_string();

        let participant = identify_sender_participant(&repo, &message)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participant.phone, "27849977040");
        assert_eq!(participant.email, "jane@acme.com");
        assert_eq!(repo.participant_count(), 1);
    }

    #[tokio::test]
    async fn test_phone_match_wins_over_email_identity() {
        let repo = InMemoryRepo::default();
        let by_phone =
            Participant::from_identifier(&Identifier::Phone("27849977040".to_string()), "P");
        let phone_id = by_phone.id;
        repo.seed_participant(by_phone);
        let by_email =
            Participant::from_identifier(&Identifier::Email("jane@acme.com".to_string()), "E");
        repo.seed_participant(by_email);

        let mut message = NormalizedMessage::new(ChannelType::Whatsapp);
        message.sender.phone = "27849977040".to_string();
        message.sender.email = "jane@acme.com".to_string();

        let resolved = identify_sender_participant(&repo, &message)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, phone_id);
    }

    #[tokio::test]
    async fn test_later_message_reveals_email() {
        let repo = InMemoryRepo::default();
        let existing =
            Participant::from_identifier(&Identifier::Phone("555".to_string()), "Bob");
        let id = existing.id;
        repo.seed_participant(existing);

        let mut message = NormalizedMessage::new(ChannelType::Whatsapp);
        message.sender.phone = "555".to_string();
        message.sender.email = "bob@acme.com".to_string();

        identify_sender_participant(&repo, &message).await.unwrap();
        assert_eq!(repo.participant_by_id(id).unwrap().email, "bob@acme.com");
    }

    #[tokio::test]
    async fn test_no_identifier_resolves_to_none() {
        let repo = InMemoryRepo::default();
        let message = NormalizedMessage::new(ChannelType::Generic);
        assert!(identify_sender_participant(&repo, &message)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_recipient_in_to_and_cc_gets_recipient_role() {
        let repo = InMemoryRepo::default();
        let mut message = NormalizedMessage::new(ChannelType::Email);
        message.to.push(NormalizedRecipient {
            email: "dual@acme.com".to_string(),
            name: String::new(),
        });
        message.cc.push(NormalizedRecipient {
            email: "dual@acme.com".to_string(),
            name: String::new(),
        });

        let resolved = resolve_recipients(&repo, &message).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].1, ParticipantRole::Recipient);
    }
}

//! The per-run participant resolution cache. Built once per sync batch and
//! passed by ownership through the call chain; concurrent runs for
//! different accounts never share state.

use crate::ports::CommsRepo;
use crate::resolution::identifiers::{sender_identifier_candidates, IdentifierMaps};
use anyhow::Result;
use comms_utils::{clean_display_name, is_generic_email};
use models_comms::identifier::Identifier;
use models_comms::normalized::NormalizedMessage;
use models_comms::participant::{is_name_upgrade, Participant};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ParticipantCache {
    entries: HashMap<String, Participant>,
}

impl ParticipantCache {
    /// Indexes a participant under every identifier namespace it carries.
    pub fn insert(&mut self, participant: &Participant) {
        for identifier in participant.identifiers() {
            self.entries
                .insert(identifier.to_string(), participant.clone());
        }
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&Participant> {
        self.entries.get(&identifier.to_string())
    }

    /// Resolves a message's sender: tries the identifier candidates in
    /// priority order and returns the first cache hit. No hit returns
    /// `None`; the caller may fall back to single-message resolution.
    pub fn get_for_message(&self, message: &NormalizedMessage) -> Option<&Participant> {
        sender_identifier_candidates(message)
            .iter()
            .find_map(|identifier| self.get(identifier))
    }

    /// Applies a name change to every cache entry for the participant.
    fn set_name(&mut self, participant_id: Uuid, name: &str) {
        for entry in self.entries.values_mut() {
            if entry.id == participant_id {
                entry.name = name.to_string();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the cache for one batch: one OR-combined fetch, multi-key
/// indexing, immediate name upgrades for existing participants, and
/// conflict-ignoring batch creation for identifiers nobody matches.
#[tracing::instrument(skip_all)]
pub async fn build_cache<R: CommsRepo>(
    repo: &R,
    maps: &IdentifierMaps,
) -> Result<ParticipantCache> {
    let mut cache = ParticipantCache::default();
    if maps.is_empty() {
        return Ok(cache);
    }

    let existing = repo
        .fetch_participants_by_identifiers(&maps.to_batch())
        .await?;
    for participant in &existing {
        cache.insert(participant);
    }

    // upgrade names on matched participants while the batch is in hand
    for (identifier, collected_name) in maps.iter() {
        let candidate = eligible_name(&identifier, collected_name);
        if candidate.is_empty() {
            continue;
        }
        if let Some(participant) = cache.get(&identifier) {
            if is_name_upgrade(&participant.name, &candidate, identifier.value()) {
                let participant_id = participant.id;
                repo.update_participant_name(participant_id, &candidate)
                    .await?;
                cache.set_name(participant_id, &candidate);
            }
        }
    }

    // create participants for identifiers with no match
    let mut created: Vec<Participant> = Vec::new();
    for (identifier, collected_name) in maps.iter() {
        if cache.get(&identifier).is_some() {
            continue;
        }
        let name = eligible_name(&identifier, collected_name);
        let participant = Participant::from_identifier(&identifier, &name);
        cache.insert(&participant);
        created.push(participant);
    }

    if !created.is_empty() {
        tracing::debug!(count = created.len(), "Creating participants for new identifiers");
        repo.insert_participants(&created).await?;
    }

    Ok(cache)
}

/// Name hygiene applied before a name reaches a participant row: provider
/// service suffixes removed, and automated senders contribute no name at
/// all.
fn eligible_name(identifier: &Identifier, raw_name: &str) -> String {
    if let Identifier::Email(email) = identifier {
        if is_generic_email(email) {
            return String::new();
        }
    }
    clean_display_name(raw_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRepo;
    use models_comms::channel::ChannelType;

    fn maps_with(identifier: Identifier, name: &str) -> IdentifierMaps {
        let mut maps = IdentifierMaps::default();
        maps.note(&identifier, name);
        maps
    }

    #[tokio::test]
    async fn test_build_cache_creates_missing_participants() {
        let repo = InMemoryRepo::default();
        let maps = maps_with(Identifier::Phone("27849977040".to_string()), "Jane");

        let cache = build_cache(&repo, &maps).await.unwrap();

        let hit = cache
            .get(&Identifier::Phone("27849977040".to_string()))
            .unwrap();
        assert_eq!(hit.phone, "27849977040");
        assert_eq!(hit.name, "Jane");
        assert_eq!(repo.participant_count(), 1);
    }

    #[tokio::test]
    async fn test_build_cache_reuses_existing_participant() {
        let repo = InMemoryRepo::default();
        let existing = Participant::from_identifier(
            &Identifier::Email("jane@acme.com".to_string()),
            "Jane Doe",
        );
        let existing_id = existing.id;
        repo.seed_participant(existing);

        let maps = maps_with(Identifier::Email("jane@acme.com".to_string()), "J");
        let cache = build_cache(&repo, &maps).await.unwrap();

        let hit = cache
            .get(&Identifier::Email("jane@acme.com".to_string()))
            .unwrap();
        assert_eq!(hit.id, existing_id);
        // shorter candidate never regresses the stored name
        assert_eq!(hit.name, "Jane Doe");
        assert_eq!(repo.participant_count(), 1);
    }

    #[tokio::test]
    async fn test_build_cache_upgrades_empty_name() {
        let repo = InMemoryRepo::default();
        let existing =
            Participant::from_identifier(&Identifier::Phone("555".to_string()), "");
        repo.seed_participant(existing);

        let maps = maps_with(Identifier::Phone("555".to_string()), "Robert Smith");
        let cache = build_cache(&repo, &maps).await.unwrap();

        let hit = cache.get(&Identifier::Phone("555".to_string())).unwrap();
        assert_eq!(hit.name, "Robert Smith");
        assert_eq!(
            repo.participant_by_id(hit.id).unwrap().name,
            "Robert Smith"
        );
    }

    #[tokio::test]
    async fn test_generic_email_contributes_no_name() {
        let repo = InMemoryRepo::default();
        let maps = maps_with(
            Identifier::Email("noreply@github.com".to_string()),
            "GitHub Notifications",
        );
        let cache = build_cache(&repo, &maps).await.unwrap();

        let hit = cache
            .get(&Identifier::Email("noreply@github.com".to_string()))
            .unwrap();
        assert_eq!(hit.name, "");
    }

    #[tokio::test]
    async fn test_get_for_message_prefers_phone_hit() {
        let repo = InMemoryRepo::default();
        let by_phone =
            Participant::from_identifier(&Identifier::Phone("27849977040".to_string()), "Phone P");
        let phone_id = by_phone.id;
        repo.seed_participant(by_phone);
        let by_email = Participant::from_identifier(
            &Identifier::Email("jane@acme.com".to_string()),
            "Email P",
        );
        repo.seed_participant(by_email);

        let mut maps = IdentifierMaps::default();
        maps.note(&Identifier::Phone("27849977040".to_string()), "");
        maps.note(&Identifier::Email("jane@acme.com".to_string()), "");
        let cache = build_cache(&repo, &maps).await.unwrap();

        let mut message = NormalizedMessage::new(ChannelType::Whatsapp);
        message.sender.phone = "27849977040".to_string();
        message.sender.email = "jane@acme.com".to_string();

        // enriched-sender phone lookup precedes the email lookup
        assert_eq!(cache.get_for_message(&message).unwrap().id, phone_id);
    }
}

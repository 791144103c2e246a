//! The privacy/relevance filter: a conversation is only worth persisting
//! when at least one participant maps to a CRM record. The decision is
//! re-evaluated on every message; a negative result is never cached, so a
//! record created later picks the conversation up on its next message.

use crate::linking::record_linker::{link_participant, LinkPolicy};
use crate::ports::{CommsRepo, RecordStore};
use anyhow::Result;
use models_comms::participant::Participant;

/// Runs the record linker over every participant of the message being
/// ingested and returns whether anything matched. Matches found here are
/// already persisted by the linker, so later messages in the same batch see
/// them without re-querying the record store.
#[tracing::instrument(skip_all, fields(participants = participants.len()))]
pub async fn should_store<R, S>(
    repo: &R,
    records: &S,
    policy: &LinkPolicy,
    participants: &mut [Participant],
) -> Result<bool>
where
    R: CommsRepo,
    S: RecordStore,
{
    for participant in participants.iter_mut() {
        link_participant(repo, records, policy, participant).await?;
    }

    let any_match = participants.iter().any(Participant::has_record_match);
    if !any_match {
        tracing::debug!("No participant resolved to a record; conversation will not be stored");
    }
    Ok(any_match)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryRepo, StaticRecordStore};
    use models_comms::identifier::Identifier;

    #[tokio::test]
    async fn test_no_match_means_no_store() {
        let repo = InMemoryRepo::default();
        let store = StaticRecordStore::empty();
        let mut participants = vec![Participant::from_identifier(
            &Identifier::Phone("27849977040".to_string()),
            "",
        )];
        repo.seed_participant(participants[0].clone());

        let decision = should_store(&repo, &store, &LinkPolicy::default(), &mut participants)
            .await
            .unwrap();
        assert!(!decision);
    }

    #[tokio::test]
    async fn test_rechecks_after_record_appears() {
        let repo = InMemoryRepo::default();
        let mut participants = vec![Participant::from_identifier(
            &Identifier::Phone("27849977040".to_string()),
            "",
        )];
        repo.seed_participant(participants[0].clone());

        // first pass: nothing matches
        let empty = StaticRecordStore::empty();
        assert!(
            !should_store(&repo, &empty, &LinkPolicy::default(), &mut participants)
                .await
                .unwrap()
        );

        // a record with this phone is created later; the same pair is
        // re-evaluated rather than cached as a permanent negative
        let with_record = StaticRecordStore::with_phone_record("27849977040");
        assert!(
            should_store(&repo, &with_record, &LinkPolicy::default(), &mut participants)
                .await
                .unwrap()
        );
    }
}

//! Matching participants against CRM business records. Primary matches go
//! through the record store's identifier lookup; secondary (company)
//! matches go through domain lookup. The two are independent: a primary
//! hit never short-circuits the company lookup.

use crate::ports::{CommsRepo, RecordIdentifierQuery, RecordStore};
use anyhow::Result;
use comms_utils::{email_domain, is_personal_email_domain};
use models_comms::participant::{resolution_method, Participant};

/// Business constants for link confidence. Hard-coded policy in the
/// product; kept configurable rather than inferred.
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    pub identifier_confidence: f64,
    pub domain_confidence: f64,
    /// Pipeline identifier stamped on secondary (company) resolutions.
    pub company_pipeline: String,
}

impl Default for LinkPolicy {
    fn default() -> LinkPolicy {
        LinkPolicy {
            identifier_confidence: 0.9,
            domain_confidence: 0.8,
            company_pipeline: "companies".to_string(),
        }
    }
}

/// Runs both lookups for one participant and persists whatever resolves,
/// so later messages in the same batch see the association immediately.
/// Record-store failures are logged and treated as "no match"; they never
/// abort ingestion.
#[tracing::instrument(skip_all, fields(participant_id = %participant.id))]
pub async fn link_participant<R, S>(
    repo: &R,
    records: &S,
    policy: &LinkPolicy,
    participant: &mut Participant,
) -> Result<()>
where
    R: CommsRepo,
    S: RecordStore,
{
    if participant.record_id.is_none() {
        resolve_primary(repo, records, policy, participant).await?;
    }

    // company lookup runs even when a primary already resolved
    if participant.secondary_record_id.is_none() {
        resolve_secondary(repo, records, policy, participant).await?;
    }

    Ok(())
}

async fn resolve_primary<R, S>(
    repo: &R,
    records: &S,
    policy: &LinkPolicy,
    participant: &mut Participant,
) -> Result<()>
where
    R: CommsRepo,
    S: RecordStore,
{
    let mut query = RecordIdentifierQuery::default();
    if !participant.email.is_empty() {
        query.emails.push(participant.email.clone());
    }
    if !participant.phone.is_empty() {
        query.phones.push(participant.phone.clone());
    }
    if query.emails.is_empty() && query.phones.is_empty() {
        return Ok(());
    }

    let matches = match records.find_records_by_identifiers(&query).await {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(error = ?e, "Record store lookup failed; treating as no match");
            return Ok(());
        }
    };

    let Some(record) = matches.first() else {
        return Ok(());
    };

    let method = if !participant.email.is_empty() {
        resolution_method::EMAIL
    } else {
        resolution_method::PHONE
    };

    repo.persist_record_link(
        participant.id,
        record.id,
        policy.identifier_confidence,
        method,
    )
    .await?;

    participant.record_id = Some(record.id);
    participant.resolution_confidence = policy.identifier_confidence;
    participant.resolution_method = method.to_string();

    Ok(())
}

async fn resolve_secondary<R, S>(
    repo: &R,
    records: &S,
    policy: &LinkPolicy,
    participant: &mut Participant,
) -> Result<()>
where
    R: CommsRepo,
    S: RecordStore,
{
    let Some(domain) = email_domain(&participant.email) else {
        return Ok(());
    };
    if is_personal_email_domain(&domain) {
        return Ok(());
    }

    let matches = match records.find_company_records_by_domain(&domain).await {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(error = ?e, domain, "Company domain lookup failed; treating as no match");
            return Ok(());
        }
    };

    let Some(record) = matches.first() else {
        return Ok(());
    };

    repo.persist_secondary_record_link(
        participant.id,
        record.id,
        policy.domain_confidence,
        resolution_method::DOMAIN,
        &policy.company_pipeline,
    )
    .await?;

    participant.secondary_record_id = Some(record.id);
    participant.secondary_confidence = policy.domain_confidence;
    participant.secondary_resolution_method = resolution_method::DOMAIN.to_string();
    participant.secondary_pipeline = policy.company_pipeline.clone();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingRecordStore, InMemoryRepo, StaticRecordStore};
    use models_comms::identifier::Identifier;

    #[tokio::test]
    async fn test_primary_match_by_phone() {
        let repo = InMemoryRepo::default();
        let store = StaticRecordStore::with_phone_record("27849977040");
        let mut participant =
            Participant::from_identifier(&Identifier::Phone("27849977040".to_string()), "");
        repo.seed_participant(participant.clone());

        link_participant(&repo, &store, &LinkPolicy::default(), &mut participant)
            .await
            .unwrap();

        assert!(participant.record_id.is_some());
        assert_eq!(participant.resolution_method, "phone");
        assert_eq!(participant.resolution_confidence, 0.9);
        // persisted immediately, not just mutated in memory
        assert!(repo
            .participant_by_id(participant.id)
            .unwrap()
            .record_id
            .is_some());
    }

    #[tokio::test]
    async fn test_secondary_runs_even_with_primary_resolved() {
        let repo = InMemoryRepo::default();
        let store = StaticRecordStore::with_email_and_domain_records("jane@acme.com", "acme.com");
        let mut participant =
            Participant::from_identifier(&Identifier::Email("jane@acme.com".to_string()), "");
        repo.seed_participant(participant.clone());

        link_participant(&repo, &store, &LinkPolicy::default(), &mut participant)
            .await
            .unwrap();

        assert!(participant.record_id.is_some());
        assert!(participant.secondary_record_id.is_some());
        assert_eq!(participant.secondary_resolution_method, "domain");
        assert_eq!(participant.secondary_confidence, 0.8);
    }

    #[tokio::test]
    async fn test_personal_domain_never_matches_company() {
        let repo = InMemoryRepo::default();
        let store = StaticRecordStore::with_email_and_domain_records("jane@gmail.com", "gmail.com");
        let mut participant =
            Participant::from_identifier(&Identifier::Email("jane@gmail.com".to_string()), "");
        repo.seed_participant(participant.clone());

        link_participant(&repo, &store, &LinkPolicy::default(), &mut participant)
            .await
            .unwrap();

        assert!(participant.secondary_record_id.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_no_match() {
        let repo = InMemoryRepo::default();
        let store = FailingRecordStore;
        let mut participant =
            Participant::from_identifier(&Identifier::Email("jane@acme.com".to_string()), "");
        repo.seed_participant(participant.clone());

        link_participant(&repo, &store, &LinkPolicy::default(), &mut participant)
            .await
            .unwrap();

        assert!(participant.record_id.is_none());
        assert!(participant.secondary_record_id.is_none());
    }
}

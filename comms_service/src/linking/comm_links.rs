//! Planning of RecordCommunicationLink rows for a store sequence. The
//! adapter executes the plan idempotently and keeps the per-record profile
//! counters in step.

use comms_utils::email_domain;
use models_comms::links::{MatchType, RecordCommunicationLink};
use models_comms::participant::{resolution_method, Participant};
use uuid::Uuid;

/// Builds the link rows a set of resolved participants implies for one
/// conversation: a primary link per participant with a record match, and a
/// secondary (company) link per participant with a domain match. Secondary
/// links carry `is_primary = false` and maintain the company record's own
/// profile, never the primary record's counters.
pub fn plan_record_links(
    conversation_id: Uuid,
    participants: &[Participant],
    created_by_sync: bool,
) -> Vec<RecordCommunicationLink> {
    let mut links = Vec::new();

    for participant in participants {
        if let Some(record_id) = participant.record_id {
            let (match_type, match_identifier) = match participant.resolution_method.as_str() {
                resolution_method::PHONE => (MatchType::Phone, participant.phone.clone()),
                resolution_method::EMAIL => (MatchType::Email, participant.email.clone()),
                resolution_method::MANUAL => (MatchType::Other, String::new()),
                _ => (MatchType::Other, String::new()),
            };

            links.push(RecordCommunicationLink {
                id: Uuid::now_v7(),
                record_id,
                conversation_id,
                participant_id: participant.id,
                match_type,
                match_identifier,
                confidence_score: participant.resolution_confidence,
                created_by_sync,
                is_primary: true,
                created_at: chrono::Utc::now(),
            });
        }

        if let Some(secondary_id) = participant.secondary_record_id {
            links.push(RecordCommunicationLink {
                id: Uuid::now_v7(),
                record_id: secondary_id,
                conversation_id,
                participant_id: participant.id,
                match_type: MatchType::Domain,
                match_identifier: email_domain(&participant.email).unwrap_or_default(),
                confidence_score: participant.secondary_confidence,
                created_by_sync,
                is_primary: false,
                created_at: chrono::Utc::now(),
            });
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use models_comms::identifier::Identifier;

    #[test]
    fn test_primary_and_secondary_links() {
        let mut participant =
            Participant::from_identifier(&Identifier::Email("jane@acme.com".to_string()), "");
        participant.record_id = Some(Uuid::now_v7());
        participant.resolution_method = "email".to_string();
        participant.resolution_confidence = 0.9;
        participant.secondary_record_id = Some(Uuid::now_v7());
        participant.secondary_confidence = 0.8;

        let conversation_id = Uuid::now_v7();
        let links = plan_record_links(conversation_id, std::slice::from_ref(&participant), false);

        assert_eq!(links.len(), 2);

        let primary = links.iter().find(|l| l.is_primary).unwrap();
        assert_eq!(primary.match_type, MatchType::Email);
        assert_eq!(primary.match_identifier, "jane@acme.com");
        assert_eq!(primary.confidence_score, 0.9);

        let secondary = links.iter().find(|l| !l.is_primary).unwrap();
        assert_eq!(secondary.match_type, MatchType::Domain);
        assert_eq!(secondary.match_identifier, "acme.com");
        assert_eq!(secondary.record_id, participant.secondary_record_id.unwrap());
    }

    #[test]
    fn test_unmatched_participant_yields_no_links() {
        let participant =
            Participant::from_identifier(&Identifier::Phone("555".to_string()), "");
        let links = plan_record_links(Uuid::now_v7(), std::slice::from_ref(&participant), true);
        assert!(links.is_empty());
    }
}

//! Rebuild a session from its registry record and event log.

use tracing::error;

use crate::error::SessionError;
use crate::session::{Event, Session, SystemMarker};
use crate::store::SessionRecord;

/// Events of the current run: everything from the most recent reset marker
/// on, or the whole log if the session was never restarted.
pub fn current_run(events: &[Event]) -> &[Event] {
    let start = events
        .iter()
        .rposition(|e| e.record.marker() == Some(SystemMarker::Reset))
        .unwrap_or(0);
    &events[start..]
}

/// Fold `events` (in sequence order) over a fresh session built from `record`.
///
/// Status and stage position are re-derived by the fold, never read from
/// the registry.
pub fn reconstruct(record: &SessionRecord, events: &[Event]) -> Result<Session, SessionError> {
    let inconsistent = |reason: String| {
        error!(session_id = %record.id, %reason, "Session log is inconsistent");
        SessionError::Inconsistent {
            session_id: record.id.to_string(),
            reason,
        }
    };

    if events.is_empty() {
        return Err(inconsistent(
            "registry record exists but the event log is empty".to_string(),
        ));
    }

    if let Some(pair) = events.windows(2).find(|w| w[1].sequence <= w[0].sequence) {
        return Err(inconsistent(format!(
            "sequence {} follows {}",
            pair[1].sequence, pair[0].sequence
        )));
    }

    let mut session = Session::new(
        record.id.clone(),
        record.owner_id.clone(),
        record.kind,
        record.context.clone(),
        record.created_at,
    );

    for event in current_run(events) {
        if event.record.session_id != record.id {
            return Err(inconsistent(format!(
                "event {} belongs to session {}",
                event.id, event.record.session_id
            )));
        }
        session
            .apply(&event.record)
            .map_err(|reason| inconsistent(format!("at sequence {}: {reason}", event.sequence)))?;
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::session::{
        EventRecord, SessionContext, SessionId, SessionKind, SessionStatus, Stage,
    };

    fn record() -> SessionRecord {
        SessionRecord::from(&Session::new(
            SessionId::from("interview_r"),
            "owner",
            SessionKind::Interview,
            SessionContext::interview("QA", "Hooli"),
            Utc::now(),
        ))
    }

    fn log(records: Vec<EventRecord>) -> Vec<Event> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| Event {
                id: Uuid::new_v4(),
                sequence: i as i64 + 1,
                record,
            })
            .collect()
    }

    fn completed_run(id: &SessionId) -> Vec<EventRecord> {
        let mut records = vec![EventRecord::system(id, SystemMarker::Started, "hi")];
        records.extend((1..=3).map(|i| EventRecord::question(id, i, format!("Q{i}"))));
        records.extend((1..=3).map(|i| EventRecord::answer(id, i, format!("A{i}"))));
        records.extend((1..=3).map(|i| EventRecord::feedback(id, i, "fb", 6 + i as u8)));
        records.push(EventRecord::summary(id, "roadmap"));
        records.push(EventRecord::system(id, SystemMarker::Completed, "done"));
        records
    }

    #[test]
    fn empty_log_is_inconsistent() {
        let err = reconstruct(&record(), &[]).unwrap_err();
        assert!(matches!(err, SessionError::Inconsistent { .. }));
    }

    #[test]
    fn full_log_reconstructs_completed_session() {
        let rec = record();
        let events = log(completed_run(&rec.id));
        let s = reconstruct(&rec, &events).unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.stage, Some(Stage::Complete));
        assert_eq!(s.aggregate_score(), Some(8.0));
        assert_eq!(s.context.company.as_deref(), Some("Hooli"));
        assert_eq!(s.updated_at, events.last().unwrap().record.created_at);
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let rec = record();
        let events = log(completed_run(&rec.id));
        assert_eq!(
            reconstruct(&rec, &events).unwrap(),
            reconstruct(&rec, &events).unwrap()
        );
    }

    #[test]
    fn only_events_after_last_reset_count() {
        let rec = record();
        let mut records = completed_run(&rec.id);
        records.push(EventRecord::system(&rec.id, SystemMarker::Reset, "reset"));
        let events = log(records);

        let s = reconstruct(&rec, &events).unwrap();
        assert_eq!(s.status, SessionStatus::Started);
        assert_eq!(s.stage, Some(Stage::Start));
        assert!(s.payload.answers.is_empty());
        assert!(s.payload.summary.is_none());
        assert_eq!(current_run(&events).len(), 1);
    }

    #[test]
    fn answer_gap_is_inconsistent() {
        let rec = record();
        let mut records = vec![EventRecord::system(&rec.id, SystemMarker::Started, "hi")];
        records.extend((1..=3).map(|i| EventRecord::question(&rec.id, i, "q")));
        records.push(EventRecord::answer(&rec.id, 3, "skipped"));
        let err = reconstruct(&rec, &log(records)).unwrap_err();
        let SessionError::Inconsistent { reason, .. } = err else {
            panic!("expected inconsistency");
        };
        assert!(reason.contains("sequence 5"));
    }

    #[test]
    fn out_of_order_sequence_is_inconsistent() {
        let rec = record();
        let mut events = log(completed_run(&rec.id));
        events.swap(1, 2);
        assert!(reconstruct(&rec, &events).is_err());
    }
}

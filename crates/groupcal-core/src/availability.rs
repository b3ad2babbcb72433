use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::ScheduleError;
use crate::event::{Commitment, EventId, ParticipantId};
use crate::store::{CommitmentMap, EventStore};
use crate::temporal::{Interval, classify};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityRequest {
    pub participants: BTreeSet<ParticipantId>,
    pub interval: Interval,
    // The event being edited; its own commitments never make anyone busy
    pub exclude_event: Option<EventId>,
    // Drop the requester's own entry when the candidate spans whole days
    pub exclude_self_if_all_day: bool,
    pub requester: ParticipantId,
}

impl AvailabilityRequest {
    // Window sent to the store: every whole day the interval touches
    pub fn window(&self) -> Interval {
        self.interval.whole_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantAvailability {
    pub commitments: Vec<Commitment>,
    pub busy: bool,
}

pub type AvailabilityMap = BTreeMap<ParticipantId, ParticipantAvailability>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityOutcome {
    pub map: AvailabilityMap,
    pub warning: Option<ScheduleError>,
}

#[instrument(
    skip(store, request),
    fields(participants = request.participants.len(), exclude = ?request.exclude_event)
)]
pub fn resolve<S>(store: &S, request: &AvailabilityRequest) -> AvailabilityOutcome
where
    S: EventStore + ?Sized,
{
    if request.participants.is_empty() {
        return AvailabilityOutcome::default();
    }
    if !request.interval.is_positive() {
        warn!("availability requested for a non-positive interval; skipping");
        return AvailabilityOutcome::default();
    }

    match store.list_participant_commitments(&request.participants, &request.window()) {
        Ok(commitments) => {
            let map = build_map(request, commitments);
            debug!(
                busy = map.values().filter(|entry| entry.busy).count(),
                "resolved availability"
            );
            AvailabilityOutcome { map, warning: None }
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "availability lookup failed");
            AvailabilityOutcome {
                map: AvailabilityMap::new(),
                warning: Some(ScheduleError::lookup(&err)),
            }
        }
    }
}

pub fn build_map(request: &AvailabilityRequest, mut commitments: CommitmentMap) -> AvailabilityMap {
    let skip_requester =
        request.exclude_self_if_all_day && classify(&request.interval).is_all_day();

    let mut map = AvailabilityMap::new();
    for participant in &request.participants {
        if skip_requester && *participant == request.requester {
            continue;
        }

        let mut entries = commitments.remove(participant).unwrap_or_default();
        if let Some(exclude) = request.exclude_event.as_deref() {
            entries.retain(|commitment| commitment.event_id != exclude);
        }
        entries.sort_by_key(|commitment| commitment.interval.start);

        let busy = entries
            .iter()
            .any(|commitment| commitment.interval.overlaps(&request.interval));
        map.insert(
            participant.clone(),
            ParticipantAvailability {
                commitments: entries,
                busy,
            },
        );
    }

    if !commitments.is_empty() {
        debug!(
            extra = commitments.len(),
            "dropped commitments for unrequested participants"
        );
    }
    map
}

pub fn retain_selected(map: &mut AvailabilityMap, participants: &BTreeSet<ParticipantId>) {
    map.retain(|participant, _| participants.contains(participant));
}

pub fn busy_participants(map: &AvailabilityMap) -> Vec<ParticipantId> {
    map.iter()
        .filter(|(_, entry)| entry.busy)
        .map(|(participant, _)| participant.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CalendarEvent, Visibility};
    use crate::store::MemoryEventStore;
    use crate::testing::{UnreachableStore, at};

    fn event(id: &str, participant: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: "Existing".to_string(),
            interval: Interval::new(at(start), at(end)),
            content: String::new(),
            location: String::new(),
            visibility: Visibility::Public,
            owner: "someone".to_string(),
            resource: None,
            category: None,
            participants: vec![participant.to_string()],
        }
    }

    fn request(participants: &[&str], start: &str, end: &str) -> AvailabilityRequest {
        AvailabilityRequest {
            participants: participants.iter().map(|p| p.to_string()).collect(),
            interval: Interval::new(at(start), at(end)),
            exclude_event: None,
            exclude_self_if_all_day: false,
            requester: "me".to_string(),
        }
    }

    fn store_with_p_busy_nine_to_ten() -> MemoryEventStore {
        let mut store = MemoryEventStore::new("me");
        store.insert(event("E1", "P", "2025-03-10 09:00", "2025-03-10 10:00"));
        store
    }

    #[test]
    fn overlapping_commitment_marks_participant_busy() {
        let store = store_with_p_busy_nine_to_ten();
        let outcome = resolve(&store, &request(&["P"], "2025-03-10 09:30", "2025-03-10 10:30"));
        assert!(outcome.warning.is_none());
        assert!(outcome.map["P"].busy);
    }

    #[test]
    fn touching_commitment_leaves_participant_free() {
        let store = store_with_p_busy_nine_to_ten();
        let outcome = resolve(&store, &request(&["P"], "2025-03-10 10:00", "2025-03-10 11:00"));
        let entry = &outcome.map["P"];
        assert!(!entry.busy);
        assert_eq!(entry.commitments.len(), 1);
    }

    #[test]
    fn excluded_event_never_conflicts_with_itself() {
        let store = store_with_p_busy_nine_to_ten();
        let mut req = request(&["P"], "2025-03-10 09:00", "2025-03-10 10:00");
        req.exclude_event = Some("E1".to_string());
        let outcome = resolve(&store, &req);
        assert!(!outcome.map["P"].busy);
        assert!(outcome.map["P"].commitments.is_empty());
    }

    #[test]
    fn all_day_candidate_can_skip_the_requester() {
        let mut store = store_with_p_busy_nine_to_ten();
        store.insert(event("E2", "me", "2025-03-10 13:00", "2025-03-10 14:00"));
        let mut req = request(&["P", "me"], "2025-03-10 00:00", "2025-03-10 23:59");
        req.exclude_self_if_all_day = true;

        let outcome = resolve(&store, &req);
        assert!(outcome.map.contains_key("P"));
        assert!(!outcome.map.contains_key("me"));

        req.exclude_self_if_all_day = false;
        let outcome = resolve(&store, &req);
        assert!(outcome.map["me"].busy);
    }

    #[test]
    fn unrequested_participants_are_dropped() {
        let req = request(&["P"], "2025-03-10 09:00", "2025-03-10 10:00");
        let mut raw = CommitmentMap::new();
        raw.insert("P".to_string(), vec![]);
        raw.insert("Q".to_string(), vec![]);
        let map = build_map(&req, raw);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["P"]);
    }

    #[test]
    fn lookup_failure_degrades_to_empty_map_with_warning() {
        let outcome = resolve(
            &UnreachableStore,
            &request(&["P"], "2025-03-10 09:00", "2025-03-10 10:00"),
        );
        assert!(outcome.map.is_empty());
        assert_eq!(
            outcome.warning,
            Some(ScheduleError::LookupFailed("directory unreachable".to_string()))
        );
    }

    #[test]
    fn retain_selected_discards_removed_participants() {
        let store = store_with_p_busy_nine_to_ten();
        let mut map = resolve(
            &store,
            &request(&["P", "Q"], "2025-03-10 09:00", "2025-03-10 10:00"),
        )
        .map;
        let still_selected: BTreeSet<ParticipantId> = ["Q".to_string()].into_iter().collect();
        retain_selected(&mut map, &still_selected);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Q"]);
        assert!(busy_participants(&map).is_empty());
    }
}

use std::collections::{BTreeMap, BTreeSet};

use anyhow::anyhow;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::event::{
    CalendarEvent, Commitment, EventId, EventWrite, ParticipantId, Resource, ResourceId,
};
use crate::resource::bookings_conflict;
use crate::temporal::{Interval, format_wire};

pub type CommitmentMap = BTreeMap<ParticipantId, Vec<Commitment>>;

pub trait EventStore {
    fn list_my_events(&self) -> anyhow::Result<Vec<CalendarEvent>>;

    fn create_event(&mut self, write: &EventWrite) -> anyhow::Result<CalendarEvent>;

    fn update_event(&mut self, id: &str, write: &EventWrite) -> anyhow::Result<CalendarEvent>;

    fn delete_event(&mut self, id: &str) -> anyhow::Result<()>;

    // Every commitment of each participant intersecting `window`
    fn list_participant_commitments(
        &self,
        participants: &BTreeSet<ParticipantId>,
        window: &Interval,
    ) -> anyhow::Result<CommitmentMap>;

    fn check_resource_availability(
        &self,
        resource: &str,
        interval: &Interval,
        exclude_event: Option<&str>,
    ) -> anyhow::Result<bool>;

    fn list_available_resources(
        &self,
        interval: &Interval,
        exclude_event: Option<&str>,
    ) -> anyhow::Result<Vec<Resource>>;

    fn list_resources(&self) -> anyhow::Result<Vec<Resource>>;
}

pub fn new_event_id() -> EventId {
    Uuid::new_v4().to_string()
}

pub(crate) fn events_for(events: &[CalendarEvent], user: &str) -> Vec<CalendarEvent> {
    let mut mine: Vec<CalendarEvent> = events
        .iter()
        .filter(|event| event.involves(user))
        .cloned()
        .collect();
    mine.sort_by(|a, b| {
        a.interval
            .start
            .cmp(&b.interval.start)
            .then_with(|| a.title.cmp(&b.title))
    });
    mine
}

pub(crate) fn commitments_in(
    events: &[CalendarEvent],
    participants: &BTreeSet<ParticipantId>,
    window: &Interval,
) -> CommitmentMap {
    let mut out = CommitmentMap::new();
    for participant in participants {
        let entries: Vec<Commitment> = events
            .iter()
            .filter(|event| event.involves(participant) && event.interval.overlaps(window))
            .map(Commitment::from)
            .collect();
        out.insert(participant.clone(), entries);
    }
    out
}

pub(crate) fn resource_bookings<'a>(
    events: &'a [CalendarEvent],
    resource: &'a str,
) -> impl Iterator<Item = Commitment> + 'a {
    events
        .iter()
        .filter(move |event| event.resource.as_deref() == Some(resource))
        .map(Commitment::from)
}

pub(crate) fn find_resource<'a>(
    resources: &'a [Resource],
    id: &str,
) -> anyhow::Result<&'a Resource> {
    resources
        .iter()
        .find(|resource| resource.id == id)
        .ok_or_else(|| anyhow!("unknown resource: {id}"))
}

pub(crate) fn resource_is_free(
    events: &[CalendarEvent],
    resources: &[Resource],
    resource: &str,
    interval: &Interval,
    exclude_event: Option<&str>,
) -> anyhow::Result<bool> {
    find_resource(resources, resource)?;
    Ok(!bookings_conflict(
        resource_bookings(events, resource),
        interval,
        exclude_event,
    ))
}

pub(crate) fn free_resources(
    events: &[CalendarEvent],
    resources: &[Resource],
    interval: &Interval,
    exclude_event: Option<&str>,
) -> Vec<Resource> {
    resources
        .iter()
        .filter(|resource| {
            !bookings_conflict(
                resource_bookings(events, &resource.id),
                interval,
                exclude_event,
            )
        })
        .cloned()
        .collect()
}

// Authoritative checks applied before a write is accepted
pub(crate) fn admit_write(
    events: &[CalendarEvent],
    resources: &[Resource],
    write: &EventWrite,
    replacing: Option<&str>,
) -> anyhow::Result<()> {
    if !write.interval.is_positive() {
        return Err(anyhow!(
            "event must end after it starts ({} .. {})",
            format_wire(write.interval.start),
            format_wire(write.interval.end)
        ));
    }

    if let Some(resource) = write.resource.as_deref()
        && !resource_is_free(events, resources, resource, &write.interval, replacing)?
    {
        return Err(anyhow!(
            "resource {resource} is already booked between {} and {}",
            format_wire(write.interval.start),
            format_wire(write.interval.end)
        ));
    }

    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    user: ParticipantId,
    events: Vec<CalendarEvent>,
    resources: Vec<Resource>,
}

impl MemoryEventStore {
    pub fn new(user: impl Into<ParticipantId>) -> Self {
        Self {
            user: user.into(),
            events: vec![],
            resources: vec![],
        }
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn insert(&mut self, event: CalendarEvent) {
        self.events.retain(|existing| existing.id != event.id);
        self.events.push(event);
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn get(&self, id: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|event| event.id == id)
    }

    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }
}

impl EventStore for MemoryEventStore {
    fn list_my_events(&self) -> anyhow::Result<Vec<CalendarEvent>> {
        Ok(events_for(&self.events, &self.user))
    }

    #[instrument(skip(self, write), fields(title = %write.title))]
    fn create_event(&mut self, write: &EventWrite) -> anyhow::Result<CalendarEvent> {
        admit_write(&self.events, &self.resources, write, None)?;
        let event = CalendarEvent::from_write(new_event_id(), self.user.clone(), write);
        debug!(id = %event.id, "created event in memory store");
        self.events.push(event.clone());
        Ok(event)
    }

    #[instrument(skip(self, write))]
    fn update_event(&mut self, id: &str, write: &EventWrite) -> anyhow::Result<CalendarEvent> {
        admit_write(&self.events, &self.resources, write, Some(id))?;
        let slot = self
            .events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or_else(|| anyhow!("event not found: {id}"))?;
        let replaced = CalendarEvent::from_write(id.to_string(), slot.owner.clone(), write);
        *slot = replaced.clone();
        Ok(replaced)
    }

    #[instrument(skip(self))]
    fn delete_event(&mut self, id: &str) -> anyhow::Result<()> {
        let before = self.events.len();
        self.events.retain(|event| event.id != id);
        if self.events.len() == before {
            return Err(anyhow!("event not found: {id}"));
        }
        Ok(())
    }

    fn list_participant_commitments(
        &self,
        participants: &BTreeSet<ParticipantId>,
        window: &Interval,
    ) -> anyhow::Result<CommitmentMap> {
        Ok(commitments_in(&self.events, participants, window))
    }

    fn check_resource_availability(
        &self,
        resource: &str,
        interval: &Interval,
        exclude_event: Option<&str>,
    ) -> anyhow::Result<bool> {
        resource_is_free(
            &self.events,
            &self.resources,
            resource,
            interval,
            exclude_event,
        )
    }

    fn list_available_resources(
        &self,
        interval: &Interval,
        exclude_event: Option<&str>,
    ) -> anyhow::Result<Vec<Resource>> {
        Ok(free_resources(
            &self.events,
            &self.resources,
            interval,
            exclude_event,
        ))
    }

    fn list_resources(&self) -> anyhow::Result<Vec<Resource>> {
        Ok(self.resources.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::event::Visibility;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").expect("valid datetime")
    }

    fn room(id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            name: format!("Room {id}"),
            capacity: Some(8),
        }
    }

    fn write(title: &str, start: &str, end: &str, resource: Option<&str>) -> EventWrite {
        EventWrite {
            title: title.to_string(),
            interval: Interval::new(at(start), at(end)),
            content: String::new(),
            location: String::new(),
            visibility: Visibility::Public,
            resource: resource.map(str::to_string),
            category: Some("meeting".to_string()),
            participants: vec!["bob".to_string()],
            all_day: false,
        }
    }

    #[test]
    fn rejects_double_booking_but_allows_replacing_self() {
        let mut store = MemoryEventStore::new("alice").with_resources(vec![room("R1")]);
        let first = store
            .create_event(&write("Standup", "2025-03-10 14:00", "2025-03-10 15:00", Some("R1")))
            .expect("first booking");

        let clash = store.create_event(&write(
            "Review",
            "2025-03-10 14:30",
            "2025-03-10 15:30",
            Some("R1"),
        ));
        assert!(clash.is_err());

        let moved = store
            .update_event(
                &first.id,
                &write("Standup", "2025-03-10 14:30", "2025-03-10 15:30", Some("R1")),
            )
            .expect("moving within own slot");
        assert_eq!(moved.owner, "alice");
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn commitments_are_grouped_per_requested_participant() {
        let mut store = MemoryEventStore::new("alice");
        store
            .create_event(&write("Planning", "2025-03-10 09:00", "2025-03-10 10:00", None))
            .expect("create");

        let participants: BTreeSet<ParticipantId> =
            ["bob".to_string(), "carol".to_string()].into_iter().collect();
        let window = Interval::new(at("2025-03-10 00:00"), at("2025-03-11 00:00"));
        let map = store
            .list_participant_commitments(&participants, &window)
            .expect("commitments");

        assert_eq!(map.get("bob").map(Vec::len), Some(1));
        assert_eq!(map.get("carol").map(Vec::len), Some(0));
    }

    #[test]
    fn unknown_resource_is_a_lookup_error() {
        let store = MemoryEventStore::new("alice").with_resources(vec![room("R1")]);
        let interval = Interval::new(at("2025-03-10 09:00"), at("2025-03-10 10:00"));
        assert!(
            store
                .check_resource_availability("R9", &interval, None)
                .is_err()
        );
        assert_eq!(
            store
                .list_available_resources(&interval, None)
                .expect("available rooms")
                .len(),
            1
        );
    }
}

use std::collections::BTreeSet;

use anyhow::anyhow;
use chrono::NaiveDateTime;

use crate::event::{CalendarEvent, EventWrite, ParticipantId, Resource};
use crate::store::{CommitmentMap, EventStore};
use crate::temporal::Interval;

pub fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").expect("valid datetime")
}

pub struct UnreachableStore;

impl EventStore for UnreachableStore {
    fn list_my_events(&self) -> anyhow::Result<Vec<CalendarEvent>> {
        Err(anyhow!("directory unreachable"))
    }

    fn create_event(&mut self, _: &EventWrite) -> anyhow::Result<CalendarEvent> {
        Err(anyhow!("directory unreachable"))
    }

    fn update_event(&mut self, _: &str, _: &EventWrite) -> anyhow::Result<CalendarEvent> {
        Err(anyhow!("directory unreachable"))
    }

    fn delete_event(&mut self, _: &str) -> anyhow::Result<()> {
        Err(anyhow!("directory unreachable"))
    }

    fn list_participant_commitments(
        &self,
        _: &BTreeSet<ParticipantId>,
        _: &Interval,
    ) -> anyhow::Result<CommitmentMap> {
        Err(anyhow!("directory unreachable"))
    }

    fn check_resource_availability(
        &self,
        _: &str,
        _: &Interval,
        _: Option<&str>,
    ) -> anyhow::Result<bool> {
        Err(anyhow!("directory unreachable"))
    }

    fn list_available_resources(
        &self,
        _: &Interval,
        _: Option<&str>,
    ) -> anyhow::Result<Vec<Resource>> {
        Err(anyhow!("directory unreachable"))
    }

    fn list_resources(&self) -> anyhow::Result<Vec<Resource>> {
        Err(anyhow!("directory unreachable"))
    }
}

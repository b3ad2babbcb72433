use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::event::{CalendarEvent, EventWrite, ParticipantId, Resource};
use crate::store::{
    CommitmentMap, EventStore, admit_write, commitments_in, events_for, free_resources,
    new_event_id, resource_is_free,
};
use crate::temporal::Interval;

#[derive(Debug)]
pub struct JsonlEventStore {
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
    pub resources_path: PathBuf,
    user: ParticipantId,
}

impl JsonlEventStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, user: &str) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join("events.data");
        let resources_path = data_dir.join("resources.data");

        if !events_path.exists() {
            fs::write(&events_path, "")?;
        }
        if !resources_path.exists() {
            fs::write(&resources_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            events = %events_path.display(),
            resources = %resources_path.display(),
            user,
            "opened event store"
        );

        Ok(Self {
            data_dir,
            events_path,
            resources_path,
            user: user.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    #[tracing::instrument(skip(self))]
    pub fn load_events(&self) -> anyhow::Result<Vec<CalendarEvent>> {
        load_jsonl(&self.events_path).context("failed to load events.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_resources(&self) -> anyhow::Result<Vec<Resource>> {
        load_jsonl(&self.resources_path).context("failed to load resources.data")
    }

    #[tracing::instrument(skip(self, events))]
    pub fn save_events(&self, events: &[CalendarEvent]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.events_path, events).context("failed to save events.data")
    }

    #[tracing::instrument(skip(self, resources))]
    pub fn save_resources(&self, resources: &[Resource]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.resources_path, resources)
            .context("failed to save resources.data")
    }
}

impl EventStore for JsonlEventStore {
    #[tracing::instrument(skip(self), fields(user = %self.user))]
    fn list_my_events(&self) -> anyhow::Result<Vec<CalendarEvent>> {
        let events = self.load_events()?;
        Ok(events_for(&events, &self.user))
    }

    #[tracing::instrument(skip(self, write), fields(title = %write.title))]
    fn create_event(&mut self, write: &EventWrite) -> anyhow::Result<CalendarEvent> {
        let mut events = self.load_events()?;
        let resources = self.load_resources()?;
        admit_write(&events, &resources, write, None).context("create rejected")?;

        let event = CalendarEvent::from_write(new_event_id(), self.user.clone(), write);
        events.push(event.clone());
        self.save_events(&events)?;
        info!(id = %event.id, "created event");
        Ok(event)
    }

    #[tracing::instrument(skip(self, write))]
    fn update_event(&mut self, id: &str, write: &EventWrite) -> anyhow::Result<CalendarEvent> {
        let mut events = self.load_events()?;
        let resources = self.load_resources()?;
        admit_write(&events, &resources, write, Some(id)).context("update rejected")?;

        let idx = events
            .iter()
            .position(|event| event.id == id)
            .ok_or_else(|| anyhow!("event not found: {id}"))?;
        let replaced = CalendarEvent::from_write(id.to_string(), events[idx].owner.clone(), write);
        events[idx] = replaced.clone();
        self.save_events(&events)?;
        info!(id, "replaced event");
        Ok(replaced)
    }

    #[tracing::instrument(skip(self))]
    fn delete_event(&mut self, id: &str) -> anyhow::Result<()> {
        let events = self.load_events()?;
        let before = events.len();
        let kept: Vec<CalendarEvent> = events.into_iter().filter(|event| event.id != id).collect();
        if kept.len() == before {
            return Err(anyhow!("event not found: {id}"));
        }
        info!(id, "deleted event");
        self.save_events(&kept)
    }

    #[tracing::instrument(skip(self, participants), fields(count = participants.len()))]
    fn list_participant_commitments(
        &self,
        participants: &BTreeSet<ParticipantId>,
        window: &Interval,
    ) -> anyhow::Result<CommitmentMap> {
        let events = self.load_events()?;
        Ok(commitments_in(&events, participants, window))
    }

    #[tracing::instrument(skip(self))]
    fn check_resource_availability(
        &self,
        resource: &str,
        interval: &Interval,
        exclude_event: Option<&str>,
    ) -> anyhow::Result<bool> {
        let events = self.load_events()?;
        let resources = self.load_resources()?;
        resource_is_free(&events, &resources, resource, interval, exclude_event)
    }

    #[tracing::instrument(skip(self))]
    fn list_available_resources(
        &self,
        interval: &Interval,
        exclude_event: Option<&str>,
    ) -> anyhow::Result<Vec<Resource>> {
        let events = self.load_events()?;
        let resources = self.load_resources()?;
        Ok(free_resources(&events, &resources, interval, exclude_event))
    }

    fn list_resources(&self) -> anyhow::Result<Vec<Resource>> {
        self.load_resources()
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

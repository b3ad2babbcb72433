// The composer is the only place candidate
// state is mutated. Queries go out as
// tickets stamped with a generation; an
// answer is applied only while its ticket
// is the latest and its request still
// matches the draft.

use std::collections::BTreeSet;

use chrono::{
  NaiveDate,
  NaiveTime
};
use thiserror::Error;
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::availability::{
  self,
  AvailabilityMap,
  AvailabilityOutcome,
  AvailabilityRequest,
  busy_participants,
  retain_selected
};
use crate::error::{
  Result,
  ScheduleError,
  ValidationIssue
};
use crate::event::{
  CalendarEvent,
  CategoryId,
  EventId,
  EventWrite,
  ParticipantId,
  ResourceId,
  Visibility
};
use crate::resource::{
  self,
  OriginalBooking,
  ResourceCheckRequest,
  ResourceOutcome,
  skip_reason
};
use crate::store::EventStore;
use crate::temporal::{
  Interval,
  end_of_day_minute,
  is_whole_day_span,
  one_hour_later,
  parse_clock_time,
  parse_date
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSettings {
  pub user: ParticipantId,
  pub default_start: NaiveTime,
  pub default_end: NaiveTime,
  pub exclude_self_if_all_day: bool
}

impl Default for DraftSettings {
  fn default() -> Self {
    Self {
      user: "me".to_string(),
      default_start:
        NaiveTime::from_hms_opt(9, 0, 0)
          .unwrap_or(NaiveTime::MIN),
      default_end:
        NaiveTime::from_hms_opt(10, 0, 0)
          .unwrap_or(NaiveTime::MIN),
      exclude_self_if_all_day: true
    }
  }
}

// `interval` is always derived from the
// date/time fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
  title:        String,
  content:      String,
  location:     String,
  start_date:   NaiveDate,
  start_time:   NaiveTime,
  end_date:     NaiveDate,
  end_time:     NaiveTime,
  all_day:      bool,
  interval:     Interval,
  participants: BTreeSet<ParticipantId>,
  resource:     Option<ResourceId>,
  category:     Option<CategoryId>,
  visibility:   Visibility
}

impl Draft {
  fn new(
    start: NaiveDate,
    start_time: NaiveTime,
    end: NaiveDate,
    end_time: NaiveTime
  ) -> Self {
    Self {
      title: String::new(),
      content: String::new(),
      location: String::new(),
      start_date: start,
      start_time,
      end_date: end,
      end_time,
      all_day: false,
      interval: Interval::new(
        start.and_time(start_time),
        end.and_time(end_time)
      ),
      participants: BTreeSet::new(),
      resource: None,
      category: None,
      visibility: Visibility::Public
    }
  }

  fn rederive(&mut self) {
    self.interval = Interval::new(
      self
        .start_date
        .and_time(self.start_time),
      self.end_date.and_time(self.end_time)
    );
  }

  fn assign_interval(
    &mut self,
    interval: Interval
  ) {
    self.start_date = interval.start.date();
    self.start_time = interval.start.time();
    self.end_date = interval.end.date();
    self.end_time = interval.end.time();
    self.interval = interval;
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn content(&self) -> &str {
    &self.content
  }

  pub fn location(&self) -> &str {
    &self.location
  }

  pub fn start_date(&self) -> NaiveDate {
    self.start_date
  }

  pub fn start_time(&self) -> NaiveTime {
    self.start_time
  }

  pub fn end_date(&self) -> NaiveDate {
    self.end_date
  }

  pub fn end_time(&self) -> NaiveTime {
    self.end_time
  }

  pub fn all_day(&self) -> bool {
    self.all_day
  }

  pub fn interval(&self) -> Interval {
    self.interval
  }

  pub fn participants(
    &self
  ) -> &BTreeSet<ParticipantId> {
    &self.participants
  }

  pub fn resource(&self) -> Option<&str> {
    self.resource.as_deref()
  }

  pub fn category(&self) -> Option<&str> {
    self.category.as_deref()
  }

  pub fn visibility(&self) -> Visibility {
    self.visibility
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<R> {
  pub generation: u64,
  pub request:    R
}

pub type AvailabilityTicket =
  Ticket<AvailabilityRequest>;
pub type ResourceTicket =
  Ticket<ResourceCheckRequest>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
  Applied,
  Stale
}

#[derive(Debug, Error)]
#[error("{error}")]
pub struct SubmitRejection {
  pub error: ScheduleError,
  composer:  Box<DraftComposer>
}

impl SubmitRejection {
  pub fn composer(&self) -> &DraftComposer {
    &self.composer
  }

  pub fn into_composer(
    self
  ) -> DraftComposer {
    *self.composer
  }

  pub fn into_parts(
    self
  ) -> (DraftComposer, ScheduleError) {
    (*self.composer, self.error)
  }
}

#[derive(Debug, Clone)]
pub struct DraftComposer {
  settings:         DraftSettings,
  draft:            Draft,
  original:         Option<OriginalBooking>,
  remembered_timed:
    Option<(NaiveTime, NaiveTime)>,

  availability: AvailabilityMap,
  availability_warning: Option<ScheduleError>,
  availability_generation: u64,
  availability_in_flight:
    Option<AvailabilityTicket>,
  last_availability:
    Option<AvailabilityRequest>,

  resource_outcome: Option<ResourceOutcome>,
  resource_generation: u64,
  resource_in_flight: Option<ResourceTicket>,
  last_resource:
    Option<ResourceCheckRequest>
}

impl DraftComposer {
  #[instrument(skip(settings))]
  pub fn create(
    settings: DraftSettings,
    date: NaiveDate
  ) -> Self {
    let draft = Draft::new(
      date,
      settings.default_start,
      date,
      settings.default_end
    );
    let mut composer =
      Self::from_parts(settings, draft, None);
    composer.recompute();
    composer
  }

  #[instrument(skip(settings, event), fields(id = %event.id))]
  pub fn edit(
    settings: DraftSettings,
    event: &CalendarEvent
  ) -> Self {
    let mut draft = Draft::new(
      event.interval.start.date(),
      event.interval.start.time(),
      event.interval.end.date(),
      event.interval.end.time()
    );
    draft.assign_interval(event.interval);
    draft.all_day =
      is_whole_day_span(&event.interval);
    draft.title = event.title.clone();
    draft.content = event.content.clone();
    draft.location = event.location.clone();
    draft.participants = event
      .participants
      .iter()
      .cloned()
      .collect();
    draft.resource = event.resource.clone();
    draft.category = event.category.clone();
    draft.visibility = event.visibility;

    let original = OriginalBooking {
      event_id: event.id.clone(),
      resource: event.resource.clone(),
      interval: event.interval
    };
    let mut composer = Self::from_parts(
      settings,
      draft,
      Some(original)
    );
    composer.recompute();
    composer
  }

  fn from_parts(
    settings: DraftSettings,
    draft: Draft,
    original: Option<OriginalBooking>
  ) -> Self {
    Self {
      settings,
      draft,
      original,
      remembered_timed: None,
      availability: AvailabilityMap::new(),
      availability_warning: None,
      availability_generation: 0,
      availability_in_flight: None,
      last_availability: None,
      resource_outcome: None,
      resource_generation: 0,
      resource_in_flight: None,
      last_resource: None
    }
  }

  pub fn draft(&self) -> &Draft {
    &self.draft
  }

  pub fn is_editing(&self) -> bool {
    self.original.is_some()
  }

  pub fn editing_event_id(
    &self
  ) -> Option<&str> {
    self
      .original
      .as_ref()
      .map(|o| o.event_id.as_str())
  }

  pub fn set_title(
    &mut self,
    title: impl Into<String>
  ) {
    self.draft.title = title.into();
  }

  pub fn set_content(
    &mut self,
    content: impl Into<String>
  ) {
    self.draft.content = content.into();
  }

  pub fn set_location(
    &mut self,
    location: impl Into<String>
  ) {
    self.draft.location = location.into();
  }

  pub fn set_category(
    &mut self,
    category: Option<CategoryId>
  ) {
    self.draft.category = category
      .filter(|c| !c.trim().is_empty());
  }

  pub fn set_visibility(
    &mut self,
    visibility: Visibility
  ) {
    self.draft.visibility = visibility;
  }

  // Re-entering the current date changes
  // nothing, so an inverted range stays
  // visible to validation.
  pub fn set_start_date(
    &mut self,
    date: NaiveDate
  ) {
    if date == self.draft.start_date {
      return;
    }

    self.draft.start_date = date;
    if date > self.draft.end_date {
      self.draft.end_date = date;
    }
    if !self.draft.all_day
      && self.draft.start_date
        == self.draft.end_date
      && self.draft.start_time
        >= self.draft.end_time
    {
      self.draft.end_time =
        one_hour_later(self.draft.start_time);
    }
    self.draft.rederive();
    self.recompute();
  }

  pub fn set_end_date(
    &mut self,
    date: NaiveDate
  ) {
    self.draft.end_date = date;
    self.draft.rederive();
    self.recompute();
  }

  // While all-day, clock edits only update
  // what toggling all-day off restores.
  pub fn set_start_time(
    &mut self,
    time: NaiveTime
  ) {
    if self.draft.all_day {
      let end = self.remembered_end();
      self.remembered_timed =
        Some((time, end));
      return;
    }
    self.draft.start_time = time;
    self.draft.rederive();
    self.recompute();
  }

  pub fn set_end_time(
    &mut self,
    time: NaiveTime
  ) {
    if self.draft.all_day {
      let start = self.remembered_start();
      self.remembered_timed =
        Some((start, time));
      return;
    }
    self.draft.end_time = time;
    self.draft.rederive();
    self.recompute();
  }

  pub fn set_start_date_text(
    &mut self,
    raw: &str
  ) -> Result<()> {
    let date = parse_date(raw)?;
    self.set_start_date(date);
    Ok(())
  }

  pub fn set_end_date_text(
    &mut self,
    raw: &str
  ) -> Result<()> {
    let date = parse_date(raw)?;
    self.set_end_date(date);
    Ok(())
  }

  pub fn set_start_time_text(
    &mut self,
    raw: &str
  ) -> Result<()> {
    let time = parse_clock_time(raw)?;
    self.set_start_time(time);
    Ok(())
  }

  pub fn set_end_time_text(
    &mut self,
    raw: &str
  ) -> Result<()> {
    let time = parse_clock_time(raw)?;
    self.set_end_time(time);
    Ok(())
  }

  // All-day drafts keep their whole-day
  // clock values.
  pub fn set_interval(
    &mut self,
    interval: Interval
  ) {
    self.draft.assign_interval(interval);
    if self.draft.all_day {
      self.draft.start_time = NaiveTime::MIN;
      self.draft.end_time =
        end_of_day_minute();
      self.draft.rederive();
    }
    self.recompute();
  }

  pub fn set_all_day(
    &mut self,
    all_day: bool
  ) {
    if self.draft.all_day == all_day {
      return;
    }

    if all_day {
      self.remembered_timed = Some((
        self.draft.start_time,
        self.draft.end_time
      ));
      self.draft.start_time = NaiveTime::MIN;
      self.draft.end_time =
        end_of_day_minute();
      if let Some(resource) =
        self.draft.resource.take()
      {
        debug!(%resource, "cleared room for all-day draft");
      }
    } else {
      let (start, end) = self
        .remembered_timed
        .take()
        .unwrap_or((
          self.settings.default_start,
          self.settings.default_end
        ));
      self.draft.start_time = start;
      self.draft.end_time = end;
    }
    self.draft.all_day = all_day;
    self.draft.rederive();
    self.recompute();
  }

  pub fn add_participant(
    &mut self,
    participant: impl Into<ParticipantId>
  ) {
    let participant = participant.into();
    if participant.trim().is_empty()
      || !self
        .draft
        .participants
        .insert(participant)
    {
      return;
    }
    self.recompute();
  }

  pub fn remove_participant(
    &mut self,
    participant: &str
  ) {
    if self
      .draft
      .participants
      .remove(participant)
    {
      self.recompute();
    }
  }

  pub fn set_participants<I>(
    &mut self,
    participants: I
  ) where
    I: IntoIterator<Item = ParticipantId>
  {
    let next: BTreeSet<ParticipantId> =
      participants
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
    if next != self.draft.participants {
      self.draft.participants = next;
      self.recompute();
    }
  }

  // False when the draft is all-day.
  pub fn set_resource(
    &mut self,
    resource: Option<ResourceId>
  ) -> bool {
    let resource = resource
      .filter(|r| !r.trim().is_empty());
    if self.draft.all_day
      && resource.is_some()
    {
      debug!(
        "ignored room selection on \
         all-day draft"
      );
      return false;
    }
    if self.draft.resource != resource {
      self.draft.resource = resource;
      self.recompute();
    }
    true
  }

  fn remembered_start(&self) -> NaiveTime {
    self.remembered_timed.map_or(
      self.settings.default_start,
      |(start, _)| start
    )
  }

  fn remembered_end(&self) -> NaiveTime {
    self.remembered_timed.map_or(
      self.settings.default_end,
      |(_, end)| end
    )
  }

  fn recompute(&mut self) {
    retain_selected(
      &mut self.availability,
      &self.draft.participants
    );
    self.dispatch_availability();
    self.dispatch_resource();
  }

  fn exclude_event(
    &self
  ) -> Option<EventId> {
    self
      .original
      .as_ref()
      .map(|o| o.event_id.clone())
  }

  fn availability_request(
    &self
  ) -> Option<AvailabilityRequest> {
    if self.draft.participants.is_empty()
      || !self.draft.interval.is_positive()
    {
      return None;
    }
    Some(AvailabilityRequest {
      participants: self
        .draft
        .participants
        .clone(),
      interval: self.draft.interval,
      exclude_event: self.exclude_event(),
      exclude_self_if_all_day: self
        .settings
        .exclude_self_if_all_day,
      requester: self.settings.user.clone()
    })
  }

  fn dispatch_availability(&mut self) {
    let request =
      self.availability_request();
    if request == self.last_availability {
      return;
    }

    self.availability_generation += 1;
    self.last_availability = request.clone();
    match request {
      | Some(request) => {
        debug!(
          generation = self.availability_generation,
          participants = request.participants.len(),
          "dispatching availability query"
        );
        self.availability_in_flight =
          Some(Ticket {
            generation: self
              .availability_generation,
            request
          });
      }
      | None => {
        self.availability_in_flight = None;
        self.availability.clear();
        self.availability_warning = None;
      }
    }
  }

  fn dispatch_resource(&mut self) {
    let skipped = skip_reason(
      self.draft.all_day,
      self.draft.resource.as_deref(),
      &self.draft.interval,
      self.original.as_ref()
    );

    if let Some(reason) = skipped {
      let outcome =
        ResourceOutcome::Skipped(reason);
      if self.last_resource.is_some()
        || self.resource_outcome.as_ref()
          != Some(&outcome)
      {
        self.resource_generation += 1;
        self.last_resource = None;
        self.resource_in_flight = None;
        self.resource_outcome = Some(outcome);
      }
      return;
    }

    let Some(resource) =
      self.draft.resource.clone()
    else {
      return;
    };
    let request = ResourceCheckRequest {
      resource,
      interval: self.draft.interval,
      exclude_event: self.exclude_event()
    };
    if self.last_resource.as_ref()
      == Some(&request)
    {
      return;
    }

    self.resource_generation += 1;
    debug!(
      generation = self.resource_generation,
      resource = %request.resource,
      "dispatching room check"
    );
    self.last_resource = Some(request.clone());
    self.resource_outcome = None;
    self.resource_in_flight = Some(Ticket {
      generation: self.resource_generation,
      request
    });
  }

  pub fn availability_ticket(
    &self
  ) -> Option<&AvailabilityTicket> {
    self.availability_in_flight.as_ref()
  }

  pub fn resource_ticket(
    &self
  ) -> Option<&ResourceTicket> {
    self.resource_in_flight.as_ref()
  }

  pub fn deliver_availability(
    &mut self,
    ticket: &AvailabilityTicket,
    outcome: AvailabilityOutcome
  ) -> Delivery {
    let current =
      self.availability_in_flight.as_ref();
    if ticket.generation
      != self.availability_generation
      || current.map(|t| &t.request)
        != Some(&ticket.request)
    {
      debug!(
        generation = ticket.generation,
        latest = self.availability_generation,
        "discarding stale availability response"
      );
      return Delivery::Stale;
    }

    self.availability_in_flight = None;
    let mut map = outcome.map;
    retain_selected(
      &mut map,
      &self.draft.participants
    );
    self.availability = map;
    self.availability_warning =
      outcome.warning;
    Delivery::Applied
  }

  pub fn deliver_resource(
    &mut self,
    ticket: &ResourceTicket,
    outcome: ResourceOutcome
  ) -> Delivery {
    let current =
      self.resource_in_flight.as_ref();
    if ticket.generation
      != self.resource_generation
      || current.map(|t| &t.request)
        != Some(&ticket.request)
    {
      debug!(
        generation = ticket.generation,
        latest = self.resource_generation,
        "discarding stale room check"
      );
      return Delivery::Stale;
    }

    self.resource_in_flight = None;
    self.resource_outcome = Some(outcome);
    Delivery::Applied
  }

  pub fn sync<S>(&mut self, store: &S)
  where
    S: EventStore + ?Sized
  {
    if let Some(ticket) =
      self.availability_in_flight.clone()
    {
      let outcome = availability::resolve(
        store,
        &ticket.request
      );
      self
        .deliver_availability(&ticket, outcome);
    }
    if let Some(ticket) =
      self.resource_in_flight.clone()
    {
      let outcome =
        resource::check(store, &ticket.request);
      self.deliver_resource(&ticket, outcome);
    }
  }

  pub fn availability(
    &self
  ) -> &AvailabilityMap {
    &self.availability
  }

  pub fn busy_participants(
    &self
  ) -> Vec<ParticipantId> {
    busy_participants(&self.availability)
  }

  // None while a room check is
  // outstanding.
  pub fn resource_outcome(
    &self
  ) -> Option<&ResourceOutcome> {
    self.resource_outcome.as_ref()
  }

  pub fn resource_available(&self) -> bool {
    self
      .resource_outcome
      .as_ref()
      .is_none_or(ResourceOutcome::available)
  }

  pub fn lookup_warnings(
    &self
  ) -> Vec<&ScheduleError> {
    self
      .availability_warning
      .iter()
      .chain(
        self
          .resource_outcome
          .as_ref()
          .and_then(ResourceOutcome::warning)
      )
      .collect()
  }

  pub fn has_pending_queries(&self) -> bool {
    self.availability_in_flight.is_some()
      || self.resource_in_flight.is_some()
  }

  pub fn validate(
    &self
  ) -> Vec<ValidationIssue> {
    let mut issues = vec![];
    if self.draft.title.trim().is_empty() {
      issues
        .push(ValidationIssue::MissingTitle);
    }
    if self.draft.category.is_none() {
      issues.push(
        ValidationIssue::MissingCategory
      );
    }
    if !self.draft.interval.is_positive() {
      issues.push(
        ValidationIssue::NonPositiveInterval
      );
    }
    if !self.draft.all_day
      && self.draft.resource.is_some()
      && matches!(
        self.resource_outcome,
        Some(ResourceOutcome::Conflict)
      )
    {
      issues.push(
        ValidationIssue::ResourceConflict
      );
    }
    issues
  }

  pub fn to_write(&self) -> EventWrite {
    EventWrite {
      title: self
        .draft
        .title
        .trim()
        .to_string(),
      interval: self.draft.interval,
      content: self.draft.content.clone(),
      location: self.draft.location.clone(),
      visibility: self.draft.visibility,
      resource: if self.draft.all_day {
        None
      } else {
        self.draft.resource.clone()
      },
      category: self.draft.category.clone(),
      participants: self
        .draft
        .participants
        .iter()
        .cloned()
        .collect(),
      all_day: self.draft.all_day
    }
  }

  // Outstanding queries are answered first
  // so validation sees the current room
  // state.
  #[instrument(skip(
    self,
    store
  ), fields(editing = ?self.editing_event_id()))]
  pub fn submit<S>(
    mut self,
    store: &mut S
  ) -> std::result::Result<
    CalendarEvent,
    SubmitRejection
  >
  where
    S: EventStore + ?Sized
  {
    self.sync(&*store);

    let issues = self.validate();
    if !issues.is_empty() {
      debug!(?issues, "draft failed validation");
      return Err(self.reject(
        ScheduleError::ValidationFailed(
          issues
        )
      ));
    }

    let write = self.to_write();
    let stored = match self.original.as_ref()
    {
      | Some(original) => {
        store.update_event(
          &original.event_id,
          &write
        )
      }
      | None => store.create_event(&write)
    };

    match stored {
      | Ok(event) => {
        info!(id = %event.id, "draft submitted");
        Ok(event)
      }
      | Err(err) => {
        warn!(error = %format!("{err:#}"), "store rejected draft");
        Err(self.reject(
          ScheduleError::submit(&err)
        ))
      }
    }
  }

  pub fn cancel(self) {
    info!(editing = ?self.editing_event_id(), "draft discarded");
  }

  fn reject(
    self,
    error: ScheduleError
  ) -> SubmitRejection {
    SubmitRejection {
      error,
      composer: Box::new(self)
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDateTime;

  use super::*;
  use crate::event::Resource;
  use crate::resource::SkipReason;
  use crate::store::MemoryEventStore;
  use crate::testing::{
    UnreachableStore,
    at
  };

  fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(
      raw, "%Y-%m-%d"
    )
    .expect("valid date")
  }

  fn clock(raw: &str) -> NaiveTime {
    NaiveTime::parse_from_str(raw, "%H:%M")
      .expect("valid time")
  }

  fn room(id: &str) -> Resource {
    Resource {
      id:       id.to_string(),
      name:     format!("Room {id}"),
      capacity: Some(6)
    }
  }

  fn existing(
    id: &str,
    start: &str,
    end: &str
  ) -> CalendarEvent {
    CalendarEvent {
      id:           id.to_string(),
      title:        "Design review"
        .to_string(),
      interval:     Interval::new(
        at(start),
        at(end)
      ),
      content:      String::new(),
      location:     String::new(),
      visibility:   Visibility::Public,
      owner:        "me".to_string(),
      resource:     None,
      category:     Some(
        "meeting".to_string()
      ),
      participants: vec![]
    }
  }

  fn composer_on(
    date: &str
  ) -> DraftComposer {
    let mut composer =
      DraftComposer::create(
        DraftSettings::default(),
        day(date)
      );
    composer.set_title("Planning");
    composer.set_category(Some(
      "meeting".to_string()
    ));
    composer
  }

  fn interval_of(
    composer: &DraftComposer
  ) -> (NaiveDateTime, NaiveDateTime) {
    let interval =
      composer.draft().interval();
    (interval.start, interval.end)
  }

  fn booked_room_store() -> MemoryEventStore
  {
    let mut store =
      MemoryEventStore::new("me")
        .with_resources(vec![
          room("R1"),
          room("R2")
        ]);
    let mut booked = existing(
      "E9",
      "2025-03-10 09:30",
      "2025-03-10 10:30"
    );
    booked.resource = Some("R1".to_string());
    store.insert(booked);
    store
  }

  #[test]
  fn new_draft_uses_default_slot() {
    let composer = composer_on("2025-03-10");
    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-10 09:00"),
        at("2025-03-10 10:00")
      )
    );
    assert!(!composer.has_pending_queries());
    assert!(composer.resource_available());
  }

  #[test]
  fn end_before_start_fails_validation() {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_end_time(clock("08:30"));
    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-10 09:00"),
        at("2025-03-10 08:30")
      )
    );

    let mut store =
      MemoryEventStore::new("me");
    let rejection = composer
      .submit(&mut store)
      .expect_err("must not submit");
    assert_eq!(
      rejection.error,
      ScheduleError::ValidationFailed(vec![
        ValidationIssue::NonPositiveInterval
      ])
    );
    assert!(store.events().is_empty());
    assert_eq!(
      rejection.composer().draft().end_time(),
      clock("08:30")
    );
  }

  #[test]
  fn reentering_the_same_start_date_keeps_the_end()
  {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_end_time(clock("08:30"));
    let pending =
      composer.availability_ticket().cloned();

    composer.set_start_date(day("2025-03-10"));
    composer
      .set_start_date_text("2025-03-10")
      .expect("valid date");
    assert_eq!(
      composer.draft().end_time(),
      clock("08:30")
    );
    assert_eq!(
      composer.validate(),
      vec![ValidationIssue::NonPositiveInterval]
    );
    assert_eq!(
      composer.availability_ticket().cloned(),
      pending
    );
  }

  #[test]
  fn missing_title_and_category_are_reported_together()
  {
    let composer = DraftComposer::create(
      DraftSettings::default(),
      day("2025-03-10")
    );
    assert_eq!(
      composer.validate(),
      vec![
        ValidationIssue::MissingTitle,
        ValidationIssue::MissingCategory
      ]
    );
  }

  #[test]
  fn all_day_on_snaps_interval_and_clears_room()
  {
    let mut composer =
      composer_on("2025-03-10");
    assert!(composer.set_resource(Some(
      "R1".to_string()
    )));
    composer.set_all_day(true);

    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-10 00:00"),
        at("2025-03-10 23:59")
      )
    );
    assert_eq!(composer.draft().resource(), None);
    assert!(!composer.set_resource(Some(
      "R1".to_string()
    )));
    assert!(composer.resource_ticket().is_none());
  }

  #[test]
  fn all_day_off_restores_previous_times() {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_start_time(clock("13:15"));
    composer.set_end_time(clock("14:45"));

    composer.set_all_day(true);
    composer.set_all_day(false);
    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-10 13:15"),
        at("2025-03-10 14:45")
      )
    );
  }

  #[test]
  fn all_day_off_without_history_uses_defaults()
  {
    let event = existing(
      "E1",
      "2025-03-10 00:00",
      "2025-03-11 23:59"
    );
    let mut composer = DraftComposer::edit(
      DraftSettings::default(),
      &event
    );
    assert!(composer.draft().all_day());

    composer.set_all_day(false);
    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-10 09:00"),
        at("2025-03-11 10:00")
      )
    );
  }

  #[test]
  fn combined_interval_and_fields_stay_in_sync()
  {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_interval(Interval::new(
      at("2025-03-12 15:00"),
      at("2025-03-13 11:30")
    ));
    let draft = composer.draft();
    assert_eq!(
      draft.start_date(),
      day("2025-03-12")
    );
    assert_eq!(
      draft.start_time(),
      clock("15:00")
    );
    assert_eq!(
      draft.end_date(),
      day("2025-03-13")
    );
    assert_eq!(
      draft.end_time(),
      clock("11:30")
    );

    composer.set_end_date(day("2025-03-14"));
    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-12 15:00"),
        at("2025-03-14 11:30")
      )
    );
  }

  #[test]
  fn moving_start_past_end_advances_end() {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_start_time(clock("16:00"));
    composer.set_end_date(day("2025-03-11"));
    composer.set_end_time(clock("10:00"));

    composer.set_start_date(day("2025-03-12"));
    assert_eq!(
      composer.draft().end_date(),
      day("2025-03-12")
    );
    assert_eq!(
      interval_of(&composer),
      (
        at("2025-03-12 16:00"),
        at("2025-03-12 17:00")
      )
    );
  }

  #[test]
  fn end_time_advance_wraps_past_midnight() {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_end_date(day("2025-03-11"));
    composer.set_start_time(clock("23:30"));
    composer.set_end_time(clock("01:00"));

    composer.set_start_date(day("2025-03-11"));
    assert_eq!(
      composer.draft().end_time(),
      clock("00:30")
    );
    assert_eq!(
      composer.validate(),
      vec![ValidationIssue::NonPositiveInterval]
    );
  }

  #[test]
  fn bad_text_input_leaves_draft_untouched() {
    let mut composer =
      composer_on("2025-03-10");
    let before = composer.draft().clone();

    assert!(matches!(
      composer.set_start_date_text("2025-13-01"),
      Err(ScheduleError::InvalidFormat(_))
    ));
    assert!(matches!(
      composer.set_end_time_text("24:10"),
      Err(ScheduleError::InvalidFormat(_))
    ));
    assert_eq!(composer.draft(), &before);

    composer
      .set_end_time_text("11:00")
      .expect("valid time");
    assert_eq!(
      composer.draft().end_time(),
      clock("11:00")
    );
  }

  #[test]
  fn participant_changes_dispatch_and_resolve_availability()
  {
    let mut store =
      MemoryEventStore::new("me");
    let mut busy = existing(
      "E1",
      "2025-03-10 09:00",
      "2025-03-10 10:00"
    );
    busy.participants = vec!["P".to_string()];
    store.insert(busy);

    let mut composer =
      composer_on("2025-03-10");
    composer.set_start_time(clock("09:30"));
    composer.set_end_time(clock("10:30"));
    composer.add_participant("P");
    composer.add_participant("Q");
    assert!(
      composer.availability_ticket().is_some()
    );

    composer.sync(&store);
    assert_eq!(
      composer.busy_participants(),
      vec!["P".to_string()]
    );
    assert!(!composer.has_pending_queries());

    composer.remove_participant("P");
    assert!(
      !composer.availability().contains_key("P")
    );
    assert!(
      composer.availability().contains_key("Q")
    );
  }

  #[test]
  fn identical_request_is_not_redispatched() {
    let mut composer =
      composer_on("2025-03-10");
    composer.add_participant("P");
    let first = composer
      .availability_ticket()
      .cloned()
      .expect("ticket");

    composer.set_title("Renamed");
    composer.set_end_time(clock("10:00"));
    assert_eq!(
      composer.availability_ticket(),
      Some(&first)
    );
  }

  #[test]
  fn out_of_order_availability_responses_are_discarded()
  {
    let mut store =
      MemoryEventStore::new("me");
    let mut busy = existing(
      "E1",
      "2025-03-10 09:00",
      "2025-03-10 10:00"
    );
    busy.participants = vec!["P".to_string()];
    store.insert(busy);

    let mut composer =
      composer_on("2025-03-10");
    composer.add_participant("P");
    let slow = composer
      .availability_ticket()
      .cloned()
      .expect("first ticket");

    composer.set_start_time(clock("10:00"));
    composer.set_end_time(clock("11:00"));
    let fast = composer
      .availability_ticket()
      .cloned()
      .expect("second ticket");
    assert!(fast.generation > slow.generation);

    let fast_answer = availability::resolve(
      &store,
      &fast.request
    );
    assert_eq!(
      composer
        .deliver_availability(&fast, fast_answer),
      Delivery::Applied
    );
    assert!(
      composer.busy_participants().is_empty()
    );

    let slow_answer = availability::resolve(
      &store,
      &slow.request
    );
    assert_eq!(
      composer
        .deliver_availability(&slow, slow_answer),
      Delivery::Stale
    );
    assert!(
      composer.busy_participants().is_empty()
    );
  }

  #[test]
  fn response_for_returning_parameters_is_still_stale()
  {
    let store = MemoryEventStore::new("me");
    let mut composer =
      composer_on("2025-03-10");
    composer.add_participant("P");
    let first = composer
      .availability_ticket()
      .cloned()
      .expect("ticket");

    composer.set_end_time(clock("11:00"));
    composer.set_end_time(clock("10:00"));
    let latest = composer
      .availability_ticket()
      .cloned()
      .expect("ticket");
    assert_eq!(latest.request, first.request);

    let answer = availability::resolve(
      &store,
      &first.request
    );
    assert_eq!(
      composer.deliver_availability(&first, answer),
      Delivery::Stale
    );
    assert!(
      composer.availability_ticket().is_some()
    );
  }

  #[test]
  fn room_conflict_blocks_submit() {
    let mut store = booked_room_store();

    let mut composer =
      composer_on("2025-03-10");
    composer
      .set_resource(Some("R1".to_string()));
    assert!(composer.resource_outcome().is_none());

    let rejection = composer
      .submit(&mut store)
      .expect_err("room is taken");
    assert_eq!(
      rejection.error,
      ScheduleError::ValidationFailed(vec![
        ValidationIssue::ResourceConflict
      ])
    );

    let mut composer =
      rejection.into_composer();
    composer.set_start_time(clock("11:00"));
    composer.set_end_time(clock("12:00"));
    let event = composer
      .submit(&mut store)
      .expect("free slot");
    assert_eq!(
      event.resource.as_deref(),
      Some("R1")
    );
    assert_eq!(event.owner, "me");
  }

  #[test]
  fn earlier_room_answer_arriving_last_is_discarded()
  {
    let store = booked_room_store();
    let mut composer =
      composer_on("2025-03-10");

    composer
      .set_resource(Some("R1".to_string()));
    let first = composer
      .resource_ticket()
      .cloned()
      .expect("R1 ticket");
    composer
      .set_resource(Some("R2".to_string()));
    let second = composer
      .resource_ticket()
      .cloned()
      .expect("R2 ticket");
    assert!(second.generation > first.generation);

    let second_answer =
      resource::check(&store, &second.request);
    assert_eq!(
      composer
        .deliver_resource(&second, second_answer),
      Delivery::Applied
    );
    assert_eq!(
      composer.resource_outcome(),
      Some(&ResourceOutcome::Available)
    );

    let first_answer =
      resource::check(&store, &first.request);
    assert_eq!(
      first_answer,
      ResourceOutcome::Conflict
    );
    assert_eq!(
      composer
        .deliver_resource(&first, first_answer),
      Delivery::Stale
    );
    assert_eq!(
      composer.resource_outcome(),
      Some(&ResourceOutcome::Available)
    );
    assert!(composer.validate().is_empty());
  }

  #[test]
  fn room_answer_after_all_day_toggle_is_discarded()
  {
    let store = booked_room_store();
    let mut composer =
      composer_on("2025-03-10");

    composer
      .set_resource(Some("R1".to_string()));
    let ticket = composer
      .resource_ticket()
      .cloned()
      .expect("R1 ticket");
    composer.set_all_day(true);
    assert!(composer.resource_ticket().is_none());

    let answer =
      resource::check(&store, &ticket.request);
    assert_eq!(
      composer.deliver_resource(&ticket, answer),
      Delivery::Stale
    );
    assert_eq!(
      composer.resource_outcome(),
      Some(&ResourceOutcome::Skipped(
        SkipReason::AllDay
      ))
    );
    assert!(composer.resource_available());
  }

  #[test]
  fn unchanged_edit_never_checks_the_room() {
    let mut event = existing(
      "E5",
      "2025-03-10 14:00",
      "2025-03-10 15:00"
    );
    event.resource = Some("R".to_string());

    let mut composer = DraftComposer::edit(
      DraftSettings::default(),
      &event
    );
    composer
      .set_title("Design review (moved agenda)");
    assert!(composer.resource_ticket().is_none());
    assert_eq!(
      composer.resource_outcome(),
      Some(&ResourceOutcome::Skipped(
        SkipReason::Unchanged
      ))
    );
    assert!(composer.resource_available());

    composer.set_end_time(clock("15:30"));
    let ticket = composer
      .resource_ticket()
      .cloned()
      .expect("ticket");
    assert_eq!(
      ticket.request.exclude_event.as_deref(),
      Some("E5")
    );
  }

  #[test]
  fn lookup_failures_warn_but_do_not_block() {
    let mut composer =
      composer_on("2025-03-10");
    composer.add_participant("P");
    composer
      .set_resource(Some("R1".to_string()));
    composer.sync(&UnreachableStore);

    assert!(composer.availability().is_empty());
    assert!(composer.resource_available());
    assert_eq!(
      composer.lookup_warnings().len(),
      2
    );
    assert!(composer.validate().is_empty());
  }

  #[test]
  fn store_rejection_keeps_the_draft() {
    let mut composer =
      composer_on("2025-03-10");
    composer.set_location("Lobby");
    let rejection = composer
      .submit(&mut UnreachableStore)
      .expect_err("store is down");
    assert!(matches!(
      rejection.error,
      ScheduleError::SubmitFailed(_)
    ));

    let (composer, _) = rejection.into_parts();
    assert_eq!(
      composer.draft().location(),
      "Lobby"
    );
    assert_eq!(
      composer.draft().title(),
      "Planning"
    );
  }

  #[test]
  fn editing_replaces_the_stored_event() {
    let mut store =
      MemoryEventStore::new("me");
    let event = existing(
      "E1",
      "2025-03-10 09:00",
      "2025-03-10 10:00"
    );
    store.insert(event.clone());

    let mut composer = DraftComposer::edit(
      DraftSettings::default(),
      &event
    );
    composer
      .set_visibility(Visibility::Private);
    composer.set_start_date(day("2025-03-11"));
    let stored = composer
      .submit(&mut store)
      .expect("update");

    assert_eq!(stored.id, "E1");
    assert_eq!(store.events().len(), 1);
    let replaced =
      store.get("E1").expect("still stored");
    assert_eq!(
      replaced.visibility,
      Visibility::Private
    );
    assert_eq!(
      replaced.interval.start,
      at("2025-03-11 09:00")
    );
  }
}

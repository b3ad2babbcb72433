use chrono::NaiveDate;
use serde::Serialize;
use tracing::{
  debug,
  instrument
};

use crate::event::{
  CalendarEvent,
  EventId
};
use crate::temporal::{
  DisplayBounds,
  Interval,
  add_days,
  display_bounds
};

pub const BUSY_TITLE: &str = "Busy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaEntry {
  pub event_id: EventId,
  pub title:    String,
  pub location: String,
  pub interval: Interval,
  pub bounds:   DisplayBounds,
  pub all_day:  bool,
  // Private event of someone else; only
  // the time is shown
  pub masked:   bool
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaDay {
  pub date:    NaiveDate,
  pub entries: Vec<AgendaEntry>
}

fn entry_for(
  event: &CalendarEvent,
  viewer: &str
) -> AgendaEntry {
  let classification =
    event.classification();
  let masked = event.is_hidden_from(viewer);
  AgendaEntry {
    event_id: event.id.clone(),
    title: if masked {
      BUSY_TITLE.to_string()
    } else {
      event.title.clone()
    },
    location: if masked {
      String::new()
    } else {
      event.location.clone()
    },
    interval: event.interval,
    bounds: display_bounds(
      &event.interval,
      classification
    ),
    all_day: classification.is_all_day(),
    masked
  }
}

#[instrument(skip(
  events,
  viewer
), fields(events = events.len()))]
pub fn build_agenda(
  events: &[CalendarEvent],
  viewer: &str,
  from: NaiveDate,
  until: NaiveDate
) -> Vec<AgendaDay> {
  let mut days: Vec<AgendaDay> = Vec::new();
  if until < from {
    return days;
  }

  let entries: Vec<AgendaEntry> = events
    .iter()
    .filter(|event| {
      event.interval.is_positive()
    })
    .map(|event| entry_for(event, viewer))
    .collect();

  let mut day = from;
  while day <= until {
    let mut todays: Vec<AgendaEntry> =
      entries
        .iter()
        .filter(|entry| {
          entry.bounds.first_day() <= day
            && day <= entry.bounds.last_day()
        })
        .cloned()
        .collect();

    if !todays.is_empty() {
      todays.sort_by(|a, b| {
        b.all_day
          .cmp(&a.all_day)
          .then_with(|| {
            a.interval
              .start
              .cmp(&b.interval.start)
          })
          .then_with(|| a.title.cmp(&b.title))
      });
      days.push(AgendaDay {
        date:    day,
        entries: todays
      });
    }

    let next = add_days(day, 1);
    if next == day {
      break;
    }
    day = next;
  }

  debug!(days = days.len(), "built agenda");
  days
}

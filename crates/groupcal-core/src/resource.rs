use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::ScheduleError;
use crate::event::{Commitment, EventId, Resource, ResourceId};
use crate::store::EventStore;
use crate::temporal::Interval;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCheckRequest {
    pub resource: ResourceId,
    pub interval: Interval,
    pub exclude_event: Option<EventId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalBooking {
    pub event_id: EventId,
    pub resource: Option<ResourceId>,
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NoResource,
    AllDay,
    Unchanged,
    // End is not after start; validation reports it instead
    InvalidInterval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    Skipped(SkipReason),
    Available,
    Conflict,
    // Lookup failed; treated as available, the store decides at submit
    Degraded(ScheduleError),
}

impl ResourceOutcome {
    pub fn available(&self) -> bool {
        !matches!(self, Self::Conflict)
    }

    pub fn warning(&self) -> Option<&ScheduleError> {
        match self {
            Self::Degraded(err) => Some(err),
            _ => None,
        }
    }
}

pub fn skip_reason(
    all_day: bool,
    resource: Option<&str>,
    interval: &Interval,
    original: Option<&OriginalBooking>,
) -> Option<SkipReason> {
    if all_day {
        return Some(SkipReason::AllDay);
    }
    let Some(resource) = resource.filter(|id| !id.trim().is_empty()) else {
        return Some(SkipReason::NoResource);
    };
    if !interval.is_positive() {
        return Some(SkipReason::InvalidInterval);
    }
    if let Some(original) = original
        && original.resource.as_deref() == Some(resource)
        && original.interval == *interval
    {
        return Some(SkipReason::Unchanged);
    }
    None
}

pub fn bookings_conflict<I>(bookings: I, interval: &Interval, exclude_event: Option<&str>) -> bool
where
    I: IntoIterator<Item = Commitment>,
{
    bookings
        .into_iter()
        .filter(|booking| Some(booking.event_id.as_str()) != exclude_event)
        .any(|booking| booking.interval.overlaps(interval))
}

#[instrument(skip(store, request), fields(resource = %request.resource))]
pub fn check<S>(store: &S, request: &ResourceCheckRequest) -> ResourceOutcome
where
    S: EventStore + ?Sized,
{
    match store.check_resource_availability(
        &request.resource,
        &request.interval,
        request.exclude_event.as_deref(),
    ) {
        Ok(true) => ResourceOutcome::Available,
        Ok(false) => {
            debug!("resource already booked");
            ResourceOutcome::Conflict
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "resource lookup failed; assuming available");
            ResourceOutcome::Degraded(ScheduleError::lookup(&err))
        }
    }
}

#[instrument(skip(store))]
pub fn available_resources<S>(
    store: &S,
    interval: &Interval,
    exclude_event: Option<&str>,
) -> (Vec<Resource>, Option<ScheduleError>)
where
    S: EventStore + ?Sized,
{
    match store.list_available_resources(interval, exclude_event) {
        Ok(resources) => (resources, None),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "room listing failed");
            (vec![], Some(ScheduleError::lookup(&err)))
        }
    }
}

use std::collections::BTreeSet;

use anyhow::{Context, anyhow, bail};
use chrono::{NaiveDate, Timelike};
use tracing::{debug, info, instrument, warn};

use crate::agenda::build_agenda;
use crate::availability::{self, AvailabilityRequest};
use crate::cli::{
    AgendaArgs, AvailabilityArgs, Command, DraftArgs, RangeArgs, RoomArgs, ViewStep,
};
use crate::config::EngineSettings;
use crate::datastore::JsonlEventStore;
use crate::draft::DraftComposer;
use crate::error::{ScheduleError, ValidationIssue};
use crate::event::Visibility;
use crate::navigator::{FileAnchorStorage, Transition, ViewMode, ViewNavigator, visible_range};
use crate::render::{Renderer, RoomRow};
use crate::resource;
use crate::store::EventStore;
use crate::temporal::{
    Interval, LocalFields, one_hour_later, parse_clock_time, parse_date, to_wire, today_in,
};

#[instrument(skip(store, settings, renderer, command))]
pub fn dispatch(
    store: &mut JsonlEventStore,
    settings: &EngineSettings,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let today = today_in(settings.timezone);
    debug!(%today, timezone = %settings.timezone, "dispatching command");

    match command {
        Command::Agenda(args) => cmd_agenda(store, settings, renderer, &args, today),
        Command::Add(args) => cmd_add(store, settings, renderer, &args, today),
        Command::Edit { id, draft } => cmd_edit(store, settings, renderer, &id, &draft),
        Command::Delete { id } => cmd_delete(store, &id),
        Command::Availability(args) => cmd_availability(store, settings, renderer, &args),
        Command::Rooms(args) => cmd_rooms(store, renderer, &args),
        Command::View { action } => cmd_view(store, settings, renderer, action.step(), today),
    }
}

fn cmd_agenda(
    store: &JsonlEventStore,
    settings: &EngineSettings,
    renderer: &Renderer,
    args: &AgendaArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let range = match args.date.as_deref() {
        Some(raw) => visible_range(ViewMode::Agenda, parse_date(raw)?, settings.week_start),
        None => {
            let nav = ViewNavigator::open(FileAnchorStorage::in_dir(&store.data_dir), today);
            nav.visible_range(settings.week_start)
        }
    };

    let events = store.list_my_events()?;
    let days = build_agenda(&events, store.user(), range.first, range.last);
    renderer.print_agenda(&days)
}

fn cmd_add(
    store: &mut JsonlEventStore,
    settings: &EngineSettings,
    renderer: &Renderer,
    args: &DraftArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let date = match args.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => today,
    };
    let mut composer = DraftComposer::create(settings.draft.clone(), date);
    apply_draft_args(&mut composer, args)?;
    submit(store, renderer, composer)
}

fn cmd_edit(
    store: &mut JsonlEventStore,
    settings: &EngineSettings,
    renderer: &Renderer,
    id: &str,
    args: &DraftArgs,
) -> anyhow::Result<()> {
    let event = store
        .list_my_events()?
        .into_iter()
        .find(|event| event.id == id)
        .ok_or_else(|| anyhow!("event not found: {id}"))?;

    let mut composer = DraftComposer::edit(settings.draft.clone(), &event);
    apply_draft_args(&mut composer, args)?;
    submit(store, renderer, composer)
}

fn cmd_delete(store: &mut JsonlEventStore, id: &str) -> anyhow::Result<()> {
    store
        .delete_event(id)
        .map_err(|err| ScheduleError::submit(&err))?;
    println!("Deleted event {id}.");
    Ok(())
}

fn cmd_availability(
    store: &JsonlEventStore,
    settings: &EngineSettings,
    renderer: &Renderer,
    args: &AvailabilityArgs,
) -> anyhow::Result<()> {
    let interval = range_interval(&args.range)?;
    if !interval.is_positive() {
        return Err(non_positive().into());
    }

    let request = AvailabilityRequest {
        participants: args.participants.iter().cloned().collect::<BTreeSet<_>>(),
        interval,
        exclude_event: args.range.exclude.clone(),
        exclude_self_if_all_day: settings.draft.exclude_self_if_all_day,
        requester: settings.draft.user.clone(),
    };

    let outcome = availability::resolve(store, &request);
    if let Some(warning) = &outcome.warning {
        renderer.print_warnings(&[warning])?;
    }
    renderer.print_availability(&outcome.map)
}

fn cmd_rooms(store: &JsonlEventStore, renderer: &Renderer, args: &RoomArgs) -> anyhow::Result<()> {
    let resources = store.list_resources()?;

    let Some(range) = args.range() else {
        let rows: Vec<RoomRow> = resources
            .into_iter()
            .map(|room| RoomRow {
                resource: room,
                free: None,
            })
            .collect();
        return renderer.print_rooms(&rows);
    };

    let interval = range_interval(&range)?;
    if !interval.is_positive() {
        return Err(non_positive().into());
    }

    let (free, warning) = resource::available_resources(store, &interval, range.exclude.as_deref());
    if let Some(warning) = &warning {
        renderer.print_warnings(&[warning])?;
    }

    let free_ids: BTreeSet<&str> = free.iter().map(|room| room.id.as_str()).collect();
    let rows: Vec<RoomRow> = resources
        .iter()
        .map(|room| RoomRow {
            resource: room.clone(),
            free: warning
                .is_none()
                .then(|| free_ids.contains(room.id.as_str())),
        })
        .collect();
    renderer.print_rooms(&rows)
}

fn cmd_view(
    store: &JsonlEventStore,
    settings: &EngineSettings,
    renderer: &Renderer,
    step: ViewStep,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let mut nav = ViewNavigator::open(FileAnchorStorage::in_dir(&store.data_dir), today);

    let transition = match step {
        ViewStep::Show => Transition::Unchanged,
        ViewStep::Switch(mode) => nav.switch_mode(mode, today),
        ViewStep::Move(direction) => nav.navigate(direction, today),
    };
    if let Transition::Moved(state) = transition {
        info!(mode = %state.mode, anchor = %state.anchor, "view moved");
    }

    let range = nav.visible_range(settings.week_start);
    renderer.print_view(&nav.state(), &range)?;

    let events = store.list_my_events()?;
    let days = build_agenda(&events, store.user(), range.first, range.last);
    renderer.print_agenda(&days)
}

#[instrument(skip(composer, args))]
fn apply_draft_args(composer: &mut DraftComposer, args: &DraftArgs) -> anyhow::Result<()> {
    if let Some(title) = &args.title {
        composer.set_title(title.as_str());
    }
    if let Some(content) = &args.content {
        composer.set_content(content.as_str());
    }
    if let Some(location) = &args.location {
        composer.set_location(location.as_str());
    }
    if let Some(category) = &args.category {
        composer.set_category(Some(category.clone()).filter(|c| !c.trim().is_empty()));
    }
    if args.private {
        composer.set_visibility(Visibility::Private);
    } else if args.public {
        composer.set_visibility(Visibility::Public);
    }

    if let Some(raw) = args.date.as_deref() {
        composer.set_start_date_text(raw)?;
    }
    if let Some(raw) = args.end_date.as_deref() {
        composer.set_end_date_text(raw)?;
    }
    if let Some(raw) = args.start_time.as_deref() {
        composer.set_start_time_text(raw)?;
    }
    match args.end_time.as_deref() {
        Some(raw) => composer.set_end_time_text(raw)?,
        None if args.start_time.is_some() && !composer.draft().interval().is_positive() => {
            let end = one_hour_later(composer.draft().start_time());
            debug!(%end, "no end time given; using a one-hour slot");
            composer.set_end_time(end);
        }
        None => {}
    }

    if args.all_day {
        composer.set_all_day(true);
    } else if args.timed {
        composer.set_all_day(false);
    }

    for participant in &args.remove_participants {
        composer.remove_participant(participant);
    }
    for participant in &args.participants {
        composer.add_participant(participant.as_str());
    }

    if args.no_room {
        composer.set_resource(None);
    } else if let Some(room) = &args.room
        && !composer.set_resource(Some(room.clone()))
    {
        bail!("rooms cannot be booked for all-day events");
    }

    Ok(())
}

fn submit(
    store: &mut JsonlEventStore,
    renderer: &Renderer,
    mut composer: DraftComposer,
) -> anyhow::Result<()> {
    composer.sync(&*store);

    renderer.print_warnings(&composer.lookup_warnings())?;
    for participant in composer.busy_participants() {
        warn!(participant = %participant, "participant is busy");
        eprintln!("warning: {participant} is busy at that time");
    }

    match composer.submit(store) {
        Ok(event) => {
            info!(id = %event.id, "event saved");
            renderer.print_event(&event)
        }
        Err(rejection) => {
            let (_discarded, error) = rejection.into_parts();
            Err(error).context("event not saved")
        }
    }
}

fn non_positive() -> ScheduleError {
    ScheduleError::ValidationFailed(vec![ValidationIssue::NonPositiveInterval])
}

fn range_interval(range: &RangeArgs) -> anyhow::Result<Interval> {
    let start_time = parse_clock_time(&range.start_time)?;
    let end_time = parse_clock_time(&range.end_time)?;
    let fields = LocalFields {
        start_date: range.start.clone(),
        start_hour: start_time.hour(),
        start_minute: start_time.minute(),
        end_date: range.end.clone().unwrap_or_else(|| range.start.clone()),
        end_hour: end_time.hour(),
        end_minute: end_time.minute(),
        all_day: range.all_day,
    };
    Ok(to_wire(&fields)?)
}

pub mod agenda;
pub mod availability;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod draft;
pub mod error;
pub mod event;
pub mod navigator;
pub mod render;
pub mod resource;
pub mod store;
pub mod temporal;

#[cfg(test)]
mod testing;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

pub use crate::draft::{Delivery, DraftComposer, DraftSettings, SubmitRejection, Ticket};
pub use crate::error::{ScheduleError, ValidationIssue};
pub use crate::event::{CalendarEvent, EventWrite, Resource, Visibility};
pub use crate::navigator::{Direction, ViewMode, ViewNavigator};
pub use crate::store::{EventStore, MemoryEventStore};
pub use crate::temporal::{Classification, Interval};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting groupcal"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rc_file.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );
    let settings = config::EngineSettings::from_config(&cfg);

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let mut store = datastore::JsonlEventStore::open(&data_dir, &settings.draft.user)
        .with_context(|| format!("failed to open event store at {}", data_dir.display()))?;

    let renderer = render::Renderer::new(settings.color);
    let command = cli
        .command
        .unwrap_or_else(|| cli::Command::Agenda(cli::AgendaArgs::default()));

    commands::dispatch(&mut store, &settings, &renderer, command)?;

    info!("done");
    Ok(())
}

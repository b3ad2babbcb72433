use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::navigator::{Direction, ViewMode};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "groupcal",
    version,
    about = "Group calendar: drafts, availability, rooms and views",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "set",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file", global = true)]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(about = "List my events day by day")]
    Agenda(AgendaArgs),
    #[command(about = "Create an event")]
    Add(DraftArgs),
    #[command(about = "Change an existing event")]
    Edit {
        id: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
    Delete {
        id: String,
    },
    #[command(about = "Show who is busy during a time range")]
    Availability(AvailabilityArgs),
    #[command(about = "List meeting rooms, or which are free during a time range")]
    Rooms(RoomArgs),
    #[command(about = "Show or move the calendar view")]
    View {
        #[arg(value_enum, default_value_t = ViewAction::Show)]
        action: ViewAction,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct AgendaArgs {
    #[arg(long = "date", help = "Any day of the month to list; defaults to the saved view")]
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DraftArgs {
    #[arg(long = "title")]
    pub title: Option<String>,

    #[arg(long = "content")]
    pub content: Option<String>,

    #[arg(long = "location")]
    pub location: Option<String>,

    #[arg(long = "category")]
    pub category: Option<String>,

    #[arg(long = "date", help = "Start date, YYYY-MM-DD")]
    pub date: Option<String>,

    #[arg(long = "start-time")]
    pub start_time: Option<String>,

    #[arg(long = "end-date")]
    pub end_date: Option<String>,

    #[arg(long = "end-time")]
    pub end_time: Option<String>,

    #[arg(long = "all-day", conflicts_with = "timed")]
    pub all_day: bool,

    #[arg(long = "timed")]
    pub timed: bool,

    #[arg(long = "participant", action = ArgAction::Append)]
    pub participants: Vec<String>,

    #[arg(long = "remove-participant", action = ArgAction::Append, help = "Drop a participant (edit only)")]
    pub remove_participants: Vec<String>,

    #[arg(long = "room", conflicts_with = "no_room")]
    pub room: Option<String>,

    #[arg(long = "no-room")]
    pub no_room: bool,

    #[arg(long = "private", conflicts_with = "public")]
    pub private: bool,

    #[arg(long = "public")]
    pub public: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    #[arg(long = "start", help = "Start date, YYYY-MM-DD")]
    pub start: String,

    #[arg(long = "start-time", default_value = "00:00")]
    pub start_time: String,

    #[arg(long = "end", help = "End date; defaults to the start date")]
    pub end: Option<String>,

    #[arg(long = "end-time", default_value = "23:59")]
    pub end_time: String,

    #[arg(long = "all-day")]
    pub all_day: bool,

    #[arg(long = "exclude", help = "Event being edited; its own bookings never conflict")]
    pub exclude: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AvailabilityArgs {
    #[arg(long = "participant", action = ArgAction::Append, required = true)]
    pub participants: Vec<String>,

    #[command(flatten)]
    pub range: RangeArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RoomArgs {
    #[arg(long = "start", help = "Only with a start date is room occupancy checked")]
    pub start: Option<String>,

    #[arg(long = "start-time", default_value = "00:00")]
    pub start_time: String,

    #[arg(long = "end")]
    pub end: Option<String>,

    #[arg(long = "end-time", default_value = "23:59")]
    pub end_time: String,

    #[arg(long = "exclude")]
    pub exclude: Option<String>,
}

impl RoomArgs {
    pub fn range(&self) -> Option<RangeArgs> {
        let start = self.start.clone()?;
        Some(RangeArgs {
            start,
            start_time: self.start_time.clone(),
            end: self.end.clone(),
            end_time: self.end_time.clone(),
            all_day: false,
            exclude: self.exclude.clone(),
        })
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    Show,
    Month,
    Week,
    Day,
    Agenda,
    Next,
    Prev,
    Today,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStep {
    Show,
    Switch(ViewMode),
    Move(Direction),
}

impl ViewAction {
    pub fn step(self) -> ViewStep {
        match self {
            Self::Show => ViewStep::Show,
            Self::Month => ViewStep::Switch(ViewMode::Month),
            Self::Week => ViewStep::Switch(ViewMode::Week),
            Self::Day => ViewStep::Switch(ViewMode::Day),
            Self::Agenda => ViewStep::Switch(ViewMode::Agenda),
            Self::Next => ViewStep::Move(Direction::Next),
            Self::Prev => ViewStep::Move(Direction::Previous),
            Self::Today => ViewStep::Move(Direction::Today),
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

// Positional `rc.key=value` (or `rc.key:value`) tokens are pulled out
// before clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

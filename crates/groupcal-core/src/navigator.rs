use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  NaiveDate,
  Weekday
};
use tempfile::NamedTempFile;
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::temporal::{
  DATE_FORMAT,
  add_days,
  first_day_of_month,
  last_day_of_month,
  month_start,
  parse_date,
  shift_months,
  start_of_week
};

pub const MODE_KEY: &str = "view.mode";
const ANCHOR_KEY_PREFIX: &str =
  "view.anchor.";

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord
)]
pub enum ViewMode {
  Month,
  Week,
  Day,
  Agenda
}

impl ViewMode {
  pub const ALL: [ViewMode; 4] = [
    Self::Month,
    Self::Week,
    Self::Day,
    Self::Agenda
  ];

  pub fn as_key(self) -> &'static str {
    match self {
      | Self::Month => "month",
      | Self::Week => "week",
      | Self::Day => "day",
      | Self::Agenda => "agenda"
    }
  }

  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    let raw =
      raw.trim().to_ascii_lowercase();
    Self::ALL
      .into_iter()
      .find(|mode| mode.as_key() == raw)
  }

  pub fn anchor_key(self) -> String {
    format!(
      "{ANCHOR_KEY_PREFIX}{}",
      self.as_key()
    )
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub struct Anchors {
  pub month:  Option<NaiveDate>,
  pub week:   Option<NaiveDate>,
  pub day:    Option<NaiveDate>,
  pub agenda: Option<NaiveDate>
}

impl Anchors {
  pub fn get(
    &self,
    mode: ViewMode
  ) -> Option<NaiveDate> {
    match mode {
      | ViewMode::Month => self.month,
      | ViewMode::Week => self.week,
      | ViewMode::Day => self.day,
      | ViewMode::Agenda => self.agenda
    }
  }

  pub fn set(
    &mut self,
    mode: ViewMode,
    anchor: NaiveDate
  ) {
    let slot = match mode {
      | ViewMode::Month => &mut self.month,
      | ViewMode::Week => &mut self.week,
      | ViewMode::Day => &mut self.day,
      | ViewMode::Agenda => {
        &mut self.agenda
      }
    };
    *slot = Some(anchor);
  }
}

// `shown` is the date on screen right now.
// Month starts from it. Agenda ignores it
// and resumes from the remembered
// anchors, else `today`. Week/Day fall
// back to it only when the target has no
// remembered anchor. From Month they keep
// the Month anchor's month and the
// target's remembered day-of-month; a day
// the month lacks rolls over.
pub fn project_anchor(
  from: ViewMode,
  to: ViewMode,
  anchors: &Anchors,
  shown: Option<NaiveDate>,
  today: NaiveDate
) -> NaiveDate {
  match to {
    | ViewMode::Month => {
      month_start(shown.unwrap_or(today))
    }
    | ViewMode::Week | ViewMode::Day => {
      if from == ViewMode::Month
        && let Some(month) =
          anchors.month.or(shown)
      {
        let day = anchors
          .get(to)
          .unwrap_or(month)
          .day();
        return day_in_month(month, day);
      }
      anchors
        .get(to)
        .or(shown)
        .unwrap_or(today)
    }
    | ViewMode::Agenda => {
      month_start(
        anchors
          .month
          .or(anchors.day)
          .or(anchors.week)
          .unwrap_or(today)
      )
    }
  }
}

fn day_in_month(
  month: NaiveDate,
  day: u32
) -> NaiveDate {
  let first = first_day_of_month(
    month.year(),
    month.month()
  );
  add_days(
    first,
    i64::from(day.saturating_sub(1))
  )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Next,
  Previous,
  Today
}

impl Direction {
  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "next" => Some(Self::Next),
      | "prev" | "previous" => {
        Some(Self::Previous)
      }
      | "today" => Some(Self::Today),
      | _ => None
    }
  }
}

pub fn step_anchor(
  mode: ViewMode,
  anchor: NaiveDate,
  direction: Direction,
  today: NaiveDate
) -> NaiveDate {
  let sign = match direction {
    | Direction::Next => 1,
    | Direction::Previous => -1,
    | Direction::Today => {
      return match mode {
        | ViewMode::Month
        | ViewMode::Agenda => {
          month_start(today)
        }
        | ViewMode::Week
        | ViewMode::Day => today
      };
    }
  };

  match mode {
    | ViewMode::Month
    | ViewMode::Agenda => {
      month_start(shift_months(
        anchor, sign
      ))
    }
    | ViewMode::Week => {
      add_days(
        anchor,
        7 * i64::from(sign)
      )
    }
    | ViewMode::Day => {
      add_days(anchor, i64::from(sign))
    }
  }
}

// Inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
  pub first: NaiveDate,
  pub last:  NaiveDate
}

impl DateRange {
  pub fn days(
    &self
  ) -> impl Iterator<Item = NaiveDate> {
    self
      .first
      .iter_days()
      .take_while(move |day| {
        *day <= self.last
      })
  }
}

pub fn visible_range(
  mode: ViewMode,
  anchor: NaiveDate,
  week_start: Weekday
) -> DateRange {
  match mode {
    | ViewMode::Month => {
      let last = last_day_of_month(
        anchor.year(),
        anchor.month()
      );
      DateRange {
        first: start_of_week(
          month_start(anchor),
          week_start
        ),
        last:  add_days(
          start_of_week(
            last, week_start
          ),
          6
        )
      }
    }
    | ViewMode::Week => {
      let first = start_of_week(
        anchor, week_start
      );
      DateRange {
        first,
        last: add_days(first, 6)
      }
    }
    | ViewMode::Day => {
      DateRange {
        first: anchor,
        last:  anchor
      }
    }
    | ViewMode::Agenda => {
      DateRange {
        first: month_start(anchor),
        last:  last_day_of_month(
          anchor.year(),
          anchor.month()
        )
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
  pub mode:   ViewMode,
  pub anchor: NaiveDate
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  Moved(ViewState),
  Unchanged
}

pub trait AnchorStorage {
  fn load(
    &self
  ) -> anyhow::Result<BTreeMap<String, String>>;

  fn save(
    &mut self,
    entries: &BTreeMap<String, String>
  ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAnchorStorage {
  pub entries: BTreeMap<String, String>,
  pub writes:  usize
}

impl AnchorStorage
  for MemoryAnchorStorage
{
  fn load(
    &self
  ) -> anyhow::Result<BTreeMap<String, String>>
  {
    Ok(self.entries.clone())
  }

  fn save(
    &mut self,
    entries: &BTreeMap<String, String>
  ) -> anyhow::Result<()> {
    self.entries = entries.clone();
    self.writes += 1;
    Ok(())
  }
}

// A JSON object in `view.data`.
#[derive(Debug, Clone)]
pub struct FileAnchorStorage {
  pub path: PathBuf
}

impl FileAnchorStorage {
  pub fn in_dir(
    data_dir: &Path
  ) -> Self {
    Self {
      path: data_dir.join("view.data")
    }
  }
}

impl AnchorStorage for FileAnchorStorage {
  #[instrument(skip(self), fields(file = %self.path.display()))]
  fn load(
    &self
  ) -> anyhow::Result<BTreeMap<String, String>>
  {
    if !self.path.exists() {
      debug!("no saved view state");
      return Ok(BTreeMap::new());
    }
    let text =
      fs::read_to_string(&self.path)
        .with_context(|| {
          format!(
            "failed to read {}",
            self.path.display()
          )
        })?;
    if text.trim().is_empty() {
      return Ok(BTreeMap::new());
    }
    serde_json::from_str(&text)
      .with_context(|| {
        format!(
          "failed parsing {}",
          self.path.display()
        )
      })
  }

  #[instrument(skip(self, entries), fields(file = %self.path.display()))]
  fn save(
    &mut self,
    entries: &BTreeMap<String, String>
  ) -> anyhow::Result<()> {
    let dir = self
      .path
      .parent()
      .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;

    let mut temp =
      NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(
      &mut temp, entries
    )?;
    writeln!(temp)?;
    temp.flush()?;
    temp
      .persist(&self.path)
      .map_err(|err| {
        anyhow!(
          "failed to persist {}: {}",
          self.path.display(),
          err
        )
      })?;
    Ok(())
  }
}

#[derive(Debug)]
pub struct ViewNavigator<S: AnchorStorage>
{
  storage: S,
  mode:    ViewMode,
  anchor:  NaiveDate,
  anchors: Anchors
}

impl<S: AnchorStorage> ViewNavigator<S> {
  // Storage problems fall back to a Month
  // view of `today`.
  #[instrument(skip(storage))]
  pub fn open(
    storage: S,
    today: NaiveDate
  ) -> Self {
    let entries = match storage.load() {
      | Ok(entries) => entries,
      | Err(err) => {
        warn!(error = %format!("{err:#}"), "could not load view state; using defaults");
        BTreeMap::new()
      }
    };

    let mode = match entries.get(MODE_KEY)
    {
      | Some(raw) => {
        ViewMode::from_key(raw)
          .unwrap_or_else(|| {
            warn!(value = %raw, "ignoring unknown view mode");
            ViewMode::Month
          })
      }
      | None => ViewMode::Month
    };

    let mut anchors = Anchors::default();
    for each in ViewMode::ALL {
      let Some(raw) =
        entries.get(&each.anchor_key())
      else {
        continue;
      };
      match parse_date(raw) {
        | Ok(date) => {
          anchors.set(each, date)
        }
        | Err(err) => {
          warn!(mode = %each, value = %raw, error = %err, "ignoring bad anchor")
        }
      }
    }

    let anchor = anchors
      .get(mode)
      .unwrap_or_else(|| {
        project_anchor(
          mode, mode, &anchors, None,
          today
        )
      });
    anchors.set(mode, anchor);

    info!(%mode, %anchor, "opened view navigator");
    Self {
      storage,
      mode,
      anchor,
      anchors
    }
  }

  pub fn mode(&self) -> ViewMode {
    self.mode
  }

  pub fn anchor(&self) -> NaiveDate {
    self.anchor
  }

  pub fn state(&self) -> ViewState {
    ViewState {
      mode:   self.mode,
      anchor: self.anchor
    }
  }

  pub fn anchors(&self) -> &Anchors {
    &self.anchors
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn visible_range(
    &self,
    week_start: Weekday
  ) -> DateRange {
    visible_range(
      self.mode,
      self.anchor,
      week_start
    )
  }

  #[instrument(skip(self), fields(from = %self.mode))]
  pub fn switch_mode(
    &mut self,
    mode: ViewMode,
    today: NaiveDate
  ) -> Transition {
    if mode == self.mode {
      return Transition::Unchanged;
    }
    let anchor = project_anchor(
      self.mode,
      mode,
      &self.anchors,
      Some(self.anchor),
      today
    );
    self.go_to(mode, anchor)
  }

  #[instrument(skip(self), fields(mode = %self.mode))]
  pub fn navigate(
    &mut self,
    direction: Direction,
    today: NaiveDate
  ) -> Transition {
    let anchor = step_anchor(
      self.mode,
      self.anchor,
      direction,
      today
    );
    self.go_to(self.mode, anchor)
  }

  // Writes through only when mode or
  // anchor differs.
  pub fn go_to(
    &mut self,
    mode: ViewMode,
    anchor: NaiveDate
  ) -> Transition {
    if mode == self.mode
      && anchor == self.anchor
    {
      debug!(%mode, %anchor, "already at requested anchor");
      return Transition::Unchanged;
    }

    self.mode = mode;
    self.anchor = anchor;
    self.anchors.set(mode, anchor);
    self.persist();

    debug!(%mode, %anchor, "view moved");
    Transition::Moved(self.state())
  }

  fn persist(&mut self) {
    let mut entries =
      match self.storage.load() {
        | Ok(entries) => entries,
        | Err(err) => {
          warn!(error = %format!("{err:#}"), "could not reload view state; overwriting");
          BTreeMap::new()
        }
      };
    entries.insert(
      MODE_KEY.to_string(),
      self.mode.as_key().to_string()
    );
    for each in ViewMode::ALL {
      if let Some(anchor) =
        self.anchors.get(each)
      {
        entries.insert(
          each.anchor_key(),
          anchor
            .format(DATE_FORMAT)
            .to_string()
        );
      }
    }

    if let Err(err) =
      self.storage.save(&entries)
    {
      warn!(error = %format!("{err:#}"), "could not save view state");
    }
  }
}

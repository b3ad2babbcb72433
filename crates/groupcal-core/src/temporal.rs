// Event times are local wall-clock values.
// The configured timezone only decides
// what "today" is.

use std::sync::OnceLock;

use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};

use crate::error::{
  Result,
  ScheduleError
};

pub const WIRE_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str =
  "%Y-%m-%d";

// Tolerates 00:00-23:59 inputs.
fn full_day_min() -> Duration {
  Duration::minutes(23 * 60 + 59)
}

// Half-open: [start, end).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize
)]
pub struct Interval {
  #[serde(with = "wire_datetime_serde")]
  pub start: NaiveDateTime,
  #[serde(with = "wire_datetime_serde")]
  pub end:   NaiveDateTime
}

impl Interval {
  pub fn new(
    start: NaiveDateTime,
    end: NaiveDateTime
  ) -> Self {
    Self {
      start,
      end
    }
  }

  pub fn is_positive(&self) -> bool {
    self.end > self.start
  }

  pub fn overlaps(
    &self,
    other: &Interval
  ) -> bool {
    overlaps(self, other)
  }

  pub fn duration(&self) -> Duration {
    self.end - self.start
  }

  pub fn whole_days(&self) -> Interval {
    let first = self.start.date();
    let last =
      self.end.date().max(first);
    Interval::new(
      first.and_time(NaiveTime::MIN),
      add_days(last, 1)
        .and_time(NaiveTime::MIN)
    )
  }
}

pub fn overlaps(
  a: &Interval,
  b: &Interval
) -> bool {
  a.start < b.end && b.start < a.end
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize
)]
pub enum Classification {
  Timed,
  FullDay,
  MultiDay
}

impl Classification {
  pub fn is_all_day(self) -> bool {
    !matches!(self, Self::Timed)
  }
}

pub fn classify(
  interval: &Interval
) -> Classification {
  let start_day = interval.start.date();
  let end_day = interval.end.date();
  if start_day != end_day {
    return Classification::MultiDay;
  }

  let starts_at_midnight =
    interval.start.time()
      == NaiveTime::MIN;
  let reaches_day_end =
    interval.end.time()
      >= end_of_day_minute();
  if starts_at_midnight
    && (reaches_day_end
      || interval.duration()
        >= full_day_min())
  {
    Classification::FullDay
  } else {
    Classification::Timed
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize
)]
pub enum DisplayBounds {
  Timed {
    start: NaiveDateTime,
    end:   NaiveDateTime
  },
  Days {
    start:         NaiveDate,
    end_exclusive: NaiveDate
  }
}

impl DisplayBounds {
  pub fn first_day(&self) -> NaiveDate {
    match self {
      | Self::Timed {
        start,
        ..
      } => start.date(),
      | Self::Days {
        start,
        ..
      } => *start
    }
  }

  // Inclusive.
  pub fn last_day(&self) -> NaiveDate {
    match self {
      | Self::Timed {
        start,
        end
      } => {
        if end.time() == NaiveTime::MIN
          && end.date() > start.date()
        {
          add_days(end.date(), -1)
        } else {
          end.date()
        }
      }
      | Self::Days {
        end_exclusive,
        ..
      } => add_days(*end_exclusive, -1)
    }
  }

  pub fn time_label(&self) -> String {
    match self {
      | Self::Timed {
        start,
        end
      } => {
        format!(
          "{}-{}",
          start.format("%H:%M"),
          end.format("%H:%M")
        )
      }
      | Self::Days {
        ..
      } => "all day".to_string()
    }
  }
}

pub fn display_bounds(
  interval: &Interval,
  classification: Classification
) -> DisplayBounds {
  match classification {
    | Classification::Timed => {
      DisplayBounds::Timed {
        start: interval.start,
        end:   interval.end
      }
    }
    | Classification::FullDay
    | Classification::MultiDay => {
      DisplayBounds::Days {
        start:         interval
          .start
          .date(),
        end_exclusive: add_days(
          interval.end.date(),
          1
        )
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFields {
  pub start_date:   String,
  pub start_hour:   u32,
  pub start_minute: u32,
  pub end_date:     String,
  pub end_hour:     u32,
  pub end_minute:   u32,
  pub all_day:      bool
}

// Does not check end > start.
pub fn to_wire(
  fields: &LocalFields
) -> Result<Interval> {
  let start_date =
    parse_date(&fields.start_date)?;
  let end_date =
    parse_date(&fields.end_date)?;

  if fields.all_day {
    return Ok(all_day_interval(
      start_date, end_date
    ));
  }

  let start_time = time_of_day(
    fields.start_hour,
    fields.start_minute
  )?;
  let end_time = time_of_day(
    fields.end_hour,
    fields.end_minute
  )?;
  Ok(Interval::new(
    start_date.and_time(start_time),
    end_date.and_time(end_time)
  ))
}

pub fn all_day_interval(
  start: NaiveDate,
  end: NaiveDate
) -> Interval {
  Interval::new(
    start.and_time(NaiveTime::MIN),
    end.and_time(end_of_day_minute())
  )
}

pub fn is_whole_day_span(
  interval: &Interval
) -> bool {
  interval.start.time() == NaiveTime::MIN
    && interval.end.time()
      >= end_of_day_minute()
    && classify(interval).is_all_day()
}

pub fn end_of_day_minute() -> NaiveTime {
  NaiveTime::from_hms_opt(23, 59, 0)
    .unwrap_or(NaiveTime::MIN)
}

pub fn time_of_day(
  hour: u32,
  minute: u32
) -> Result<NaiveTime> {
  let out_of_range = || {
    ScheduleError::InvalidFormat(format!(
      "time out of range: \
       {hour:02}:{minute:02}"
    ))
  };
  if hour > 23 || minute > 59 {
    return Err(out_of_range());
  }
  NaiveTime::from_hms_opt(
    hour, minute, 0
  )
  .ok_or_else(out_of_range)
}

pub fn parse_date(
  raw: &str
) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(
    raw.trim(),
    DATE_FORMAT
  )
  .map_err(|err| {
    ScheduleError::InvalidFormat(format!(
      "expected YYYY-MM-DD, got \
       {raw:?}: {err}"
    ))
  })
}

pub fn parse_wire_datetime(
  raw: &str
) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(
    raw.trim(),
    WIRE_FORMAT
  )
  .map_err(|err| {
    ScheduleError::InvalidFormat(format!(
      "expected YYYY-MM-DDTHH:MM:SS, \
       got {raw:?}: {err}"
    ))
  })
}

pub fn format_wire(
  dt: NaiveDateTime
) -> String {
  dt.format(WIRE_FORMAT).to_string()
}

fn clock_regex() -> Option<&'static Regex>
{
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$"
      )
      .ok()
    })
    .as_ref()
}

// HH:MM, H:MM, h:MMam or h:MMpm.
pub fn parse_clock_time(
  raw: &str
) -> Result<NaiveTime> {
  let invalid = || {
    ScheduleError::InvalidFormat(format!(
      "expected HH:MM, got {raw:?}"
    ))
  };
  let clock_re =
    clock_regex().ok_or_else(invalid)?;
  let captures = clock_re
    .captures(raw.trim())
    .ok_or_else(invalid)?;

  let raw_hour = captures
    .name("hour")
    .and_then(|m| {
      m.as_str().parse::<u32>().ok()
    })
    .ok_or_else(invalid)?;
  let minute = captures
    .name("minute")
    .and_then(|m| {
      m.as_str().parse::<u32>().ok()
    })
    .ok_or_else(invalid)?;

  let hour = match captures.name("ampm")
  {
    | Some(ampm) => {
      if raw_hour == 0 || raw_hour > 12
      {
        return Err(invalid());
      }
      match (
        ampm
          .as_str()
          .to_ascii_lowercase()
          .as_str(),
        raw_hour
      ) {
        | ("am", 12) => 0,
        | ("am", h) => h,
        | ("pm", 12) => 12,
        | ("pm", h) => h + 12,
        | _ => return Err(invalid())
      }
    }
    | None => raw_hour
  };

  time_of_day(hour, minute)
}

// Wraps past 23 back to 0, keeping the
// minute.
pub fn one_hour_later(
  time: NaiveTime
) -> NaiveTime {
  let hour = (time.hour() + 1) % 24;
  NaiveTime::from_hms_opt(
    hour,
    time.minute(),
    0
  )
  .unwrap_or(time)
}

pub fn today_in(
  timezone: Tz
) -> NaiveDate {
  Utc::now()
    .with_timezone(&timezone)
    .date_naive()
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn month_start(
  date: NaiveDate
) -> NaiveDate {
  first_day_of_month(
    date.year(),
    date.month()
  )
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

pub mod wire_datetime_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::WIRE_FORMAT;

  pub fn serialize<S>(
    dt: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.format(WIRE_FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(
      &raw,
      WIRE_FORMAT
    )
    .map_err(serde::de::Error::custom)
  }
}

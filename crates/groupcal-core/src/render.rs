use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::agenda::AgendaDay;
use crate::availability::AvailabilityMap;
use crate::error::ScheduleError;
use crate::event::{CalendarEvent, Resource, Visibility};
use crate::navigator::{DateRange, ViewState};
use crate::temporal::{DATE_FORMAT, display_bounds, format_wire};

// Room row for the rooms table; `free` is unknown without a time range
#[derive(Debug, Clone)]
pub struct RoomRow {
    pub resource: Resource,
    pub free: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    #[tracing::instrument(skip(self, days))]
    pub fn print_agenda(&self, days: &[AgendaDay]) -> anyhow::Result<()> {
        self.write_agenda(io::stdout().lock(), days)
    }

    pub fn write_agenda<W: Write>(&self, mut out: W, days: &[AgendaDay]) -> anyhow::Result<()> {
        if days.is_empty() {
            writeln!(out, "No events.")?;
            return Ok(());
        }

        let headers = vec![
            "Date".to_string(),
            "Time".to_string(),
            "Title".to_string(),
            "Location".to_string(),
            "ID".to_string(),
        ];

        let mut rows = Vec::new();
        for day in days {
            for (idx, entry) in day.entries.iter().enumerate() {
                let date = if idx == 0 {
                    self.paint(&day.date.format("%a %Y-%m-%d").to_string(), "1")
                } else {
                    String::new()
                };
                let time = entry.bounds.time_label();
                let time = if entry.all_day {
                    self.paint(&time, "36")
                } else {
                    time
                };
                let title = if entry.masked {
                    self.paint(&entry.title, "2")
                } else {
                    entry.title.clone()
                };
                rows.push(vec![
                    date,
                    time,
                    title,
                    entry.location.clone(),
                    self.paint(&entry.event_id, "33"),
                ]);
            }
        }

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, map))]
    pub fn print_availability(&self, map: &AvailabilityMap) -> anyhow::Result<()> {
        self.write_availability(io::stdout().lock(), map)
    }

    pub fn write_availability<W: Write>(
        &self,
        mut out: W,
        map: &AvailabilityMap,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "Participant".to_string(),
            "Status".to_string(),
            "Commitments".to_string(),
        ];

        let rows = map
            .iter()
            .map(|(participant, entry)| {
                let status = if entry.busy {
                    self.paint("busy", "31")
                } else {
                    self.paint("free", "32")
                };
                let commitments = entry
                    .commitments
                    .iter()
                    .map(|commitment| {
                        format!(
                            "{} {}",
                            commitment.interval.start.format("%m-%d %H:%M"),
                            commitment.interval.end.format("%H:%M")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![participant.clone(), status, commitments]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, rooms))]
    pub fn print_rooms(&self, rooms: &[RoomRow]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Capacity".to_string(),
            "Free".to_string(),
        ];

        let rows = rooms
            .iter()
            .map(|row| {
                let free = match row.free {
                    Some(true) => self.paint("yes", "32"),
                    Some(false) => self.paint("no", "31"),
                    None => "-".to_string(),
                };
                vec![
                    self.paint(&row.resource.id, "33"),
                    row.resource.name.clone(),
                    row.resource
                        .capacity
                        .map(|value| value.to_string())
                        .unwrap_or_default(),
                    free,
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, event))]
    pub fn print_event(&self, event: &CalendarEvent) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let bounds = display_bounds(&event.interval, event.classification());

        writeln!(out, "id          {}", self.paint(&event.id, "33"))?;
        writeln!(out, "title       {}", event.title)?;
        writeln!(out, "start       {}", format_wire(event.interval.start))?;
        writeln!(out, "end         {}", format_wire(event.interval.end))?;
        writeln!(out, "shown as    {:?} ({})", event.classification(), bounds.time_label())?;
        writeln!(out, "owner       {}", event.owner)?;
        writeln!(out, "category    {}", event.category.clone().unwrap_or_default())?;
        writeln!(out, "room        {}", event.resource.clone().unwrap_or_default())?;
        writeln!(out, "location    {}", event.location)?;
        writeln!(out, "with        {}", event.participants.join(", "))?;
        if event.visibility == Visibility::Private {
            writeln!(out, "visibility  private")?;
        }
        if !event.content.is_empty() {
            writeln!(out, "content     {}", event.content)?;
        }

        Ok(())
    }

    pub fn print_view(&self, state: &ViewState, range: &DateRange) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "mode    {}", self.paint(state.mode.as_key(), "1"))?;
        writeln!(out, "anchor  {}", state.anchor.format(DATE_FORMAT))?;
        writeln!(
            out,
            "shows   {} .. {}",
            range.first.format(DATE_FORMAT),
            range.last.format(DATE_FORMAT)
        )?;
        Ok(())
    }

    pub fn print_warnings(&self, warnings: &[&ScheduleError]) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        for warning in warnings {
            writeln!(err, "warning: {warning}")?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

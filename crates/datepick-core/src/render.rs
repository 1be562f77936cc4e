use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Weekday};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::day::{CalendarDay, Grid};

const CELL_WIDTH: usize = 4;
const WEEK_WIDTH: usize = CELL_WIDTH * 7;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, grid))]
    pub fn print_grid(
        &self,
        label: &str,
        grid: &Grid,
        today: NaiveDate,
        first_weekday: Weekday,
    ) -> anyhow::Result<()> {
        let paint = self.color && io::stdout().is_terminal();
        let mut out = io::stdout().lock();
        write_grid(&mut out, label, grid, today, first_weekday, paint)
    }

    pub fn print_dates(&self, dates: &[NaiveDate]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for date in dates {
            writeln!(out, "{}", date.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

/// Month label, weekday header, then six rows of seven cells. Selected days
/// are bracketed, in-range days wrapped in `~`, today carries a `*`.
pub fn write_grid<W: Write>(
    mut writer: W,
    label: &str,
    grid: &Grid,
    today: NaiveDate,
    first_weekday: Weekday,
    paint: bool,
) -> anyhow::Result<()> {
    let label_width = UnicodeWidthStr::width(label);
    let indent = WEEK_WIDTH.saturating_sub(label_width) / 2;
    writeln!(writer, "{}{}", " ".repeat(indent), label)?;

    let mut weekday = first_weekday;
    for _ in 0..7 {
        let name = weekday.to_string();
        let short: String = name.chars().take(2).collect();
        write!(writer, " {short} ")?;
        weekday = weekday.succ();
    }
    writeln!(writer)?;

    if grid.is_empty() {
        writeln!(writer, "(no days)")?;
        return Ok(());
    }

    for week in grid.days.chunks(7) {
        let line = week
            .iter()
            .map(|cell| render_cell(cell, today, paint))
            .collect::<String>();
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn render_cell(cell: &CalendarDay, today: NaiveDate, paint: bool) -> String {
    let Some(date) = cell.date else {
        return " ".repeat(CELL_WIDTH);
    };

    let day = date.day();
    let text = if cell.is_selected {
        format!("[{day:>2}]")
    } else if cell.is_in_range {
        format!("~{day:>2}~")
    } else if date == today {
        format!(" {day:>2}*")
    } else {
        format!(" {day:>2} ")
    };

    if !paint {
        return text;
    }
    if cell.is_selected {
        format!("\x1b[1;32m{text}\x1b[0m")
    } else if cell.is_in_range {
        format!("\x1b[36m{text}\x1b[0m")
    } else if date < today {
        format!("\x1b[2m{text}\x1b[0m")
    } else {
        text
    }
}

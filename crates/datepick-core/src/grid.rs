use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{debug, warn};

use crate::datetime::{days_in_month, first_day_of_month, leading_placeholders};
use crate::day::{CalendarDay, GRID_SLOTS, Grid};
use crate::selection::Selection;

/// Lays out `month` as a 42-cell grid starting on `first_weekday`, flagging
/// selected and in-range days from `selection`.
#[tracing::instrument(skip(selection), fields(selected = selection.len()))]
pub fn build_grid(month: NaiveDate, first_weekday: Weekday, selection: &Selection) -> Grid {
    let first = first_day_of_month(month);
    let Some(day_count) = days_in_month(first.year(), first.month()) else {
        warn!(%first, "month length undefined; returning empty grid");
        return Grid::empty();
    };

    let leading = leading_placeholders(first, first_weekday);
    let mut days = Vec::with_capacity(GRID_SLOTS);
    days.extend(std::iter::repeat_n(CalendarDay::placeholder(), leading));

    for date in first.iter_days().take(day_count as usize) {
        days.push(CalendarDay {
            date: Some(date),
            is_selected: selection.is_selected(date),
            is_in_range: selection.is_in_range(date),
        });
    }

    if days.len() > GRID_SLOTS {
        warn!(cells = days.len(), "month does not fit the grid; returning empty grid");
        return Grid::empty();
    }
    days.resize(GRID_SLOTS, CalendarDay::placeholder());

    debug!(%first, leading, day_count, "built month grid");
    Grid {
        month: Some(first),
        days,
    }
}

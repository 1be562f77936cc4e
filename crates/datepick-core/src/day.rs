use chrono::NaiveDate;
use serde::Serialize;

/// Number of cells in a month grid: six weeks of seven days.
pub const GRID_SLOTS: usize = 42;

/// One cell of the month grid. A cell without a date is a placeholder that
/// pads the grid so the 1st lands under its weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CalendarDay {
    pub date: Option<NaiveDate>,
    pub is_selected: bool,
    pub is_in_range: bool,
}

impl CalendarDay {
    pub fn placeholder() -> Self {
        Self {
            date: None,
            is_selected: false,
            is_in_range: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.date.is_none()
    }

    /// Past days and placeholders do not react to activation.
    pub fn is_interactive(&self, today: NaiveDate) -> bool {
        self.date.is_some_and(|date| date >= today)
    }

    pub fn accessibility_label(&self) -> Option<String> {
        self.date
            .map(|date| date.format("%-d %B %Y").to_string())
    }
}

/// Snapshot of the displayed month. Regenerated on every change, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grid {
    /// First day of the displayed month; `None` for the empty grid.
    pub month: Option<NaiveDate>,
    pub days: Vec<CalendarDay>,
}

impl Grid {
    pub fn empty() -> Self {
        Self {
            month: None,
            days: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn leading_placeholders(&self) -> usize {
        self.days
            .iter()
            .take_while(|day| day.is_placeholder())
            .count()
    }

    pub fn day_at(&self, index: usize) -> Option<&CalendarDay> {
        self.days.get(index)
    }

    pub fn position_of(&self, date: NaiveDate) -> Option<usize> {
        self.days.iter().position(|day| day.date == Some(date))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarDay> {
        self.days.iter()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty()
    }
}

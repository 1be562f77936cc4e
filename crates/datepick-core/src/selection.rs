use chrono::NaiveDate;
use tracing::{debug, warn};

/// How a call to [`Selection::select`] changed the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The day was already selected.
    Unchanged,
    /// First date of an empty selection.
    Started,
    /// Second date; the selection now spans a range.
    Extended,
    /// A range was already complete, so the new date starts over.
    Restarted,
}

impl SelectOutcome {
    pub fn changed(self) -> bool {
        self != Self::Unchanged
    }
}

/// Up to two distinct days, kept in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    dates: Vec<NaiveDate>,
}

impl Selection {
    pub const MAX_DATES: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { dates: vec![date] }
    }

    /// Rebuilds a selection from stored dates. Duplicates are dropped and
    /// only the first two distinct dates survive.
    pub fn from_persisted(dates: &[NaiveDate]) -> Self {
        let mut selection = Self::new();
        for date in dates {
            if selection.dates.contains(date) {
                debug!(%date, "dropping duplicate persisted date");
                continue;
            }
            if selection.dates.len() == Self::MAX_DATES {
                warn!(
                    stored = dates.len(),
                    "persisted selection holds more than two dates; keeping the first two"
                );
                break;
            }
            selection.dates.push(*date);
        }
        selection
    }

    pub fn select(&mut self, date: NaiveDate) -> SelectOutcome {
        if self.is_selected(date) {
            return SelectOutcome::Unchanged;
        }

        match self.dates.len() {
            0 => {
                self.dates.push(date);
                SelectOutcome::Started
            }
            1 => {
                self.dates.push(date);
                SelectOutcome::Extended
            }
            _ => {
                self.dates = vec![date];
                SelectOutcome::Restarted
            }
        }
    }

    pub fn reset_to(&mut self, today: NaiveDate) {
        self.dates = vec![today];
    }

    pub fn is_selected(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    /// Inclusive bounds of a complete range, ordered regardless of pick order.
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self.dates.as_slice() {
            [a, b] => Some((*a.min(b), *a.max(b))),
            _ => None,
        }
    }

    /// True strictly between the two endpoints; endpoints count as selected.
    pub fn is_in_range(&self, date: NaiveDate) -> bool {
        self.range()
            .is_some_and(|(start, end)| date > start && date < end)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn earliest(&self) -> Option<NaiveDate> {
        self.dates.iter().min().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

use std::fmt::Write as _;

use chrono::{NaiveDate, Weekday};
use tracing::{debug, info, instrument, warn};

use crate::datetime::{first_day_of_month, month_offset_between, project_today, shift_months};
use crate::day::Grid;
use crate::grid::build_grid;
use crate::observer::{Observers, SubscriptionId};
use crate::selection::{SelectOutcome, Selection};
use crate::storage::DateStorage;

pub const DEFAULT_MONTH_FORMAT: &str = "%B %Y";

/// Source of the current calendar day.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// Today in the configured project timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        project_today()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub first_weekday: Weekday,
    /// strftime pattern for [`CalendarEngine::month_label`].
    pub month_label_format: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            first_weekday: Weekday::Mon,
            month_label_format: DEFAULT_MONTH_FORMAT.to_string(),
        }
    }
}

/// Owns the selection and the displayed month, and hands grid snapshots to
/// subscribers after every change.
///
/// The displayed month is `reference month + offset`, where the reference
/// month is the month containing today when the engine was built. Storage
/// failures never escape: they are logged and the engine falls back to its
/// defaults.
pub struct CalendarEngine<S, C = SystemClock> {
    storage: S,
    clock: C,
    settings: EngineSettings,
    reference_month: NaiveDate,
    month_offset: i32,
    selection: Selection,
    grid: Grid,
    observers: Observers<Grid>,
}

impl<S: DateStorage, C: Clock> CalendarEngine<S, C> {
    pub fn new(storage: S, clock: C, settings: EngineSettings) -> Self {
        let reference_month = first_day_of_month(clock.today());
        debug!(%reference_month, first_weekday = ?settings.first_weekday, "created calendar engine");
        Self {
            storage,
            clock,
            settings,
            reference_month,
            month_offset: 0,
            selection: Selection::new(),
            grid: Grid::empty(),
            observers: Observers::new(),
        }
    }

    /// Restores the stored selection and opens on the month of its earliest
    /// date. With nothing stored, today is selected and saved right away.
    #[instrument(skip(self))]
    pub fn load(&mut self) -> &Grid {
        let stored = match self.storage.load() {
            Ok(dates) => dates,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to load selected dates; using defaults");
                Vec::new()
            }
        };

        self.selection = Selection::from_persisted(&stored);
        match self.selection.earliest() {
            Some(earliest) => {
                self.month_offset = month_offset_between(self.reference_month, earliest);
                info!(
                    selected = self.selection.len(),
                    offset = self.month_offset,
                    "restored selection"
                );
                if self.selection.len() < stored.len() {
                    debug!(stored = stored.len(), kept = self.selection.len(), "rewriting normalized selection");
                    self.persist();
                }
            }
            None => {
                let today = self.today();
                self.selection.reset_to(today);
                self.month_offset = 0;
                info!(%today, "no stored selection; defaulting to today");
                self.persist();
            }
        }

        self.update_days()
    }

    /// Regenerates the grid for the displayed month and notifies subscribers.
    #[instrument(skip(self), fields(offset = self.month_offset))]
    pub fn update_days(&mut self) -> &Grid {
        self.grid = match self.current_month() {
            Some(month) => build_grid(month, self.settings.first_weekday, &self.selection),
            None => {
                warn!(offset = self.month_offset, "displayed month out of range; empty grid");
                Grid::empty()
            }
        };
        self.observers.emit(&self.grid);
        &self.grid
    }

    /// Adds `date` to the selection. A third distinct date replaces a
    /// complete range; a date that is already selected changes nothing.
    #[instrument(skip(self))]
    pub fn select(&mut self, date: NaiveDate) -> SelectOutcome {
        let outcome = self.selection.select(date);
        if !outcome.changed() {
            debug!(%date, "date already selected");
            return outcome;
        }

        debug!(%date, ?outcome, selected = self.selection.len(), "selection changed");
        self.persist();
        self.update_days();
        outcome
    }

    /// Back to today selected and the current month shown.
    #[instrument(skip(self))]
    pub fn clear(&mut self) {
        let today = self.today();
        self.selection.reset_to(today);
        self.month_offset = 0;
        self.persist();
        self.update_days();
    }

    /// Moves the displayed month by `delta`. An offset that would overflow
    /// is left as it was.
    #[instrument(skip(self))]
    pub fn change_month(&mut self, delta: i32) {
        match self.month_offset.checked_add(delta) {
            Some(offset) => {
                self.month_offset = offset;
                debug!(offset, "changed month");
            }
            None => warn!(offset = self.month_offset, delta, "month offset overflow; keeping offset"),
        }
        self.update_days();
    }

    pub fn is_selected(&self, date: NaiveDate) -> bool {
        self.selection.is_selected(date)
    }

    pub fn is_in_range(&self, date: NaiveDate) -> bool {
        self.selection.is_in_range(date)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// First day of the displayed month, `None` if it cannot be represented.
    pub fn current_month(&self) -> Option<NaiveDate> {
        shift_months(self.reference_month, self.month_offset)
    }

    pub fn month_label(&self) -> String {
        let Some(month) = self.current_month() else {
            return String::new();
        };

        let mut label = String::new();
        if write!(label, "{}", month.format(&self.settings.month_label_format)).is_err() {
            warn!(
                format = %self.settings.month_label_format,
                "invalid month label format; using default"
            );
            label = month.format(DEFAULT_MONTH_FORMAT).to_string();
        }
        label
    }

    pub fn reference_month(&self) -> NaiveDate {
        self.reference_month
    }

    pub fn month_offset(&self) -> i32 {
        self.month_offset
    }

    pub fn selected_dates(&self) -> &[NaiveDate] {
        self.selection.dates()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Registers a callback that receives every new grid snapshot.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&Grid) + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn persist(&mut self) {
        if let Err(err) = self.storage.save(self.selection.dates()) {
            warn!(error = %format!("{err:#}"), "failed to persist selected dates");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::anyhow;
    use chrono::{Duration, NaiveDate, Weekday};

    use super::{CalendarEngine, EngineSettings, FixedClock};
    use crate::day::GRID_SLOTS;
    use crate::selection::SelectOutcome;
    use crate::storage::{DateStorage, MemoryDateStorage};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn today() -> NaiveDate {
        day(2026, 10, 15)
    }

    fn engine_with(storage: MemoryDateStorage) -> CalendarEngine<MemoryDateStorage, FixedClock> {
        CalendarEngine::new(storage, FixedClock(today()), EngineSettings::default())
    }

    struct BrokenStorage;

    impl DateStorage for BrokenStorage {
        fn save(&mut self, _dates: &[NaiveDate]) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }

        fn load(&self) -> anyhow::Result<Vec<NaiveDate>> {
            Err(anyhow!("unreadable"))
        }
    }

    #[test]
    fn first_load_selects_today_and_persists_it() {
        let mut engine = engine_with(MemoryDateStorage::new());
        let grid = engine.load().clone();

        assert_eq!(engine.selected_dates(), &[today()]);
        assert_eq!(engine.month_offset(), 0);
        assert_eq!(engine.storage().load().expect("load"), vec![today()]);
        assert_eq!(grid.len(), GRID_SLOTS);
        assert_eq!(grid.month, Some(day(2026, 10, 1)));
    }

    #[test]
    fn load_opens_on_month_of_earliest_stored_date() {
        let storage = MemoryDateStorage::with_dates(vec![day(2027, 2, 3), day(2026, 12, 24)]);
        let mut engine = engine_with(storage);
        engine.load();

        assert_eq!(engine.selected_dates(), &[day(2027, 2, 3), day(2026, 12, 24)]);
        assert_eq!(engine.month_offset(), 2);
        assert_eq!(engine.current_month(), Some(day(2026, 12, 1)));
        assert!(engine.is_in_range(day(2027, 1, 10)));
    }

    #[test]
    fn load_writes_back_normalized_selection() {
        let storage = MemoryDateStorage::with_dates(vec![
            day(2026, 10, 20),
            day(2026, 10, 22),
            day(2026, 10, 20),
            day(2026, 10, 25),
        ]);
        let mut engine = engine_with(storage);
        engine.load();

        assert_eq!(engine.selected_dates(), &[day(2026, 10, 20), day(2026, 10, 22)]);
        assert_eq!(
            engine.storage().load().expect("load"),
            vec![day(2026, 10, 20), day(2026, 10, 22)]
        );
    }

    #[test]
    fn range_scenario_from_fresh_start() {
        let mut engine = engine_with(MemoryDateStorage::new());
        engine.load();

        let plus = |n| today() + Duration::days(n);
        assert_eq!(engine.select(plus(5)), SelectOutcome::Extended);
        assert_eq!(engine.selected_dates(), &[today(), plus(5)]);
        assert!(engine.is_in_range(plus(2)));
        assert!(!engine.is_in_range(today()));
        assert!(!engine.is_in_range(plus(5)));

        assert_eq!(engine.select(plus(10)), SelectOutcome::Restarted);
        assert_eq!(engine.selected_dates(), &[plus(10)]);
        assert!(!engine.is_in_range(plus(2)));
        assert_eq!(engine.storage().load().expect("load"), vec![plus(10)]);
    }

    #[test]
    fn duplicate_select_neither_persists_nor_notifies() {
        let mut engine = engine_with(MemoryDateStorage::new());
        engine.load();

        let emitted = Rc::new(RefCell::new(0));
        {
            let emitted = Rc::clone(&emitted);
            engine.subscribe(move |_| *emitted.borrow_mut() += 1);
        }

        assert_eq!(engine.select(today()), SelectOutcome::Unchanged);
        assert_eq!(*emitted.borrow(), 0);

        engine.select(day(2026, 10, 18));
        assert_eq!(*emitted.borrow(), 1);
        assert!(engine.grid().iter().any(|cell| cell.date == Some(day(2026, 10, 18)) && cell.is_selected));
    }

    #[test]
    fn clear_resets_selection_and_month() {
        let mut engine = engine_with(MemoryDateStorage::new());
        engine.load();
        engine.select(day(2026, 11, 2));
        engine.change_month(4);

        engine.clear();
        assert_eq!(engine.selected_dates(), &[today()]);
        assert_eq!(engine.month_offset(), 0);
        assert_eq!(engine.storage().load().expect("load"), vec![today()]);
    }

    #[test]
    fn inverse_navigation_restores_grid() {
        let mut engine = engine_with(MemoryDateStorage::new());
        let original = engine.load().clone();

        engine.change_month(1);
        assert_eq!(engine.month_label(), "November 2026");
        assert_ne!(engine.grid(), &original);
        engine.change_month(-1);
        assert_eq!(engine.month_offset(), 0);
        assert_eq!(engine.grid(), &original);
        assert_eq!(engine.month_label(), "October 2026");
    }

    #[test]
    fn unrepresentable_month_yields_empty_grid() {
        let mut engine = engine_with(MemoryDateStorage::new());
        engine.load();
        engine.change_month(i32::MAX);

        assert!(engine.grid().is_empty());
        assert_eq!(engine.current_month(), None);
        assert_eq!(engine.month_label(), "");
    }

    #[test]
    fn overflowing_navigation_keeps_offset() {
        let mut engine = engine_with(MemoryDateStorage::new());
        engine.load();
        engine.change_month(i32::MAX);

        engine.change_month(1);
        assert_eq!(engine.month_offset(), i32::MAX);
        engine.change_month(-1);
        assert_eq!(engine.month_offset(), i32::MAX - 1);
        engine.change_month(1);
        assert_eq!(engine.month_offset(), i32::MAX);

        engine.change_month(-i32::MAX);
        assert_eq!(engine.month_offset(), 0);
        assert_eq!(engine.month_label(), "October 2026");
    }

    #[test]
    fn storage_failures_fall_back_to_defaults() {
        let mut engine = CalendarEngine::new(BrokenStorage, FixedClock(today()), EngineSettings::default());
        engine.load();
        assert_eq!(engine.selected_dates(), &[today()]);

        engine.select(day(2026, 10, 20));
        assert_eq!(engine.selected_dates(), &[today(), day(2026, 10, 20)]);
    }

    #[test]
    fn week_start_shifts_padding() {
        let settings = EngineSettings {
            first_weekday: Weekday::Sun,
            month_label_format: "%m/%Y".to_string(),
        };
        let mut engine = CalendarEngine::new(MemoryDateStorage::new(), FixedClock(today()), settings);
        let grid = engine.load();

        // 2026-10-01 is a Thursday.
        assert_eq!(grid.leading_placeholders(), 4);
        assert_eq!(engine.month_label(), "10/2026");
    }
}

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, instrument, trace};

use crate::engine::{CalendarEngine, Clock};
use crate::observer::{Observers, SubscriptionId};
use crate::storage::DateStorage;

pub const DEFAULT_TAP_THRESHOLD: u32 = 5;
pub const DEFAULT_MULTI_TAP_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
    Down,
}

/// Lifecycle phase reported by the host recognizer. Only `Ended` signals
/// carry a completed gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerState {
    Possible,
    Began,
    Changed,
    Ended,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawGestureKind {
    Tap,
    Swipe(SwipeDirection),
}

/// Signal as delivered by the presentation layer, before classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawGesture {
    pub kind: RawGestureKind,
    pub state: RecognizerState,
    pub at: Instant,
    pub location: Option<Point>,
}

impl RawGesture {
    pub fn tap(at: Instant, location: Option<Point>) -> Self {
        Self {
            kind: RawGestureKind::Tap,
            state: RecognizerState::Ended,
            at,
            location,
        }
    }

    pub fn swipe(direction: SwipeDirection, at: Instant) -> Self {
        Self {
            kind: RawGestureKind::Swipe(direction),
            state: RecognizerState::Ended,
            at,
            location: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    SingleTap,
    DoubleTap,
    SwipeLeft,
    SwipeRight,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub location: Option<Point>,
}

/// What the dispatcher did in response to an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// Confirmed single tap. No engine operation is bound to it.
    SingleTap,
    /// Double tap counted towards the explosion threshold.
    TapCounted { count: u32 },
    /// A running explosion was reset before starting a new one.
    ExplosionCancelled,
    ExplosionTriggered,
    /// Month changed; the caller must report `transition_finished`.
    MonthChanged { delta: i32 },
    /// A month transition was already running.
    SwipeIgnored,
    DateSelected(NaiveDate),
    /// Placeholder, past day, out-of-grid index, or interaction disabled.
    CellIgnored,
    Restored,
}

/// Holds back a single tap until the multi-tap window has passed so that a
/// double tap always wins.
#[derive(Debug, Clone)]
pub struct TapClassifier {
    window: Duration,
    pending: Option<(Instant, Option<Point>)>,
}

impl TapClassifier {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Feeds one tap. Yields the previous tap as a single tap when it has
    /// expired, or a double tap when this one falls inside the window.
    pub fn tap(&mut self, at: Instant, location: Option<Point>) -> Vec<GestureEvent> {
        match self.pending.take() {
            Some((first, _)) if at.saturating_duration_since(first) <= self.window => {
                vec![GestureEvent {
                    kind: GestureKind::DoubleTap,
                    location,
                }]
            }
            Some((_, previous)) => {
                self.pending = Some((at, location));
                vec![GestureEvent {
                    kind: GestureKind::SingleTap,
                    location: previous,
                }]
            }
            None => {
                self.pending = Some((at, location));
                Vec::new()
            }
        }
    }

    /// Releases the held tap once the window has elapsed at `now`.
    pub fn flush(&mut self, now: Instant) -> Option<GestureEvent> {
        let (first, location) = self.pending?;
        if now.saturating_duration_since(first) <= self.window {
            return None;
        }
        self.pending = None;
        Some(GestureEvent {
            kind: GestureKind::SingleTap,
            location,
        })
    }

    /// Releases the held tap as a single tap regardless of the window. Used
    /// when another gesture interrupts a possible double tap.
    pub fn release(&mut self) -> Option<GestureEvent> {
        let (_, location) = self.pending.take()?;
        Some(GestureEvent {
            kind: GestureKind::SingleTap,
            location,
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Double taps needed to set off the explosion.
    pub tap_threshold: u32,
    pub multi_tap_window: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            tap_threshold: DEFAULT_TAP_THRESHOLD,
            multi_tap_window: DEFAULT_MULTI_TAP_WINDOW,
        }
    }
}

/// Turns raw gestures into engine operations and explosion signals.
///
/// The dispatcher does not own the engine; each call borrows it. Two
/// latches keep animations serialized: a month transition must be reported
/// finished before another swipe is honoured, and at most one explosion runs
/// at a time.
#[derive(Debug)]
pub struct GestureDispatcher {
    settings: DispatcherSettings,
    classifier: TapClassifier,
    tap_count: u32,
    transition_busy: bool,
    explosion_active: bool,
    interaction_enabled: bool,
    events: Observers<GestureEvent>,
    actions: Observers<DispatchAction>,
}

impl GestureDispatcher {
    pub fn new(settings: DispatcherSettings) -> Self {
        let tap_threshold = if settings.tap_threshold == 0 {
            DEFAULT_TAP_THRESHOLD
        } else {
            settings.tap_threshold
        };
        Self {
            settings: DispatcherSettings {
                tap_threshold,
                ..settings
            },
            classifier: TapClassifier::new(settings.multi_tap_window),
            tap_count: 0,
            transition_busy: false,
            explosion_active: false,
            interaction_enabled: true,
            events: Observers::new(),
            actions: Observers::new(),
        }
    }

    #[instrument(skip(self, engine), fields(kind = ?raw.kind, state = ?raw.state))]
    pub fn handle<S, C>(
        &mut self,
        raw: RawGesture,
        engine: &mut CalendarEngine<S, C>,
    ) -> Vec<DispatchAction>
    where
        S: DateStorage,
        C: Clock,
    {
        if raw.state != RecognizerState::Ended {
            trace!("ignoring unfinished gesture");
            return Vec::new();
        }

        let events = match raw.kind {
            RawGestureKind::Tap => self.classifier.tap(raw.at, raw.location),
            RawGestureKind::Swipe(direction) => {
                let kind = match direction {
                    SwipeDirection::Left => GestureKind::SwipeLeft,
                    SwipeDirection::Right => GestureKind::SwipeRight,
                    SwipeDirection::Up | SwipeDirection::Down => {
                        debug!(?direction, "unsupported swipe direction");
                        return Vec::new();
                    }
                };
                let mut events: Vec<GestureEvent> =
                    self.classifier.release().into_iter().collect();
                events.push(GestureEvent {
                    kind,
                    location: raw.location,
                });
                events
            }
        };

        events
            .into_iter()
            .flat_map(|event| self.route(event, engine))
            .collect()
    }

    /// Confirms a held single tap once its window has passed.
    pub fn flush(&mut self, now: Instant) -> Vec<DispatchAction> {
        match self.classifier.flush(now) {
            Some(event) => {
                self.events.emit(&event);
                let action = DispatchAction::SingleTap;
                self.actions.emit(&action);
                vec![action]
            }
            None => Vec::new(),
        }
    }

    fn route<S, C>(
        &mut self,
        event: GestureEvent,
        engine: &mut CalendarEngine<S, C>,
    ) -> Vec<DispatchAction>
    where
        S: DateStorage,
        C: Clock,
    {
        self.events.emit(&event);
        let actions = match event.kind {
            GestureKind::SingleTap => vec![DispatchAction::SingleTap],
            GestureKind::DoubleTap => self.register_double_tap(),
            GestureKind::SwipeLeft => vec![self.swipe(engine, 1)],
            GestureKind::SwipeRight => vec![self.swipe(engine, -1)],
        };
        for action in &actions {
            self.actions.emit(action);
        }
        actions
    }

    fn register_double_tap(&mut self) -> Vec<DispatchAction> {
        self.tap_count += 1;
        if self.tap_count < self.settings.tap_threshold {
            debug!(count = self.tap_count, "double tap counted");
            return vec![DispatchAction::TapCounted {
                count: self.tap_count,
            }];
        }

        self.tap_count = 0;
        let mut actions = Vec::with_capacity(2);
        if self.explosion_active {
            debug!("explosion already running; resetting it");
            actions.push(DispatchAction::ExplosionCancelled);
        }
        self.explosion_active = true;
        self.interaction_enabled = false;
        info!("explosion triggered");
        actions.push(DispatchAction::ExplosionTriggered);
        actions
    }

    fn swipe<S, C>(&mut self, engine: &mut CalendarEngine<S, C>, delta: i32) -> DispatchAction
    where
        S: DateStorage,
        C: Clock,
    {
        if self.transition_busy {
            debug!(delta, "month transition in progress; swipe ignored");
            return DispatchAction::SwipeIgnored;
        }
        self.transition_busy = true;
        engine.change_month(delta);
        DispatchAction::MonthChanged { delta }
    }

    /// Releases the swipe latch once the month transition has finished.
    pub fn transition_finished(&mut self) {
        trace!("month transition finished");
        self.transition_busy = false;
    }

    /// The explosion animation has settled. Cells stay inert until
    /// [`restore`](Self::restore).
    pub fn explosion_finished(&mut self) {
        self.explosion_active = false;
    }

    /// Cancels any explosion, re-enables the grid and repaints it.
    #[instrument(skip(self, engine))]
    pub fn restore<S, C>(&mut self, engine: &mut CalendarEngine<S, C>) -> DispatchAction
    where
        S: DateStorage,
        C: Clock,
    {
        self.explosion_active = false;
        self.interaction_enabled = true;
        self.tap_count = 0;
        engine.update_days();
        let action = DispatchAction::Restored;
        self.actions.emit(&action);
        action
    }

    /// Selects the day in grid cell `index` when it is today or later.
    #[instrument(skip(self, engine))]
    pub fn activate_cell<S, C>(
        &mut self,
        engine: &mut CalendarEngine<S, C>,
        index: usize,
    ) -> DispatchAction
    where
        S: DateStorage,
        C: Clock,
    {
        let today = engine.today();
        let target = engine
            .grid()
            .day_at(index)
            .filter(|cell| cell.is_interactive(today))
            .and_then(|cell| cell.date);

        let action = match target {
            Some(date) if self.interaction_enabled => {
                engine.select(date);
                DispatchAction::DateSelected(date)
            }
            _ => {
                debug!(index, interaction = self.interaction_enabled, "cell activation ignored");
                DispatchAction::CellIgnored
            }
        };
        self.actions.emit(&action);
        action
    }

    pub fn subscribe_events<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&GestureEvent) + 'static,
    {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe_events(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn subscribe_actions<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&DispatchAction) + 'static,
    {
        self.actions.subscribe(observer)
    }

    pub fn unsubscribe_actions(&mut self, id: SubscriptionId) -> bool {
        self.actions.unsubscribe(id)
    }

    pub fn settings(&self) -> DispatcherSettings {
        self.settings
    }

    pub fn tap_count(&self) -> u32 {
        self.tap_count
    }

    pub fn is_transition_busy(&self) -> bool {
        self.transition_busy
    }

    pub fn is_explosion_active(&self) -> bool {
        self.explosion_active
    }

    pub fn is_interaction_enabled(&self) -> bool {
        self.interaction_enabled
    }

    pub fn has_pending_tap(&self) -> bool {
        self.classifier.has_pending()
    }
}

impl Default for GestureDispatcher {
    fn default() -> Self {
        Self::new(DispatcherSettings::default())
    }
}

use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use tracing::{debug, instrument};

use crate::cli::Invocation;
use crate::datetime::parse_day_expr;
use crate::engine::{CalendarEngine, Clock};
use crate::gesture::{DispatchAction, GestureDispatcher, RawGesture, SwipeDirection};
use crate::render::Renderer;
use crate::selection::SelectOutcome;
use crate::storage::DateStorage;

/// Gap between scripted gestures; wider than any sane multi-tap window.
const SCRIPT_STEP: Duration = Duration::from_secs(1);
const DOUBLE_TAP_GAP: Duration = Duration::from_millis(50);

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "show", "select", "tap", "clear", "next", "prev", "gestures", "dates", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(engine, dispatcher, renderer, inv))]
pub fn dispatch<S, C>(
    engine: &mut CalendarEngine<S, C>,
    dispatcher: &mut GestureDispatcher,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()>
where
    S: DateStorage,
    C: Clock,
{
    let command = inv.command.as_str();
    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "show" => show(engine, renderer),
        "select" => cmd_select(engine, renderer, &inv.command_args),
        "tap" => cmd_tap(engine, dispatcher, renderer, &inv.command_args),
        "clear" => {
            engine.clear();
            show(engine, renderer)
        }
        "next" => cmd_navigate(engine, renderer, &inv.command_args, 1),
        "prev" => cmd_navigate(engine, renderer, &inv.command_args, -1),
        "gestures" => cmd_gestures(engine, dispatcher, renderer, &inv.command_args),
        "dates" => renderer.print_dates(engine.selected_dates()),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn show<S, C>(engine: &CalendarEngine<S, C>, renderer: &Renderer) -> anyhow::Result<()>
where
    S: DateStorage,
    C: Clock,
{
    renderer.print_grid(
        &engine.month_label(),
        engine.grid(),
        engine.today(),
        engine.settings().first_weekday,
    )
}

fn cmd_select<S, C>(
    engine: &mut CalendarEngine<S, C>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()>
where
    S: DateStorage,
    C: Clock,
{
    let expr = single_arg(args, "select <day>")?;
    let date = parse_day_expr(expr, engine.today())?;
    let outcome = engine.select(date);
    let note = match outcome {
        SelectOutcome::Unchanged => "already selected",
        SelectOutcome::Started => "selected",
        SelectOutcome::Extended => "range selected",
        SelectOutcome::Restarted => "new selection started",
    };
    println!("{date}: {note}");
    show(engine, renderer)
}

fn cmd_tap<S, C>(
    engine: &mut CalendarEngine<S, C>,
    dispatcher: &mut GestureDispatcher,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()>
where
    S: DateStorage,
    C: Clock,
{
    let raw = single_arg(args, "tap <cell-index>")?;
    let index: usize = raw
        .parse()
        .with_context(|| format!("invalid cell index: {raw}"))?;
    let action = dispatcher.activate_cell(engine, index);
    println!("{}", describe(&action));
    show(engine, renderer)
}

fn cmd_navigate<S, C>(
    engine: &mut CalendarEngine<S, C>,
    renderer: &Renderer,
    args: &[String],
    direction: i32,
) -> anyhow::Result<()>
where
    S: DateStorage,
    C: Clock,
{
    let steps: i32 = match args.first() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid month count: {raw}"))?,
        None => 1,
    };
    engine.change_month(direction.saturating_mul(steps));
    show(engine, renderer)
}

/// Replays a gesture script such as `double-tap swipe-left restore`.
/// Month transitions complete before the next token.
fn cmd_gestures<S, C>(
    engine: &mut CalendarEngine<S, C>,
    dispatcher: &mut GestureDispatcher,
    renderer: &Renderer,
    tokens: &[String],
) -> anyhow::Result<()>
where
    S: DateStorage,
    C: Clock,
{
    if tokens.is_empty() {
        return Err(anyhow!("gestures needs at least one token"));
    }

    let mut at = Instant::now();
    for token in tokens {
        let actions = match token.to_ascii_lowercase().as_str() {
            "tap" => dispatcher.handle(RawGesture::tap(at, None), engine),
            "double-tap" | "doubletap" => {
                let mut actions = dispatcher.handle(RawGesture::tap(at, None), engine);
                actions.extend(dispatcher.handle(RawGesture::tap(at + DOUBLE_TAP_GAP, None), engine));
                actions
            }
            "swipe-left" => {
                let actions = dispatcher.handle(RawGesture::swipe(SwipeDirection::Left, at), engine);
                dispatcher.transition_finished();
                actions
            }
            "swipe-right" => {
                let actions = dispatcher.handle(RawGesture::swipe(SwipeDirection::Right, at), engine);
                dispatcher.transition_finished();
                actions
            }
            "restore" => vec![dispatcher.restore(engine)],
            other => return Err(anyhow!("unknown gesture: {other}")),
        };
        for action in &actions {
            println!("{token}: {}", describe(action));
        }
        at += SCRIPT_STEP;
    }

    for action in dispatcher.flush(at) {
        println!("tap: {}", describe(&action));
    }

    show(engine, renderer)
}

fn describe(action: &DispatchAction) -> String {
    match action {
        DispatchAction::SingleTap => "single tap".to_string(),
        DispatchAction::TapCounted { count } => format!("double tap {count}"),
        DispatchAction::ExplosionCancelled => "explosion reset".to_string(),
        DispatchAction::ExplosionTriggered => "explosion!".to_string(),
        DispatchAction::MonthChanged { delta } => format!("month {delta:+}"),
        DispatchAction::SwipeIgnored => "swipe ignored".to_string(),
        DispatchAction::DateSelected(date) => format!("selected {date}"),
        DispatchAction::CellIgnored => "cell ignored".to_string(),
        DispatchAction::Restored => "restored".to_string(),
    }
}

fn single_arg<'a>(args: &'a [String], usage: &str) -> anyhow::Result<&'a str> {
    match args {
        [only] => Ok(only.as_str()),
        _ => Err(anyhow!("usage: datepick {usage}")),
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!("datepick [options] [command] [args]");
    println!();
    println!("commands:");
    println!("  show                 print the displayed month (default)");
    println!("  select <day>         select today, tomorrow, +N, -N or YYYY-MM-DD");
    println!("  tap <index>          activate grid cell 0..41");
    println!("  clear                reset to today");
    println!("  next [n] / prev [n]  move the displayed month");
    println!("  gestures <token>...  replay tap, double-tap, swipe-left, swipe-right, restore");
    println!("  dates                list selected dates");
    println!("  help | version");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{describe, dispatch, expand_command_abbrev, known_command_names};
    use crate::cli::Invocation;
    use crate::config::Config;
    use crate::engine::{CalendarEngine, EngineSettings, FixedClock};
    use crate::gesture::{DispatchAction, GestureDispatcher};
    use crate::render::Renderer;
    use crate::storage::MemoryDateStorage;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn invocation(command: &str, args: &[&str]) -> Invocation {
        Invocation {
            command: command.to_string(),
            command_args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    #[test]
    fn abbreviations_resolve_uniquely() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("g", &known), Some("gestures"));
        assert_eq!(expand_command_abbrev("ne", &known), Some("next"));
        assert_eq!(expand_command_abbrev("s", &known), None);
        assert_eq!(expand_command_abbrev("tap", &known), Some("tap"));
    }

    #[test]
    fn scripted_commands_drive_engine() {
        let mut engine = CalendarEngine::new(
            MemoryDateStorage::new(),
            FixedClock(day(2026, 10, 15)),
            EngineSettings::default(),
        );
        engine.load();
        let mut dispatcher = GestureDispatcher::default();
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");

        dispatch(&mut engine, &mut dispatcher, &renderer, invocation("select", &["+5"]))
            .expect("select");
        assert_eq!(engine.selected_dates(), &[day(2026, 10, 15), day(2026, 10, 20)]);

        dispatch(
            &mut engine,
            &mut dispatcher,
            &renderer,
            invocation("gestures", &["swipe-left", "swipe-left", "swipe-right"]),
        )
        .expect("gestures");
        assert_eq!(engine.month_offset(), 1);

        dispatch(&mut engine, &mut dispatcher, &renderer, invocation("clear", &[]))
            .expect("clear");
        assert_eq!(engine.selected_dates(), &[day(2026, 10, 15)]);
        assert_eq!(engine.month_offset(), 0);

        assert!(dispatch(&mut engine, &mut dispatcher, &renderer, invocation("select", &[])).is_err());
        assert!(
            dispatch(&mut engine, &mut dispatcher, &renderer, invocation("gestures", &["pinch"]))
                .is_err()
        );
    }

    #[test]
    fn describes_actions_for_humans() {
        assert_eq!(describe(&DispatchAction::MonthChanged { delta: -1 }), "month -1");
        assert_eq!(
            describe(&DispatchAction::DateSelected(day(2026, 10, 20))),
            "selected 2026-10-20"
        );
    }
}

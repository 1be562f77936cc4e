pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod day;
pub mod engine;
pub mod gesture;
pub mod grid;
pub mod observer;
pub mod render;
pub mod selection;
pub mod storage;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use crate::day::{
  CalendarDay,
  GRID_SLOTS,
  Grid
};
pub use crate::engine::{
  CalendarEngine,
  Clock,
  EngineSettings,
  FixedClock,
  SystemClock
};
pub use crate::gesture::{
  DispatchAction,
  DispatcherSettings,
  GestureDispatcher,
  GestureEvent,
  GestureKind,
  RawGesture
};
pub use crate::selection::{
  SelectOutcome,
  Selection
};
pub use crate::storage::{
  DateStorage,
  JsonFileDateStorage,
  MemoryDateStorage
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting datepick"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.datepickrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  let settings =
    config::Settings::from_config(&cfg)
      .context(
        "invalid calendar settings"
      )?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    JsonFileDateStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open date storage \
         at {}",
        data_dir.display()
      )
    })?;

  let mut engine = CalendarEngine::new(
    storage,
    SystemClock,
    settings.engine
  );
  engine.load();
  let mut dispatcher =
    GestureDispatcher::new(
      settings.dispatcher
    );

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv =
    cli::Invocation::parse(cli.rest)?;

  commands::dispatch(
    &mut engine,
    &mut dispatcher,
    &renderer,
    inv
  )?;

  info!("done");
  Ok(())
}

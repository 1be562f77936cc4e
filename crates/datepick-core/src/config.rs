use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono::NaiveDate;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::parse_weekday;
use crate::engine::{
  DEFAULT_MONTH_FORMAT,
  EngineSettings
};
use crate::gesture::{
  DEFAULT_MULTI_TAP_WINDOW,
  DEFAULT_TAP_THRESHOLD,
  DispatcherSettings
};

const RC_ENV_VAR: &str = "DATEPICKRC";
const RC_FILE_NAME: &str = ".datepickrc";
const DATA_DIR_NAME: &str = ".datepick";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  /// Built-in defaults without reading
  /// any rc file.
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in [
      ("data.location", "~/.datepick"),
      ("calendar.week_start", "monday"),
      (
        "calendar.month_format",
        DEFAULT_MONTH_FORMAT
      ),
      ("gesture.tap_threshold", "5"),
      (
        "gesture.multi_tap_window_ms",
        "300"
      ),
      ("color", "on")
    ] {
      cfg.map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading datepickrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no datepickrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include already loaded; skipping");
          continue;
        }
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Typed view of the calendar and
/// gesture keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub engine:     EngineSettings,
  pub dispatcher: DispatcherSettings
}

impl Settings {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let week_start = cfg
      .get("calendar.week_start")
      .unwrap_or_else(|| {
        "monday".to_string()
      });
    let first_weekday =
      parse_weekday(&week_start)
        .ok_or_else(|| {
          anyhow!(
            "invalid \
             calendar.week_start: \
             {week_start}"
          )
        })?;

    let month_label_format = cfg
      .get("calendar.month_format")
      .filter(|raw| {
        !raw.trim().is_empty()
      })
      .unwrap_or_else(|| {
        DEFAULT_MONTH_FORMAT.to_string()
      });
    validate_month_format(
      &month_label_format
    )?;

    let mut tap_threshold = parse_number(
      cfg,
      "gesture.tap_threshold",
      u64::from(DEFAULT_TAP_THRESHOLD)
    )?;
    if tap_threshold == 0 {
      warn!(
        "gesture.tap_threshold must \
         be positive; using default"
      );
      tap_threshold =
        u64::from(DEFAULT_TAP_THRESHOLD);
    }
    let tap_threshold =
      u32::try_from(tap_threshold)
        .context(
          "gesture.tap_threshold is \
           too large"
        )?;

    let window_ms = parse_number(
      cfg,
      "gesture.multi_tap_window_ms",
      DEFAULT_MULTI_TAP_WINDOW
        .as_millis()
        as u64
    )?;

    let settings = Self {
      engine:     EngineSettings {
        first_weekday,
        month_label_format
      },
      dispatcher: DispatcherSettings {
        tap_threshold,
        multi_tap_window:
          Duration::from_millis(
            window_ms
          )
      }
    };
    debug!(?settings, "resolved settings");
    Ok(settings)
  }
}

fn parse_number(
  cfg: &Config,
  key: &str,
  default: u64
) -> anyhow::Result<u64> {
  match cfg.get(key) {
    | Some(raw) => {
      raw.trim().parse::<u64>().with_context(
        || {
          format!(
            "invalid {key}: {raw}"
          )
        }
      )
    }
    | None => Ok(default)
  }
}

fn validate_month_format(
  format: &str
) -> anyhow::Result<()> {
  let sample =
    NaiveDate::from_ymd_opt(2000, 1, 1)
      .ok_or_else(|| {
        anyhow!(
          "failed to build sample date"
        )
      })?;
  let mut out = String::new();
  write!(out, "{}", sample.format(format))
    .map_err(|_| {
      anyhow!(
        "invalid \
         calendar.month_format: \
         {format}"
      )
    })
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(DATA_DIR_NAME))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use chrono::Weekday;
  use tempfile::tempdir;

  use super::{
    Config,
    Settings
  };

  #[test]
  fn defaults_resolve_to_documented_settings(
  ) {
    let settings = Settings::from_config(
      &Config::defaults()
    )
    .expect("default settings");
    assert_eq!(
      settings.engine.first_weekday,
      Weekday::Mon
    );
    assert_eq!(
      settings.engine.month_label_format,
      "%B %Y"
    );
    assert_eq!(
      settings.dispatcher.tap_threshold,
      5
    );
    assert_eq!(
      settings
        .dispatcher
        .multi_tap_window,
      Duration::from_millis(300)
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides(
  ) {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "gesture.tap_threshold = 3\n"
    )
    .expect("write include");
    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# calendar\n\
       calendar.week_start = sunday # US\n\
       include extra.rc\n\
       gesture.multi_tap_window_ms=250\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);

    cfg.apply_overrides([(
      "rc.calendar.month_format"
        .to_string(),
      "%Y-%m".to_string()
    )]);

    let settings =
      Settings::from_config(&cfg)
        .expect("settings");
    assert_eq!(
      settings.engine.first_weekday,
      Weekday::Sun
    );
    assert_eq!(
      settings.engine.month_label_format,
      "%Y-%m"
    );
    assert_eq!(
      settings.dispatcher.tap_threshold,
      3
    );
    assert_eq!(
      settings
        .dispatcher
        .multi_tap_window,
      Duration::from_millis(250)
    );
  }

  #[test]
  fn rejects_bad_values() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "calendar.week_start".to_string(),
      "someday".to_string()
    )]);
    assert!(
      Settings::from_config(&cfg).is_err()
    );

    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "gesture.tap_threshold".to_string(),
      "many".to_string()
    )]);
    assert!(
      Settings::from_config(&cfg).is_err()
    );

    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "calendar.month_format".to_string(),
      "%Q".to_string()
    )]);
    assert!(
      Settings::from_config(&cfg).is_err()
    );
  }

  #[test]
  fn zero_threshold_falls_back_to_default(
  ) {
    let mut cfg = Config::defaults();
    cfg.apply_overrides([(
      "gesture.tap_threshold".to_string(),
      "0".to_string()
    )]);
    let settings =
      Settings::from_config(&cfg)
        .expect("settings");
    assert_eq!(
      settings.dispatcher.tap_threshold,
      5
    );
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "week_start sunday\n")
      .expect("write rc");
    assert!(Config::load(Some(&rc)).is_err());
  }
}

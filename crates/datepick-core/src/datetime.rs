use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Duration,
  Months,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "datepick-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DATEPICK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DATEPICK_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone used to decide which calendar
/// day "today" is. Resolved once per
/// process.
pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn today_in(tz: &Tz) -> NaiveDate {
  Utc::now()
    .with_timezone(tz)
    .date_naive()
}

#[must_use]
pub fn project_today() -> NaiveDate {
  today_in(project_timezone())
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn first_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

/// Number of days in `month` of `year`,
/// or `None` when the month is outside
/// chrono's representable range.
pub fn days_in_month(
  year: i32,
  month: u32
) -> Option<u32> {
  let first = NaiveDate::from_ymd_opt(
    year, month, 1
  )?;
  let next = first
    .checked_add_months(Months::new(1))?;
  let last = next.pred_opt()?;
  Some(last.day())
}

/// Moves a month anchor by `delta`
/// months. `None` on overflow.
pub fn shift_months(
  month_first: NaiveDate,
  delta: i32
) -> Option<NaiveDate> {
  let months =
    Months::new(delta.unsigned_abs());
  if delta >= 0 {
    month_first
      .checked_add_months(months)
  } else {
    month_first
      .checked_sub_months(months)
  }
}

/// Calendar-month difference from `from`
/// to `to`; the day of month is ignored.
#[must_use]
pub fn month_offset_between(
  from: NaiveDate,
  to: NaiveDate
) -> i32 {
  (to.year() - from.year()) * 12
    + (to.month() as i32
      - from.month() as i32)
}

#[must_use]
pub fn leading_placeholders(
  month_first: NaiveDate,
  first_weekday: Weekday
) -> usize {
  let weekday = month_first
    .weekday()
    .num_days_from_monday()
    as usize;
  let start =
    first_weekday.num_days_from_monday()
      as usize;
  (weekday + 7 - start) % 7
}

pub fn parse_weekday(
  raw: &str
) -> Option<Weekday> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_day_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .succ_opt()
        .ok_or_else(|| {
          anyhow!(
            "no day after {today}"
          )
        });
    }
    | "yesterday" => {
      return today
        .pred_opt()
        .ok_or_else(|| {
          anyhow!(
            "no day before {today}"
          )
        });
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d{1,6})$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let amount: i64 = caps["num"]
      .parse()
      .context("invalid day count")?;
    let signed = if &caps["sign"] == "-" {
      -amount
    } else {
      amount
    };
    return today
      .checked_add_signed(
        Duration::days(signed)
      )
      .ok_or_else(|| {
        anyhow!(
          "relative day out of range: \
           {token}"
        )
      });
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "unrecognized day expression: \
       {token}"
    )
  })
}

/// Serde helpers encoding `NaiveDate`
/// lists as `YYYY-MM-DD` strings.
pub mod iso_day_serde {
  const FORMAT: &str = "%Y-%m-%d";

  pub mod vec {
    use chrono::NaiveDate;
    use serde::ser::SerializeSeq;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    use super::FORMAT;

    pub fn serialize<S>(
      days: &[NaiveDate],
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      let mut seq = serializer
        .serialize_seq(Some(days.len()))?;
      for day in days {
        seq.serialize_element(
          &day.format(FORMAT).to_string()
        )?;
      }
      seq.end()
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<Vec<NaiveDate>, D::Error>
    where
      D: Deserializer<'de>
    {
      let raw = Vec::<String>::deserialize(
        deserializer
      )?;
      raw
        .iter()
        .map(|item| {
          NaiveDate::parse_from_str(
            item, FORMAT
          )
          .map_err(
            serde::de::Error::custom
          )
        })
        .collect()
    }
  }
}

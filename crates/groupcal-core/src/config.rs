use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  NaiveTime,
  Weekday
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::draft::DraftSettings;
use crate::temporal::{
  one_hour_later,
  parse_clock_time
};

pub const TIMEZONE_ENV: &str =
  "GROUPCAL_TIMEZONE";
pub const RC_ENV: &str = "GROUPCALRC";

const DEFAULTS: [(&str, &str); 8] = [
  ("data.location", "~/.groupcal"),
  ("user", "me"),
  ("color", "on"),
  ("calendar.timezone", "UTC"),
  ("calendar.week_start", "monday"),
  ("draft.default_start", "09:00"),
  ("draft.default_end", "10:00"),
  (
    "availability.exclude_self_all_day",
    "yes"
  )
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
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

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .and_then(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
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

    let canonical =
      fs::canonicalize(&path)
        .unwrap_or_else(|_| {
          path.clone()
        });
    self
      .loaded_files
      .push(canonical);

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
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if !include_path.exists() {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
          continue;
        }

        let target =
          fs::canonicalize(
            &include_path
          )
          .unwrap_or_else(|_| {
            include_path.clone()
          });
        if self
          .loaded_files
          .contains(&target)
        {
          return Err(anyhow!(
            "include cycle at {}:{}: \
             {} is already loaded",
            path.display(),
            line_num + 1,
            include_path.display()
          ));
        }

        self.load_file(&include_path)?;
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

// Bad values fall back to the defaults
// with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
  pub draft:      DraftSettings,
  pub timezone:   Tz,
  pub week_start: Weekday,
  pub color:      bool
}

impl EngineSettings {
  pub fn from_config(
    cfg: &Config
  ) -> Self {
    Self::resolve(
      cfg,
      std::env::var(TIMEZONE_ENV).ok()
    )
  }

  #[tracing::instrument(skip(cfg))]
  pub fn resolve(
    cfg: &Config,
    timezone_env: Option<String>
  ) -> Self {
    let user = match cfg.get("user") {
      | Some(user)
        if !user.trim().is_empty() =>
      {
        user.trim().to_string()
      }
      | _ => {
        warn!(
          "empty user; falling back \
           to default"
        );
        "me".to_string()
      }
    };

    let defaults =
      DraftSettings::default();
    let default_start = clock_setting(
      cfg,
      "draft.default_start",
      defaults.default_start
    );
    let mut default_end = clock_setting(
      cfg,
      "draft.default_end",
      defaults.default_end
    );
    if default_end <= default_start {
      warn!(
        start = %default_start,
        end = %default_end,
        "draft.default_end must be after draft.default_start; using a one-hour slot"
      );
      default_end =
        one_hour_later(default_start);
    }

    let exclude_self_if_all_day =
      bool_setting(
        cfg,
        "availability.exclude_self_all_day",
        true
      );

    let timezone_raw = timezone_env
      .filter(|raw| {
        !raw.trim().is_empty()
      })
      .or_else(|| {
        cfg.get("calendar.timezone")
      })
      .unwrap_or_else(|| {
        "UTC".to_string()
      });
    let timezone = timezone_raw
      .trim()
      .parse::<Tz>()
      .unwrap_or_else(|_| {
        warn!(value = %timezone_raw, "unknown time zone; using UTC");
        Tz::UTC
      });

    let week_start = match cfg
      .get("calendar.week_start")
    {
      | Some(raw) => {
        raw
          .trim()
          .parse::<Weekday>()
          .unwrap_or_else(|_| {
            warn!(value = %raw, "invalid calendar.week_start; using monday");
            Weekday::Mon
          })
      }
      | None => Weekday::Mon
    };

    let color =
      bool_setting(cfg, "color", true);

    Self {
      draft: DraftSettings {
        user,
        default_start,
        default_end,
        exclude_self_if_all_day
      },
      timezone,
      week_start,
      color
    }
  }
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self::resolve(
      &Config::default(),
      None
    )
  }
}

fn clock_setting(
  cfg: &Config,
  key: &str,
  fallback: NaiveTime
) -> NaiveTime {
  let Some(raw) = cfg.get(key) else {
    return fallback;
  };
  parse_clock_time(&raw)
    .unwrap_or_else(|err| {
      warn!(key, value = %raw, error = %err, "invalid time setting; using default");
      fallback
    })
}

fn bool_setting(
  cfg: &Config,
  key: &str,
  fallback: bool
) -> bool {
  match cfg.get(key) {
    | None => fallback,
    | Some(raw) => {
      parse_bool(&raw)
        .unwrap_or_else(|| {
          warn!(key, value = %raw, "invalid boolean setting; using default");
          fallback
        })
    }
  }
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
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       ~/.groupcalrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".groupcalrc");
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
  Ok(home.join(".groupcal"))
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

fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  fn time(raw: &str) -> NaiveTime {
    NaiveTime::parse_from_str(
      raw, "%H:%M"
    )
    .expect("valid time")
  }

  fn pair(
    key: &str,
    value: &str
  ) -> (String, String) {
    (
      key.to_string(),
      value.to_string()
    )
  }

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let temp =
      tempdir().expect("tempdir");
    let rc =
      temp.path().join("groupcalrc");
    fs::write(
      temp.path().join("team.rc"),
      "calendar.week_start = sunday\n"
    )
    .expect("write include");
    fs::write(
      &rc,
      "# team calendar\nuser = alice   # signed in\ninclude team.rc\ndraft.default_start = 8:30am\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load rc");
    cfg.apply_overrides([pair(
      "rc.color", "off"
    )]);
    assert_eq!(cfg.loaded_files.len(), 2);

    let settings =
      EngineSettings::resolve(&cfg, None);
    assert_eq!(settings.draft.user, "alice");
    assert_eq!(
      settings.week_start,
      Weekday::Sun
    );
    assert_eq!(
      settings.draft.default_start,
      time("08:30")
    );
    assert_eq!(
      settings.draft.default_end,
      time("10:00")
    );
    assert!(!settings.color);
  }

  #[test]
  fn self_include_is_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let rc =
      temp.path().join("groupcalrc");
    fs::write(
      &rc,
      "user = alice\ninclude groupcalrc\n"
    )
    .expect("write rc");

    let err = Config::load(Some(&rc))
      .expect_err("cycle must fail");
    assert!(
      err
        .to_string()
        .contains("include cycle")
    );
  }

  #[test]
  fn include_loop_across_files_is_rejected()
  {
    let temp =
      tempdir().expect("tempdir");
    let rc =
      temp.path().join("groupcalrc");
    fs::write(
      temp.path().join("team.rc"),
      "color = off\ninclude ./groupcalrc\n"
    )
    .expect("write include");
    fs::write(&rc, "include team.rc\n")
      .expect("write rc");

    let err = Config::load(Some(&rc))
      .expect_err("cycle must fail");
    let message = format!("{err:#}");
    assert!(
      message.contains("include cycle")
    );
    assert!(message.contains("team.rc:2"));
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let rc =
      temp.path().join("groupcalrc");
    fs::write(&rc, "user alice\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err(
        "line without '=' must fail"
      );
    assert!(
      err.to_string().contains(":1:")
    );
  }

  #[test]
  fn invalid_values_fall_back_to_defaults()
  {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      pair(
        "calendar.timezone",
        "Mars/Olympus"
      ),
      pair(
        "calendar.week_start",
        "someday"
      ),
      pair(
        "draft.default_start",
        "25:00"
      ),
      pair(
        "availability.exclude_self_all_day",
        "maybe"
      ),
      pair("user", "  ")
    ]);
    let settings =
      EngineSettings::resolve(&cfg, None);
    assert_eq!(settings.timezone, Tz::UTC);
    assert_eq!(
      settings.week_start,
      Weekday::Mon
    );
    assert_eq!(
      settings.draft.default_start,
      time("09:00")
    );
    assert!(
      settings
        .draft
        .exclude_self_if_all_day
    );
    assert_eq!(settings.draft.user, "me");
  }

  #[test]
  fn end_before_start_becomes_one_hour_slot()
  {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      pair(
        "draft.default_start",
        "14:00"
      ),
      pair("draft.default_end", "13:00")
    ]);
    let settings =
      EngineSettings::resolve(&cfg, None);
    assert_eq!(
      settings.draft.default_end,
      time("15:00")
    );
  }

  #[test]
  fn timezone_env_wins_over_config() {
    let mut cfg = Config::default();
    cfg.apply_overrides([pair(
      "calendar.timezone",
      "Europe/Berlin"
    )]);
    assert_eq!(
      EngineSettings::resolve(&cfg, None)
        .timezone,
      chrono_tz::Europe::Berlin
    );
    assert_eq!(
      EngineSettings::resolve(
        &cfg,
        Some("Asia/Seoul".to_string())
      )
      .timezone,
      chrono_tz::Asia::Seoul
    );
  }

  #[test]
  fn data_dir_override_is_created() {
    let temp =
      tempdir().expect("tempdir");
    let target = temp
      .path()
      .join("nested")
      .join("data");
    let dir = resolve_data_dir(
      &Config::default(),
      Some(&target)
    )
    .expect("data dir");
    assert_eq!(dir, target);
    assert!(target.is_dir());
  }
}

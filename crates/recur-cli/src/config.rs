use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use recur_core::models::SchedulingConfig;
use recur_core::timezone::validate_timezone;
use serde::Deserialize;

const CONFIG_FILE: &str = "recur.toml";
const DEFAULT_DATABASE: &str = "recur.db";

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: String,
    /// IANA zone deciding which calendar day is "today"
    pub clinic_timezone: String,
    pub scheduling: SchedulingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE.to_string(),
            clinic_timezone: detect_system_timezone(),
            scheduling: SchedulingConfig::default(),
        }
    }
}

impl Config {
    /// Merges `recur.toml` and `RECUR_*` environment variables over the
    /// defaults. Nested keys use `__`, e.g. `RECUR_SCHEDULING__CONFLICT_HORIZON_DAYS`.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("RECUR_").split("__"))
    }
}

/// Detects the system timezone, falling back to UTC if detection fails
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(local_tz) = iana_time_zone::get_timezone() {
        if validate_timezone(&local_tz).is_ok() {
            return local_tz;
        }
    }

    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_and_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                database_path = "clinic.db"
                clinic_timezone = "Europe/Istanbul"

                [scheduling]
                default_max_conflicts = 25
                "#,
            )?;
            jail.set_env("RECUR_SCHEDULING__CONFLICT_HORIZON_DAYS", "90");

            let config = Config::load()?;
            assert_eq!(config.database_path, "clinic.db");
            assert_eq!(config.clinic_timezone, "Europe/Istanbul");
            assert_eq!(config.scheduling.default_max_conflicts, 25);
            assert_eq!(config.scheduling.conflict_horizon_days, 90);
            assert_eq!(config.scheduling.max_conflicts_limit, 100);
            Ok(())
        });
    }

    #[test]
    fn test_env_only() {
        Jail::expect_with(|jail| {
            jail.set_env("RECUR_DATABASE_PATH", "/tmp/other.db");
            let config = Config::load()?;
            assert_eq!(config.database_path, "/tmp/other.db");
            assert_eq!(config.scheduling.next_occurrence_lookahead_days, 366);
            Ok(())
        });
    }
}

//! Run token and output directory naming

use crate::config::ConfigMap;
use crate::error::ConfigError;
use chrono::{DateTime, TimeZone};
use serde_yaml::Value;
use std::fmt::Display;
use std::path::{Path, PathBuf};

pub const TOKEN_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// `<name>_<map_name>_<YYYY-MM-DD_HH-MM-SS>`
pub fn unique_token<Tz>(name: &str, map_name: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}_{}_{}", name, map_name, timestamp.format(TOKEN_TIME_FORMAT))
}

/// The experiment name stored under the top-level `name` key.
pub fn experiment_name(config: &ConfigMap) -> Result<String, ConfigError> {
    match config.get("name") {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(Value::Null) | None => Err(ConfigError::MissingKey("name".into())),
        Some(_) => Err(ConfigError::WrongType { key: "name".into(), expected: "a string" }),
    }
}

/// `<results_dir>/sacred/<token>`
pub fn observer_dir(results_dir: &Path, token: &str) -> PathBuf {
    results_dir.join("sacred").join(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Utc};

    #[test]
    fn token_joins_name_map_and_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(unique_token("liir", "3m", &ts), "liir_3m_2024-03-09_07-05-02");
    }

    #[test]
    fn token_uses_local_wall_clock() {
        let ts = Local.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(unique_token("qmix", "2s3z", &ts), "qmix_2s3z_2023-12-31_23-59-59");
    }

    #[test]
    fn experiment_name_requires_string() {
        let cfg: ConfigMap = serde_yaml::from_str("name: liir\n").expect("yaml");
        assert_eq!(experiment_name(&cfg).expect("name"), "liir");

        let cfg: ConfigMap = serde_yaml::from_str("name: 3\n").expect("yaml");
        assert!(matches!(experiment_name(&cfg), Err(ConfigError::WrongType { .. })));

        assert!(matches!(experiment_name(&ConfigMap::new()), Err(ConfigError::MissingKey(_))));
    }

    #[test]
    fn observer_dir_nests_under_sacred() {
        let dir = observer_dir(Path::new("results"), "liir_3m_2024-03-09_07-05-02");
        assert_eq!(dir, Path::new("results/sacred/liir_3m_2024-03-09_07-05-02"));
    }
}

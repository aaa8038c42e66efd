//! 配置加载：TOML 文件 → 环境变量 → 命令行参数，后者覆盖前者

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use zhxg_signin_core::Settings;

/// 配置目录下的文件名
pub const CONFIG_FILE: &str = "config.toml";

/// 环境变量前缀，形如 `ZHXG_<SECTION>_<KEY>`
pub const ENV_PREFIX: &str = "ZHXG_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
    pub api_key: Option<String>,
}

impl Overrides {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(username) = self.username {
            settings.user.username = username;
        }
        if let Some(password) = self.password {
            settings.user.password = password;
        }
        if let Some(lng) = self.lng {
            settings.location.longitude = lng;
        }
        if let Some(lat) = self.lat {
            settings.location.latitude = lat;
        }
        if let Some(api_key) = self.api_key {
            settings.llm.api_key = api_key;
        }
    }
}

/// 从配置目录和进程环境加载
pub fn load(dir: &Path) -> Result<Settings, ConfigError> {
    load_from(dir, std::env::vars())
}

/// 配置文件不存在时使用默认值
pub fn load_from<I>(dir: &Path, vars: I) -> Result<Settings, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let path = dir.join(CONFIG_FILE);
    let mut settings = match std::fs::read_to_string(&path) {
        Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    apply_env(&mut settings, vars)?;
    Ok(settings)
}

/// 应用 `ZHXG_` 前缀的环境变量，未知的键忽略
pub fn apply_env<I>(settings: &mut Settings, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "user_username" => settings.user.username = value,
            "user_password" => settings.user.password = value,
            "user_token" => settings.user.token = Some(value).filter(|t| !t.is_empty()),
            "location_longitude" => settings.location.longitude = parse(&key, &value)?,
            "location_latitude" => settings.location.latitude = parse(&key, &value)?,
            "location_address" => settings.location.address = value,
            "location_street" => settings.location.street = value,
            "location_district" => settings.location.district = value,
            "location_city" => settings.location.city = value,
            "location_province" => settings.location.province = value,
            "llm_api_key" => settings.llm.api_key = value,
            "llm_endpoint" => settings.llm.endpoint = value,
            "llm_model" => settings.llm.model = value,
            "signin_base_url" => settings.signin.base_url = value,
            "signin_retry_times" => settings.signin.retry_times = parse(&key, &value)?,
            "signin_retry_interval_secs" => {
                settings.signin.retry_interval_secs = parse(&key, &value)?
            }
            "scheduler_enabled" => settings.scheduler.enabled = parse(&key, &value)?,
            "scheduler_cron" => settings.scheduler.cron = value,
            "scheduler_timezone" => settings.scheduler.timezone = value,
            "logging_level" => settings.logging.level = value,
            "logging_file" => {
                settings.logging.file = Some(PathBuf::from(value)).filter(|p| !p.as_os_str().is_empty())
            }
            "logging_debug" => settings.logging.debug = parse(&key, &value)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const SAMPLE: &str = r#"
[user]
username = "20210001"
password = "from-file"

[location]
longitude = 116.397
latitude = 39.909
address = "北京市东城区"

[llm]
api_key = "sk-file"
model = "qwen-vl-max"

[signin]
base_url = "https://zhxg.example.edu.cn"
retry_times = 3

[scheduler]
enabled = true
cron = "30 7 * * 1-5"
"#;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(dir.path(), Vec::new()).unwrap();
        assert_eq!(settings.signin.retry_times, 5);
        assert!(settings.user.username.is_empty());
    }

    #[test]
    fn test_file_values_and_defaults_merge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), SAMPLE).unwrap();

        let settings = load_from(dir.path(), Vec::new()).unwrap();
        assert_eq!(settings.user.username, "20210001");
        assert_eq!(settings.location.longitude, 116.397);
        assert_eq!(settings.location.address, "北京市东城区");
        // 未写的字段保留默认值
        assert_eq!(settings.location.province, "辽宁省");
        assert_eq!(settings.signin.retry_times, 3);
        assert_eq!(settings.signin.retry_interval_secs, 3);
        assert!(settings.scheduler.enabled);
        assert_eq!(settings.scheduler.timezone, "Asia/Shanghai");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), SAMPLE).unwrap();

        let settings = load_from(
            dir.path(),
            vars(&[
                ("ZHXG_USER_PASSWORD", "from-env"),
                ("ZHXG_SIGNIN_RETRY_TIMES", "2"),
                ("ZHXG_SCHEDULER_ENABLED", "false"),
                ("ZHXG_LOGGING_FILE", "logs/run.json"),
                ("ZHXG_UNKNOWN_KEY", "ignored"),
                ("PATH", "/usr/bin"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.user.password, "from-env");
        assert_eq!(settings.signin.retry_times, 2);
        assert!(!settings.scheduler.enabled);
        assert_eq!(settings.logging.file, Some(PathBuf::from("logs/run.json")));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut settings = Settings::default();
        let err = apply_env(&mut settings, vars(&[("ZHXG_LOCATION_LATITUDE", "north")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "ZHXG_LOCATION_LATITUDE"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[user\nusername = 1").unwrap();
        let err = load_from(dir.path(), Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_flags_override_env() {
        let mut settings = Settings::default();
        apply_env(&mut settings, vars(&[("ZHXG_USER_USERNAME", "env-user")])).unwrap();
        Overrides {
            username: Some("flag-user".to_string()),
            lat: Some(31.23),
            ..Default::default()
        }
        .apply(&mut settings);
        assert_eq!(settings.user.username, "flag-user");
        assert_eq!(settings.location.latitude, 31.23);
        assert_eq!(settings.location.longitude, 121.533_04);
    }
}

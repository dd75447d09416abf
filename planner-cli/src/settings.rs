use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use planner_client::{
    CalendarExpander, ClientConfig, DEFAULT_BASE_URL, DEFAULT_MAX_SPAN_DAYS, DEFAULT_OFFSET_HOURS,
    IdPolicy,
};

const DEFAULT_DATA_DIR: &str = ".planner";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub timeout_secs: u64,
    pub calendar_offset_hours: i64,
    pub calendar_max_days: i64,
    pub id_policy: IdPolicy,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Читает настройки через `lookup`; в тестах вместо окружения подставляется map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = normalize_server(
            non_empty(&lookup, "PLANNER_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        );
        let data_dir = non_empty(&lookup, "PLANNER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let timeout_secs = parse_u64(&lookup, "PLANNER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let calendar_offset_hours =
            parse_i64(&lookup, "PLANNER_CALENDAR_OFFSET_HOURS", DEFAULT_OFFSET_HOURS)?;
        if !(-23..=23).contains(&calendar_offset_hours) {
            return Err(anyhow!("PLANNER_CALENDAR_OFFSET_HOURS must be within -23..=23"));
        }
        let calendar_max_days =
            parse_i64(&lookup, "PLANNER_CALENDAR_MAX_DAYS", DEFAULT_MAX_SPAN_DAYS)?;
        if calendar_max_days <= 0 {
            return Err(anyhow!("PLANNER_CALENDAR_MAX_DAYS must be > 0"));
        }
        let id_policy = match non_empty(&lookup, "PLANNER_ID_POLICY") {
            Some(raw) => raw
                .parse::<IdPolicy>()
                .map_err(|err| anyhow!("PLANNER_ID_POLICY: {err}"))?,
            None => IdPolicy::default(),
        };
        let log_level = non_empty(&lookup, "LOG_LEVEL")
            .or_else(|| non_empty(&lookup, "RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            api_url,
            data_dir,
            timeout_secs,
            calendar_offset_hours,
            calendar_max_days,
            id_policy,
            log_level,
        })
    }

    /// Флаги командной строки перекрывают окружение.
    pub fn with_overrides(mut self, server: Option<String>, data_dir: Option<PathBuf>) -> Self {
        if let Some(server) = server {
            self.api_url = normalize_server(server);
        }
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            calendar: CalendarExpander::new(self.calendar_offset_hours, self.calendar_max_days),
        }
    }
}

pub fn normalize_server(server: String) -> String {
    let server = server.trim().trim_end_matches('/').to_string();
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    let value = match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?,
        None => default,
    };

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

fn parse_i64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> Result<i64> {
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("Failed to parse {key}, expecting integer")),
        None => Ok(default),
    }
}

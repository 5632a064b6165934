use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::quality::parse_metric;

pub type DeviceId = u64;

/// Dashboard timestamps are shown in Philippine time (UTC+08:00, no DST).
const DISPLAY_OFFSET: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
    Some(offset) => offset,
    None => panic!("display offset out of range"),
};

// Enum to represent the status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unknown => "unknown",
        }
    }
}

// Struct to hold a monitored device as reported by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: DeviceStatus,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub wifi_ssid: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub signal_strength: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub latency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub download_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub upload_speed: Option<f64>,
}

impl Device {
    pub fn last_seen_display(&self) -> String {
        self.last_seen
            .map(|ts| format_display_time(&ts))
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// One observation of a device's connection quality.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub signal_strength: Option<f64>,
    pub download_speed: Option<f64>,
    pub upload_speed: Option<f64>,
    pub latency: Option<f64>,
    pub dns_resolution_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireMetricSample {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_number")]
    signal_strength: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    download_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    upload_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    latency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    dns_resolution_time: Option<f64>,
}

impl MetricSample {
    /// Decodes a metrics payload. Samples without a usable timestamp are
    /// dropped and the rest are returned oldest first.
    pub fn list_from_json(body: &str) -> serde_json::Result<Vec<MetricSample>> {
        let raw: Vec<WireMetricSample> = serde_json::from_str(body)?;
        let mut samples: Vec<MetricSample> = raw
            .into_iter()
            .filter_map(|s| {
                Some(MetricSample {
                    timestamp: s.timestamp?,
                    signal_strength: s.signal_strength,
                    download_speed: s.download_speed,
                    upload_speed: s.upload_speed,
                    latency: s.latency,
                    dns_resolution_time: s.dns_resolution_time,
                })
            })
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpeedTestResult {
    pub download: f64,
    pub upload: f64,
}

/// Window of history requested from the metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Hour,
    Day,
    Month,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::Hour, Timeframe::Day, Timeframe::Month];

    pub fn as_query(&self) -> &'static str {
        match self {
            Timeframe::Hour => "hour",
            Timeframe::Day => "day",
            Timeframe::Month => "month",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Hour => "Last hour",
            Timeframe::Day => "Today",
            Timeframe::Month => "This month",
        }
    }
}

pub fn format_display_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&DISPLAY_OFFSET)
        .format("%-m/%-d/%Y, %-I:%M:%S %p")
        .to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_metric(&s),
            _ => None,
        })
        .filter(|v| v.is_finite()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_timestamp(&s),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<DeviceStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if s.eq_ignore_ascii_case("online") => DeviceStatus::Online,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("offline") => DeviceStatus::Offline,
        _ => DeviceStatus::Unknown,
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ApiError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Serialize, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Available,
    Connected,
    Offline,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default = "unknown_status")]
    pub status: DeviceStatus,
}

fn unknown_status() -> DeviceStatus {
    DeviceStatus::Unknown
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AvailableDeviceInfo {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
}

/// Devices announcing themselves for pairing, keyed by device id.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct AvailableDevices(BTreeMap<String, AvailableDeviceInfo>);

impl AvailableDevices {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, device_id: &str) -> Option<&AvailableDeviceInfo> {
        self.0.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.0.contains_key(device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AvailableDeviceInfo)> {
        self.0.iter()
    }

    /// Ordered `(id, info)` pairs for list rendering.
    pub fn into_pairs(self) -> Vec<(String, AvailableDeviceInfo)> {
        self.0.into_iter().collect()
    }
}

impl FromIterator<(String, AvailableDeviceInfo)> for AvailableDevices {
    fn from_iter<I: IntoIterator<Item = (String, AvailableDeviceInfo)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WaterParameterSample {
    #[serde(default)]
    pub device_id: String,
    pub ph_level: f64,
    pub temperature: f64,
    pub turbidity: f64,
    pub hydrogen_sulfide_level: f64,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterParameter {
    Temperature,
    PhLevel,
    Turbidity,
    HydrogenSulfide,
}

impl WaterParameter {
    pub const ALL: [WaterParameter; 4] = [
        WaterParameter::Temperature,
        WaterParameter::PhLevel,
        WaterParameter::Turbidity,
        WaterParameter::HydrogenSulfide,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            WaterParameter::Temperature => "temperature",
            WaterParameter::PhLevel => "ph_level",
            WaterParameter::Turbidity => "turbidity",
            WaterParameter::HydrogenSulfide => "hydrogen_sulfide_level",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            WaterParameter::Temperature => "°C",
            WaterParameter::PhLevel => "pH",
            WaterParameter::Turbidity => "NTU",
            WaterParameter::HydrogenSulfide => "mg/L",
        }
    }
}

impl WaterParameterSample {
    pub fn value(&self, parameter: WaterParameter) -> f64 {
        match parameter {
            WaterParameter::Temperature => self.temperature,
            WaterParameter::PhLevel => self.ph_level,
            WaterParameter::Turbidity => self.turbidity,
            WaterParameter::HydrogenSulfide => self.hydrogen_sulfide_level,
        }
    }
}

/// A chart series `(created_date, value)` in the order the samples were given.
pub fn series(samples: &[WaterParameterSample], parameter: WaterParameter) -> Vec<(DateTime<Utc>, f64)> {
    samples
        .iter()
        .map(|s| (s.created_date, s.value(parameter)))
        .collect()
}

/// Job identifier as the backend sent it. Numeric ids are kept in their
/// decimal form.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(JobId(n.to_string())),
            Raw::Text(s) if !s.trim().is_empty() => Ok(JobId(s.trim().to_string())),
            Raw::Text(_) => Err(serde::de::Error::custom("empty job id")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Job {
    #[serde(alias = "job_id")]
    pub id: JobId,
    #[serde(default)]
    pub device_id: String,
    #[serde(default, alias = "command")]
    pub job_name: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
}

impl Job {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }

    /// Reads the reply to a queued command, either a bare job or one wrapped
    /// in `{"job": ..}`. Only the id is required.
    pub(crate) fn from_command_reply(reply: serde_json::Value) -> serde_json::Result<Self> {
        match reply {
            serde_json::Value::Object(mut map) if map.get("job").is_some_and(|j| j.is_object()) => {
                serde_json::from_value(map.remove("job").unwrap_or_default())
            }
            other => serde_json::from_value(other),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl JobQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            start: None,
            limit: Some(limit),
        }
    }
}

/// Free-form motor command. The backend's vocabulary is not published, so
/// the client only normalizes to trimmed lowercase and rejects blanks.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct DeviceCommand(String);

impl DeviceCommand {
    pub const SMALL_OPEN: &'static str = "small open";
    pub const HALF_OPEN: &'static str = "half open";
    pub const FULL_OPEN: &'static str = "full open";

    pub fn new(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ApiError::InvalidCommand(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct CommandRequest<'a> {
    pub command: &'a DeviceCommand,
}

#[derive(Serialize, Debug)]
pub(crate) struct DeviceIdBody<'a> {
    pub device_id: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FeedingDays {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Default for FeedingDays {
    fn default() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
        }
    }
}

impl FeedingDays {
    pub fn enabled(&self) -> impl Iterator<Item = chrono::Weekday> + '_ {
        use chrono::Weekday::*;
        [
            (Mon, self.monday),
            (Tue, self.tuesday),
            (Wed, self.wednesday),
            (Thu, self.thursday),
            (Fri, self.friday),
            (Sat, self.saturday),
            (Sun, self.sunday),
        ]
        .into_iter()
        .filter_map(|(day, on)| on.then_some(day))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedingHabit {
    pub minute_interval: u32,
    #[serde(default)]
    pub days: FeedingDays,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FeedingSchedule {
    pub habit: FeedingHabit,
    pub start_time: String,
    pub end_time: String,
}

impl Default for FeedingSchedule {
    fn default() -> Self {
        Self {
            habit: FeedingHabit {
                minute_interval: 30,
                days: FeedingDays::default(),
            },
            start_time: "08:00 AM".to_string(),
            end_time: "05:00 PM".to_string(),
        }
    }
}

/// `{"response": {"schedule": {...}}}`; either level may be absent.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct FeedingScheduleEnvelope {
    #[serde(default)]
    pub response: Option<FeedingScheduleBody>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct FeedingScheduleBody {
    #[serde(default)]
    pub schedule: Option<FeedingSchedule>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NotificationPage {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub total_count: u64,
}

impl NotificationPage {
    pub fn total_pages(&self, limit: u32) -> u64 {
        if limit == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(limit))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

/// Payload for creating or updating a user. `password` is omitted on
/// updates that keep the current one.
#[derive(Serialize, Clone, PartialEq)]
pub struct UserForm {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub role: Role,
}

impl fmt::Debug for UserForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .finish()
    }
}

/// Acknowledgement body. The backend replies with arbitrary JSON (or
/// nothing) on mutations.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Ack(pub serde_json::Value);

impl Ack {
    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(|m| m.as_str())
    }
}

/// Binary image returned by the inference endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ProcessedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    /// RFC 3339, RFC 2822, or a naive timestamp taken as UTC.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unrecognized timestamp {raw:?}")))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp {raw:?}"))),
        }
    }
}

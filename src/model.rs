//! Data models for Pillbox.
//!
//! # Wire Compatibility
//!
//! The persisted record shapes are shared with the dispensing device firmware
//! and the remote store. The field names `id`, `container`, `days`,
//! `pillCount`, `times` and `medName` are a compatibility surface and must be
//! preserved exactly; Rust-side names are mapped with serde renames.
//!
//! Persisted data is treated as untrusted: a record with missing or
//! wrong-shaped `days`/`times` decodes to empty sequences rather than
//! failing, so one corrupt record never breaks rendering or checking of all
//! the others.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Number of physical medicine containers.
pub const CONTAINER_COUNT: u8 = 4;

/// Canonical English weekday names used by schedule day-sets.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Motor speed applied when a container has never been tuned.
pub const DEFAULT_MOTOR_SPEED: i64 = 128;

/// Trigger threshold applied when a container has never been tuned.
pub const DEFAULT_TRIGGER_THRESHOLD: i64 = 1500;

/// One dosage plan for one physical container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique identity, derived from the creation timestamp in milliseconds.
    /// Immutable and never reused.
    pub id: i64,

    /// Which physical container this plan governs (1 through 4).
    #[serde(default = "default_container")]
    pub container: u8,

    /// Weekday names this plan is active on. Unordered for matching, stored
    /// in the order the user picked them.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub days: Vec<String>,

    /// Number of dose events per scheduled day.
    #[serde(rename = "pillCount", default = "default_pill_count")]
    pub pill_count: u32,

    /// Dose times in 12-hour display form (e.g. `"8:00 AM"`). Length should
    /// equal `pill_count` but a mismatch is tolerated everywhere.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub times: Vec<String>,

    /// Optional display label for the medicine in this container.
    #[serde(rename = "medName", default, skip_serializing_if = "Option::is_none")]
    pub med_name: Option<String>,
}

impl Schedule {
    /// Display label, falling back to `"Container {n}"` when no medicine
    /// name was set.
    pub fn display_name(&self) -> String {
        match &self.med_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Container {}", self.container),
        }
    }
}

fn default_container() -> u8 {
    1
}

fn default_pill_count() -> u32 {
    1
}

/// Decode a sequence of strings, tolerating null, missing, or wrong-shaped
/// values by producing an empty sequence. Non-string elements are dropped.
fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    })
}

/// An edit submitted to the sync engine: a new schedule when `id` is unset,
/// an in-place replacement of the matching record when set.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDraft {
    #[serde(default)]
    pub id: Option<i64>,

    pub container: u8,

    #[serde(default)]
    pub days: Vec<String>,

    #[serde(rename = "pillCount", default = "default_pill_count")]
    pub pill_count: u32,

    /// Dose times, either 24-hour `"HH:MM"` (time-picker input) or already
    /// in display form; normalized on save.
    #[serde(default)]
    pub times: Vec<String>,

    #[serde(rename = "medName", default)]
    pub med_name: Option<String>,
}

/// Per-container dispensing tuning values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSettings {
    #[serde(rename = "motorSpeed", default, skip_serializing_if = "Option::is_none")]
    pub motor_speed: Option<i64>,

    #[serde(rename = "triggerThreshold", default = "default_trigger_threshold")]
    pub trigger_threshold: i64,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            motor_speed: Some(DEFAULT_MOTOR_SPEED),
            trigger_threshold: DEFAULT_TRIGGER_THRESHOLD,
        }
    }
}

fn default_trigger_threshold() -> i64 {
    DEFAULT_TRIGGER_THRESHOLD
}

/// UI theme flag persisted alongside container settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

/// Session settings: per-container tuning plus the global theme flag.
///
/// The persisted shape keeps both under one flat object (keys `"1".."4"`
/// plus a sibling `"theme"` key) for compatibility with existing store data;
/// internally the two concerns are kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub containers: BTreeMap<u8, ContainerSettings>,
    pub theme: Option<Theme>,
}

impl Settings {
    /// Serialize into the persisted flat-object shape.
    pub fn to_remote(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (container, tuning) in &self.containers {
            let mut entry = serde_json::Map::new();
            if let Some(speed) = tuning.motor_speed {
                entry.insert("motorSpeed".to_string(), speed.into());
            }
            entry.insert(
                "triggerThreshold".to_string(),
                tuning.trigger_threshold.into(),
            );
            map.insert(container.to_string(), Value::Object(entry));
        }
        if let Some(theme) = self.theme {
            let label = match theme {
                Theme::Dark => "dark",
                Theme::Light => "light",
            };
            map.insert("theme".to_string(), label.into());
        }
        Value::Object(map)
    }

    /// Decode the persisted flat-object shape, tolerating an absent value
    /// and skipping entries that are not recognizable.
    pub fn from_remote(value: Option<&Value>) -> Self {
        let mut settings = Settings::default();
        let Some(Value::Object(map)) = value else {
            return settings;
        };

        for (key, entry) in map {
            if key == "theme" {
                settings.theme = match entry.as_str() {
                    Some("dark") => Some(Theme::Dark),
                    Some("light") => Some(Theme::Light),
                    _ => None,
                };
                continue;
            }
            let Ok(container) = key.parse::<u8>() else {
                continue;
            };
            if !(1..=CONTAINER_COUNT).contains(&container) {
                continue;
            }
            settings.containers.insert(
                container,
                ContainerSettings {
                    motor_speed: entry.get("motorSpeed").and_then(Value::as_i64),
                    trigger_threshold: entry
                        .get("triggerThreshold")
                        .and_then(Value::as_i64)
                        .unwrap_or(DEFAULT_TRIGGER_THRESHOLD),
                },
            );
        }
        settings
    }
}

/// A pending dose alert. Ephemeral: queued by the presenter until the user
/// acknowledges, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    #[serde(rename = "medName")]
    pub med_name: String,

    /// Dose time in display form.
    pub time: String,

    /// `"{scheduleId}-{timeIndex}"`, the per-occurrence dedup key.
    #[serde(rename = "pillId")]
    pub pill_id: String,
}

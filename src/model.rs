use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DAYS_PER_WEEK: usize = 7;
pub const WEEKS_PER_YEAR: usize = 52;

/// One week of commit activity: which of the seven days (Sunday first) saw at
/// least one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Week {
    #[serde(deserialize_with = "deserialize_days")]
    pub days: [bool; DAYS_PER_WEEK],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<i64>,
}

impl Week {
    pub fn from_days(days: [bool; DAYS_PER_WEEK]) -> Self {
        Self {
            days,
            total: None,
            week: None,
        }
    }

    pub fn full() -> Self {
        Self::from_days([true; DAYS_PER_WEEK])
    }

    pub fn is_active(&self, day: usize) -> bool {
        self.days.get(day).copied().unwrap_or(false)
    }

    pub fn active_days(&self) -> impl Iterator<Item = usize> + '_ {
        self.days
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(|(day, _)| day)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DayValue {
    Flag(bool),
    Count(u64),
}

// Upstream sends commit counts per day; tests and hand-written fixtures use
// booleans. Both collapse to "had a commit".
fn deserialize_days<'de, D>(deserializer: D) -> Result<[bool; DAYS_PER_WEEK], D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<DayValue>::deserialize(deserializer)?;
    if values.len() != DAYS_PER_WEEK {
        return Err(de::Error::invalid_length(values.len(), &"7 day entries"));
    }

    let mut days = [false; DAYS_PER_WEEK];
    for (slot, value) in days.iter_mut().zip(values) {
        *slot = match value {
            DayValue::Flag(flag) => flag,
            DayValue::Count(count) => count > 0,
        };
    }
    Ok(days)
}

/// Ordered weeks, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekActivity {
    weeks: Vec<Week>,
}

impl WeekActivity {
    pub fn new(weeks: Vec<Week>) -> Self {
        Self { weeks }
    }

    pub fn len(&self) -> usize {
        self.weeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Week> {
        self.weeks.get(index)
    }

    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    pub fn into_weeks(self) -> Vec<Week> {
        self.weeks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    Ready,
    NotFound,
    RateLimited,
    ServerError,
    Unknown,
}

impl FetchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The latest request issued for a user/repository pair. Retries replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub id: AttemptId,
    pub user: String,
    pub repository: String,
    pub status: FetchStatus,
}

/// Whether the last week of a session gets its own tone.
///
/// `Skip` keeps the one-tick silent pause before playback ends: the tick that
/// reaches the last week only advances the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalWeekAudio {
    Skip,
    Play,
}

impl FinalWeekAudio {
    pub const DEFAULT: Self = Self::Skip;
}

impl Default for FinalWeekAudio {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tone_sustain_ms")]
    pub tone_sustain_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub background_accompaniment: bool,
    #[serde(default)]
    pub final_week_audio: FinalWeekAudio,
    #[serde(default = "default_share_base_url")]
    pub share_base_url: String,
}

fn default_api_base_url() -> String {
    String::from("https://api.github.com")
}

fn default_tick_interval_ms() -> u64 {
    400
}

fn default_retry_delay_ms() -> u64 {
    400
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_tone_sustain_ms() -> u64 {
    200
}

fn default_volume() -> f32 {
    1.0
}

fn default_share_base_url() -> String {
    String::from("tonalhub://play")
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn tone_sustain(&self) -> Duration {
        Duration::from_millis(self.tone_sustain_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            tick_interval_ms: default_tick_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            tone_sustain_ms: default_tone_sustain_ms(),
            volume: default_volume(),
            background_accompaniment: false,
            final_week_audio: FinalWeekAudio::DEFAULT,
            share_base_url: default_share_base_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_accepts_commit_counts() {
        let raw = r#"{"days":[0,3,26,20,39,1,0],"total":89,"week":1336280400}"#;
        let week: Week = serde_json::from_str(raw).expect("week");
        assert_eq!(week.days, [false, true, true, true, true, true, false]);
        assert_eq!(week.total, Some(89));
    }

    #[test]
    fn week_accepts_boolean_days() {
        let raw = r#"{"days":[true,false,false,false,false,false,true]}"#;
        let week: Week = serde_json::from_str(raw).expect("week");
        assert_eq!(week.active_days().collect::<Vec<_>>(), vec![0, 6]);
    }

    #[test]
    fn week_rejects_wrong_day_count() {
        let raw = r#"{"days":[1,0,0]}"#;
        assert!(serde_json::from_str::<Week>(raw).is_err());
    }

    #[test]
    fn activity_is_a_plain_json_array() {
        let raw = r#"[{"days":[0,0,0,0,0,0,1]},{"days":[1,0,0,0,0,0,0]}]"#;
        let activity: WeekActivity = serde_json::from_str(raw).expect("activity");
        assert_eq!(activity.len(), 2);
        assert!(activity.get(1).expect("second week").is_active(0));
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"tick_interval_ms":250}"#).expect("settings");
        assert_eq!(settings.tick_interval(), Duration::from_millis(250));
        assert_eq!(settings.retry_delay(), Duration::from_millis(400));
        assert_eq!(settings.final_week_audio, FinalWeekAudio::Skip);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!FetchStatus::Pending.is_terminal());
        assert!(FetchStatus::Ready.is_terminal());
        assert!(FetchStatus::Unknown.is_terminal());
    }
}

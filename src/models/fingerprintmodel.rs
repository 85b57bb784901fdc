use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value reported by the browser for navigator.doNotTrack. Older clients send
/// a boolean, newer ones a string ("1", "unspecified"), and some omit it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DoNotTrack {
    Flag(bool),
    Value(String),
}

/// Snapshot of device/browser signals attached to one user. Every field is
/// optional: the client probe sends whatever it managed to collect, and the
/// record is replaced wholesale on login or explicit update.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FingerprintRecord {
    pub visitor_id: Option<String>,
    pub confidence: Option<f64>,
    pub components: Option<Vec<String>>,
    pub cookie_enabled: Option<bool>,
    pub do_not_track: Option<DoNotTrack>,
    pub hardware_concurrency: Option<i32>,
    pub max_touch_points: Option<i32>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub user_agent: Option<String>,
    pub vendor: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl FingerprintRecord {
    pub fn has_visitor_id(&self) -> bool {
        self.visitor_id.as_deref().map_or(false, |id| !id.is_empty())
    }
}

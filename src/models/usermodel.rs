use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::fingerprintmodel::FingerprintRecord;

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,

    /// Generated once at registration, never changed afterwards.
    pub referral_code: String,
    /// The code this user typed when registering, if any. Set only at creation.
    pub entered_referral_code: Option<String>,
    pub points: i32,

    /// Latest device snapshot, stored as JSONB. Replaced wholesale, no history.
    pub fingerprint: Option<Json<FingerprintRecord>>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn fingerprint_record(&self) -> Option<&FingerprintRecord> {
        self.fingerprint.as_ref().map(|fp| &fp.0)
    }
}

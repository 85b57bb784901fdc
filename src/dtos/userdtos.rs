use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::fingerprintmodel::FingerprintRecord;
use crate::models::referralmodel::ReferralStats;
use crate::models::usermodel::User;
use crate::service::referral::FraudReason;

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,

    #[validate(
        length(min = 1, message = "Confirm Password is required"),
        must_match(other = "password", message = "passwords do not match")
    )]
    #[serde(rename = "passwordConfirm")]
    pub password_confirm: String,

    pub referral_code: Option<String>,

    pub fingerprint: Option<FingerprintRecord>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(
        length(min = 1, message = "Password is required"),
        length(min = 6, message = "Password must be at least 6 characters")
    )]
    pub password: String,

    /// Latest probe result; replaces the stored snapshot wholesale on login.
    pub fingerprint: Option<FingerprintRecord>,
}

#[derive(Serialize, Deserialize, Validate)]
pub struct RequestQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct FraudCheckDto {
    pub fingerprint: FingerprintRecord,

    pub referral_code: Option<String>,

    /// Optional per-request override of the configured similarity threshold.
    #[validate(range(min = 0.0, max = 1.0, message = "Threshold must be within [0, 1]"))]
    pub threshold: Option<f64>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFingerprintDto {
    pub fingerprint: FingerprintRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub referral_code: String,
    pub entered_referral_code: Option<String>,
    pub points: i32,
    pub has_fingerprint: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            id: user.id.to_string(),
            name: user.name.to_owned(),
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            referral_code: user.referral_code.to_owned(),
            entered_referral_code: user.entered_referral_code.to_owned(),
            points: user.points,
            has_fingerprint: user.fingerprint.is_some(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    pub fn filter_users(users: &[User]) -> Vec<FilterUserDto> {
        users.iter().map(FilterUserDto::filter_user).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: UserData,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponseDto {
    pub status: String,
    pub data: UserData,
    /// Outcome of the referral points transaction. Fraud or an invalid code
    /// never fails the registration itself; only this field reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<ReferralOutcomeDto>,
}

#[derive(Debug, Serialize)]
pub struct ReferralOutcomeDto {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FraudReason>,
    pub referrer_points_awarded: i32,
    pub new_user_points_awarded: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserLoginResponseDto {
    pub status: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponseDto {
    pub status: String,
    pub users: Vec<FilterUserDto>,
    pub results: i64,
}

#[derive(Debug, Serialize)]
pub struct ReferralStatsResponseDto {
    pub status: String,
    pub data: ReferralStats,
}

#[derive(Debug, Serialize)]
pub struct FraudCheckResponseDto {
    pub status: String,
    pub allowed: bool,
    pub reason: FraudReason,
    pub threshold: f64,
    /// Score against the referrer's stored fingerprint, present when a
    /// referral code was supplied and that referrer has a snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_to_referrer: Option<f64>,
    pub matched_existing_account: bool,
    /// Whether the exact visitor id is already on file. Informational only:
    /// visitor ids are not unique across users and never decide the verdict.
    pub visitor_id_seen: bool,
}

use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::userdb::UserExt;
use crate::error::HttpError;
use crate::models::fingerprintmodel::FingerprintRecord;
use crate::models::usermodel::User;
use crate::service::fingerprint::{find_matching_fingerprint, is_same_device};

/// Points credited to the referrer for one legitimate referral. The new user
/// never receives points for entering a code.
pub const REFERRAL_POINTS: i32 = 100;

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReason {
    None,
    SelfReferral,
    MultiAccount,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferralVerdict {
    pub allowed: bool,
    pub reason: FraudReason,
}

impl ReferralVerdict {
    fn allowed() -> Self {
        ReferralVerdict {
            allowed: true,
            reason: FraudReason::None,
        }
    }

    fn fraud(reason: FraudReason) -> Self {
        ReferralVerdict {
            allowed: false,
            reason,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReferralError {
    #[error("Referral code {0} does not match any account")]
    ReferrerNotFound(String),

    #[error("Newly registered user {0} not found")]
    NewUserNotFound(Uuid),

    #[error("Referral blocked by fraud check: {0:?}")]
    FraudDetected(FraudReason),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ReferralError> for HttpError {
    fn from(error: ReferralError) -> Self {
        match error {
            ReferralError::ReferrerNotFound(_) => HttpError::bad_request(error.to_string()),
            ReferralError::NewUserNotFound(_) => HttpError::server_error(error.to_string()),
            ReferralError::FraudDetected(_) => HttpError::bad_request(error.to_string()),
            ReferralError::Database(_) => HttpError::server_error(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReferralAward {
    pub referrer_points_awarded: i32,
    pub new_user_points_awarded: i32,
    pub fraud_check_passed: bool,
}

/// Decides whether a referral is legitimate. Checks run in order and stop at
/// the first fraud signal: self-referral (new user's device is the referrer's
/// device), then multi-account (some other existing account is on the same
/// device as the new user).
///
/// A new user without a fingerprint passes: no fingerprint means no check is
/// possible, and legitimacy is assumed rather than penalized.
pub fn evaluate_referral(
    referrer: &User,
    new_user_id: Uuid,
    new_fingerprint: Option<&FingerprintRecord>,
    accounts: &[User],
    threshold: f64,
) -> ReferralVerdict {
    let Some(new_fingerprint) = new_fingerprint else {
        return ReferralVerdict::allowed();
    };

    if is_same_device(referrer.fingerprint_record(), Some(new_fingerprint), threshold) {
        return ReferralVerdict::fraud(FraudReason::SelfReferral);
    }

    if let Some(existing) = find_matching_fingerprint(new_fingerprint, accounts, threshold) {
        if existing.id != new_user_id {
            return ReferralVerdict::fraud(FraudReason::MultiAccount);
        }
    }

    ReferralVerdict::allowed()
}

/// Credits the referrer for a new registration, gated by the fraud guard.
///
/// The new user's account is already committed by the time this runs; every
/// error here is a signal to the caller, never a reason to unwind the
/// registration. The points mutation is a single atomic increment at the
/// store, so concurrent awards against the same referrer serialize there.
pub async fn award_referral_points<D: UserExt + Sync>(
    db: &D,
    referral_code: &str,
    new_user_id: Uuid,
    new_fingerprint: Option<&FingerprintRecord>,
    threshold: f64,
) -> Result<ReferralAward, ReferralError> {
    let referrer = db
        .get_user_by_referral_code(referral_code)
        .await?
        .ok_or_else(|| ReferralError::ReferrerNotFound(referral_code.to_string()))?;

    let new_user = db
        .get_user(Some(new_user_id), None, None)
        .await?
        .ok_or(ReferralError::NewUserNotFound(new_user_id))?;

    let accounts = db.get_users_with_fingerprint().await?;

    let verdict = evaluate_referral(&referrer, new_user.id, new_fingerprint, &accounts, threshold);
    if !verdict.allowed {
        tracing::warn!(
            "Referral fraud detected: {:?} (code {}, new user {})",
            verdict.reason,
            referral_code,
            new_user.id
        );
        return Err(ReferralError::FraudDetected(verdict.reason));
    }

    let updated_referrer = db.add_referral_points(referrer.id, REFERRAL_POINTS).await?;
    db.create_referral_record(referrer.id, new_user.id, REFERRAL_POINTS)
        .await?;

    tracing::info!(
        "Referral successful: {} referred {} (+{} points)",
        updated_referrer.username,
        new_user.username,
        REFERRAL_POINTS
    );

    Ok(ReferralAward {
        referrer_points_awarded: REFERRAL_POINTS,
        new_user_points_awarded: 0,
        fraud_check_passed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::referralmodel::{Referral, ReferralStats};
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::types::Json;
    use std::sync::Mutex;

    fn fingerprint(
        visitor_id: &str,
        platform: &str,
        vendor: &str,
        user_agent: &str,
        screen_resolution: &str,
        hardware_concurrency: i32,
    ) -> FingerprintRecord {
        FingerprintRecord {
            visitor_id: Some(visitor_id.to_string()),
            platform: Some(platform.to_string()),
            vendor: Some(vendor.to_string()),
            user_agent: Some(user_agent.to_string()),
            screen_resolution: Some(screen_resolution.to_string()),
            hardware_concurrency: Some(hardware_concurrency),
            max_touch_points: Some(0),
            timezone: Some("Africa/Accra".to_string()),
            language: Some("en-US".to_string()),
            ..Default::default()
        }
    }

    fn referrer_fingerprint() -> FingerprintRecord {
        fingerprint("fp-referrer", "Win32", "Google Inc.", "UA-X", "1920x1080", 8)
    }

    fn distinct_fingerprint() -> FingerprintRecord {
        // Differs on 5 of 8 fields: score 3/8 = 0.375, below 0.7.
        fingerprint("fp-new", "MacIntel", "Apple Inc.", "UA-Y", "2560x1600", 16)
    }

    fn user(code: &str, fp: Option<FingerprintRecord>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: code.to_string(),
            username: code.to_lowercase(),
            email: format!("{}@example.com", code.to_lowercase()),
            password: "hash".to_string(),
            referral_code: code.to_string(),
            entered_referral_code: None,
            points: 0,
            fingerprint: fp.map(Json),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn referral_code_is_eight_uppercase_alphanumeric_chars() {
        for _ in 0..50 {
            let code = generate_referral_code();
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn missing_fingerprint_is_allowed() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let verdict = evaluate_referral(&referrer, Uuid::new_v4(), None, &[referrer.clone()], 0.7);
        assert!(verdict.allowed);
        assert_eq!(verdict.reason, FraudReason::None);
    }

    #[test]
    fn identical_fingerprint_is_self_referral() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let verdict = evaluate_referral(
            &referrer,
            Uuid::new_v4(),
            Some(&referrer_fingerprint()),
            &[referrer.clone()],
            0.7,
        );
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, FraudReason::SelfReferral);
    }

    #[test]
    fn distinct_fingerprint_is_allowed() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let verdict = evaluate_referral(
            &referrer,
            Uuid::new_v4(),
            Some(&distinct_fingerprint()),
            &[referrer.clone()],
            0.7,
        );
        assert!(verdict.allowed);
        assert_eq!(verdict.reason, FraudReason::None);
    }

    #[test]
    fn matching_third_account_is_multi_account_fraud() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let other = user("OTHERACC", Some(distinct_fingerprint()));
        let accounts = vec![referrer.clone(), other];

        let verdict = evaluate_referral(
            &referrer,
            Uuid::new_v4(),
            Some(&distinct_fingerprint()),
            &accounts,
            0.7,
        );
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, FraudReason::MultiAccount);
    }

    #[test]
    fn new_users_own_row_is_not_multi_account() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let new_user = user("NEWUSER1", Some(distinct_fingerprint()));
        let accounts = vec![referrer.clone(), new_user.clone()];

        let verdict = evaluate_referral(
            &referrer,
            new_user.id,
            Some(&distinct_fingerprint()),
            &accounts,
            0.7,
        );
        assert!(verdict.allowed);
    }

    #[test]
    fn self_referral_is_reported_before_multi_account() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let clone_account = user("CLONEACC", Some(referrer_fingerprint()));
        let accounts = vec![clone_account, referrer.clone()];

        let verdict = evaluate_referral(
            &referrer,
            Uuid::new_v4(),
            Some(&referrer_fingerprint()),
            &accounts,
            0.7,
        );
        assert_eq!(verdict.reason, FraudReason::SelfReferral);
    }

    /// In-memory store for exercising the award flow without Postgres.
    struct MemStore {
        users: Mutex<Vec<User>>,
        referrals: Mutex<Vec<Referral>>,
    }

    impl MemStore {
        fn new(users: Vec<User>) -> Self {
            MemStore {
                users: Mutex::new(users),
                referrals: Mutex::new(Vec::new()),
            }
        }

        fn points_of(&self, id: Uuid) -> i32 {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .map(|u| u.points)
                .unwrap()
        }
    }

    #[async_trait]
    impl UserExt for MemStore {
        async fn get_user(
            &self,
            user_id: Option<Uuid>,
            username: Option<&str>,
            email: Option<&str>,
        ) -> Result<Option<User>, sqlx::Error> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .find(|u| {
                    user_id.map_or(false, |id| u.id == id)
                        || username.map_or(false, |n| u.username == n)
                        || email.map_or(false, |e| u.email == e)
                })
                .cloned())
        }

        async fn get_users(&self, _page: u32, _limit: usize) -> Result<Vec<User>, sqlx::Error> {
            Ok(self.users.lock().unwrap().clone())
        }

        async fn get_user_count(&self) -> Result<i64, sqlx::Error> {
            Ok(self.users.lock().unwrap().len() as i64)
        }

        async fn save_user(
            &self,
            _name: String,
            _username: String,
            _email: String,
            _password: String,
            _referral_code: String,
            _entered_referral_code: Option<String>,
            _fingerprint: Option<FingerprintRecord>,
        ) -> Result<User, sqlx::Error> {
            unimplemented!("not used by the award flow")
        }

        async fn get_user_by_referral_code(
            &self,
            referral_code: &str,
        ) -> Result<Option<User>, sqlx::Error> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .find(|u| u.referral_code == referral_code)
                .cloned())
        }

        async fn get_user_by_visitor_id(
            &self,
            visitor_id: &str,
        ) -> Result<Option<User>, sqlx::Error> {
            let users = self.users.lock().unwrap();
            Ok(crate::service::fingerprint::find_by_visitor_id(visitor_id, &users).cloned())
        }

        async fn get_users_with_fingerprint(&self) -> Result<Vec<User>, sqlx::Error> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .filter(|u| u.fingerprint_record().map_or(false, |fp| fp.has_visitor_id()))
                .cloned()
                .collect())
        }

        async fn update_user_fingerprint(
            &self,
            user_id: Uuid,
            fingerprint: FingerprintRecord,
        ) -> Result<User, sqlx::Error> {
            let mut users = self.users.lock().unwrap();
            let user = users.iter_mut().find(|u| u.id == user_id).unwrap();
            user.fingerprint = Some(Json(fingerprint));
            Ok(user.clone())
        }

        async fn add_referral_points(
            &self,
            referrer_id: Uuid,
            points: i32,
        ) -> Result<User, sqlx::Error> {
            let mut users = self.users.lock().unwrap();
            let user = users.iter_mut().find(|u| u.id == referrer_id).unwrap();
            user.points += points;
            Ok(user.clone())
        }

        async fn create_referral_record(
            &self,
            referrer_id: Uuid,
            referee_id: Uuid,
            points: i32,
        ) -> Result<Referral, sqlx::Error> {
            let referral = Referral {
                id: Uuid::new_v4(),
                referrer_id,
                referee_id,
                points_awarded: points,
                created_at: Some(Utc::now()),
            };
            self.referrals.lock().unwrap().push(Referral {
                id: referral.id,
                referrer_id,
                referee_id,
                points_awarded: points,
                created_at: referral.created_at,
            });
            Ok(referral)
        }

        async fn get_user_referral_stats(
            &self,
            user_id: Uuid,
        ) -> Result<ReferralStats, sqlx::Error> {
            let referrals = self.referrals.lock().unwrap();
            let mine: Vec<_> = referrals.iter().filter(|r| r.referrer_id == user_id).collect();
            Ok(ReferralStats {
                total_referrals: mine.len() as i64,
                total_points_earned: mine.iter().map(|r| r.points_awarded as i64).sum(),
                successful_referrals: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn award_credits_referrer_exactly_once() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let new_user = user("NEWUSER1", Some(distinct_fingerprint()));
        let referrer_id = referrer.id;
        let new_user_id = new_user.id;
        let store = MemStore::new(vec![referrer, new_user]);

        let award = award_referral_points(
            &store,
            "REFERRER",
            new_user_id,
            Some(&distinct_fingerprint()),
            0.7,
        )
        .await
        .expect("award should pass");

        assert_eq!(award.referrer_points_awarded, REFERRAL_POINTS);
        assert_eq!(award.new_user_points_awarded, 0);
        assert!(award.fraud_check_passed);
        assert_eq!(store.points_of(referrer_id), 100);
        assert_eq!(store.points_of(new_user_id), 0);
        assert_eq!(store.referrals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn self_referral_fails_and_withholds_points() {
        let referrer = user("REFERRER", Some(referrer_fingerprint()));
        let new_user = user("NEWUSER1", Some(referrer_fingerprint()));
        let referrer_id = referrer.id;
        let new_user_id = new_user.id;
        let store = MemStore::new(vec![referrer, new_user]);

        let err = award_referral_points(
            &store,
            "REFERRER",
            new_user_id,
            Some(&referrer_fingerprint()),
            0.7,
        )
        .await
        .expect_err("self-referral must be blocked");

        assert!(matches!(
            err,
            ReferralError::FraudDetected(FraudReason::SelfReferral)
        ));
        assert_eq!(store.points_of(referrer_id), 0);
        assert!(store.referrals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_referral_code_is_referrer_not_found() {
        let new_user = user("NEWUSER1", None);
        let new_user_id = new_user.id;
        let store = MemStore::new(vec![new_user]);

        let err = award_referral_points(&store, "NOSUCHCD", new_user_id, None, 0.7)
            .await
            .expect_err("unknown code must fail");
        assert!(matches!(err, ReferralError::ReferrerNotFound(_)));
    }

    #[tokio::test]
    async fn missing_new_user_is_new_user_not_found() {
        let referrer = user("REFERRER", None);
        let store = MemStore::new(vec![referrer]);

        let err = award_referral_points(&store, "REFERRER", Uuid::new_v4(), None, 0.7)
            .await
            .expect_err("missing new user must fail");
        assert!(matches!(err, ReferralError::NewUserNotFound(_)));
    }
}

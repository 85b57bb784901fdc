use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{
    fingerprintmodel::FingerprintRecord,
    referralmodel::{Referral, ReferralStats, ReferralUser},
    usermodel::User,
};

const USER_COLUMNS: &str = r#"
    id, name, username, email, password,
    referral_code, entered_referral_code, points,
    fingerprint, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct DBClient {
    pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

#[async_trait]
pub trait UserExt {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn get_users(&self, page: u32, limit: usize) -> Result<Vec<User>, sqlx::Error>;

    async fn get_user_count(&self) -> Result<i64, sqlx::Error>;

    async fn save_user(
        &self,
        name: String,
        username: String,
        email: String,
        password: String,
        referral_code: String,
        entered_referral_code: Option<String>,
        fingerprint: Option<FingerprintRecord>,
    ) -> Result<User, sqlx::Error>;

    async fn get_user_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn get_user_by_visitor_id(
        &self,
        visitor_id: &str,
    ) -> Result<Option<User>, sqlx::Error>;

    /// All accounts whose stored fingerprint carries a non-empty visitor id,
    /// in creation order. This is the candidate set the fraud scan walks.
    async fn get_users_with_fingerprint(&self) -> Result<Vec<User>, sqlx::Error>;

    async fn update_user_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: FingerprintRecord,
    ) -> Result<User, sqlx::Error>;

    /// Single-statement increment so concurrent awards against one referrer
    /// serialize at the row instead of losing updates.
    async fn add_referral_points(
        &self,
        referrer_id: Uuid,
        points: i32,
    ) -> Result<User, sqlx::Error>;

    async fn create_referral_record(
        &self,
        referrer_id: Uuid,
        referee_id: Uuid,
        points: i32,
    ) -> Result<Referral, sqlx::Error>;

    async fn get_user_referral_stats(
        &self,
        user_id: Uuid,
    ) -> Result<ReferralStats, sqlx::Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(username) = username {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(email) = email {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        }

        Ok(user)
    }

    async fn get_users(&self, page: u32, limit: usize) -> Result<Vec<User>, sqlx::Error> {
        let offset = (page.saturating_sub(1)) as i64 * limit as i64;

        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_user_count(&self) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn save_user(
        &self,
        name: String,
        username: String,
        email: String,
        password: String,
        referral_code: String,
        entered_referral_code: Option<String>,
        fingerprint: Option<FingerprintRecord>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, username, email, password, referral_code, entered_referral_code, fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(username)
        .bind(email)
        .bind(password)
        .bind(referral_code)
        .bind(entered_referral_code)
        .bind(fingerprint.map(Json))
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user_by_referral_code(
        &self,
        referral_code: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE referral_code = $1"
        ))
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_user_by_visitor_id(
        &self,
        visitor_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE fingerprint->>'visitorId' = $1"
        ))
        .bind(visitor_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_users_with_fingerprint(&self) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE fingerprint->>'visitorId' IS NOT NULL
              AND fingerprint->>'visitorId' <> ''
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn update_user_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint: FingerprintRecord,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET fingerprint = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Json(fingerprint))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn add_referral_points(
        &self,
        referrer_id: Uuid,
        points: i32,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET points = points + $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(points)
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn create_referral_record(
        &self,
        referrer_id: Uuid,
        referee_id: Uuid,
        points: i32,
    ) -> Result<Referral, sqlx::Error> {
        sqlx::query_as::<_, Referral>(
            r#"
            INSERT INTO referrals (referrer_id, referee_id, points_awarded)
            VALUES ($1, $2, $3)
            RETURNING id, referrer_id, referee_id, points_awarded, created_at
            "#,
        )
        .bind(referrer_id)
        .bind(referee_id)
        .bind(points)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user_referral_stats(
        &self,
        user_id: Uuid,
    ) -> Result<ReferralStats, sqlx::Error> {
        let (total_referrals, total_points_earned): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(points_awarded), 0)::BIGINT
            FROM referrals
            WHERE referrer_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let successful_referrals = sqlx::query_as::<_, ReferralUser>(
            r#"
            SELECT u.id, u.name, u.username, u.email, r.created_at AS joined_at
            FROM referrals r
            JOIN users u ON r.referee_id = u.id
            WHERE r.referrer_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ReferralStats {
            total_referrals,
            total_points_earned,
            successful_referrals,
        })
    }
}

use crate::service::fingerprint::DEFAULT_SAME_DEVICE_THRESHOLD;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    /// Similarity threshold the referral fraud guard uses. The ad-hoc
    /// fraud-check endpoint may override it per request.
    pub same_device_threshold: f64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);

        let same_device_threshold = std::env::var("SAME_DEVICE_THRESHOLD")
            .ok()
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(DEFAULT_SAME_DEVICE_THRESHOLD);

        Config {
            database_url,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().unwrap(),
            port,
            same_device_threshold,
        }
    }
}

use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub check_interval_secs: u64,
    /// Without a token alerts go to the log only.
    pub bot_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://virtwatch.db".into()),
            check_interval_secs: env::var("CHECK_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .ok()
                .filter(|secs: &u64| *secs > 0)
                .expect("CHECK_INTERVAL_SECONDS must be a positive integer"),
            bot_token: env::var("BOT_TOKEN").ok().filter(|t| !t.trim().is_empty()),
        }
    }
}

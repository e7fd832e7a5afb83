use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;

// ── Account ─────────────────────────────────────────────────────────

/// Stored panel credentials, owned by one chat user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub panel_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    pub verify_tls: bool,
    pub created_at: DateTime<Utc>,
}

pub struct NewAccount<'a> {
    pub user_id: i64,
    pub title: &'a str,
    pub panel_url: &'a str,
    pub api_key: &'a str,
    pub api_secret: &'a str,
    pub verify_tls: bool,
}

impl Account {
    pub async fn insert(pool: &SqlitePool, account: &NewAccount<'_>) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO accounts (user_id, title, panel_url, api_key, api_secret, verify_tls)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(account.user_id)
        .bind(account.title)
        .bind(account.panel_url)
        .bind(account.api_key)
        .bind(account.api_secret)
        .bind(account.verify_tls)
        .fetch_one(pool)
        .await
    }

    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Fetch an account only if `user_id` owns it.
    pub async fn get_for_user(pool: &SqlitePool, user_id: i64, id: i64) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM accounts WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first.
    pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM accounts WHERE user_id = ? ORDER BY id DESC")
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Distinct users owning at least one account.
    pub async fn list_user_ids(pool: &SqlitePool) -> sqlx::Result<Vec<i64>> {
        sqlx::query_scalar("SELECT DISTINCT user_id FROM accounts ORDER BY user_id")
            .fetch_all(pool)
            .await
    }

    /// Delete an account together with its alert state.
    ///
    /// Returns `false` when the account does not exist or belongs to someone else.
    pub async fn delete_for_user(pool: &SqlitePool, user_id: i64, id: i64) -> sqlx::Result<bool> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM alert_state WHERE user_id = ? AND account_id = ?")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM accounts WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }
}

// ── AlertSettings ───────────────────────────────────────────────────

pub const DEFAULT_WARN_PERCENT: i32 = 80;
pub const DEFAULT_CRITICAL_PERCENT: i32 = 100;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertSettings {
    pub user_id: i64,
    pub alerts_enabled: bool,
    pub disk_warn: i32,
    pub disk_critical: i32,
    pub bw_warn: i32,
    pub bw_critical: i32,
    pub suspend_alerts: bool,
    pub updated_at: DateTime<Utc>,
}

/// Warn/critical percentages for both resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub disk_warn: i32,
    pub disk_critical: i32,
    pub bw_warn: i32,
    pub bw_critical: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disk_warn: DEFAULT_WARN_PERCENT,
            disk_critical: DEFAULT_CRITICAL_PERCENT,
            bw_warn: DEFAULT_WARN_PERCENT,
            bw_critical: DEFAULT_CRITICAL_PERCENT,
        }
    }
}

impl Thresholds {
    /// Critical must not be below warn for either resource.
    pub fn is_consistent(&self) -> bool {
        self.disk_critical >= self.disk_warn && self.bw_critical >= self.bw_warn
    }
}

impl AlertSettings {
    /// Load a user's settings, inserting the defaults on first access.
    pub async fn get_or_default(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Self> {
        sqlx::query("INSERT INTO alert_settings (user_id) VALUES (?) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query_as("SELECT * FROM alert_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn set_alerts_enabled(pool: &SqlitePool, user_id: i64, enabled: bool) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO alert_settings (user_id, alerts_enabled) VALUES (?, ?)
               ON CONFLICT (user_id)
               DO UPDATE SET alerts_enabled = excluded.alerts_enabled, updated_at = ?
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(enabled)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn set_suspend_alerts(pool: &SqlitePool, user_id: i64, enabled: bool) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO alert_settings (user_id, suspend_alerts) VALUES (?, ?)
               ON CONFLICT (user_id)
               DO UPDATE SET suspend_alerts = excluded.suspend_alerts, updated_at = ?
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(enabled)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Store thresholds as given; callers validate with [`parse_percent`] and
    /// [`Thresholds::is_consistent`].
    pub async fn set_thresholds(pool: &SqlitePool, user_id: i64, t: &Thresholds) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO alert_settings (user_id, disk_warn, disk_critical, bw_warn, bw_critical)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (user_id)
               DO UPDATE SET disk_warn = excluded.disk_warn,
                             disk_critical = excluded.disk_critical,
                             bw_warn = excluded.bw_warn,
                             bw_critical = excluded.bw_critical,
                             updated_at = ?
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(t.disk_warn)
        .bind(t.disk_critical)
        .bind(t.bw_warn)
        .bind(t.bw_critical)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            disk_warn: self.disk_warn,
            disk_critical: self.disk_critical,
            bw_warn: self.bw_warn,
            bw_critical: self.bw_critical,
        }
    }
}

/// Parse a threshold typed by a user: an integer 1..=100, `%` optional.
pub fn parse_percent(text: &str) -> Option<i32> {
    let t = text.trim().replace(['%', '٪'], "");
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    t.parse::<i32>().ok().filter(|n| (1..=100).contains(n))
}

// ── AlertState ──────────────────────────────────────────────────────

/// Classified usage of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ok,
    Warn,
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Critical => "critical",
        }
    }

    /// Warn and critical are the levels that notify.
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::Warn | Self::Critical)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "warn" => Ok(Self::Warn),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// Last observation of one VM, per (user, account, vm).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertState {
    pub user_id: i64,
    pub account_id: i64,
    pub vm_id: String,
    pub last_disk_level: Option<Level>,
    pub last_bw_level: Option<Level>,
    pub last_suspend: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewAlertState<'a> {
    pub user_id: i64,
    pub account_id: i64,
    pub vm_id: &'a str,
    pub disk_level: Option<Level>,
    pub bw_level: Option<Level>,
    pub suspended: Option<i64>,
}

impl AlertState {
    pub async fn get(
        pool: &SqlitePool,
        user_id: i64,
        account_id: i64,
        vm_id: &str,
    ) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM alert_state WHERE user_id = ? AND account_id = ? AND vm_id = ?")
            .bind(user_id)
            .bind(account_id)
            .bind(vm_id)
            .fetch_optional(pool)
            .await
    }

    /// Last write wins; `None` levels overwrite previous values.
    pub async fn upsert(pool: &SqlitePool, state: &NewAlertState<'_>) -> sqlx::Result<()> {
        sqlx::query(
            r#"INSERT INTO alert_state (user_id, account_id, vm_id, last_disk_level, last_bw_level, last_suspend, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (user_id, account_id, vm_id)
               DO UPDATE SET last_disk_level = excluded.last_disk_level,
                             last_bw_level = excluded.last_bw_level,
                             last_suspend = excluded.last_suspend,
                             updated_at = excluded.updated_at"#,
        )
        .bind(state.user_id)
        .bind(state.account_id)
        .bind(state.vm_id)
        .bind(state.disk_level)
        .bind(state.bw_level)
        .bind(state.suspended)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_account(
        pool: &SqlitePool,
        user_id: i64,
        account_id: i64,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM alert_state WHERE user_id = ? AND account_id = ? ORDER BY vm_id")
            .bind(user_id)
            .bind(account_id)
            .fetch_all(pool)
            .await
    }

    pub async fn delete_for_account(pool: &SqlitePool, user_id: i64, account_id: i64) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM alert_state WHERE user_id = ? AND account_id = ?")
            .bind(user_id)
            .bind(account_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_pool;

    async fn add_account(pool: &SqlitePool, user_id: i64, title: &str) -> Account {
        Account::insert(
            pool,
            &NewAccount {
                user_id,
                title,
                panel_url: "https://panel.test:4083",
                api_key: "key-abcdef",
                api_secret: "pass-abcdef",
                verify_tls: false,
            },
        )
        .await
        .unwrap()
    }

    fn state<'a>(account_id: i64, vm_id: &'a str, disk: Option<Level>, suspended: Option<i64>) -> NewAlertState<'a> {
        NewAlertState {
            user_id: 1,
            account_id,
            vm_id,
            disk_level: disk,
            bw_level: None,
            suspended,
        }
    }

    #[tokio::test]
    async fn accounts_are_scoped_to_their_owner() {
        let pool = memory_pool().await.unwrap();
        let first = add_account(&pool, 1, "Panel A").await;
        let second = add_account(&pool, 1, "Panel B").await;
        add_account(&pool, 2, "Other").await;

        assert!(!first.verify_tls);
        let listed = Account::list_for_user(&pool, 1).await.unwrap();
        assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        assert!(Account::get_for_user(&pool, 2, first.id).await.unwrap().is_none());
        assert_eq!(Account::list_user_ids(&pool).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn deleting_account_removes_its_alert_state() {
        let pool = memory_pool().await.unwrap();
        let keep = add_account(&pool, 1, "Keep").await;
        let gone = add_account(&pool, 1, "Gone").await;

        AlertState::upsert(&pool, &state(keep.id, "101", Some(Level::Ok), Some(0))).await.unwrap();
        AlertState::upsert(&pool, &state(gone.id, "101", Some(Level::Warn), Some(0))).await.unwrap();

        assert!(!Account::delete_for_user(&pool, 2, gone.id).await.unwrap());
        assert!(Account::delete_for_user(&pool, 1, gone.id).await.unwrap());

        assert!(AlertState::get(&pool, 1, gone.id, "101").await.unwrap().is_none());
        assert!(AlertState::get(&pool, 1, keep.id, "101").await.unwrap().is_some());
        assert!(Account::get_by_id(&pool, gone.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn alert_state_upsert_is_last_write_wins() {
        let pool = memory_pool().await.unwrap();
        let account = add_account(&pool, 1, "Panel").await;

        AlertState::upsert(&pool, &state(account.id, "7", Some(Level::Critical), Some(1))).await.unwrap();
        AlertState::upsert(&pool, &state(account.id, "7", None, Some(0))).await.unwrap();

        let rows = AlertState::list_for_account(&pool, 1, account.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_disk_level, None);
        assert_eq!(rows[0].last_suspend, Some(0));

        assert_eq!(AlertState::delete_for_account(&pool, 1, account.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn settings_default_then_update() {
        let pool = memory_pool().await.unwrap();

        let s = AlertSettings::get_or_default(&pool, 42).await.unwrap();
        assert!(s.alerts_enabled);
        assert!(s.suspend_alerts);
        assert_eq!(s.thresholds(), Thresholds::default());

        let s = AlertSettings::set_alerts_enabled(&pool, 42, false).await.unwrap();
        assert!(!s.alerts_enabled);
        assert_eq!(s.disk_warn, DEFAULT_WARN_PERCENT);

        let t = Thresholds {
            disk_warn: 70,
            disk_critical: 90,
            bw_warn: 60,
            bw_critical: 95,
        };
        let s = AlertSettings::set_thresholds(&pool, 42, &t).await.unwrap();
        assert_eq!(s.thresholds(), t);
        assert!(!s.alerts_enabled);

        let s = AlertSettings::set_suspend_alerts(&pool, 43, false).await.unwrap();
        assert!(!s.suspend_alerts);
        assert!(s.alerts_enabled);
    }

    #[test]
    fn threshold_consistency() {
        assert!(Thresholds::default().is_consistent());
        let inverted = Thresholds {
            disk_warn: 90,
            disk_critical: 80,
            ..Thresholds::default()
        };
        assert!(!inverted.is_consistent());
    }

    #[test]
    fn percent_input_parsing() {
        assert_eq!(parse_percent(" 80 "), Some(80));
        assert_eq!(parse_percent("95%"), Some(95));
        assert_eq!(parse_percent("95٪"), Some(95));
        assert_eq!(parse_percent("100"), Some(100));
        assert_eq!(parse_percent("0"), None);
        assert_eq!(parse_percent("101"), None);
        assert_eq!(parse_percent("-5"), None);
        assert_eq!(parse_percent("8.5"), None);
        assert_eq!(parse_percent(""), None);
    }

    #[test]
    fn level_names() {
        assert_eq!("critical".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!(Level::Warn.to_string(), "warn");
        assert!(!Level::Ok.is_alerting());
        assert!("bad".parse::<Level>().is_err());
    }
}

use async_trait::async_trait;
use sqlx::SqlitePool;
use vw_db::models::{Account, AlertSettings, AlertState, NewAlertState};

use crate::monitor::{AlertStore, BoxError};

/// [`AlertStore`] backed by the SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn user_ids(&self) -> Result<Vec<i64>, BoxError> {
        Ok(Account::list_user_ids(&self.pool).await?)
    }

    async fn settings(&self, user_id: i64) -> Result<AlertSettings, BoxError> {
        Ok(AlertSettings::get_or_default(&self.pool, user_id).await?)
    }

    async fn accounts(&self, user_id: i64) -> Result<Vec<Account>, BoxError> {
        Ok(Account::list_for_user(&self.pool, user_id).await?)
    }

    async fn alert_state(
        &self,
        user_id: i64,
        account_id: i64,
        vm_id: &str,
    ) -> Result<Option<AlertState>, BoxError> {
        Ok(AlertState::get(&self.pool, user_id, account_id, vm_id).await?)
    }

    async fn save_alert_state(&self, state: &NewAlertState<'_>) -> Result<(), BoxError> {
        Ok(AlertState::upsert(&self.pool, state).await?)
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SqliteStore {
    SqliteStore::new(vw_db::memory_pool().await.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vw_db::models::{Level, NewAccount};

    #[tokio::test]
    async fn store_round_trips_through_the_database() {
        let store = memory_store().await;
        let account = Account::insert(
            store.pool(),
            &NewAccount {
                user_id: 9,
                title: "Main",
                panel_url: "https://p.test",
                api_key: "key-12345",
                api_secret: "pass-12345",
                verify_tls: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(store.user_ids().await.unwrap(), vec![9]);
        assert_eq!(store.accounts(9).await.unwrap().len(), 1);
        assert!(store.settings(9).await.unwrap().alerts_enabled);
        assert!(store.alert_state(9, account.id, "1").await.unwrap().is_none());

        store
            .save_alert_state(&NewAlertState {
                user_id: 9,
                account_id: account.id,
                vm_id: "1",
                disk_level: Some(Level::Warn),
                bw_level: None,
                suspended: Some(0),
            })
            .await
            .unwrap();

        let saved = store.alert_state(9, account.id, "1").await.unwrap().unwrap();
        assert_eq!(saved.last_disk_level, Some(Level::Warn));
        assert_eq!(saved.last_bw_level, None);
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use virtualizor_api::normalize::{display_name, primary_ip, vm_id};
use virtualizor_api::{PanelClient, PanelCredentials, VmRecord};
use vw_db::models::{Account, AlertSettings, AlertState, Level, NewAlertState, Thresholds};

use crate::notifier::Notifier;
use crate::usage::{Resource, classify, extract_usage, suspended_flag};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Panel calls the engine needs.
#[async_trait]
pub trait PanelApi: Send + Sync + 'static {
    async fn list_vms(&self, creds: &PanelCredentials) -> Result<Vec<VmRecord>, BoxError>;
    async fn vm_detail(&self, creds: &PanelCredentials, vm_id: &str) -> Result<VmRecord, BoxError>;
}

#[async_trait]
impl PanelApi for PanelClient {
    async fn list_vms(&self, creds: &PanelCredentials) -> Result<Vec<VmRecord>, BoxError> {
        Ok(PanelClient::list_vms(self, creds).await?)
    }

    async fn vm_detail(&self, creds: &PanelCredentials, vm_id: &str) -> Result<VmRecord, BoxError> {
        Ok(PanelClient::vm_detail(self, creds, vm_id).await?)
    }
}

/// Persistence the engine reads and writes. The engine is the only writer
/// of alert state.
#[async_trait]
pub trait AlertStore: Send + Sync + 'static {
    async fn user_ids(&self) -> Result<Vec<i64>, BoxError>;
    async fn settings(&self, user_id: i64) -> Result<AlertSettings, BoxError>;
    async fn accounts(&self, user_id: i64) -> Result<Vec<Account>, BoxError>;
    async fn alert_state(
        &self,
        user_id: i64,
        account_id: i64,
        vm_id: &str,
    ) -> Result<Option<AlertState>, BoxError>;
    async fn save_alert_state(&self, state: &NewAlertState<'_>) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Period between the starts of consecutive sweeps.
    pub interval: Duration,
}

/// Counters for one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub users_checked: usize,
    pub accounts_checked: usize,
    pub accounts_failed: usize,
    pub vms_checked: usize,
    pub vms_failed: usize,
    pub notifications_sent: usize,
}

/// What one poll observed for a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmReading {
    pub disk_pct: Option<i64>,
    pub disk_level: Option<Level>,
    pub bw_pct: Option<i64>,
    pub bw_level: Option<Level>,
    pub suspended: i64,
}

impl VmReading {
    pub fn from_detail(detail: &VmRecord, thresholds: &Thresholds) -> Self {
        let disk_pct = extract_usage(detail, Resource::Disk).and_then(|u| u.percent());
        let bw_pct = extract_usage(detail, Resource::Bandwidth).and_then(|u| u.percent());
        Self {
            disk_pct,
            disk_level: classify(disk_pct, thresholds.disk_warn, thresholds.disk_critical),
            bw_pct,
            bw_level: classify(bw_pct, thresholds.bw_warn, thresholds.bw_critical),
            suspended: suspended_flag(detail),
        }
    }

    fn resource(&self, resource: Resource) -> (Option<i64>, Option<Level>) {
        match resource {
            Resource::Disk => (self.disk_pct, self.disk_level),
            Resource::Bandwidth => (self.bw_pct, self.bw_level),
        }
    }
}

/// A state transition worth telling the user about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Usage {
        resource: Resource,
        level: Level,
        pct: i64,
    },
    Suspended,
    Unsuspended,
}

impl Notice {
    pub fn render(&self, name: &str, ip: &str) -> String {
        match self {
            Self::Usage { resource, level, pct } => format!(
                "⚠️ {} {}\nVPS: {name}\nIP: {ip}\nUsage: {pct}%",
                resource.label(),
                level.as_str().to_uppercase()
            ),
            Self::Suspended => format!("⛔ VPS suspended\nVPS: {name}\nIP: {ip}"),
            Self::Unsuspended => format!("✅ VPS unsuspended\nVPS: {name}\nIP: {ip}"),
        }
    }
}

/// Diff a reading against the stored state.
///
/// Usage notices fire when the new level is warn or critical and differs from
/// the stored one. Suspend notices need a stored flag to compare against.
pub fn transitions(prev: Option<&AlertState>, reading: &VmReading, suspend_alerts: bool) -> Vec<Notice> {
    let mut notices = Vec::new();

    for resource in Resource::ALL {
        let (pct, level) = reading.resource(resource);
        let previous = prev.and_then(|p| match resource {
            Resource::Disk => p.last_disk_level,
            Resource::Bandwidth => p.last_bw_level,
        });
        if let (Some(level), Some(pct)) = (level, pct)
            && level.is_alerting()
            && Some(level) != previous
        {
            notices.push(Notice::Usage { resource, level, pct });
        }
    }

    if suspend_alerts && let Some(last) = prev.and_then(|p| p.last_suspend) {
        match (last, reading.suspended) {
            (0, 1) => notices.push(Notice::Suspended),
            (1, 0) => notices.push(Notice::Unsuspended),
            _ => {}
        }
    }

    notices
}

/// Background service that sweeps every account on a fixed period.
pub struct AlertEngine {
    panel: Arc<dyn PanelApi>,
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
}

impl AlertEngine {
    pub fn new(
        panel: Arc<dyn PanelApi>,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            panel,
            store,
            notifier,
            config,
        }
    }

    /// Spawn the sweep loop. It never returns on its own.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let started = tokio::time::Instant::now();
                let report = self.sweep().await;
                tracing::info!(
                    users = report.users_checked,
                    accounts = report.accounts_checked,
                    accounts_failed = report.accounts_failed,
                    vms = report.vms_checked,
                    vms_failed = report.vms_failed,
                    notifications = report.notifications_sent,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "alert sweep finished"
                );
            }
        })
    }

    /// One pass over every user, account and VM, strictly in sequence.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let users = match self.store.user_ids().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "alert sweep: failed to list users");
                return report;
            }
        };

        for user_id in users {
            let settings = match self.store.settings(user_id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(user_id, error = %e, "alert sweep: failed to load settings");
                    continue;
                }
            };

            if !settings.alerts_enabled {
                continue;
            }

            if !settings.thresholds().is_consistent() {
                tracing::warn!(
                    user_id,
                    disk_warn = settings.disk_warn,
                    disk_critical = settings.disk_critical,
                    bw_warn = settings.bw_warn,
                    bw_critical = settings.bw_critical,
                    "critical threshold below warn; critical takes precedence"
                );
            }

            let accounts = match self.store.accounts(user_id).await {
                Ok(a) => a,
                Err(e) => {
                    tracing::error!(user_id, error = %e, "alert sweep: failed to load accounts");
                    continue;
                }
            };

            report.users_checked += 1;
            for account in &accounts {
                self.check_account(&settings, account, &mut report).await;
            }
        }

        report
    }

    async fn check_account(&self, settings: &AlertSettings, account: &Account, report: &mut SweepReport) {
        report.accounts_checked += 1;
        let creds = credentials(account);

        let vms = match self.panel.list_vms(&creds).await {
            Ok(vms) => vms,
            Err(e) => {
                report.accounts_failed += 1;
                tracing::warn!(
                    user_id = account.user_id,
                    account_id = account.id,
                    error = %e,
                    "alert sweep: failed to list VMs"
                );
                return;
            }
        };

        for vm in &vms {
            // Records without an identifier cannot be polled for detail.
            let Some(id) = vm_id(vm) else { continue };
            report.vms_checked += 1;

            let detail = match self.panel.vm_detail(&creds, &id).await {
                Ok(detail) => detail,
                Err(e) => {
                    report.vms_failed += 1;
                    tracing::warn!(
                        user_id = account.user_id,
                        account_id = account.id,
                        vm_id = %id,
                        error = %e,
                        "alert sweep: failed to fetch VM detail"
                    );
                    continue;
                }
            };

            if let Err(e) = self.evaluate_vm(settings, account, &id, &detail, report).await {
                report.vms_failed += 1;
                tracing::error!(
                    user_id = account.user_id,
                    account_id = account.id,
                    vm_id = %id,
                    error = %e,
                    "alert sweep: failed to evaluate VM"
                );
            }
        }
    }

    async fn evaluate_vm(
        &self,
        settings: &AlertSettings,
        account: &Account,
        id: &str,
        detail: &VmRecord,
        report: &mut SweepReport,
    ) -> Result<(), BoxError> {
        let user_id = account.user_id;
        let reading = VmReading::from_detail(detail, &settings.thresholds());
        let prev = self.store.alert_state(user_id, account.id, id).await?;

        let notices = transitions(prev.as_ref(), &reading, settings.suspend_alerts);
        if !notices.is_empty() {
            let name = display_name(detail, id);
            let ip = primary_ip(detail);
            for notice in &notices {
                match self.notifier.notify(user_id, &notice.render(&name, &ip)).await {
                    Ok(()) => report.notifications_sent += 1,
                    Err(e) => {
                        tracing::warn!(user_id, vm_id = %id, error = %e, "failed to deliver alert");
                    }
                }
            }
        }

        self.store
            .save_alert_state(&NewAlertState {
                user_id,
                account_id: account.id,
                vm_id: id,
                disk_level: reading.disk_level,
                bw_level: reading.bw_level,
                suspended: Some(reading.suspended),
            })
            .await
    }
}

fn credentials(account: &Account) -> PanelCredentials {
    PanelCredentials {
        base_url: account.panel_url.clone(),
        api_key: account.api_key.clone(),
        api_secret: account.api_secret.clone(),
        verify_tls: account.verify_tls,
    }
}

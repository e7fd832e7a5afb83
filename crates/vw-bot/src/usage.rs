//! Disk and bandwidth usage from VM detail records.

use serde_json::Value;
use virtualizor_api::VmRecord;
use vw_db::models::Level;

/// Resources with warn/critical thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Disk,
    Bandwidth,
}

/// Field names a panel may use for a resource's counters, in priority order.
#[derive(Debug)]
pub struct UsageAliases {
    pub used: &'static [&'static str],
    pub total: &'static [&'static str],
}

static DISK_ALIASES: UsageAliases = UsageAliases {
    used: &["disk_used", "used_disk", "hdd_used", "used_hdd"],
    total: &["disk", "vps_disk", "hdd", "total_hdd"],
};

static BANDWIDTH_ALIASES: UsageAliases = UsageAliases {
    used: &["bandwidth_used", "bw_used", "used_bandwidth", "used_bw"],
    total: &["bandwidth", "bw", "total_bandwidth", "total_bw"],
};

const SUSPEND_KEYS: &[&str] = &["suspended", "is_suspended"];

impl Resource {
    pub const ALL: [Resource; 2] = [Resource::Disk, Resource::Bandwidth];

    pub fn aliases(&self) -> &'static UsageAliases {
        match self {
            Self::Disk => &DISK_ALIASES,
            Self::Bandwidth => &BANDWIDTH_ALIASES,
        }
    }

    /// Short label used in notification text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disk => "Disk",
            Self::Bandwidth => "BW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub used: f64,
    pub total: f64,
}

impl Usage {
    pub fn percent(&self) -> Option<i64> {
        compute_percent(self.used, self.total)
    }
}

/// Read the used/total pair for `resource`.
///
/// Each side takes the first alias whose value is a finite number or a
/// numeric string. Returns `None` unless both sides are found.
pub fn extract_usage(detail: &VmRecord, resource: Resource) -> Option<Usage> {
    let aliases = resource.aliases();
    let used = first_number(detail, aliases.used)?;
    let total = first_number(detail, aliases.total)?;
    Some(Usage { used, total })
}

/// Whole percentage, truncated: 79.9% is 79.
///
/// `None` when `total` is not positive.
pub fn compute_percent(used: f64, total: f64) -> Option<i64> {
    if total <= 0.0 || total.is_nan() {
        return None;
    }
    Some((used * 100.0 / total).floor() as i64)
}

/// Classify a percentage against inclusive thresholds.
///
/// Critical is checked first, so with `critical < warn` any value at or above
/// `critical` is critical and values in `[warn, critical)` cannot occur.
/// Unknown usage stays unknown.
pub fn classify(pct: Option<i64>, warn: i32, critical: i32) -> Option<Level> {
    let pct = pct?;
    if pct >= i64::from(critical) {
        Some(Level::Critical)
    } else if pct >= i64::from(warn) {
        Some(Level::Warn)
    } else {
        Some(Level::Ok)
    }
}

/// Suspension flag from `suspended` / `is_suspended`; absent reads as 0.
pub fn suspended_flag(detail: &VmRecord) -> i64 {
    SUSPEND_KEYS
        .iter()
        .filter_map(|k| detail.get(*k))
        .map(to_int)
        .find(|n| *n != 0)
        .unwrap_or(0)
}

fn first_number(detail: &VmRecord, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| detail.get(*k).and_then(as_number))
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn to_int(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        other => as_number(other).map(|n| n.trunc() as i64).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> VmRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn disk_usage_hits_warn_at_exact_threshold() {
        let detail = record(json!({"disk_used": 40, "disk": 50}));
        let usage = extract_usage(&detail, Resource::Disk).unwrap();
        assert_eq!(usage.percent(), Some(80));
        assert_eq!(classify(usage.percent(), 80, 100), Some(Level::Warn));
    }

    #[test]
    fn aliases_are_tried_in_order() {
        let detail = record(json!({
            "used_hdd": 1,
            "hdd_used": "7",
            "total_hdd": 100,
            "vps_disk": " 10 "
        }));
        assert_eq!(
            extract_usage(&detail, Resource::Disk),
            Some(Usage { used: 7.0, total: 10.0 })
        );
    }

    #[test]
    fn bandwidth_uses_its_own_aliases() {
        let detail = record(json!({"used_bw": 512.5, "total_bandwidth": 1024, "disk": 5}));
        let usage = extract_usage(&detail, Resource::Bandwidth).unwrap();
        assert_eq!(usage.percent(), Some(50));
        assert_eq!(extract_usage(&detail, Resource::Disk), None);
    }

    #[test]
    fn non_numeric_values_are_skipped() {
        let detail = record(json!({
            "bandwidth_used": "n/a",
            "bw_used": null,
            "used_bandwidth": "inf",
            "bandwidth": [1]
        }));
        assert_eq!(extract_usage(&detail, Resource::Bandwidth), None);
    }

    #[test]
    fn percent_truncates() {
        assert_eq!(compute_percent(79.9, 100.0), Some(79));
        assert_eq!(compute_percent(29.0, 100.0), Some(29));
        assert_eq!(compute_percent(1.0, 3.0), Some(33));
        assert_eq!(compute_percent(150.0, 100.0), Some(150));
        assert_eq!(compute_percent(0.0, 10.0), Some(0));
    }

    #[test]
    fn percent_requires_positive_total() {
        assert_eq!(compute_percent(5.0, 0.0), None);
        assert_eq!(compute_percent(5.0, -10.0), None);
        assert_eq!(compute_percent(0.0, 0.0), None);
    }

    #[test]
    fn percent_is_monotonic_in_used() {
        let total = 37.0;
        let mut last = i64::MIN;
        for used in 0..=400 {
            let pct = compute_percent(used as f64 / 4.0, total).unwrap();
            assert!(pct >= last);
            assert_eq!(pct, ((used as f64 / 4.0) * 100.0 / total).floor() as i64);
            last = pct;
        }
    }

    #[test]
    fn classify_levels() {
        assert_eq!(classify(None, 80, 100), None);
        assert_eq!(classify(Some(79), 80, 100), Some(Level::Ok));
        assert_eq!(classify(Some(80), 80, 100), Some(Level::Warn));
        assert_eq!(classify(Some(99), 80, 100), Some(Level::Warn));
        assert_eq!(classify(Some(100), 80, 100), Some(Level::Critical));
        assert_eq!(classify(Some(80), 80, 80), Some(Level::Critical));
    }

    #[test]
    fn classify_with_inverted_thresholds_checks_critical_first() {
        // warn = 90, critical = 70
        assert_eq!(classify(Some(95), 90, 70), Some(Level::Critical));
        assert_eq!(classify(Some(75), 90, 70), Some(Level::Critical));
        assert_eq!(classify(Some(60), 90, 70), Some(Level::Ok));
    }

    #[test]
    fn suspended_flag_variants() {
        assert_eq!(suspended_flag(&record(json!({}))), 0);
        assert_eq!(suspended_flag(&record(json!({"suspended": 1}))), 1);
        assert_eq!(suspended_flag(&record(json!({"suspended": "1"}))), 1);
        assert_eq!(suspended_flag(&record(json!({"suspended": "0", "is_suspended": true}))), 1);
        assert_eq!(suspended_flag(&record(json!({"is_suspended": "yes"}))), 0);
    }
}

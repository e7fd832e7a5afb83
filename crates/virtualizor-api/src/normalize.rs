//! Locating VM records inside panel responses.
//!
//! Panel versions disagree on where the VM collection lives (`vs`, `vps`,
//! `data`, nested somewhere else entirely) and on what the identifier is
//! called. Both extractors look for "mapping-shaped records with VM-like
//! fields" instead of a fixed schema.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// One VM summary or detail record, keys in panel order.
pub type VmRecord = Map<String, Value>;

/// Canonical identifier key every accepted record carries when the panel
/// supplied any identifier at all.
pub const ID_KEY: &str = "vpsid";

const ID_ALIASES: &[&str] = &["vps_id", "id"];
const LIST_KEYS: &[&str] = &["vs", "vps", "data", "result"];
const DETAIL_KEYS: &[&str] = &["info", "vps", "vs", "data", "result"];
const DESCRIPTIVE_KEYS: &[&str] = &["hostname", "name", "primary_ip", "ip"];
const DETAIL_MARKERS: &[&str] = &["vpsid", "hostname", "name", "primary_ip", "ip"];
const NAME_KEYS: &[&str] = &["hostname", "name", "vps_name"];
const IP_KEYS: &[&str] = &["primary_ip", "ip", "ipaddress"];

/// Limits for the fallback deep scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanBudget {
    /// Nodes (containers and scalars) examined before the scan gives up.
    pub max_visits: usize,
    /// Records accumulated before the scan stops.
    pub max_results: usize,
}

impl Default for ScanBudget {
    fn default() -> Self {
        Self {
            max_visits: 5000,
            max_results: 500,
        }
    }
}

/// Extract the VM collection from an `act=vs` response.
///
/// Well-known top-level keys are tried first; when none of them yields a
/// record, the whole document is deep-scanned with the default budget.
pub fn extract_vm_list(root: &Map<String, Value>) -> Vec<VmRecord> {
    for key in LIST_KEYS {
        let found = match root.get(*key) {
            Some(Value::Array(items)) => collect_vms(items.iter()),
            Some(Value::Object(map)) => collect_vms(map.values()),
            _ => continue,
        };
        if !found.is_empty() {
            return found;
        }
    }

    deep_scan(Container::Dict(root), ScanBudget::default())
}

/// Bounded depth-first search for the first collection of VM records in
/// every branch of `root`.
///
/// A node counts as a collection when it is a non-empty array of objects or a
/// non-empty object whose values are all objects. If at least one entry passes
/// the VM filter, the entries are taken and the scan does not descend into that
/// node; otherwise it keeps walking its children.
pub fn deep_find_vm_list(root: &Value, budget: ScanBudget) -> Vec<VmRecord> {
    match Container::of(root) {
        Some(container) => deep_scan(container, budget),
        None => Vec::new(),
    }
}

/// Extract one VM's detail record from an `act=managevs` response.
///
/// Returns the first well-known child that looks like a VM, or the root
/// itself. Detail responses are never deep-scanned.
pub fn extract_vm_detail(root: &Map<String, Value>) -> &Map<String, Value> {
    DETAIL_KEYS
        .iter()
        .filter_map(|key| root.get(*key).and_then(Value::as_object))
        .find(|candidate| DETAIL_MARKERS.iter().any(|k| candidate.contains_key(*k)))
        .unwrap_or(root)
}

/// The record's identifier rendered as a string.
///
/// Empty strings, zero, `null`, booleans and nested values are not identifiers.
pub fn vm_id(record: &VmRecord) -> Option<String> {
    record.get(ID_KEY).and_then(scalar_text)
}

/// Human-readable label: hostname, name, or `VPS <id>`.
pub fn display_name(record: &VmRecord, fallback_id: &str) -> String {
    first_text(record, NAME_KEYS).unwrap_or_else(|| format!("VPS {fallback_id}"))
}

pub fn primary_ip(record: &VmRecord) -> String {
    first_text(record, IP_KEYS).unwrap_or_else(|| "-".to_string())
}

// ── Internals ────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Container<'a> {
    List(&'a [Value]),
    Dict(&'a Map<String, Value>),
}

impl<'a> Container<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::List(items)),
            Value::Object(map) => Some(Self::Dict(map)),
            _ => None,
        }
    }

    fn entries(self) -> Vec<&'a Value> {
        match self {
            Self::List(items) => items.iter().collect(),
            Self::Dict(map) => map.values().collect(),
        }
    }
}

fn deep_scan(root: Container<'_>, budget: ScanBudget) -> Vec<VmRecord> {
    let mut found: Vec<VmRecord> = Vec::new();
    let mut visited = 0usize;
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if visited >= budget.max_visits || found.len() >= budget.max_results {
            break;
        }
        visited += 1;

        let entries = node.entries();
        if !entries.is_empty() && entries.iter().all(|v| v.is_object()) {
            let items = collect_vms(entries.iter().copied());
            if !items.is_empty() {
                found.extend(items);
                continue;
            }
        }

        // Reverse push keeps document order on pop.
        for child in entries.into_iter().rev() {
            match Container::of(child) {
                Some(container) => stack.push(container),
                None => visited += 1,
            }
        }
    }

    found.truncate(budget.max_results);
    dedup_by_id(found)
}

/// Keep one record per identifier: first position, last content.
///
/// When no record carries an identifier the input is returned unchanged.
fn dedup_by_id(found: Vec<VmRecord>) -> Vec<VmRecord> {
    if !found.iter().any(|item| vm_id(item).is_some()) {
        return found;
    }

    let mut unique: Vec<VmRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in found {
        let Some(id) = vm_id(&item) else { continue };
        match index.get(&id) {
            Some(&pos) => unique[pos] = item,
            None => {
                index.insert(id, unique.len());
                unique.push(item);
            }
        }
    }
    unique
}

fn collect_vms<'a>(entries: impl Iterator<Item = &'a Value>) -> Vec<VmRecord> {
    entries
        .filter_map(Value::as_object)
        .map(|item| canonicalize(item.clone()))
        .filter(looks_like_vm)
        .collect()
}

/// Copy the first identifier alias into `vpsid` when it is missing.
fn canonicalize(mut item: VmRecord) -> VmRecord {
    if !item.contains_key(ID_KEY)
        && let Some(id) = ID_ALIASES.iter().find_map(|k| item.get(*k)).cloned()
    {
        item.insert(ID_KEY.to_string(), id);
    }
    item
}

/// Records with an identifier pass; otherwise descriptive fields are enough
/// unless a `uid` marks the record as a user object.
fn looks_like_vm(item: &VmRecord) -> bool {
    if item.contains_key(ID_KEY) {
        return true;
    }
    !item.contains_key("uid") && DESCRIPTIVE_KEYS.iter().any(|k| item.contains_key(*k))
}

fn first_text(record: &VmRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| record.get(*k).and_then(scalar_text))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

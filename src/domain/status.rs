//! VM reachability samples, transitions and the hourly grid.

use std::collections::BTreeMap;
use std::fmt;

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::parse_timestamp;
use super::wire::null_as_default;

pub const UNKNOWN_VM: &str = "Unknown VM";
pub const NOT_AVAILABLE: &str = "N/A";

/// Reachability as reported by the monitoring API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LinkStatus {
    Reachable,
    NotReachable,
    #[default]
    Unknown,
    /// Anything else the collaborator sends, kept verbatim.
    Other(String),
}

impl LinkStatus {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Reachable
        } else {
            Self::NotReachable
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Reachable => "reachable",
            Self::NotReachable => "not reachable",
            Self::Unknown => "unknown",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for LinkStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "reachable" => Self::Reachable,
            "not reachable" | "not_reachable" | "unreachable" => Self::NotReachable,
            "unknown" | "" => Self::Unknown,
            _ => Self::Other(value),
        }
    }
}

impl From<LinkStatus> for String {
    fn from(value: LinkStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

async_graphql::scalar!(LinkStatus);

/// How a VM's reachability moved between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
pub enum StatusChange {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "no change")]
    NoChange,
    #[serde(rename = "still down")]
    StillDown,
    #[serde(rename = "came back")]
    CameBack,
    #[serde(rename = "went down")]
    WentDown,
    /// Only reachable with statuses outside reachable/not reachable.
    #[serde(rename = "changed")]
    Changed,
}

impl StatusChange {
    /// Classify the pair `(previous, current)`. No previous sample → `New`.
    pub fn classify(current: &LinkStatus, previous: Option<&LinkStatus>) -> Self {
        use LinkStatus::{NotReachable, Reachable};
        match (previous, current) {
            (None, _) => Self::New,
            (Some(Reachable), Reachable) => Self::NoChange,
            (Some(NotReachable), NotReachable) => Self::StillDown,
            (Some(NotReachable), Reachable) => Self::CameBack,
            (Some(Reachable), NotReachable) => Self::WentDown,
            _ => Self::Changed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::NoChange => "no change",
            Self::StillDown => "still down",
            Self::CameBack => "came back",
            Self::WentDown => "went down",
            Self::Changed => "changed",
        }
    }
}

impl fmt::Display for StatusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for StatusChange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "new" => Ok(Self::New),
            "no change" => Ok(Self::NoChange),
            "still down" => Ok(Self::StillDown),
            "came back" => Ok(Self::CameBack),
            "went down" => Ok(Self::WentDown),
            "changed" => Ok(Self::Changed),
            other => Err(format!("unknown status change '{other}'")),
        }
    }
}

/// Inventory fields embedded in a monitoring sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleVm {
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
}

/// One raw sample from the monitoring API's status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSample {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: LinkStatus,
    /// Empty or unparseable values drop the sample.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default)]
    pub vm_master: Option<SampleVm>,
}

impl StatusSample {
    pub fn vm_name(&self) -> &str {
        self.vm_master
            .as_ref()
            .and_then(|m| m.vm_name.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_VM)
    }

    fn project(&self) -> String {
        self.vm_master
            .as_ref()
            .and_then(|m| m.project_name.clone())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    fn cluster(&self) -> String {
        self.vm_master
            .as_ref()
            .and_then(|m| m.cluster.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// A sample paired with the one immediately before it for the same VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct StatusTransition {
    pub ip: String,
    pub vm_name: String,
    pub current_status: LinkStatus,
    pub current_time: DateTime<Utc>,
    pub previous_status: Option<LinkStatus>,
    pub previous_time: Option<DateTime<Utc>>,
    pub status_change: StatusChange,
    pub project: String,
    pub cluster: String,
}

/// Build the transition history from raw samples.
///
/// Samples are grouped per `(ip, vm name)`, ordered newest first and paired
/// with their predecessor. Samples whose `created_at` does not parse are
/// dropped; the number dropped is returned alongside. The output is ordered
/// newest first across all VMs.
pub fn derive_transitions(samples: &[StatusSample]) -> (Vec<StatusTransition>, usize) {
    let mut per_vm: BTreeMap<(&str, &str), Vec<(DateTime<Utc>, &StatusSample)>> = BTreeMap::new();
    let mut dropped = 0;

    for sample in samples {
        match parse_timestamp(&sample.created_at) {
            Some(at) => per_vm
                .entry((sample.ip.as_str(), sample.vm_name()))
                .or_default()
                .push((at, sample)),
            None => dropped += 1,
        }
    }

    let mut out = Vec::with_capacity(samples.len() - dropped);
    for ((ip, vm_name), mut history) in per_vm {
        history.sort_by(|a, b| b.0.cmp(&a.0));
        for (i, (at, current)) in history.iter().enumerate() {
            let previous = history.get(i + 1);
            out.push(StatusTransition {
                ip: ip.to_string(),
                vm_name: vm_name.to_string(),
                current_status: current.status.clone(),
                current_time: *at,
                previous_status: previous.map(|(_, p)| p.status.clone()),
                previous_time: previous.map(|(t, _)| *t),
                status_change: StatusChange::classify(
                    &current.status,
                    previous.map(|(_, p)| &p.status),
                ),
                project: current.project(),
                cluster: current.cluster(),
            });
        }
    }

    out.sort_by(|a, b| b.current_time.cmp(&a.current_time));
    (out, dropped)
}

/// Transitions of one VM, newest first, for repeated per-VM lookups.
#[derive(Debug, Default)]
pub struct HistoryIndex<'a> {
    by_ip: BTreeMap<&'a str, BTreeMap<&'a str, Vec<&'a StatusTransition>>>,
}

impl<'a> HistoryIndex<'a> {
    pub fn new(history: &'a [StatusTransition]) -> Self {
        let mut by_ip: BTreeMap<&str, BTreeMap<&str, Vec<&StatusTransition>>> = BTreeMap::new();
        for t in history {
            by_ip
                .entry(t.ip.as_str())
                .or_default()
                .entry(t.vm_name.as_str())
                .or_default()
                .push(t);
        }
        for list in by_ip.values_mut().flat_map(|names| names.values_mut()) {
            list.sort_by(|a, b| b.current_time.cmp(&a.current_time));
        }
        Self { by_ip }
    }

    pub fn for_vm(&self, ip: &str, vm_name: &str) -> &[&'a StatusTransition] {
        self.by_ip
            .get(ip)
            .and_then(|names| names.get(vm_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn latest(&self, ip: &str, vm_name: &str) -> Option<&'a StatusTransition> {
        self.for_vm(ip, vm_name).first().copied()
    }

    pub fn last_reachable(&self, ip: &str, vm_name: &str) -> Option<&'a StatusTransition> {
        self.for_vm(ip, vm_name)
            .iter()
            .copied()
            .find(|t| t.current_status.is_reachable())
    }
}

/// Which half of the day a grid shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "UPPERCASE")]
pub enum HalfDay {
    #[default]
    #[serde(alias = "am")]
    Am,
    #[serde(alias = "pm")]
    Pm,
}

impl HalfDay {
    pub fn contains(self, hour: u32) -> bool {
        match self {
            Self::Am => hour < 12,
            Self::Pm => hour >= 12,
        }
    }
}

impl std::str::FromStr for HalfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AM" => Ok(Self::Am),
            "PM" => Ok(Self::Pm),
            other => Err(format!("unknown half of day '{other}', expected AM or PM")),
        }
    }
}

/// `12:00 AM`-style label for an hour of day (0-23).
pub fn hour_label(hour: u32) -> String {
    let suffix = if hour >= 12 { "PM" } else { "AM" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display}:00 {suffix}")
}

/// Transitions on `date` bucketed by VM `(ip, name)` and hour of day.
pub type HourlySlots<'a> = BTreeMap<(String, String), BTreeMap<u32, Vec<&'a StatusTransition>>>;

/// Bucket the transitions of `date` by VM and hour; `change` narrows the
/// records (not the VMs) to a single status-change tag.
pub fn hourly_slots<'a>(
    history: &'a [StatusTransition],
    date: NaiveDate,
    change: Option<StatusChange>,
) -> HourlySlots<'a> {
    let mut slots: HourlySlots<'a> = BTreeMap::new();
    for t in history {
        if t.current_time.date_naive() != date {
            continue;
        }
        if change.is_some_and(|c| c != t.status_change) {
            continue;
        }
        slots
            .entry((t.ip.clone(), t.vm_name.clone()))
            .or_default()
            .entry(t.current_time.hour())
            .or_default()
            .push(t);
    }
    slots
}

/// Newest transition in a slot.
pub fn latest_in_slot<'a>(slot: &[&'a StatusTransition]) -> Option<&'a StatusTransition> {
    slot.iter().copied().max_by_key(|t| t.current_time)
}

/// Transitions for one hour of a day, with per-tag counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourBlock {
    /// `HH:00`, 24-hour clock.
    pub hour: String,
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
    pub items: Vec<StatusTransition>,
}

/// History of `date` grouped by hour, latest hour first. `search` matches IP or
/// VM name (case-insensitive); `change` keeps one status-change tag.
pub fn history_by_hour(
    history: &[StatusTransition],
    date: NaiveDate,
    search: Option<&str>,
    change: Option<StatusChange>,
) -> Vec<HourBlock> {
    let needle = search.map(str::to_lowercase).filter(|s| !s.is_empty());
    let mut hours: BTreeMap<u32, Vec<StatusTransition>> = BTreeMap::new();

    for t in history {
        if t.current_time.date_naive() != date {
            continue;
        }
        if change.is_some_and(|c| c != t.status_change) {
            continue;
        }
        if let Some(n) = &needle {
            if !t.ip.to_lowercase().contains(n) && !t.vm_name.to_lowercase().contains(n) {
                continue;
            }
        }
        hours.entry(t.current_time.hour()).or_default().push(t.clone());
    }

    hours
        .into_iter()
        .rev()
        .map(|(hour, items)| {
            let mut counts: BTreeMap<String, usize> = [
                StatusChange::NoChange,
                StatusChange::StillDown,
                StatusChange::CameBack,
                StatusChange::WentDown,
                StatusChange::New,
            ]
            .iter()
            .map(|c| (c.label().to_string(), 0))
            .collect();
            for item in &items {
                if let Some(n) = counts.get_mut(item.status_change.label()) {
                    *n += 1;
                }
            }
            HourBlock {
                hour: format!("{hour:02}:00"),
                total: items.len(),
                counts,
                items,
            }
        })
        .collect()
}

/// Distinct calendar dates present in the history, newest first.
pub fn history_dates(history: &[StatusTransition]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = history.iter().map(|t| t.current_time.date_naive()).collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample(ip: &str, name: &str, status: &str, at: &str) -> StatusSample {
        StatusSample {
            ip: ip.into(),
            status: LinkStatus::from(status.to_string()),
            created_at: at.into(),
            vm_master: Some(SampleVm {
                vm_name: Some(name.into()),
                project_name: Some("Core".into()),
                cluster: None,
            }),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test_case(None, LinkStatus::Reachable, StatusChange::New ; "first reachable")]
    #[test_case(None, LinkStatus::NotReachable, StatusChange::New ; "first down")]
    #[test_case(Some(LinkStatus::Reachable), LinkStatus::Reachable, StatusChange::NoChange ; "stays up")]
    #[test_case(Some(LinkStatus::NotReachable), LinkStatus::NotReachable, StatusChange::StillDown ; "stays down")]
    #[test_case(Some(LinkStatus::NotReachable), LinkStatus::Reachable, StatusChange::CameBack ; "recovers")]
    #[test_case(Some(LinkStatus::Reachable), LinkStatus::NotReachable, StatusChange::WentDown ; "fails")]
    #[test_case(Some(LinkStatus::Other("degraded".into())), LinkStatus::Reachable, StatusChange::Changed ; "outside two valued domain")]
    fn classifies_transitions(
        previous: Option<LinkStatus>,
        current: LinkStatus,
        expected: StatusChange,
    ) {
        assert_eq!(StatusChange::classify(&current, previous.as_ref()), expected);
    }

    #[test]
    fn two_valued_domain_never_yields_changed() {
        let domain = [LinkStatus::Reachable, LinkStatus::NotReachable];
        for current in &domain {
            assert_ne!(StatusChange::classify(current, None), StatusChange::Changed);
            for previous in &domain {
                assert_ne!(
                    StatusChange::classify(current, Some(previous)),
                    StatusChange::Changed
                );
            }
        }
    }

    #[test]
    fn link_status_wire_format() {
        let s: LinkStatus = serde_json::from_str(r#""not reachable""#).unwrap();
        assert_eq!(s, LinkStatus::NotReachable);
        assert_eq!(serde_json::to_string(&LinkStatus::Reachable).unwrap(), r#""reachable""#);
        let other: LinkStatus = serde_json::from_str(r#""flapping""#).unwrap();
        assert_eq!(other, LinkStatus::Other("flapping".into()));
    }

    #[test]
    fn status_change_parses_labels() {
        assert_eq!("came back".parse::<StatusChange>(), Ok(StatusChange::CameBack));
        assert_eq!("still_down".parse::<StatusChange>(), Ok(StatusChange::StillDown));
        assert!("sideways".parse::<StatusChange>().is_err());
    }

    #[test]
    fn transitions_pair_each_sample_with_its_predecessor() {
        let samples = vec![
            sample("10.0.0.1", "db", "reachable", "2024-03-01T08:00:00"),
            sample("10.0.0.1", "db", "not reachable", "2024-03-01T09:00:00"),
            sample("10.0.0.1", "db", "reachable", "2024-03-01T10:00:00"),
            sample("10.0.0.2", "web", "reachable", "2024-03-01T09:30:00"),
        ];
        let (history, dropped) = derive_transitions(&samples);
        assert_eq!(dropped, 0);
        assert_eq!(history.len(), 4);

        let db: Vec<_> = history.iter().filter(|t| t.vm_name == "db").collect();
        assert_eq!(db[0].status_change, StatusChange::CameBack);
        assert_eq!(db[1].status_change, StatusChange::WentDown);
        assert_eq!(db[2].status_change, StatusChange::New);
        assert_eq!(db[0].previous_status, Some(LinkStatus::NotReachable));
        assert_eq!(db[2].previous_time, None);

        // Newest first across VMs.
        assert!(history.windows(2).all(|w| w[0].current_time >= w[1].current_time));
        assert_eq!(history[0].project, "Core");
        assert_eq!(history[0].cluster, NOT_AVAILABLE);
    }

    #[test]
    fn unparseable_samples_are_dropped() {
        let samples = vec![
            sample("10.0.0.1", "db", "reachable", "2024-03-01T08:00:00"),
            sample("10.0.0.1", "db", "not reachable", "soon"),
        ];
        let (history, dropped) = derive_transitions(&samples);
        assert_eq!(dropped, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status_change, StatusChange::New);
    }

    #[test]
    fn null_fields_drop_only_their_sample() {
        let raw = r#"[
            {"ip":"10.0.0.1","status":"reachable","created_at":"2024-03-01T08:00:00","vm_master":null},
            {"ip":"10.0.0.1","status":null,"created_at":null,"vm_master":{"vm_name":null,"project_name":null,"cluster":null}}
        ]"#;
        let samples: Vec<StatusSample> = serde_json::from_str(raw).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].status, LinkStatus::Unknown);

        let (history, dropped) = derive_transitions(&samples);
        assert_eq!(dropped, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].current_status, LinkStatus::Reachable);
    }

    #[test]
    fn missing_inventory_fields_use_placeholders() {
        let raw = r#"[{"ip":"10.0.0.9","status":"reachable","created_at":"2024-03-01T08:00:00"}]"#;
        let samples: Vec<StatusSample> = serde_json::from_str(raw).unwrap();
        let (history, _) = derive_transitions(&samples);
        assert_eq!(history[0].vm_name, UNKNOWN_VM);
        assert_eq!(history[0].project, NOT_AVAILABLE);
    }

    #[test]
    fn history_index_orders_per_vm() {
        let samples = vec![
            sample("10.0.0.1", "db", "reachable", "2024-03-01T08:00:00"),
            sample("10.0.0.1", "db", "not reachable", "2024-03-01T09:00:00"),
        ];
        let (history, _) = derive_transitions(&samples);
        let index = HistoryIndex::new(&history);
        assert_eq!(
            index.latest("10.0.0.1", "db").map(|t| &t.current_status),
            Some(&LinkStatus::NotReachable)
        );
        assert_eq!(
            index.last_reachable("10.0.0.1", "db").map(|t| t.current_time.hour()),
            Some(8)
        );
        assert!(index.for_vm("10.0.0.1", "web").is_empty());
    }

    #[test_case(0, "12:00 AM")]
    #[test_case(9, "9:00 AM")]
    #[test_case(12, "12:00 PM")]
    #[test_case(23, "11:00 PM")]
    fn hour_labels(hour: u32, expected: &str) {
        assert_eq!(hour_label(hour), expected);
    }

    #[test]
    fn hourly_slots_filter_records_by_date_and_change() {
        let samples = vec![
            sample("10.0.0.1", "db", "reachable", "2024-03-01T08:05:00"),
            sample("10.0.0.1", "db", "not reachable", "2024-03-01T08:45:00"),
            sample("10.0.0.1", "db", "not reachable", "2024-03-02T08:45:00"),
        ];
        let (history, _) = derive_transitions(&samples);

        let slots = hourly_slots(&history, day("2024-03-01"), None);
        let db = &slots[&("10.0.0.1".to_string(), "db".to_string())];
        assert_eq!(db[&8].len(), 2);
        assert_eq!(
            latest_in_slot(&db[&8]).map(|t| t.status_change),
            Some(StatusChange::WentDown)
        );

        let only_new = hourly_slots(&history, day("2024-03-01"), Some(StatusChange::New));
        assert_eq!(only_new[&("10.0.0.1".to_string(), "db".to_string())][&8].len(), 1);

        assert!(HalfDay::Am.contains(8));
        assert!(!HalfDay::Pm.contains(8));
        assert_eq!("pm".parse::<HalfDay>(), Ok(HalfDay::Pm));
        assert!("noon".parse::<HalfDay>().is_err());
    }

    #[test_case(r#""AM""#, HalfDay::Am ; "upper am")]
    #[test_case(r#""am""#, HalfDay::Am ; "lower am")]
    #[test_case(r#""PM""#, HalfDay::Pm ; "upper pm")]
    #[test_case(r#""pm""#, HalfDay::Pm ; "lower pm")]
    fn half_day_deserializes_either_case(raw: &str, expected: HalfDay) {
        assert_eq!(serde_json::from_str::<HalfDay>(raw).unwrap(), expected);
    }

    #[test]
    fn history_by_hour_counts_tags() {
        let samples = vec![
            sample("10.0.0.1", "db", "reachable", "2024-03-01T08:05:00"),
            sample("10.0.0.1", "db", "not reachable", "2024-03-01T14:45:00"),
            sample("10.0.0.2", "web", "reachable", "2024-03-01T14:10:00"),
        ];
        let (history, _) = derive_transitions(&samples);
        let blocks = history_by_hour(&history, day("2024-03-01"), None, None);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].hour, "14:00");
        assert_eq!(blocks[0].total, 2);
        assert_eq!(blocks[0].counts["went down"], 1);
        assert_eq!(blocks[0].counts["new"], 1);

        let web_only = history_by_hour(&history, day("2024-03-01"), Some("WEB"), None);
        assert_eq!(web_only.len(), 1);
        assert_eq!(web_only[0].items[0].vm_name, "web");

        assert_eq!(history_dates(&history), vec![day("2024-03-01")]);
    }
}

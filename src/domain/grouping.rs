//! Grouping engine: flat backup records → nested time/group/VM indexes.
//!
//! Both indexes are pure functions of the input slice. Nothing survives
//! between calls; a refresh rebuilds from scratch.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::backup::{BackupFile, BackupFlags, BackupRecord, BackupTag, IngestedBackup};
use super::timestamp::{latest, month_key};

/// Flags, files and newest timestamp accumulated for one VM in one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    #[serde(flatten)]
    pub flags: BackupFlags,
    pub files: Vec<BackupFile>,
    /// Newest parseable `last_modified` among `files`.
    pub last_modified: Option<DateTime<Utc>>,
}

impl DayBucket {
    fn absorb(&mut self, file: BackupFile) {
        self.flags.merge(file.flags);
        self.last_modified = latest(self.last_modified, file.modified_at);
        self.files.push(file);
    }

    pub fn tag(&self) -> BackupTag {
        self.flags.tag()
    }
}

/// Day view entry: one VM within one date and group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmBackupSummary {
    pub unique_name: String,
    #[serde(flatten)]
    pub bucket: DayBucket,
}

impl VmBackupSummary {
    fn new(unique_name: &str) -> Self {
        Self {
            unique_name: unique_name.to_string(),
            bucket: DayBucket::default(),
        }
    }

    /// Entry for a VM that is registered with a group (through metadata) but
    /// produced no file on `date`.
    fn expected(unique_name: &str, date: NaiveDate) -> Self {
        Self {
            unique_name: unique_name.to_string(),
            bucket: DayBucket {
                last_modified: date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
                ..DayBucket::default()
            },
        }
    }
}

/// Month view entry: one VM within one month and group, with per-day buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmMonthRow {
    pub unique_name: String,
    /// Day of month (1-31) → bucket. Days without files are absent.
    pub days: BTreeMap<u32, DayBucket>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl VmMonthRow {
    fn new(unique_name: &str) -> Self {
        Self {
            unique_name: unique_name.to_string(),
            days: BTreeMap::new(),
            last_modified: None,
        }
    }

    /// Union of the flags of every day in the month.
    pub fn month_flags(&self) -> BackupFlags {
        let mut flags = BackupFlags::default();
        for bucket in self.days.values() {
            flags.merge(bucket.flags);
        }
        flags
    }
}

/// `date → group → [VM]`, VMs ordered by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyIndex {
    pub dates: BTreeMap<NaiveDate, BTreeMap<String, Vec<VmBackupSummary>>>,
    /// Input records dropped because their date could not be read.
    pub rejected: usize,
}

impl DailyIndex {
    /// Dates newest first.
    pub fn dates_desc(&self) -> Vec<NaiveDate> {
        self.dates.keys().rev().copied().collect()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.keys().next_back().copied()
    }
}

/// `YYYY-MM → group → [VM with day map]`, VMs ordered by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyIndex {
    pub months: BTreeMap<String, BTreeMap<String, Vec<VmMonthRow>>>,
    pub rejected: usize,
}

impl MonthlyIndex {
    pub fn latest_month(&self) -> Option<&str> {
        self.months.keys().next_back().map(String::as_str)
    }
}

type Nested<T> = BTreeMap<String, BTreeMap<String, T>>;

/// Group records by calendar date, directory and VM identity.
///
/// A VM that produced a metadata file anywhere in the input is registered
/// with the directory of its (last seen) metadata file; every date bucket is
/// then back-filled with an empty entry for it under that directory, so a
/// silent day shows up as "expected but missing" rather than disappearing.
pub fn group_by_date(records: &[BackupRecord]) -> DailyIndex {
    let mut dates: BTreeMap<NaiveDate, Nested<VmBackupSummary>> = BTreeMap::new();
    let mut metadata_groups: BTreeMap<String, String> = BTreeMap::new();
    let mut rejected = 0;

    for record in records {
        let Some(item) = IngestedBackup::from_record(record) else {
            rejected += 1;
            continue;
        };

        if item.file.flags.metadata {
            metadata_groups.insert(item.vm_id.clone(), item.group.clone());
        }

        dates
            .entry(item.date)
            .or_default()
            .entry(item.group)
            .or_default()
            .entry(item.vm_id.clone())
            .or_insert_with(|| VmBackupSummary::new(&item.vm_id))
            .bucket
            .absorb(item.file);
    }

    for (date, groups) in dates.iter_mut() {
        for (vm_id, group) in &metadata_groups {
            groups
                .entry(group.clone())
                .or_default()
                .entry(vm_id.clone())
                .or_insert_with(|| VmBackupSummary::expected(vm_id, *date));
        }
    }

    DailyIndex {
        dates: dates
            .into_iter()
            .map(|(date, groups)| (date, flatten_groups(groups)))
            .collect(),
        rejected,
    }
}

/// Group records by month, directory, VM identity and day of month.
///
/// No back-fill: a VM only appears in months where it produced files.
pub fn group_by_month(records: &[BackupRecord]) -> MonthlyIndex {
    let mut months: BTreeMap<String, Nested<VmMonthRow>> = BTreeMap::new();
    let mut rejected = 0;

    for record in records {
        let Some(item) = IngestedBackup::from_record(record) else {
            rejected += 1;
            continue;
        };

        let row = months
            .entry(month_key(item.date))
            .or_default()
            .entry(item.group)
            .or_default()
            .entry(item.vm_id.clone())
            .or_insert_with(|| VmMonthRow::new(&item.vm_id));

        row.last_modified = latest(row.last_modified, item.file.modified_at);
        row.days
            .entry(item.date.day())
            .or_default()
            .absorb(item.file);
    }

    MonthlyIndex {
        months: months
            .into_iter()
            .map(|(month, groups)| (month, flatten_groups(groups)))
            .collect(),
        rejected,
    }
}

fn flatten_groups<T>(groups: Nested<T>) -> BTreeMap<String, Vec<T>> {
    groups
        .into_iter()
        .map(|(group, vms)| (group, vms.into_values().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(vm: &str, dir: &str, ts: &str, m: bool, f: bool, i: bool) -> BackupRecord {
        BackupRecord {
            vm: vm.into(),
            parent_directory: dir.into(),
            last_modified: ts.into(),
            metadata: m,
            full_backup: f,
            incremental_backup: i,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn two_days_of_one_vm() {
        let records = vec![
            record("DB1.vbk", "Finance", "2024-03-01 10:00:00", false, true, false),
            record("DB1.vib", "Finance", "2024-03-02 10:00:00", false, false, true),
        ];
        let index = group_by_date(&records);

        assert_eq!(index.dates.len(), 2);

        let first = &index.dates[&date("2024-03-01")]["Finance"];
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].unique_name, "DB1");
        assert!(first[0].bucket.flags.full_backup);
        assert!(!first[0].bucket.flags.incremental_backup);

        let second = &index.dates[&date("2024-03-02")]["Finance"];
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].unique_name, "DB1");
        assert!(!second[0].bucket.flags.full_backup);
        assert!(second[0].bucket.flags.incremental_backup);
    }

    #[test]
    fn same_bucket_flags_are_or_merged() {
        let records = vec![
            record("App.vbk", "Ops", "2024-03-01 01:00:00", false, true, false),
            record("App.20D2024-03-01T020000_AB12.vib", "Ops", "2024-03-01 02:00:00", false, false, true),
        ];
        let index = group_by_date(&records);
        let vm = &index.dates[&date("2024-03-01")]["Ops"][0];
        assert!(vm.bucket.flags.full_backup && vm.bucket.flags.incremental_backup);
        assert_eq!(vm.bucket.files.len(), 2);
        assert_eq!(
            vm.bucket.last_modified.map(|t| t.to_string()),
            Some("2024-03-01 02:00:00 UTC".to_string())
        );
    }

    #[test]
    fn max_timestamp_is_chronological_not_lexical() {
        let records = vec![
            record("App.vib", "Ops", "2024-03-01 9:30:00", false, false, true),
            record("App.vib", "Ops", "2024-03-01 10:00:00", false, false, true),
        ];
        let index = group_by_date(&records);
        let vm = &index.dates[&date("2024-03-01")]["Ops"][0];
        // Lexically "9:30" sorts after "10:00".
        assert_eq!(
            vm.bucket.last_modified.map(|t| t.to_string()),
            Some("2024-03-01 10:00:00 UTC".to_string())
        );
    }

    #[test]
    fn malformed_timestamp_never_wins() {
        let records = vec![
            record("App.vib", "Ops", "2024-03-01 08:00:00", false, false, true),
            record("App.vib", "Ops", "2024-03-01 garbage", false, false, true),
        ];
        let vm = &group_by_date(&records).dates[&date("2024-03-01")]["Ops"][0];
        assert_eq!(vm.bucket.files.len(), 2);
        assert_eq!(
            vm.bucket.last_modified.map(|t| t.to_string()),
            Some("2024-03-01 08:00:00 UTC".to_string())
        );
    }

    #[test]
    fn metadata_back_fills_silent_dates() {
        let records = vec![
            record("Mail_C0FFEE.vbm", "Exchange", "2024-03-01 00:30:00", true, false, false),
            record("Web.vbk", "Frontend", "2024-03-02 03:00:00", false, true, false),
        ];
        let index = group_by_date(&records);

        let silent = &index.dates[&date("2024-03-02")]["Exchange"];
        assert_eq!(silent.len(), 1);
        assert_eq!(silent[0].unique_name, "Mail");
        assert!(silent[0].bucket.files.is_empty());
        assert_eq!(silent[0].bucket.tag(), BackupTag::NoBackup);
        assert_eq!(
            silent[0].bucket.last_modified.map(|t| t.to_string()),
            Some("2024-03-02 00:00:00 UTC".to_string())
        );

        // Frontend VM never produced metadata, so it is not back-filled.
        assert!(!index.dates[&date("2024-03-01")].contains_key("Frontend"));
    }

    #[test]
    fn month_view_keys_days_and_skips_back_fill() {
        let records = vec![
            record("DB1.vbk", "Finance", "2024-03-01 10:00:00", false, true, false),
            record("DB1.vib", "Finance", "2024-03-15 10:00:00", false, false, true),
            record("DB1.vbm", "Finance", "2024-04-02 10:00:00", true, false, false),
            record("Web.vbk", "Frontend", "2024-04-03 10:00:00", false, true, false),
        ];
        let index = group_by_month(&records);

        let march = &index.months["2024-03"]["Finance"];
        assert_eq!(march.len(), 1);
        assert_eq!(march[0].days.keys().copied().collect::<Vec<_>>(), vec![1, 15]);
        assert!(march[0].days[&1].flags.full_backup);
        assert!(march[0].days[&15].flags.incremental_backup);
        assert!(march[0].month_flags().full_backup && march[0].month_flags().incremental_backup);

        assert!(!index.months["2024-03"].contains_key("Frontend"));
        assert_eq!(index.latest_month(), Some("2024-04"));
    }

    #[test]
    fn empty_input_is_an_empty_index() {
        assert!(group_by_date(&[]).dates.is_empty());
        assert!(group_by_month(&[]).months.is_empty());
    }

    #[test]
    fn undated_records_are_counted_not_grouped() {
        let records = vec![
            record("DB1.vbk", "Finance", "", false, true, false),
            record("DB1.vbk", "Finance", "2024-03-01 10:00:00", false, true, false),
        ];
        let index = group_by_date(&records);
        assert_eq!(index.rejected, 1);
        assert_eq!(index.dates.len(), 1);
    }

    #[test]
    fn null_timestamp_rejects_one_record_not_the_batch() {
        let raw = r#"[
            {"vm":"DB1.vbk","parent_directory":"Finance","last_modified":null,"full_backup":true},
            {"vm":"DB1.vbk","parent_directory":null,"last_modified":"2024-03-01 10:00:00","metadata":null,"full_backup":true}
        ]"#;
        let records: Vec<BackupRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records.len(), 2);

        let daily = group_by_date(&records);
        assert_eq!(daily.rejected, 1);
        assert_eq!(daily.dates.len(), 1);
        let monthly = group_by_month(&records);
        assert_eq!(monthly.rejected, 1);
        assert!(monthly.months.contains_key("2024-03"));
    }

    #[test]
    fn dates_desc_orders_newest_first() {
        let records = vec![
            record("A.vbk", "G", "2024-03-02 10:00:00", false, true, false),
            record("A.vbk", "G", "2024-03-10 10:00:00", false, true, false),
            record("A.vbk", "G", "2024-02-28 10:00:00", false, true, false),
        ];
        let index = group_by_date(&records);
        assert_eq!(
            index.dates_desc(),
            vec![date("2024-03-10"), date("2024-03-02"), date("2024-02-28")]
        );
        assert_eq!(index.latest_date(), Some(date("2024-03-10")));
    }

    fn arb_record() -> impl Strategy<Value = BackupRecord> {
        (
            prop::sample::select(vec!["DB1", "Web", "Mail", "Files_C0FF"]),
            prop::sample::select(vec![".vbk", ".vib", ".vbm"]),
            prop::sample::select(vec!["Finance", "Ops", "Frontend"]),
            1u32..=28,
            0u32..24,
            any::<(bool, bool, bool)>(),
        )
            .prop_map(|(vm, ext, dir, day, hour, (m, f, i))| {
                record(
                    &format!("{vm}{ext}"),
                    dir,
                    &format!("2024-03-{day:02} {hour:02}:00:00"),
                    m,
                    f,
                    i,
                )
            })
    }

    proptest! {
        #[test]
        fn every_record_is_placed_exactly_once(records in prop::collection::vec(arb_record(), 1..40)) {
            let index = group_by_date(&records);
            let files: usize = index
                .dates
                .values()
                .flat_map(|groups| groups.values())
                .flat_map(|vms| vms.iter())
                .map(|vm| vm.bucket.files.len())
                .sum();
            prop_assert_eq!(files, records.len());

            for r in &records {
                let d = date(&r.last_modified[..10]);
                let vms = &index.dates[&d][&r.parent_directory];
                prop_assert!(vms.iter().any(|vm| vm.unique_name == r.vm_identity()));
            }

            let monthly = group_by_month(&records);
            let month_files: usize = monthly
                .months
                .values()
                .flat_map(|groups| groups.values())
                .flat_map(|vms| vms.iter())
                .flat_map(|vm| vm.days.values())
                .map(|bucket| bucket.files.len())
                .sum();
            prop_assert_eq!(month_files, records.len());
        }

        #[test]
        fn grouping_is_a_pure_function(records in prop::collection::vec(arb_record(), 0..20)) {
            prop_assert_eq!(group_by_date(&records), group_by_date(&records));
            prop_assert_eq!(group_by_month(&records), group_by_month(&records));
        }
    }
}

//! Backup inventory records and their classification.

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::normalize::normalize;
use super::timestamp::{parse_date_prefix, parse_timestamp};
use super::wire::null_as_default;

/// One file reported by the backup inventory API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Raw backup filename (VM name plus tool suffixes).
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent_directory: String,
    /// `YYYY-MM-DD HH:MM:SS`. Empty or unparseable values reject the record.
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_modified: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_backup: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub incremental_backup: bool,
}

impl BackupRecord {
    pub fn flags(&self) -> BackupFlags {
        BackupFlags {
            metadata: self.metadata,
            full_backup: self.full_backup,
            incremental_backup: self.incremental_backup,
        }
    }

    pub fn vm_identity(&self) -> String {
        normalize(&self.vm)
    }
}

/// The three backup-type flags. Not mutually exclusive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, SimpleObject,
)]
pub struct BackupFlags {
    pub metadata: bool,
    pub full_backup: bool,
    pub incremental_backup: bool,
}

impl BackupFlags {
    /// OR-merge another set of flags into this one.
    pub fn merge(&mut self, other: BackupFlags) {
        self.metadata |= other.metadata;
        self.full_backup |= other.full_backup;
        self.incremental_backup |= other.incremental_backup;
    }

    pub fn is_empty(&self) -> bool {
        !(self.metadata || self.full_backup || self.incremental_backup)
    }

    /// A real backup (full or incremental), as opposed to catalog metadata.
    pub fn has_data_backup(&self) -> bool {
        self.full_backup || self.incremental_backup
    }

    pub fn tag(&self) -> BackupTag {
        if self.is_empty() {
            BackupTag::NoBackup
        } else if !self.has_data_backup() {
            BackupTag::NoFullOrIncremental
        } else {
            BackupTag::Backed
        }
    }
}

/// Classification of a record (or merged bucket) by its flags.
///
/// `NoFullOrIncremental` marks metadata-only activity: the VM is still
/// registered with the backup job but has stopped producing backup files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
pub enum BackupTag {
    #[serde(rename = "No Backup")]
    NoBackup,
    #[serde(rename = "No Full or Incremental")]
    NoFullOrIncremental,
    #[serde(rename = "Backed Up")]
    Backed,
}

impl std::fmt::Display for BackupTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBackup => write!(f, "No Backup"),
            Self::NoFullOrIncremental => write!(f, "No Full or Incremental"),
            Self::Backed => write!(f, "Backed Up"),
        }
    }
}

/// Full vs incremental label for a "last backup" column. Full wins a tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
pub enum BackupKind {
    Full,
    Incremental,
    Metadata,
}

impl BackupKind {
    pub fn of(flags: BackupFlags) -> Option<Self> {
        if flags.full_backup {
            Some(Self::Full)
        } else if flags.incremental_backup {
            Some(Self::Incremental)
        } else if flags.metadata {
            Some(Self::Metadata)
        } else {
            None
        }
    }
}

/// A raw record after ingestion: identity derived, time parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub filename: String,
    #[serde(flatten)]
    pub flags: BackupFlags,
    /// The raw value as reported.
    pub last_modified: String,
    /// Parsed `last_modified`; `None` when the value is malformed.
    pub modified_at: Option<DateTime<Utc>>,
}

/// A record ready for grouping. Records without a usable date are rejected at
/// this step and counted by the caller.
#[derive(Debug, Clone)]
pub struct IngestedBackup {
    pub date: NaiveDate,
    pub group: String,
    pub vm_id: String,
    pub file: BackupFile,
}

impl IngestedBackup {
    pub fn from_record(record: &BackupRecord) -> Option<Self> {
        let date = parse_date_prefix(&record.last_modified)?;
        Some(Self {
            date,
            group: record.parent_directory.clone(),
            vm_id: record.vm_identity(),
            file: BackupFile {
                filename: record.vm.clone(),
                flags: record.flags(),
                last_modified: record.last_modified.clone(),
                modified_at: parse_timestamp(&record.last_modified),
            },
        })
    }
}

pub mod backups;
pub mod daemon;
pub mod history;
pub mod inventory;
pub mod output;
pub mod ping;
pub mod query;
pub mod source;
pub mod sweep;
pub mod vms;

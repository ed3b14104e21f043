pub mod backup;
pub mod backup_report;
pub mod filter;
pub mod grouping;
pub mod monitor_service;
pub mod normalize;
pub mod ping;
pub mod reconcile;
pub mod severity;
pub mod snapshot;
pub mod status;
pub mod timestamp;
pub mod types;
pub mod views;
pub mod wire;

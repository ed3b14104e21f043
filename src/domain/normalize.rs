//! Backup filename → VM identity.
//!
//! Backup files carry the VM name followed by tool-generated suffixes. The
//! suffix grammar, stripped from the end in this order:
//!
//! 1. file extension: `.vbk` (full), `.vib` (incremental), `.vbm` (metadata)
//! 2. chain suffix: `.<digits>D<YYYY-MM-DD>T<6 digits>_<hex>`
//! 3. per-disk chain suffix: `.vm-<digits>D<YYYY-MM-DD>T<6 digits>_<hex>`
//! 4. disambiguation tag: `_<4-6 hex>`
//! 5. leftover raw timestamp (`D<YYYY-MM-DD>T<digits>...` or bare
//!    `<YYYY-MM-DD>T<digits>...`), trailing `.`/`_`, surrounding whitespace
//!
//! The pipeline is repeated until the value stops changing, so
//! `normalize(normalize(x)) == normalize(x)` for every input. A name ending
//! in several hex-looking segments loses all of them: `App_Dead_Beef` becomes
//! `App`.

use once_cell::sync::Lazy;
use regex::Regex;

static EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(vbk|vib|vbm)$").unwrap_or_else(|_| unreachable!()));

static CHAIN_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.\d+D\d{4}-\d{2}-\d{2}T\d{6}_[A-F0-9]+$")
        .unwrap_or_else(|_| unreachable!())
});

static DISK_CHAIN_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.vm-\d+D\d{4}-\d{2}-\d{2}T\d{6}_[A-F0-9]+$")
        .unwrap_or_else(|_| unreachable!())
});

static SHORT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_[A-F0-9]{4,6}$").unwrap_or_else(|_| unreachable!()));

static RAW_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[._-]?D?\d{4}-\d{2}-\d{2}T\d{4,6}.*$").unwrap_or_else(|_| unreachable!())
});

/// Canonical VM identity for a raw backup filename.
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(name: &str) -> String {
    let mut out = EXTENSION.replace(name, "").into_owned();
    out = CHAIN_SUFFIX.replace(&out, "").into_owned();
    out = DISK_CHAIN_SUFFIX.replace(&out, "").into_owned();
    out = SHORT_TAG.replace(&out, "").into_owned();
    out = RAW_TIMESTAMP.replace(&out, "").into_owned();
    out.trim_end_matches(['.', '_']).trim().to_string()
}

//! Process-level worker identity.
//!
//! Every claim a process makes is stamped with the same ULID, so rows in
//! `intake.submissions.claimed_by` can be traced back to one worker run.

use once_cell::sync::Lazy;
use ulid::Ulid;

static WORKER_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// The worker id for this process, generated on first access.
#[inline]
pub fn get() -> &'static str {
    &WORKER_ID
}

#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

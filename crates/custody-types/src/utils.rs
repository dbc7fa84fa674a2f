//! Formatting helpers for log output.

use chrono::{DateTime, Utc};

/// Shortens a settlement reference for display.
///
/// Shows only the first 8 characters followed by ".." for longer references,
/// and `<failed>` for the empty reference of a failed record.
pub fn short_reference(reference: &str) -> String {
	if reference.is_empty() {
		"<failed>".to_string()
	} else if reference.len() <= 8 {
		reference.to_string()
	} else {
		format!("{}..", &reference[..8])
	}
}

/// Current wall-clock time used to stamp ledger records.
pub fn current_timestamp() -> DateTime<Utc> {
	Utc::now()
}

use chrono::{DateTime, Utc};

/// Time source for the ledger, kept behind a trait so billing math can be
/// driven by a manual clock in tests.
pub trait Clock: Send + Sync {
	fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_utc(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

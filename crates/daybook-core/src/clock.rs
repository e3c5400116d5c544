//! Time source for the engine.
//!
//! Every component reads "now" through [`Clock`] so tests can pin and advance
//! time without sleeping.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Calendar date format used to key entries, usage records and drafts.
pub const LOCAL_DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date of `now()` in the given IANA timezone, as `YYYY-MM-DD`.
    ///
    /// Unknown timezones fall back to the UTC date.
    fn local_date(&self, timezone: &str) -> String {
        local_date_at(self.now(), timezone)
    }
}

/// Calendar date of `at` in `timezone`, falling back to UTC.
pub fn local_date_at(at: DateTime<Utc>, timezone: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => at.with_timezone(&tz).format(LOCAL_DATE_FORMAT).to_string(),
        Err(_) => {
            tracing::debug!(timezone, "unknown timezone, using UTC date");
            at.format(LOCAL_DATE_FORMAT).to_string()
        }
    }
}

/// Parse a `YYYY-MM-DD` local date.
pub fn parse_local_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, LOCAL_DATE_FORMAT).ok()
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Profile statistics for Daybook
//!
//! Streaks are measured over local dates with at least one entry. The current
//! streak ends today, or yesterday when today's entry has not been posted yet,
//! so a streak is not broken before the day is over.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::parse_local_date;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_entries: u64,
    pub kudos_received: u64,
}

impl ProfileStats {
    /// Build stats from the local dates a user posted on.
    ///
    /// `dates` may be unsorted and may contain unparseable values, which are
    /// ignored for streaks but still counted as entries.
    pub fn from_dates<S: AsRef<str>>(dates: &[S], today: &str, kudos_received: u64) -> Self {
        let mut days: Vec<NaiveDate> = dates
            .iter()
            .filter_map(|d| parse_local_date(d.as_ref()))
            .collect();
        days.sort_unstable();
        days.dedup();

        Self {
            current_streak: parse_local_date(today)
                .map(|t| current_streak(&days, t))
                .unwrap_or(0),
            longest_streak: longest_streak(&days),
            total_entries: dates.len() as u64,
            kudos_received,
        }
    }
}

fn longest_streak(days: &[NaiveDate]) -> u32 {
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        run = match prev {
            Some(p) if day - p == Duration::days(1) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

fn current_streak(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut expected = if days.binary_search(&today).is_ok() {
        today
    } else {
        today - Duration::days(1)
    };
    let mut streak = 0;
    for &day in days.iter().rev() {
        if day > expected {
            continue;
        }
        if day != expected {
            break;
        }
        streak += 1;
        expected = expected - Duration::days(1);
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history() {
        let stats = ProfileStats::from_dates::<&str>(&[], "2026-05-01", 0);
        assert_eq!(stats, ProfileStats::default());
    }

    #[test]
    fn streak_through_today() {
        let dates = ["2026-04-29", "2026-04-30", "2026-05-01"];
        let stats = ProfileStats::from_dates(&dates, "2026-05-01", 7);
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.longest_streak, 3);
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.kudos_received, 7);
    }

    #[test]
    fn unposted_today_keeps_yesterdays_streak() {
        let dates = ["2026-04-29", "2026-04-30"];
        let stats = ProfileStats::from_dates(&dates, "2026-05-01", 0);
        assert_eq!(stats.current_streak, 2);
    }

    #[test]
    fn gap_breaks_current_but_not_longest() {
        let dates = ["2026-04-20", "2026-04-21", "2026-04-22", "2026-04-23", "2026-04-30", "2026-05-01"];
        let stats = ProfileStats::from_dates(&dates, "2026-05-01", 0);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.longest_streak, 4);
    }

    #[test]
    fn two_days_missed_resets_current() {
        let dates = ["2026-04-27", "2026-04-28"];
        let stats = ProfileStats::from_dates(&dates, "2026-05-01", 0);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.longest_streak, 2);
    }
}

//! Per-process risk counters: windowed, in-memory, lost on restart.
//! Acceptable per spec.md §4.5 because exchange-side limits are authoritative.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct DailyCounter {
    pub count: u32,
    pub reset_date: chrono::NaiveDate,
}

impl DailyCounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            reset_date: now.date_naive(),
        }
    }

    /// Resets on a UTC calendar-day boundary (spec.md §9 Open Question,
    /// resolved as UTC midnight), then increments.
    pub fn increment(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.reset_date {
            self.count = 0;
            self.reset_date = today;
        }
        self.count += 1;
    }

    pub fn current(&self, now: DateTime<Utc>) -> u32 {
        if now.date_naive() != self.reset_date {
            0
        } else {
            self.count
        }
    }
}

/// Sliding 60-second window of API-call timestamps.
#[derive(Debug, Clone, Default)]
pub struct MinuteWindowCounter {
    timestamps: std::collections::VecDeque<DateTime<Utc>>,
}

impl MinuteWindowCounter {
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.evict(now);
        self.timestamps.push_back(now);
    }

    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        self.evict(now);
        self.timestamps.len()
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let window_ago = now - chrono::Duration::seconds(60);
        while let Some(front) = self.timestamps.front() {
            if *front < window_ago {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn daily_counter_resets_on_utc_midnight() {
        let day1 = Utc::now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();
        let mut counter = DailyCounter::new(day1);
        counter.increment(day1);
        counter.increment(day1);
        assert_eq!(counter.current(day1), 2);

        let day2 = day1 + Duration::hours(2);
        counter.increment(day2);
        assert_eq!(counter.current(day2), 1);
    }

    #[test]
    fn minute_window_evicts_old_timestamps() {
        let mut window = MinuteWindowCounter::default();
        let t0 = Utc::now();
        window.record(t0);
        window.record(t0 + Duration::seconds(10));
        assert_eq!(window.count(t0 + Duration::seconds(20)), 2);

        let later = t0 + Duration::seconds(70);
        assert_eq!(window.count(later), 1);
    }
}

//! Due / due-soon / complete status from the last completion date.

use chrono::{Days, Months, NaiveDate};
use prep_model::{Frequency, Interval, ScreeningCriteria, ScreeningStatus};

/// Date the screening is next due after a completion on `last_completed`.
///
/// Returns `None` only if the date falls outside chrono's range.
pub fn next_due_date(last_completed: NaiveDate, frequency: &Frequency) -> Option<NaiveDate> {
    match frequency.interval() {
        Interval::Days(days) => last_completed.checked_add_days(Days::new(u64::from(days))),
        Interval::Months(months) => last_completed.checked_add_months(Months::new(months)),
    }
}

/// Computes statuses relative to a fixed `today`.
#[derive(Debug, Clone, Copy)]
pub struct StatusCalculator {
    today: NaiveDate,
    due_soon_window_months: u32,
}

impl StatusCalculator {
    pub fn new(today: NaiveDate, due_soon_window_months: u32) -> Self {
        Self {
            today,
            due_soon_window_months,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn calculate_status(
        &self,
        criteria: &ScreeningCriteria,
        last_completed: Option<NaiveDate>,
    ) -> ScreeningStatus {
        self.status_for(criteria.frequency.as_ref(), last_completed)
    }

    /// - no completion: `due`
    /// - no frequency: `complete` once completed, for good
    /// - next due on or before today: `due`
    /// - next due inside the lookahead window: `due_soon`
    /// - otherwise `complete`
    pub fn status_for(
        &self,
        frequency: Option<&Frequency>,
        last_completed: Option<NaiveDate>,
    ) -> ScreeningStatus {
        let Some(last_completed) = last_completed else {
            return ScreeningStatus::Due;
        };
        let Some(frequency) = frequency else {
            return ScreeningStatus::Complete;
        };
        let Some(next_due) = next_due_date(last_completed, frequency) else {
            return ScreeningStatus::Complete;
        };
        if next_due <= self.today {
            return ScreeningStatus::Due;
        }
        let horizon = self
            .today
            .checked_add_months(Months::new(self.due_soon_window_months))
            .unwrap_or(NaiveDate::MAX);
        if next_due <= horizon {
            ScreeningStatus::DueSoon
        } else {
            ScreeningStatus::Complete
        }
    }
}

#[cfg(test)]
mod tests {
    use prep_model::FrequencyUnit;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn years(value: f64) -> Frequency {
        Frequency {
            value,
            unit: FrequencyUnit::Years,
        }
    }

    #[test]
    fn half_year_adds_six_calendar_months() {
        assert_eq!(next_due_date(date(2024, 1, 15), &years(0.5)), Some(date(2024, 7, 15)));
        assert_eq!(next_due_date(date(2024, 1, 15), &years(0.25)), Some(date(2024, 4, 15)));
    }

    #[test]
    fn month_end_clamps() {
        let monthly = Frequency {
            value: 1.0,
            unit: FrequencyUnit::Months,
        };
        assert_eq!(next_due_date(date(2024, 1, 31), &monthly), Some(date(2024, 2, 29)));
    }

    #[test]
    fn day_frequency() {
        let days = Frequency {
            value: 90.0,
            unit: FrequencyUnit::Days,
        };
        assert_eq!(next_due_date(date(2024, 1, 1), &days), Some(date(2024, 3, 31)));
    }

    #[test]
    fn yearly_status_transitions() {
        let calc = StatusCalculator::new(date(2025, 6, 1), 1);
        let yearly = years(1.0);
        assert_eq!(calc.status_for(Some(&yearly), Some(date(2025, 6, 1))), ScreeningStatus::Complete);
        assert_eq!(calc.status_for(Some(&yearly), Some(date(2023, 6, 1))), ScreeningStatus::Due);
        assert_eq!(calc.status_for(Some(&yearly), Some(date(2024, 7, 1))), ScreeningStatus::DueSoon);
        assert_eq!(calc.status_for(Some(&yearly), Some(date(2024, 6, 1))), ScreeningStatus::Due);
        assert_eq!(calc.status_for(Some(&yearly), None), ScreeningStatus::Due);
    }

    #[test]
    fn no_frequency_means_complete_once_done() {
        let calc = StatusCalculator::new(date(2025, 6, 1), 1);
        assert_eq!(calc.status_for(None, Some(date(2001, 1, 1))), ScreeningStatus::Complete);
        assert_eq!(calc.status_for(None, None), ScreeningStatus::Due);
    }
}

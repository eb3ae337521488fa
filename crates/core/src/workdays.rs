use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

/// Advances `date` one calendar day at a time until `days` working days
/// (Mon-Fri) have been counted. Saturdays and Sundays are stepped over without
/// counting. Time-of-day is inherited from the input.
pub fn add_working_days(date: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let mut result = date;
    let mut added = 0;

    while added < days {
        result += Duration::days(1);
        if !is_weekend(result.weekday()) {
            added += 1;
        }
    }

    result
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

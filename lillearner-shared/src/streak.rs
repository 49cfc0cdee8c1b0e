use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

/// The walk back from today never looks further than this many days.
pub const MAX_STREAK_DAYS: u32 = 365;

/// Collapses timestamps already mapped to local calendar days into a set.
pub fn active_days<I>(days: I) -> BTreeSet<NaiveDate>
where
    I: IntoIterator<Item = NaiveDate>,
{
    days.into_iter().collect()
}

/// Consecutive days with at least one entry, counting back from `today`.
///
/// A missing entry today does not break the streak (the day is not over
/// yet); any other missing day ends it. Days after `today` are ignored.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    for offset in 0..MAX_STREAK_DAYS {
        let Some(day) = today.checked_sub_days(Days::new(u64::from(offset))) else {
            break;
        };
        if days.contains(&day) {
            streak += 1;
        } else if offset == 0 {
            continue;
        } else {
            break;
        }
    }
    streak
}

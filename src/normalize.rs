use crate::model::{WEEKS_PER_YEAR, WeekActivity};

/// Clamps activity to the most recent 52 weeks.
///
/// Some years report 53 weeks; the oldest ones are dropped so the grid always
/// ends on the current week.
pub fn normalize(activity: WeekActivity) -> WeekActivity {
    if activity.len() <= WEEKS_PER_YEAR {
        return activity;
    }

    let mut weeks = activity.into_weeks();
    let excess = weeks.len() - WEEKS_PER_YEAR;
    weeks.drain(..excess);
    WeekActivity::new(weeks)
}

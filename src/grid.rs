use crate::model::{DAYS_PER_WEEK, WEEKS_PER_YEAR, WeekActivity};

/// The 52-week by 7-day board the scheduler paints on.
pub trait ActivityGrid {
    fn week_count(&self) -> usize;
    fn set_day_active(&mut self, week: usize, day: usize, active: bool);
    fn set_week_playing(&mut self, week: usize, playing: bool);

    fn show_activity(&mut self, activity: &WeekActivity) {
        for week in 0..self.week_count() {
            let days = activity.get(week).map(|entry| entry.days).unwrap_or_default();
            for (day, active) in days.into_iter().enumerate() {
                self.set_day_active(week, day, active);
            }
        }
    }

    fn clear_playing(&mut self) {
        for week in 0..self.week_count() {
            self.set_week_playing(week, false);
        }
    }

    fn clear_all(&mut self) {
        for week in 0..self.week_count() {
            self.set_week_playing(week, false);
            for day in 0..DAYS_PER_WEEK {
                self.set_day_active(week, day, false);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridView {
    active: [[bool; DAYS_PER_WEEK]; WEEKS_PER_YEAR],
    playing: [bool; WEEKS_PER_YEAR],
}

impl Default for GridView {
    fn default() -> Self {
        Self {
            active: [[false; DAYS_PER_WEEK]; WEEKS_PER_YEAR],
            playing: [false; WEEKS_PER_YEAR],
        }
    }
}

impl GridView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_day_active(&self, week: usize, day: usize) -> bool {
        self.active
            .get(week)
            .and_then(|days| days.get(day))
            .copied()
            .unwrap_or(false)
    }

    pub fn is_week_playing(&self, week: usize) -> bool {
        self.playing.get(week).copied().unwrap_or(false)
    }

    pub fn playing_week(&self) -> Option<usize> {
        self.playing.iter().position(|playing| *playing)
    }

    pub fn active_day_count(&self) -> usize {
        self.active.iter().flatten().filter(|active| **active).count()
    }
}

impl ActivityGrid for GridView {
    fn week_count(&self) -> usize {
        WEEKS_PER_YEAR
    }

    fn set_day_active(&mut self, week: usize, day: usize, active: bool) {
        if let Some(slot) = self.active.get_mut(week).and_then(|days| days.get_mut(day)) {
            *slot = active;
        }
    }

    fn set_week_playing(&mut self, week: usize, playing: bool) {
        if let Some(slot) = self.playing.get_mut(week) {
            *slot = playing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Week;

    #[test]
    fn show_activity_paints_and_blanks_missing_weeks() {
        let mut grid = GridView::new();
        grid.set_day_active(10, 3, true);

        let activity = WeekActivity::new(vec![Week::from_days([
            true, false, false, false, false, false, true,
        ])]);
        grid.show_activity(&activity);

        assert!(grid.is_day_active(0, 0));
        assert!(grid.is_day_active(0, 6));
        assert!(!grid.is_day_active(10, 3));
        assert_eq!(grid.active_day_count(), 2);
    }

    #[test]
    fn clear_all_removes_every_cue() {
        let mut grid = GridView::new();
        grid.show_activity(&WeekActivity::new(vec![Week::full(); 52]));
        grid.set_week_playing(5, true);
        assert_eq!(grid.playing_week(), Some(5));

        grid.clear_all();
        assert_eq!(grid.active_day_count(), 0);
        assert_eq!(grid.playing_week(), None);
    }

    #[test]
    fn out_of_range_cells_are_ignored() {
        let mut grid = GridView::new();
        grid.set_day_active(52, 0, true);
        grid.set_week_playing(99, true);
        assert_eq!(grid.active_day_count(), 0);
        assert!(!grid.is_week_playing(99));
    }
}

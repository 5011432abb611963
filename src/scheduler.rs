use crate::audio::ToneChannels;
use crate::grid::ActivityGrid;
use crate::model::{FinalWeekAudio, WeekActivity};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Finishing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

/// Repeating deadline. Runs at most one tick per poll and re-anchors instead
/// of bursting when the caller falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period: Duration,
    next_due: Instant,
}

impl Interval {
    pub fn arm(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now + period,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    fn advance(&mut self, now: Instant) {
        self.next_due += self.period;
        if self.next_due <= now {
            self.next_due = now + self.period;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session; nothing happened.
    Inactive,
    Played { week: usize, tones: usize },
    /// The cursor moved past the final week without sounding it.
    SilentFinalWeek { week: usize },
    /// Timer disarmed, session released.
    Finished,
}

#[derive(Debug)]
struct PlaybackSession {
    handle: SessionHandle,
    cursor: usize,
    activity: WeekActivity,
    timer: Option<Interval>,
}

#[derive(Debug)]
pub struct PlaybackScheduler {
    state: PlaybackState,
    session: Option<PlaybackSession>,
    tick_interval: Duration,
    final_week: FinalWeekAudio,
    background: bool,
    next_handle: u64,
}

impl PlaybackScheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            state: PlaybackState::Idle,
            session: None,
            tick_interval,
            final_week: FinalWeekAudio::DEFAULT,
            background: false,
            next_handle: 0,
        }
    }

    pub fn with_final_week_audio(mut self, policy: FinalWeekAudio) -> Self {
        self.final_week = policy;
        self
    }

    pub fn with_background(mut self, enabled: bool) -> Self {
        self.background = enabled;
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Playing | PlaybackState::Finishing
        )
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.session.as_ref().map(|session| session.handle)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.cursor)
    }

    pub fn week_count(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.activity.len())
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.session
            .as_ref()
            .and_then(|session| session.timer)
            .map(|timer| timer.next_due())
    }

    /// Replaces any running session, paints the activity and arms the timer.
    /// The first tick fires one interval after `now`.
    pub fn start(
        &mut self,
        activity: WeekActivity,
        now: Instant,
        channels: &mut dyn ToneChannels,
        grid: &mut dyn ActivityGrid,
    ) -> SessionHandle {
        if self.session.is_some() {
            debug!("start while a session is live, cancelling it first");
            self.reset(channels, grid);
        }

        grid.clear_playing();
        grid.show_activity(&activity);
        if self.background {
            channels.play_background();
        }

        self.next_handle += 1;
        let handle = SessionHandle(self.next_handle);
        info!(weeks = activity.len(), "playback started");
        self.session = Some(PlaybackSession {
            handle,
            cursor: 0,
            activity,
            timer: Some(Interval::arm(self.tick_interval, now)),
        });
        self.state = PlaybackState::Playing;
        handle
    }

    /// Runs one tick if the timer is due.
    pub fn poll(
        &mut self,
        now: Instant,
        channels: &mut dyn ToneChannels,
        grid: &mut dyn ActivityGrid,
    ) -> Option<TickOutcome> {
        let timer = self.session.as_mut()?.timer.as_mut()?;
        if !timer.is_due(now) {
            return None;
        }
        timer.advance(now);
        Some(self.tick(channels, grid))
    }

    pub fn tick(
        &mut self,
        channels: &mut dyn ToneChannels,
        grid: &mut dyn ActivityGrid,
    ) -> TickOutcome {
        let final_week = self.final_week;
        let finishing = self.state == PlaybackState::Finishing;
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Inactive;
        };

        channels.stop_all();
        grid.clear_playing();

        let len = session.activity.len();
        if finishing || session.cursor >= len {
            self.finish(channels);
            return TickOutcome::Finished;
        }

        let week = session.cursor;
        if final_week == FinalWeekAudio::Skip && week + 1 == len {
            session.cursor += 1;
            self.state = PlaybackState::Finishing;
            return TickOutcome::SilentFinalWeek { week };
        }

        let mut tones = 0;
        if let Some(entry) = session.activity.get(week) {
            for day in entry.active_days() {
                channels.play(day);
                tones += 1;
            }
        }
        grid.set_week_playing(week, true);
        session.cursor += 1;
        if session.cursor == len {
            self.state = PlaybackState::Finishing;
        }
        TickOutcome::Played { week, tones }
    }

    /// Cancels the session identified by `handle`. A handle from an earlier
    /// session leaves the current one alone.
    pub fn cancel(
        &mut self,
        handle: SessionHandle,
        channels: &mut dyn ToneChannels,
        grid: &mut dyn ActivityGrid,
    ) -> bool {
        if self.handle() != Some(handle) {
            debug!(?handle, "ignoring cancel for a session that is no longer live");
            return false;
        }
        self.reset(channels, grid);
        true
    }

    /// Stops everything regardless of state: timer, every channel, every cue.
    pub fn reset(&mut self, channels: &mut dyn ToneChannels, grid: &mut dyn ActivityGrid) {
        if let Some(session) = self.session.take() {
            info!(cursor = session.cursor, "playback cancelled");
        }
        channels.stop_all();
        channels.stop_background();
        grid.clear_all();
        self.state = PlaybackState::Stopped;
    }

    fn finish(&mut self, channels: &mut dyn ToneChannels) {
        if let Some(mut session) = self.session.take() {
            session.timer = None;
            info!(weeks = session.activity.len(), "playback finished");
        }
        channels.stop_background();
        self.state = PlaybackState::Stopped;
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridView;
    use crate::model::{DAYS_PER_WEEK, Week};

    #[derive(Default)]
    struct RecordingChannels {
        plays: Vec<usize>,
        sounding: [bool; DAYS_PER_WEEK],
        background: bool,
    }

    impl ToneChannels for RecordingChannels {
        fn play(&mut self, channel: usize) {
            self.plays.push(channel);
            self.sounding[channel] = true;
        }

        fn stop(&mut self, channel: usize) {
            self.sounding[channel] = false;
        }

        fn play_background(&mut self) {
            self.background = true;
        }

        fn stop_background(&mut self) {
            self.background = false;
        }

        fn output_name(&self) -> Option<String> {
            None
        }
    }

    fn full_weeks(len: usize) -> WeekActivity {
        WeekActivity::new(vec![Week::full(); len])
    }

    fn run_to_end(
        scheduler: &mut PlaybackScheduler,
        channels: &mut RecordingChannels,
        grid: &mut GridView,
    ) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..200 {
            let outcome = scheduler.tick(channels, grid);
            outcomes.push(outcome);
            if outcome == TickOutcome::Finished {
                break;
            }
        }
        outcomes
    }

    #[test]
    fn full_playback_skips_the_final_week() {
        for weeks in 1..=52 {
            let mut scheduler = PlaybackScheduler::default();
            let mut channels = RecordingChannels::default();
            let mut grid = GridView::new();
            scheduler.start(full_weeks(weeks), Instant::now(), &mut channels, &mut grid);

            let outcomes = run_to_end(&mut scheduler, &mut channels, &mut grid);

            assert_eq!(channels.plays.len(), 7 * (weeks - 1), "weeks={weeks}");
            assert_eq!(outcomes.len(), weeks + 1);
            assert_eq!(
                outcomes[weeks - 1],
                TickOutcome::SilentFinalWeek { week: weeks - 1 }
            );
            assert_eq!(scheduler.state(), PlaybackState::Stopped);
            assert_eq!(grid.playing_week(), None);
            assert!(channels.sounding.iter().all(|sounding| !sounding));
        }
    }

    #[test]
    fn play_policy_sounds_every_week() {
        let mut scheduler =
            PlaybackScheduler::default().with_final_week_audio(FinalWeekAudio::Play);
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        scheduler.start(full_weeks(3), Instant::now(), &mut channels, &mut grid);

        let outcomes = run_to_end(&mut scheduler, &mut channels, &mut grid);

        assert_eq!(channels.plays.len(), 21);
        assert_eq!(outcomes.len(), 4);
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn only_active_days_are_triggered() {
        let mut scheduler = PlaybackScheduler::default();
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        let activity = WeekActivity::new(vec![
            Week::from_days([false, true, false, false, true, false, false]),
            Week::default(),
        ]);
        scheduler.start(activity, Instant::now(), &mut channels, &mut grid);

        assert_eq!(
            scheduler.tick(&mut channels, &mut grid),
            TickOutcome::Played { week: 0, tones: 2 }
        );
        assert_eq!(channels.plays, vec![1, 4]);
        assert_eq!(grid.playing_week(), Some(0));
    }

    #[test]
    fn empty_activity_finishes_on_first_tick() {
        let mut scheduler = PlaybackScheduler::default();
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        scheduler.start(WeekActivity::default(), Instant::now(), &mut channels, &mut grid);

        assert_eq!(scheduler.tick(&mut channels, &mut grid), TickOutcome::Finished);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn start_then_cancel_leaves_nothing_behind() {
        let mut scheduler = PlaybackScheduler::default().with_background(true);
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        let handle = scheduler.start(full_weeks(52), Instant::now(), &mut channels, &mut grid);
        scheduler.tick(&mut channels, &mut grid);
        assert!(channels.background);

        assert!(scheduler.cancel(handle, &mut channels, &mut grid));

        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        assert_eq!(scheduler.next_deadline(), None);
        assert!(channels.sounding.iter().all(|sounding| !sounding));
        assert!(!channels.background);
        assert_eq!(grid.active_day_count(), 0);
        assert_eq!(grid.playing_week(), None);
        assert_eq!(scheduler.tick(&mut channels, &mut grid), TickOutcome::Inactive);
    }

    #[test]
    fn stale_handle_does_not_cancel_new_session() {
        let mut scheduler = PlaybackScheduler::default();
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        let first = scheduler.start(full_weeks(4), Instant::now(), &mut channels, &mut grid);
        let second = scheduler.start(full_weeks(4), Instant::now(), &mut channels, &mut grid);

        assert!(!scheduler.cancel(first, &mut channels, &mut grid));
        assert_eq!(scheduler.handle(), Some(second));
        assert_eq!(scheduler.state(), PlaybackState::Playing);
    }

    #[test]
    fn restart_resets_cursor_and_keeps_a_single_timer() {
        let mut scheduler = PlaybackScheduler::default();
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        let now = Instant::now();
        scheduler.start(full_weeks(10), now, &mut channels, &mut grid);
        scheduler.tick(&mut channels, &mut grid);
        scheduler.tick(&mut channels, &mut grid);

        let later = now + Duration::from_secs(5);
        scheduler.start(full_weeks(10), later, &mut channels, &mut grid);

        assert_eq!(scheduler.cursor(), Some(0));
        assert_eq!(scheduler.next_deadline(), Some(later + DEFAULT_TICK_INTERVAL));
    }

    #[test]
    fn poll_waits_for_the_interval() {
        let mut scheduler = PlaybackScheduler::new(Duration::from_millis(250));
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        let now = Instant::now();
        scheduler.start(full_weeks(5), now, &mut channels, &mut grid);

        assert_eq!(
            scheduler.poll(now + Duration::from_millis(100), &mut channels, &mut grid),
            None
        );
        assert_eq!(
            scheduler.poll(now + Duration::from_millis(250), &mut channels, &mut grid),
            Some(TickOutcome::Played { week: 0, tones: 7 })
        );
        assert_eq!(
            scheduler.next_deadline(),
            Some(now + Duration::from_millis(500))
        );
    }

    #[test]
    fn poll_reanchors_after_a_stall() {
        let mut scheduler = PlaybackScheduler::new(Duration::from_millis(100));
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        let now = Instant::now();
        scheduler.start(full_weeks(5), now, &mut channels, &mut grid);

        let stalled = now + Duration::from_millis(1_000);
        assert!(scheduler.poll(stalled, &mut channels, &mut grid).is_some());
        assert_eq!(scheduler.poll(stalled, &mut channels, &mut grid), None);
        assert_eq!(
            scheduler.next_deadline(),
            Some(stalled + Duration::from_millis(100))
        );
    }

    #[test]
    fn natural_finish_keeps_active_days_but_drops_background() {
        let mut scheduler = PlaybackScheduler::default().with_background(true);
        let mut channels = RecordingChannels::default();
        let mut grid = GridView::new();
        scheduler.start(full_weeks(2), Instant::now(), &mut channels, &mut grid);

        run_to_end(&mut scheduler, &mut channels, &mut grid);

        assert!(!channels.background);
        assert_eq!(grid.active_day_count(), 14);
        assert_eq!(grid.playing_week(), None);
    }
}

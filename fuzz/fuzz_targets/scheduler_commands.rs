#![no_main]

use libfuzzer_sys::fuzz_target;
use std::time::{Duration, Instant};
use tonalhub::audio::NullToneBank;
use tonalhub::grid::GridView;
use tonalhub::model::{FinalWeekAudio, Week, WeekActivity};
use tonalhub::normalize::normalize;
use tonalhub::scheduler::{PlaybackScheduler, TickOutcome};

fuzz_target!(|data: &[u8]| {
    let Some((&first, ops)) = data.split_first() else {
        return;
    };
    let policy = if first & 1 == 0 {
        FinalWeekAudio::Skip
    } else {
        FinalWeekAudio::Play
    };
    let tick = Duration::from_millis(400);
    let mut scheduler = PlaybackScheduler::new(tick).with_final_week_audio(policy);
    let mut channels = NullToneBank::new();
    let mut grid = GridView::new();
    let mut now = Instant::now();
    let mut handles = Vec::new();

    for byte in ops {
        match byte % 5 {
            0 => {
                let weeks = (*byte as usize) % 64;
                let activity = WeekActivity::new(
                    (0..weeks)
                        .map(|week| {
                            let bits = (week as u8).wrapping_mul(*byte);
                            Week::from_days(std::array::from_fn(|day| bits & (1 << day) != 0))
                        })
                        .collect(),
                );
                handles.push(scheduler.start(normalize(activity), now, &mut channels, &mut grid));
            }
            1 | 2 => {
                now += tick;
                if let Some(TickOutcome::Played { week, .. }) =
                    scheduler.poll(now, &mut channels, &mut grid)
                {
                    assert_eq!(grid.playing_week(), Some(week));
                }
            }
            3 => {
                if let Some(handle) = handles.get(*byte as usize % handles.len().max(1)).copied() {
                    let live = scheduler.handle() == Some(handle);
                    assert_eq!(scheduler.cancel(handle, &mut channels, &mut grid), live);
                }
            }
            _ => scheduler.reset(&mut channels, &mut grid),
        }

        if !scheduler.is_active() {
            assert_eq!(grid.playing_week(), None);
            assert!((0..7).all(|day| !channels.is_sounding(day)));
        }
        if let (Some(cursor), Some(total)) = (scheduler.cursor(), scheduler.week_count()) {
            assert!(cursor <= total && total <= 52);
        }
    }
});

use crate::audio::ToneChannels;
use crate::fetch::{FetchDispatcher, FetchError, FetchEvent, FetchOutcome, FetchRequest};
use crate::grid::ActivityGrid;
use crate::model::{AttemptId, FetchAttempt, FetchStatus, Settings};
use crate::normalize::normalize;
use crate::query::{Location, QueryStateStore, ShareState};
use crate::scheduler::{PlaybackScheduler, TickOutcome};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const INVALID_INPUT_MESSAGE: &str = "Make sure you have both user and repository filled in.";
pub const NOT_FOUND_MESSAGE: &str = "It seems like the user or repository doesn't exist :(";
pub const SERVER_ERROR_MESSAGE: &str = "Woops! There are some issues with GitHub's API";
pub const RATE_LIMITED_MESSAGE: &str = "We went over the query limit :( GitHub allows a maximum of 60 requests per hour. Try again later.";
pub const UNKNOWN_MESSAGE: &str = "Something went wrong with the request :(";

/// User-facing text for a terminal failure. `Pending` and `Ready` have none.
pub fn failure_message(status: FetchStatus) -> Option<&'static str> {
    match status {
        FetchStatus::Pending | FetchStatus::Ready => None,
        FetchStatus::NotFound => Some(NOT_FOUND_MESSAGE),
        FetchStatus::RateLimited => Some(RATE_LIMITED_MESSAGE),
        FetchStatus::ServerError => Some(SERVER_ERROR_MESSAGE),
        FetchStatus::Unknown => Some(UNKNOWN_MESSAGE),
    }
}

/// The play/stop button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Shows "play" and accepts presses.
    Idle,
    /// Disabled while an attempt or a retry is outstanding.
    Busy,
    /// Shows "stop".
    Playing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchState {
    Idle,
    InFlight {
        attempt: AttemptId,
        request: FetchRequest,
    },
    RetryScheduled {
        request: FetchRequest,
        due: Instant,
    },
}

pub struct SessionController<C, G, D> {
    channels: C,
    grid: G,
    dispatcher: D,
    scheduler: PlaybackScheduler,
    query: QueryStateStore,
    control: ControlState,
    error: Option<String>,
    fetch: FetchState,
    attempt: Option<FetchAttempt>,
    next_attempt: u64,
    retry_delay: Duration,
    retries: u32,
}

impl<C, G, D> SessionController<C, G, D>
where
    C: ToneChannels,
    G: ActivityGrid,
    D: FetchDispatcher,
{
    pub fn new(
        channels: C,
        grid: G,
        dispatcher: D,
        scheduler: PlaybackScheduler,
        query: QueryStateStore,
        retry_delay: Duration,
    ) -> Self {
        Self {
            channels,
            grid,
            dispatcher,
            scheduler,
            query,
            control: ControlState::Idle,
            error: None,
            fetch: FetchState::Idle,
            attempt: None,
            next_attempt: 0,
            retry_delay,
            retries: 0,
        }
    }

    pub fn from_settings(
        channels: C,
        grid: G,
        dispatcher: D,
        location: Location,
        settings: &Settings,
    ) -> Self {
        let scheduler = PlaybackScheduler::new(settings.tick_interval())
            .with_final_week_audio(settings.final_week_audio)
            .with_background(settings.background_accompaniment);
        Self::new(
            channels,
            grid,
            dispatcher,
            scheduler,
            QueryStateStore::new(location),
            settings.retry_delay(),
        )
    }

    pub fn control_state(&self) -> ControlState {
        self.control
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn channels(&self) -> &C {
        &self.channels
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn location(&self) -> &Location {
        self.query.location()
    }

    pub fn current_attempt(&self) -> Option<&FetchAttempt> {
        self.attempt.as_ref()
    }

    /// Pending responses seen since the last `play`.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch != FetchState::Idle
    }

    /// Reads the link once. When it names both a user and a repository,
    /// playback starts and the pair is returned so the inputs can be filled.
    pub fn initialize(&mut self) -> Option<ShareState> {
        let state = self.query.read()?;
        info!(user = %state.user, repository = %state.repository, "starting from shared link");
        if let Err(err) = self.play(&state.user, &state.repository) {
            debug!(%err, "shared link did not start playback");
        }
        Some(state)
    }

    /// The play/stop button press.
    pub fn toggle(&mut self, user: &str, repository: &str) {
        self.error = None;
        match self.control {
            ControlState::Busy => debug!("control is disabled while fetching"),
            ControlState::Playing => self.stop(),
            ControlState::Idle => {
                if let Err(err) = self.play(user, repository) {
                    debug!(%err, "play rejected");
                }
            }
        }
    }

    pub fn play(&mut self, user: &str, repository: &str) -> Result<AttemptId, FetchError> {
        let request = match FetchRequest::new(user, repository) {
            Ok(request) => request,
            Err(err) => {
                self.error = Some(INVALID_INPUT_MESSAGE.to_string());
                return Err(err);
            }
        };

        if self.scheduler.is_active() {
            self.scheduler.reset(&mut self.channels, &mut self.grid);
            self.query.clear();
        }
        debug!(
            user = request.user(),
            repository = request.repository(),
            "fetching commit activity"
        );
        self.retries = 0;
        self.control = ControlState::Busy;
        Ok(self.dispatch(request))
    }

    /// Valid in any state. Drops any outstanding attempt or retry so a late
    /// completion cannot restart playback.
    pub fn stop(&mut self) {
        if self.is_fetching() {
            debug!("abandoning outstanding fetch");
        }
        self.fetch = FetchState::Idle;
        self.attempt = None;
        self.scheduler.reset(&mut self.channels, &mut self.grid);
        self.query.clear();
        self.control = ControlState::Idle;
    }

    /// Drains fetch completions, fires a due retry and runs a due tick.
    /// Returns whether anything visible changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Some(event) = self.dispatcher.try_recv() {
            changed |= self.handle_fetch_event(event, now);
        }

        let retry_due = matches!(
            &self.fetch,
            FetchState::RetryScheduled { due, .. } if now >= *due
        );
        if retry_due
            && let FetchState::RetryScheduled { request, .. } =
                std::mem::replace(&mut self.fetch, FetchState::Idle)
        {
            self.dispatch(request);
        }

        if let Some(outcome) = self.scheduler.poll(now, &mut self.channels, &mut self.grid) {
            changed = true;
            if outcome == TickOutcome::Finished {
                self.control = ControlState::Idle;
            }
        }
        changed
    }

    /// The earliest instant at which `poll` has timer work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let retry = match &self.fetch {
            FetchState::RetryScheduled { due, .. } => Some(*due),
            _ => None,
        };
        match (retry, self.scheduler.next_deadline()) {
            (Some(retry), Some(tick)) => Some(retry.min(tick)),
            (retry, tick) => retry.or(tick),
        }
    }

    fn dispatch(&mut self, request: FetchRequest) -> AttemptId {
        self.next_attempt += 1;
        let id = AttemptId(self.next_attempt);
        self.attempt = Some(FetchAttempt {
            id,
            user: request.user().to_string(),
            repository: request.repository().to_string(),
            status: FetchStatus::Pending,
        });
        self.fetch = FetchState::InFlight {
            attempt: id,
            request: request.clone(),
        };
        self.dispatcher.dispatch(id, request);
        id
    }

    fn handle_fetch_event(&mut self, event: FetchEvent, now: Instant) -> bool {
        let live = matches!(
            &self.fetch,
            FetchState::InFlight { attempt, .. } if *attempt == event.attempt
        );
        if !live {
            debug!(attempt = ?event.attempt, "dropping completion for a superseded attempt");
            return false;
        }
        let FetchState::InFlight { request, .. } =
            std::mem::replace(&mut self.fetch, FetchState::Idle)
        else {
            return false;
        };

        let status = event.outcome.status();
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.status = status;
        }

        match event.outcome {
            FetchOutcome::Pending => {
                self.retries += 1;
                debug!(retries = self.retries, "statistics still computing, retrying");
                self.fetch = FetchState::RetryScheduled {
                    request,
                    due: now + self.retry_delay,
                };
            }
            FetchOutcome::Ready(activity) => {
                let activity = normalize(activity);
                info!(
                    user = request.user(),
                    repository = request.repository(),
                    weeks = activity.len(),
                    "commit activity ready"
                );
                self.query.write(request.user(), request.repository());
                self.scheduler
                    .start(activity, now, &mut self.channels, &mut self.grid);
                self.control = ControlState::Playing;
            }
            _ => {
                warn!(
                    ?status,
                    user = request.user(),
                    repository = request.repository(),
                    "commit activity unavailable"
                );
                self.error = failure_message(status).map(ToOwned::to_owned);
                self.control = ControlState::Idle;
            }
        }
        true
    }
}

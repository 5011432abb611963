use crate::model::{AttemptId, FetchStatus, WeekActivity};
use crate::query::encode_component;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("tonalhub/", env!("CARGO_PKG_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("user and repository must both be filled in")]
    InvalidInput,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode commit activity: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A validated user/repository pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    user: String,
    repository: String,
}

impl FetchRequest {
    pub fn new(user: &str, repository: &str) -> Result<Self, FetchError> {
        let user = user.trim();
        let repository = repository.trim();
        if user.is_empty() || repository.is_empty() {
            return Err(FetchError::InvalidInput);
        }
        Ok(Self {
            user: user.to_string(),
            repository: repository.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// One GET, any status. Only failures to get a response at all are errors.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let request = self
            .agent
            .get(url)
            .set("Accept", GITHUB_ACCEPT)
            .set("User-Agent", USER_AGENT);

        match request.call() {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|err| FetchError::Transport(format!("response read failed: {err}")))?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpResponse {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(err)) => Err(FetchError::Transport(err.to_string())),
        }
    }
}

/// Classified result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Ready(WeekActivity),
    /// Upstream is still computing the statistics.
    Pending,
    NotFound,
    RateLimited,
    ServerError,
    /// Any other status, an undecodable body, or no response at all.
    Unknown { status: Option<u16> },
}

impl FetchOutcome {
    pub fn status(&self) -> FetchStatus {
        match self {
            Self::Ready(_) => FetchStatus::Ready,
            Self::Pending => FetchStatus::Pending,
            Self::NotFound => FetchStatus::NotFound,
            Self::RateLimited => FetchStatus::RateLimited,
            Self::ServerError => FetchStatus::ServerError,
            Self::Unknown { .. } => FetchStatus::Unknown,
        }
    }
}

pub fn classify(response: &HttpResponse) -> FetchOutcome {
    match response.status {
        200 => match serde_json::from_str::<WeekActivity>(&response.body) {
            Ok(activity) => FetchOutcome::Ready(activity),
            Err(err) => {
                warn!(error = %FetchError::from(err), "commit activity body rejected");
                FetchOutcome::Unknown { status: Some(200) }
            }
        },
        202 => FetchOutcome::Pending,
        403 => FetchOutcome::RateLimited,
        404 => FetchOutcome::NotFound,
        500 => FetchOutcome::ServerError,
        other => FetchOutcome::Unknown {
            status: Some(other),
        },
    }
}

pub struct ActivityFetcher<T> {
    transport: T,
    api_base: String,
}

impl<T: Transport> ActivityFetcher<T> {
    pub fn new(transport: T, api_base: &str) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Each identifier is one escaped path segment, so `/`, `?` or `#` in
    /// input cannot reach another endpoint.
    pub fn endpoint(&self, request: &FetchRequest) -> String {
        format!(
            "{}/repos/{}/{}/stats/commit_activity",
            self.api_base,
            encode_component(&request.user),
            encode_component(&request.repository)
        )
    }

    /// One blocking attempt.
    pub fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let url = self.endpoint(request);
        match self.transport.get(&url) {
            Ok(response) => {
                debug!(%url, status = response.status, "commit activity response");
                classify(&response)
            }
            Err(err) => {
                warn!(%url, error = %err, "commit activity request failed");
                FetchOutcome::Unknown { status: None }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEvent {
    pub attempt: AttemptId,
    pub outcome: FetchOutcome,
}

/// Starts attempts and hands back their completions without blocking.
pub trait FetchDispatcher {
    fn dispatch(&mut self, attempt: AttemptId, request: FetchRequest);
    fn try_recv(&mut self) -> Option<FetchEvent>;
}

/// Runs each attempt on its own thread and posts the outcome on a channel.
pub struct FetchWorker<T> {
    fetcher: Arc<ActivityFetcher<T>>,
    event_tx: Sender<FetchEvent>,
    event_rx: Receiver<FetchEvent>,
}

impl<T: Transport + 'static> FetchWorker<T> {
    pub fn new(fetcher: ActivityFetcher<T>) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            fetcher: Arc::new(fetcher),
            event_tx,
            event_rx,
        }
    }
}

impl<T: Transport + 'static> FetchDispatcher for FetchWorker<T> {
    fn dispatch(&mut self, attempt: AttemptId, request: FetchRequest) {
        let fetcher = Arc::clone(&self.fetcher);
        let event_tx = self.event_tx.clone();
        thread::spawn(move || {
            let outcome = fetcher.fetch(&request);
            let _ = event_tx.send(FetchEvent { attempt, outcome });
        });
    }

    fn try_recv(&mut self) -> Option<FetchEvent> {
        self.event_rx.try_recv().ok()
    }
}

use crate::audio::{NullToneBank, ToneBank, ToneChannels};
use crate::fetch::{ActivityFetcher, FetchWorker, UreqTransport};
use crate::grid::GridView;
use crate::model::Settings;
use crate::query::{Location, QueryStateStore, REPOSITORY_PARAM, USER_PARAM};
use crate::session::SessionController;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const INPUT_POLL: Duration = Duration::from_millis(33);
const REDRAW_EVERY: Duration = Duration::from_millis(250);

pub struct AppStartupOptions {
    pub settings: Settings,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Field {
    #[default]
    User,
    Repository,
}

#[derive(Debug, Clone, Default)]
pub struct InputForm {
    pub user: String,
    pub repository: String,
    pub focus: Field,
}

impl InputForm {
    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            Field::User => &mut self.user,
            Field::Repository => &mut self.repository,
        }
    }

    fn switch_focus(&mut self) {
        self.focus = match self.focus {
            Field::User => Field::Repository,
            Field::Repository => Field::User,
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    None,
    Toggle,
    Stop,
    Quit,
}

/// Link the session starts from: `--link` wins, otherwise the configured base.
/// Explicit user/repository values are written on top.
pub fn startup_location(
    link: Option<&str>,
    user: Option<&str>,
    repository: Option<&str>,
    settings: &Settings,
) -> Location {
    let mut location = Location::new(link.unwrap_or(&settings.share_base_url));
    match (user, repository) {
        (Some(user), Some(repository)) => {
            let mut store = QueryStateStore::new(location);
            store.write(user, repository);
            location = store.location().clone();
        }
        (Some(user), None) => location = location.with_param(USER_PARAM, Some(user)),
        (None, Some(repository)) => {
            location = location.with_param(REPOSITORY_PARAM, Some(repository));
        }
        (None, None) => {}
    }
    location
}

pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let settings = options.settings;

    let channels: Box<dyn ToneChannels> =
        match ToneBank::new(settings.tone_sustain(), settings.volume) {
            Ok(bank) => Box::new(bank),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "audio output unavailable, playing silently");
                Box::new(NullToneBank::new())
            }
        };
    let fetcher = ActivityFetcher::new(
        UreqTransport::new(settings.request_timeout()),
        &settings.api_base_url,
    );
    let mut controller = SessionController::from_settings(
        channels,
        GridView::new(),
        FetchWorker::new(fetcher),
        options.location,
        &settings,
    );

    let mut form = InputForm::default();
    if let Some(shared) = controller.initialize() {
        form.user = shared.user;
        form.repository = shared.repository;
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut dirty = true;
    let mut last_draw = Instant::now();

    let result: Result<()> = loop {
        if controller.poll(Instant::now()) {
            dirty = true;
        }

        if dirty || last_draw.elapsed() > REDRAW_EVERY {
            terminal.draw(|frame| crate::ui::draw(frame, &controller, &form))?;
            dirty = false;
            last_draw = Instant::now();
        }

        let timeout = poll_timeout(controller.next_deadline(), Instant::now());
        if !event::poll(timeout)? {
            continue;
        }

        let key = match event::read()? {
            Event::Key(key) => key,
            Event::Resize(_, _) => {
                dirty = true;
                continue;
            }
            _ => continue,
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match handle_key(&mut form, key) {
            KeyAction::Quit => break Ok(()),
            KeyAction::Toggle => controller.toggle(&form.user, &form.repository),
            KeyAction::Stop => controller.stop(),
            KeyAction::None => {}
        }
        dirty = true;
    };

    controller.stop();
    info!("shutting down");

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn handle_key(form: &mut InputForm, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Enter => KeyAction::Toggle,
        KeyCode::Esc => KeyAction::Stop,
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            form.switch_focus();
            KeyAction::None
        }
        KeyCode::Backspace => {
            form.focused_mut().pop();
            KeyAction::None
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            form.focused_mut().push(ch);
            KeyAction::None
        }
        _ => KeyAction::None,
    }
}

/// Input wait, shortened so a tick or retry deadline is not overslept.
fn poll_timeout(deadline: Option<Instant>, now: Instant) -> Duration {
    deadline
        .map(|deadline| deadline.saturating_duration_since(now))
        .map_or(INPUT_POLL, |until| until.min(INPUT_POLL))
}

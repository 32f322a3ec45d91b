use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{App, Notification, ParametersResult, ProgressEvent, ProgressSink, RetrieveResult};
use crate::busy::BusyState;
use crate::domain::{ApiKey, ConfigDocument};
use crate::error::OniError;
use crate::provider::ProviderRegistry;
use crate::store::{Store, StoreSummary};
use crate::tabulator::Tabulator;

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;
const NOTIFICATIONS_MAX: usize = 20;
const SPINNER: &[&str] = &["|", "/", "-", "\\"];
const API_KEY_PLACEHOLDER: &str = "af6391e0-f873-11ee-8355-bae397411a92";
const COLLECTION_PLACEHOLDER: &str = "arcp://name,doi10.26180%2F23961609";
const KEY_HINTS: &str = "F5 Retrieve collection  F6 Get parameters  Tab focus  F4 logs  F1 help  Esc quit";

type Backend = CrosstermBackend<io::Stdout>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Form,
    Logs,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Provider,
    CustomProvider,
    ApiKey,
    CollectionId,
    Config,
}

impl Field {
    const ORDER: [Field; 5] = [
        Field::Provider,
        Field::CustomProvider,
        Field::ApiKey,
        Field::CollectionId,
        Field::Config,
    ];

    fn index(self) -> usize {
        Self::ORDER
            .iter()
            .position(|field| *field == self)
            .unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    fn previous(self) -> Self {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }

    fn label(self) -> &'static str {
        match self {
            Field::Provider => "Provider",
            Field::CustomProvider => "Add custom provider",
            Field::ApiKey => "API Key",
            Field::CollectionId => "Collection ID",
            Field::Config => "Configuration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Infer,
    Build,
    Export,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Infer => "Infer",
            Phase::Build => "Build",
            Phase::Export => "Export",
        }
    }
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Option<Phase>,
    latency_ms: Option<u128>,
    store_summary: StoreSummary,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    notifications: VecDeque<Notification>,
}

impl AppState {
    fn new(store_summary: StoreSummary) -> Self {
        Self {
            status: "ready".to_string(),
            phase: None,
            latency_ms: None,
            store_summary,
            events: VecDeque::new(),
            logs: VecDeque::new(),
            notifications: VecDeque::new(),
        }
    }
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some(elapsed) = event.elapsed {
                state.latency_ms = Some(elapsed.as_millis());
                state.status = "done".to_string();
            } else if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = Some(phase);
                state.status = payload.to_string();
            } else {
                state.status = message.clone();
            }
            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            push_bounded(
                &mut state.logs,
                format!("[{}] {message}", timestamp()),
                LOGS_MAX,
            );
        }
    }

    fn notify(&self, notification: Notification) {
        if let Ok(mut state) = self.state.lock() {
            push_notification(&mut state, notification);
        }
    }
}

enum Outcome {
    Retrieved(Result<RetrieveResult, OniError>),
    Parameters(Result<ParametersResult, OniError>),
}

/// Interactive form over [`App`]: provider, API key, collection and an
/// editable configuration document.
pub struct Tui {
    state: Arc<Mutex<AppState>>,
    busy: BusyState,
    store: Store,
    providers: ProviderRegistry,
    custom_provider: String,
    api_key: String,
    collection_id: String,
    config_text: String,
    focus: Field,
    view: View,
    log_scroll: u16,
    pending: Option<Receiver<Outcome>>,
}

impl Tui {
    pub fn new<T: Tabulator>(app: &App<T>, api_key: Option<&ApiKey>) -> Self {
        let document = app.document();
        Self {
            state: Arc::new(Mutex::new(AppState::new(app.store().summary()))),
            busy: app.busy().clone(),
            store: app.store().clone(),
            providers: app.providers().clone(),
            custom_provider: String::new(),
            api_key: api_key
                .map(|key| key.expose().to_string())
                .unwrap_or_default(),
            collection_id: String::new(),
            config_text: if document.is_empty() {
                String::new()
            } else {
                document.to_pretty_string()
            },
            focus: Field::CollectionId,
            view: View::Form,
            log_scroll: 0,
            pending: None,
        }
    }

    pub fn run<T: Tabulator + 'static>(&mut self, app: App<T>) -> miette::Result<()> {
        let app = Arc::new(Mutex::new(app));

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let result = self.event_loop(&mut terminal, &app);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop<T: Tabulator + 'static>(
        &mut self,
        terminal: &mut Terminal<Backend>,
        app: &Arc<Mutex<App<T>>>,
    ) -> miette::Result<()> {
        let mut tick = 0usize;
        loop {
            self.collect_outcome();
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key, app) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }
        Ok(())
    }

    fn is_working(&self) -> bool {
        self.pending.is_some() || self.busy.is_busy()
    }

    fn notify(&self, notification: Notification) {
        if let Ok(mut state) = self.state.lock() {
            push_notification(&mut state, notification);
        }
    }

    fn handle_key<T: Tabulator + 'static>(
        &mut self,
        key: KeyEvent,
        app: &Arc<Mutex<App<T>>>,
    ) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let quit_requested = matches!(key.code, KeyCode::Esc)
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL));
        if quit_requested {
            if self.view != View::Form {
                self.view = View::Form;
                return false;
            }
            if self.is_working() {
                self.notify(Notification::Info(format!(
                    "wait for \"{}\" to finish",
                    self.busy.label()
                )));
                return false;
            }
            return true;
        }

        match key.code {
            KeyCode::F(1) => self.toggle_view(View::Help),
            KeyCode::F(4) => self.toggle_view(View::Logs),
            KeyCode::F(5) => self.start_retrieve(app),
            KeyCode::F(6) => self.start_parameters(app),
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::BackTab => self.focus = self.focus.previous(),
            KeyCode::PageUp => self.scroll_logs(5),
            KeyCode::PageDown => self.scroll_logs(-5),
            _ => self.edit_field(key),
        }
        false
    }

    fn toggle_view(&mut self, view: View) {
        self.view = if self.view == view { View::Form } else { view };
    }

    fn edit_field(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return;
        }
        match self.focus {
            Field::Provider => match key.code {
                KeyCode::Left => self.providers.select_previous(),
                KeyCode::Right | KeyCode::Char(' ') => self.providers.select_next(),
                _ => {}
            },
            Field::CustomProvider => match key.code {
                KeyCode::Enter => self.add_custom_provider(),
                KeyCode::Backspace => {
                    self.custom_provider.pop();
                }
                KeyCode::Char(ch) => self.custom_provider.push(ch),
                _ => {}
            },
            Field::ApiKey => edit_line(&mut self.api_key, key.code),
            Field::CollectionId => match key.code {
                KeyCode::Enter => self.focus = Field::Config,
                code => edit_line(&mut self.collection_id, code),
            },
            Field::Config => match key.code {
                KeyCode::Enter => self.config_text.push('\n'),
                KeyCode::Backspace => {
                    self.config_text.pop();
                }
                KeyCode::Char(ch) => self.config_text.push(ch),
                _ => {}
            },
        }
    }

    fn add_custom_provider(&mut self) {
        let provider = std::mem::take(&mut self.custom_provider);
        if self.providers.add(&provider) {
            self.notify(Notification::Info(format!("added provider {provider}")));
        }
    }

    fn start_retrieve<T: Tabulator + 'static>(&mut self, app: &Arc<Mutex<App<T>>>) {
        let collection_id = self.collection_id.clone();
        let api_key = ApiKey::new(self.api_key.clone());
        self.spawn(app, move |app, sink| {
            Outcome::Retrieved(app.retrieve_collection(&collection_id, api_key.as_ref(), sink))
        });
    }

    fn start_parameters<T: Tabulator + 'static>(&mut self, app: &Arc<Mutex<App<T>>>) {
        let document = match self.config_text.parse::<ConfigDocument>() {
            Ok(document) => document,
            Err(err) => {
                self.notify(Notification::Error(err.to_string()));
                return;
            }
        };
        let collection_id = self.collection_id.clone();
        let api_key = ApiKey::new(self.api_key.clone());
        self.spawn(app, move |app, sink| {
            app.edit_document(document.clone());
            Outcome::Parameters(app.get_table_parameters(
                &collection_id,
                api_key.as_ref(),
                document,
                sink,
            ))
        });
    }

    fn spawn<T, F>(&mut self, app: &Arc<Mutex<App<T>>>, job: F)
    where
        T: Tabulator + 'static,
        F: FnOnce(&mut App<T>, &TuiProgress) -> Outcome + Send + 'static,
    {
        if self.is_working() {
            self.notify(Notification::Info(format!(
                "busy: {}",
                self.busy.label()
            )));
            return;
        }
        let providers = self.providers.clone();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let app = app.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut app = app.lock().unwrap_or_else(PoisonError::into_inner);
            *app.providers_mut() = providers;
            let _ = tx.send(job(&mut app, &sink));
        });
        self.pending = Some(rx);
    }

    fn collect_outcome(&mut self) {
        let Some(rx) = &self.pending else {
            return;
        };
        match rx.try_recv() {
            Ok(outcome) => {
                self.pending = None;
                self.apply_outcome(outcome);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                self.notify(Notification::Error(
                    "operation stopped unexpectedly".to_string(),
                ));
            }
        }
    }

    fn apply_outcome(&mut self, outcome: Outcome) {
        refresh_store_summary(&self.state, &self.store);
        match outcome {
            Outcome::Retrieved(Ok(result)) => {
                // A failed conversion keeps whatever the user typed.
                if result.error.is_none() {
                    self.config_text = result.document.to_pretty_string();
                    self.notify(Notification::Info(format!(
                        "retrieved {} ({} tables)",
                        result.collection_id,
                        result.tables.len()
                    )));
                }
            }
            Outcome::Parameters(Ok(result)) => {
                self.config_text = result.document.to_pretty_string();
                self.notify(Notification::Info(format!(
                    "built {} table(s) for {}",
                    result.built_tables.len(),
                    result.collection_id
                )));
            }
            Outcome::Retrieved(Err(err)) | Outcome::Parameters(Err(err)) => {
                self.notify(Notification::Error(err.to_string()));
            }
        }
    }

    fn scroll_logs(&mut self, delta: i16) {
        let max = self.state.lock().map(|state| state.logs.len()).unwrap_or(0);
        let max_scroll = max.saturating_sub(1) as i16;
        let next = (self.log_scroll as i16 + delta).clamp(0, max_scroll);
        self.log_scroll = next as u16;
    }
}

fn edit_line(value: &mut String, code: KeyCode) {
    match code {
        KeyCode::Backspace => {
            value.pop();
        }
        KeyCode::Char(ch) => value.push(ch),
        _ => {}
    }
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    match tui.view {
        View::Form => draw_form_view(frame, tui, state, tick),
        View::Logs => draw_logs(frame, tui, state, tick),
        View::Help => draw_help(frame),
    }
}

fn draw_form_view(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(8),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, state, tick), chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[1]);
    frame.render_widget(draw_form_panel(tui, state, tick), body[0]);
    draw_config_editor(frame, tui, tick, body[1]);

    frame.render_widget(draw_notifications(state), chunks[2]);
}

fn draw_logs(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8)])
        .split(frame.area());

    frame.render_widget(draw_header(tui, state, tick), chunks[0]);
    frame.render_widget(
        draw_logs_view(state, tui.log_scroll, chunks[1].height),
        chunks[1],
    );
}

fn draw_help(frame: &mut ratatui::Frame) {
    let block = Block::default().borders(Borders::ALL).title("Help");
    let lines = vec![
        Line::from("F5 Retrieve collection: fetch, convert and infer a configuration"),
        Line::from("F6 Get parameters: load the edited configuration and build its tables"),
        Line::from("Tab / Shift-Tab move between fields"),
        Line::from("Provider: Left/Right to choose; Add custom provider: type a URL, Enter"),
        Line::from("Configuration: leave empty to infer from scratch"),
        Line::from("F4 logs (PgUp/PgDown to scroll)   Esc back / quit"),
    ];
    let view = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(view, frame.area());
}

fn draw_header(tui: &Tui, state: &AppState, tick: usize) -> Paragraph<'static> {
    let busy = tui.busy.snapshot();
    let activity = if busy.busy {
        Span::styled(
            format!("{} {}", SPINNER[tick % SPINNER.len()], busy.label),
            Style::default().fg(Color::Yellow),
        )
    } else {
        Span::styled("idle", Style::default().fg(Color::Green))
    };
    let title = Line::from(vec![
        Span::styled(
            "ONI-TAB",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Provider: "),
        Span::styled(
            tui.providers.selected().to_string(),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("   "),
        activity,
    ]);
    let summary = &state.store_summary;
    let store_line = Line::from(Span::styled(
        format!(
            "Data: {} · {} databases · {}",
            tui.store.data_dir(),
            summary.databases,
            bytes_to_human(summary.bytes)
        ),
        Style::default().fg(Color::Gray),
    ));
    Paragraph::new(vec![title, store_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_form_panel(tui: &Tui, state: &AppState, tick: usize) -> Paragraph<'static> {
    let cursor = if tick % 8 < 4 { "_" } else { " " };
    let mut lines = Vec::new();
    for field in Field::ORDER {
        if field == Field::Config {
            continue;
        }
        let focused = tui.focus == field;
        let marker = if focused { "> " } else { "  " };
        let label_style = if focused {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        lines.push(Line::from(vec![
            Span::styled(marker, label_style),
            Span::styled(field.label(), label_style),
        ]));

        let value = match field {
            Field::Provider => Span::raw(format!(
                "< {} >  ({}/{})",
                tui.providers.selected(),
                tui.providers.selected_index() + 1,
                tui.providers.len()
            )),
            Field::CustomProvider => text_value(&tui.custom_provider, "https://", focused, cursor),
            Field::ApiKey => {
                let masked = "*".repeat(tui.api_key.chars().count());
                text_value(&masked, API_KEY_PLACEHOLDER, focused, cursor)
            }
            Field::CollectionId => {
                text_value(&tui.collection_id, COLLECTION_PLACEHOLDER, focused, cursor)
            }
            Field::Config => Span::raw(""),
        };
        lines.push(Line::from(vec![Span::raw("    "), value]));
        lines.push(Line::from(""));
    }

    let phase = state.phase.map(Phase::label).unwrap_or("--");
    let latency = state
        .latency_ms
        .map(|value| format!("{value} ms"))
        .unwrap_or_else(|| "--".to_string());
    lines.push(Line::from(vec![
        Span::styled("Phase: ", Style::default().fg(Color::Gray)),
        Span::styled(phase, Style::default().fg(Color::Cyan)),
        Span::styled("   Last run: ", Style::default().fg(Color::Gray)),
        Span::raw(latency),
    ]));
    lines.push(Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Gray)),
        Span::raw(state.status.clone()),
    ]));
    for event in state.events.iter().rev().take(3) {
        lines.push(Line::from(Span::styled(
            format!("- {event}"),
            Style::default().fg(Color::DarkGray),
        )));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: false })
}

fn text_value(value: &str, placeholder: &str, focused: bool, cursor: &str) -> Span<'static> {
    if value.is_empty() && !focused {
        return Span::styled(placeholder.to_string(), Style::default().fg(Color::DarkGray));
    }
    let shown = if focused {
        format!("{value}{cursor}")
    } else {
        value.to_string()
    };
    Span::styled(shown, Style::default().fg(Color::White))
}

fn draw_config_editor(frame: &mut ratatui::Frame, tui: &Tui, tick: usize, area: Rect) {
    let focused = tui.focus == Field::Config;
    let border = if focused { Color::Cyan } else { Color::DarkGray };
    let mut text = tui.config_text.clone();
    if focused && tick % 8 < 4 {
        text.push('_');
    }
    let mut lines: Vec<Line> = text.split('\n').map(|line| Line::from(line.to_string())).collect();
    if tui.config_text.is_empty() && !focused {
        lines = vec![Line::from(Span::styled(
            "(empty: F6 infers a configuration)",
            Style::default().fg(Color::DarkGray),
        ))];
    }
    let inner_height = area.height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(inner_height) as u16;
    let editor = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title("Configuration (JSON)"),
        )
        .scroll((scroll, 0));
    frame.render_widget(editor, area);
}

fn draw_notifications(state: &AppState) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        KEY_HINTS,
        Style::default().fg(Color::DarkGray),
    ))];
    for notification in state.notifications.iter().rev().take(5) {
        let (label, color) = match notification {
            Notification::Info(_) => ("info ", Color::Green),
            Notification::Error(_) => ("error", Color::Red),
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{label} "), Style::default().fg(color)),
            Span::raw(notification.message().to_string()),
        ]));
    }
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::TOP).title("Notifications"))
        .wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &AppState, scroll: u16, height: u16) -> Paragraph<'static> {
    let total = state.logs.len();
    let visible = height.saturating_sub(1).max(1) as usize;
    let start = total.saturating_sub(scroll as usize + visible);
    let mut lines = Vec::with_capacity(visible + 1);
    lines.push(Line::from(Span::styled(
        "LOGS (scrollable)",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));
    for line in state.logs.iter().skip(start).take(visible) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines)
        .block(Block::default())
        .wrap(Wrap { trim: true })
}

fn push_notification(state: &mut AppState, notification: Notification) {
    let level = match &notification {
        Notification::Info(_) => "info",
        Notification::Error(_) => "error",
    };
    push_bounded(
        &mut state.logs,
        format!("[{}] {level}: {}", timestamp(), notification.message()),
        LOGS_MAX,
    );
    push_bounded(&mut state.notifications, notification, NOTIFICATIONS_MAX);
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = match name {
        "Resolve" => Phase::Resolve,
        "Fetch" => Phase::Fetch,
        "Infer" => Phase::Infer,
        "Build" => Phase::Build,
        "Export" => Phase::Export,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn refresh_store_summary(state: &Mutex<AppState>, store: &Store) {
    let summary = store.summary();
    if let Ok(mut state) = state.lock() {
        state.store_summary = summary;
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    let mins = (secs / 60) % 60;
    let hours = (secs / 3600) % 24;
    let seconds = secs % 60;
    format!("{hours:02}:{mins:02}:{seconds:02}")
}

fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

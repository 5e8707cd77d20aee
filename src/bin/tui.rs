//! Gate TUI - live operator dashboard
//!
//! One row per gate, driven by the gate pollers:
//! - Status badges for the leg the gate watches
//! - Plate, tag and dispatch of the latest transaction
//! - Auto-refresh state with the countdown to the next fetch
//! - Attention marker while the transaction is not yet successful
//!
//! Keys: ↑/↓ select, space toggle gate, `a` toggle all, `r` refresh selected, `q` quit.

use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gate_dashboard::domain::display::{format_display_time, or_missing, picture_url};
use gate_dashboard::domain::status::{badge_class, description, translate, Badge};
use gate_dashboard::domain::{Side, Status, Transaction};
use gate_dashboard::infra::{Config, Metrics, SessionContext};
use gate_dashboard::io::{GateApi, HttpGateApi};
use gate_dashboard::services::{CoordinatorOptions, GateDashboardCoordinator, GateSnapshot, PollerState};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Gate TUI - live gate transactions
#[derive(Parser, Debug)]
#[command(name = "gate-tui", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Write logs here; the terminal belongs to the dashboard
    #[arg(long)]
    log_file: Option<String>,
}

/// UI-only state; gate data lives in the pollers
struct DashboardState {
    selected: usize,
    /// Last operator feedback line
    notice: Option<(String, Instant)>,
    base_url: String,
    utc_offset_hours: i32,
}

impl DashboardState {
    fn new(config: &Config) -> Self {
        Self {
            selected: 0,
            notice: None,
            base_url: config.api_base_url().to_string(),
            utc_offset_hours: config.utc_offset_hours(),
        }
    }

    fn notify(&mut self, text: impl Into<String>) {
        self.notice = Some((text.into(), Instant::now()));
    }

    fn select_next(&mut self, gates: usize) {
        if gates > 0 {
            self.selected = (self.selected + 1) % gates;
        }
    }

    fn select_prev(&mut self, gates: usize) {
        if gates > 0 {
            self.selected = (self.selected + gates - 1) % gates;
        }
    }
}

const NOTICE_TTL: Duration = Duration::from_secs(4);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(UtcTime::rfc_3339())
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };

    let session = Arc::new(SessionContext::new());
    if let Some(token) = config.resolve_token()? {
        session.set_token(token);
    }
    let api: Arc<dyn GateApi> = Arc::new(HttpGateApi::from_config(&config, session)?);

    // Load before taking over the terminal so failures print normally
    let mut coordinator = GateDashboardCoordinator::load(
        api,
        Arc::new(Metrics::new()),
        CoordinatorOptions::from(&config),
    )
    .await?;
    coordinator.start();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = DashboardState::new(&config);
    let result = run_ui(&mut terminal, &mut coordinator, &mut state).await;

    coordinator.dispose();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    coordinator: &mut GateDashboardCoordinator,
    state: &mut DashboardState,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        let snapshots: Vec<GateSnapshot> = coordinator.pollers().map(|p| p.snapshot()).collect();
        if state.selected >= snapshots.len() {
            state.selected = snapshots.len().saturating_sub(1);
        }
        if state.notice.as_ref().is_some_and(|(_, at)| at.elapsed() >= NOTICE_TTL) {
            state.notice = None;
        }
        let sides: Vec<Side> = coordinator.pollers().map(|p| p.side()).collect();
        terminal.draw(|f| draw_ui(f, state, coordinator.refresh_all(), &snapshots, &sides))?;

        // Keep the runtime free for poller tasks between frames
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        let pending = tokio::task::block_in_place(|| event::poll(timeout))?;
        if pending {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let selected = snapshots.get(state.selected).map(|s| s.lane_name.clone());
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Down | KeyCode::Char('j') => state.select_next(snapshots.len()),
                        KeyCode::Up | KeyCode::Char('k') => state.select_prev(snapshots.len()),
                        KeyCode::Char(' ') => {
                            if let Some(name) = selected {
                                if let Some(enabled) = coordinator.toggle_gate(&name) {
                                    let word = if enabled { "on" } else { "off" };
                                    state.notify(format!("{name}: auto refresh {word}"));
                                }
                            }
                        }
                        KeyCode::Char('a') => {
                            let enabled = coordinator.toggle_all();
                            let word = if enabled { "on" } else { "off" };
                            state.notify(format!("All gates: auto refresh {word}"));
                        }
                        KeyCode::Char('r') => {
                            if let Some(name) = selected {
                                if coordinator.request_refresh(&name) {
                                    state.notify(format!("{name}: refreshing"));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
        tokio::task::yield_now().await;
    }
}

fn draw_ui(f: &mut Frame, state: &DashboardState, refresh_all: bool, snapshots: &[GateSnapshot], sides: &[Side]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Min(6),     // Gates
            Constraint::Length(12), // Selected transaction
            Constraint::Length(3),  // Keys / notice
        ])
        .split(f.area());

    draw_header(f, chunks[0], refresh_all, snapshots);
    draw_gate_panel(f, chunks[1], state, snapshots, sides);
    draw_detail_panel(f, chunks[2], state, snapshots.get(state.selected));
    draw_footer(f, chunks[3], state);
}

fn badge_color(badge: Badge) -> Color {
    match badge {
        Badge::Green => Color::Green,
        Badge::Yellow => Color::Yellow,
        Badge::Orange => Color::LightRed,
        Badge::Blue => Color::Blue,
        Badge::Gray => Color::DarkGray,
    }
}

fn status_span(status: Option<&Status>, side: Side) -> Span<'static> {
    match status {
        Some(status) => Span::styled(
            translate(status, side).to_string(),
            Style::default().fg(badge_color(badge_class(status, side))).add_modifier(Modifier::BOLD),
        ),
        None => Span::styled("-", Style::default().fg(Color::DarkGray)),
    }
}

fn draw_header(f: &mut Frame, area: Rect, refresh_all: bool, snapshots: &[GateSnapshot]) {
    let attention = snapshots.iter().filter(|s| s.needs_attention).count();
    let polling = snapshots.iter().filter(|s| s.state == PollerState::Polling).count();
    let (master_text, master_color) = if refresh_all { ("ALL ON", Color::Green) } else { ("MIXED/OFF", Color::Yellow) };

    let header = Paragraph::new(Line::from(vec![
        Span::styled("Gate Dashboard ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| Auto refresh: "),
        Span::styled(master_text, Style::default().fg(master_color)),
        Span::raw(format!(" | Polling: {}/{}", polling, snapshots.len())),
        Span::raw(" | Attention: "),
        Span::styled(
            attention.to_string(),
            Style::default().fg(if attention > 0 { Color::Red } else { Color::Green }),
        ),
        Span::raw(format!(" | {}", Utc::now().format("%H:%M:%S UTC"))),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_gate_panel(f: &mut Frame, area: Rect, state: &DashboardState, snapshots: &[GateSnapshot], sides: &[Side]) {
    let rows: Vec<Row> = snapshots
        .iter()
        .zip(sides)
        .enumerate()
        .map(|(i, (snapshot, &side))| {
            let tx = snapshot.transaction.as_ref();
            let refresh = match snapshot.state {
                PollerState::Polling => Span::styled(
                    format!("ON {:>3}s", snapshot.countdown_secs),
                    Style::default().fg(Color::Green),
                ),
                PollerState::Disposed => Span::styled("CLOSED", Style::default().fg(Color::DarkGray)),
                _ => Span::styled("OFF", Style::default().fg(Color::Yellow)),
            };
            let marker = if snapshot.needs_attention {
                Span::styled("!", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
            } else {
                Span::raw(" ")
            };
            let plate = match (snapshot.loaded, tx) {
                (false, _) => "loading".to_string(),
                (true, None) => "no transaction".to_string(),
                (true, Some(tx)) => or_missing(tx.plate_number.as_deref()).to_string(),
            };

            let row = Row::new(vec![
                Cell::from(marker),
                Cell::from(snapshot.lane_name.clone()),
                Cell::from(refresh),
                Cell::from(status_span(tx.and_then(|t| t.status(side)), side)),
                Cell::from(plate),
                Cell::from(or_missing(tx.and_then(|t| t.tag_id.as_deref())).to_string()),
                Cell::from(or_missing(tx.and_then(|t| t.dispatch_id.as_deref())).to_string()),
                Cell::from(format_display_time(tx.and_then(|t| t.date_time), state.utc_offset_hours)),
            ]);
            if i == state.selected {
                row.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),  // Attention
            Constraint::Length(16), // Gate
            Constraint::Length(8),  // Refresh
            Constraint::Length(15), // Status
            Constraint::Length(14), // Plate
            Constraint::Length(14), // Tag
            Constraint::Length(14), // Dispatch
            Constraint::Min(19),    // Time
        ],
    )
    .header(
        Row::new(vec!["", "Gate", "Refresh", "Status", "Plate", "Tag", "Dispatch", "Time"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().title(" Gates ").borders(Borders::ALL).border_style(Style::default().fg(Color::Blue)));

    f.render_widget(table, area);
}

fn detail_lines(tx: &Transaction, state: &DashboardState) -> Vec<Line<'static>> {
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Cyan));
    let time = |ts| format_display_time(ts, state.utc_offset_hours);
    let leg = |side: Side| {
        let status = tx.status(side);
        vec![
            label(if side == Side::Entry { "Entry:    " } else { "Exit:     " }),
            status_span(status, side),
            Span::raw(format!("  {}", status.map_or("", description))),
        ]
    };

    let mut lines = vec![
        Line::from(vec![label("Txn:      "), Span::raw(tx.id.to_string())]),
        Line::from(vec![label("Dispatch: "), Span::raw(or_missing(tx.dispatch_id.as_deref()).to_string())]),
        Line::from(vec![label("Plate:    "), Span::raw(or_missing(tx.plate_number.as_deref()).to_string())]),
        Line::from(vec![label("Tag:      "), Span::raw(or_missing(tx.tag_id.as_deref()).to_string())]),
        Line::from(leg(Side::Entry)),
        Line::from(vec![
            label("  in/out: "),
            Span::raw(format!("{} / {}", time(tx.start_entry_time), time(tx.finish_entry_time))),
        ]),
        Line::from(leg(Side::Exit)),
        Line::from(vec![
            label("  in/out: "),
            Span::raw(format!("{} / {}", time(tx.start_exit_time), time(tx.finish_exit_time))),
        ]),
    ];
    if let Some(picture) = tx.first_picture() {
        lines.push(Line::from(vec![label("Picture:  "), Span::raw(picture_url(&state.base_url, picture.id))]));
    }
    lines
}

fn draw_detail_panel(f: &mut Frame, area: Rect, state: &DashboardState, selected: Option<&GateSnapshot>) {
    let (title, lines) = match selected {
        Some(snapshot) => {
            let title = format!(" {} ", snapshot.lane_name);
            match &snapshot.transaction {
                Some(tx) => (title, detail_lines(tx, state)),
                None if snapshot.loaded => (title, vec![Line::from("No transaction")]),
                None => (title, vec![Line::from("Loading...")]),
            }
        }
        None => (" Transaction ".to_string(), vec![Line::from("No gates configured")]),
    };

    let updated = selected
        .and_then(|s| s.updated_at)
        .map(|t| format!(" updated {}s ago ", (Utc::now() - t).num_seconds().max(0)))
        .unwrap_or_default();

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(title)
            .title_bottom(updated)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(panel, area);
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let line = match &state.notice {
        Some((text, _)) => Line::from(Span::styled(text.clone(), Style::default().fg(Color::Yellow))),
        None => Line::from(vec![
            Span::styled("↑/↓", Style::default().fg(Color::Cyan)),
            Span::raw(" select  "),
            Span::styled("space", Style::default().fg(Color::Cyan)),
            Span::raw(" toggle gate  "),
            Span::styled("a", Style::default().fg(Color::Cyan)),
            Span::raw(" toggle all  "),
            Span::styled("r", Style::default().fg(Color::Cyan)),
            Span::raw(" refresh  "),
            Span::styled("q", Style::default().fg(Color::Cyan)),
            Span::raw(" quit"),
        ]),
    };
    f.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL)), area);
}

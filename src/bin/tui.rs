//! Pit strategy TUI - live pit wall dashboard
//!
//! Tails the engine's report file and displays:
//! - The box / stay-out call for the driver on track
//! - Karts waiting in the pit lane, in queue order
//! - Cycle counters (rows, malformed rows, laps, scored stints)

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pit_strategy::domain::{epoch_ms, Classification, CycleReport, Verdict};
use pit_strategy::infra::Config;
use pit_strategy::io::read_last_report;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};
use time::macros::format_description;
use time::OffsetDateTime;

const REFRESH: Duration = Duration::from_millis(500);

/// Pit strategy dashboard
#[derive(Parser, Debug)]
#[command(name = "pit-tui", version, about)]
struct Args {
    /// Report file to follow (defaults to egress.file from the config)
    #[arg(short, long)]
    file: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

struct DashboardState {
    file: String,
    report: Option<CycleReport>,
    error: Option<String>,
    last_read: Option<Instant>,
}

impl DashboardState {
    fn new(file: String) -> Self {
        Self { file, report: None, error: None, last_read: None }
    }

    fn refresh(&mut self) {
        match read_last_report(&self.file) {
            Ok(Some(report)) => {
                self.report = Some(report);
                self.error = None;
            }
            Ok(None) => self.error = None,
            // Keep the last good report; the writer may be mid-line
            Err(e) => self.error = Some(format!("{e:#}")),
        }
        self.last_read = Some(Instant::now());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let file = match args.file {
        Some(file) => file,
        None => {
            let config_path = Config::resolve_config_path(args.config.as_deref());
            Config::from_file(&config_path)
                .map(|config| config.egress_file().to_string())
                .unwrap_or_else(|_| Config::default().egress_file().to_string())
        }
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, DashboardState::new(file));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut state: DashboardState,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        if state.last_read.map_or(true, |t| t.elapsed() >= REFRESH) {
            state.refresh();
        }
        terminal.draw(|f| draw_ui(f, &state))?;

        let timeout = state.last_read.map_or(Duration::ZERO, |t| REFRESH.saturating_sub(t.elapsed()));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') => state.refresh(),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn draw_ui(f: &mut Frame, state: &DashboardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(5), // Verdict
            Constraint::Min(0),    // Queue
            Constraint::Length(3), // Counters
        ])
        .split(f.area());

    draw_header(f, chunks[0], state);
    draw_verdict(f, chunks[1], state);
    draw_queue(f, chunks[2], state);
    draw_counters(f, chunks[3], state);
}

fn format_ts(ts_ms: u64) -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&format).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn draw_header(f: &mut Frame, area: Rect, state: &DashboardState) {
    let (session, cycle, at) = match &state.report {
        Some(r) => (r.session.as_str(), r.cycle.to_string(), format_ts(r.ts)),
        None => ("-", "-".to_string(), "-".to_string()),
    };

    let mut spans = vec![
        Span::styled("Pit Strategy ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| Session: "),
        Span::styled(session.to_string(), Style::default().fg(Color::Yellow)),
        Span::raw(" | Cycle: "),
        Span::raw(cycle),
        Span::raw(" @ "),
        Span::raw(at),
        Span::raw(" UTC | "),
        Span::styled(state.file.clone(), Style::default().fg(Color::DarkGray)),
    ];
    if let Some(err) = &state.error {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(err.clone(), Style::default().fg(Color::Red)));
    }
    spans.push(Span::raw(" | 'q' quit, 'r' refresh"));

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_verdict(f: &mut Frame, area: Rect, state: &DashboardState) {
    let (text, detail, color) = match state.report.as_ref().map(|r| &r.verdict) {
        Some(Verdict::BoxNow { kart_id, driver_id, score }) => (
            "BOX NOW".to_string(),
            format!("Kart {} ({:+.3}s vs {}'s baseline)", kart_id, score, driver_id),
            Color::Green,
        ),
        Some(Verdict::StayOut) => {
            ("STAY OUT".to_string(), "No kart in the pit lane beats the box threshold".to_string(), Color::Yellow)
        }
        Some(Verdict::NoKartsAvailable) => {
            ("NO KARTS".to_string(), "Pit lane queue is empty".to_string(), Color::DarkGray)
        }
        None => ("WAITING".to_string(), "No cycle report yet".to_string(), Color::DarkGray),
    };

    let verdict = Paragraph::new(vec![
        Line::from(Span::styled(text, Style::default().fg(color).add_modifier(Modifier::BOLD))),
        Line::from(Span::raw(detail)),
    ])
    .block(
        Block::default()
            .title(" Call ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color)),
    );
    f.render_widget(verdict, area);
}

fn class_color(class: Classification) -> Color {
    match class {
        Classification::Rocket => Color::Green,
        Classification::Neutral => Color::White,
        Classification::Lemon => Color::Red,
    }
}

fn draw_queue(f: &mut Frame, area: Rect, state: &DashboardState) {
    let now = epoch_ms();
    let rows: Vec<Row> = state
        .report
        .iter()
        .flat_map(|r| r.queue.iter())
        .enumerate()
        .map(|(i, entry)| {
            let waited = now.saturating_sub(entry.queued_at) / 1000;
            Row::new(vec![
                format!("{}", i + 1),
                entry.kart_id.to_string(),
                entry.driver_id.to_string(),
                format!("{:+.3}", entry.score),
                entry.classification.as_str().to_uppercase(),
                entry.stint_laps.to_string(),
                format!("{}s", waited),
            ])
            .style(Style::default().fg(class_color(entry.classification)))
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),  // Position
            Constraint::Length(6),  // Kart
            Constraint::Min(16),    // Driver
            Constraint::Length(8),  // Score
            Constraint::Length(8),  // Class
            Constraint::Length(5),  // Laps
            Constraint::Length(7),  // Waited
        ],
    )
    .header(
        Row::new(vec!["#", "Kart", "Brought in by", "Score", "Class", "Laps", "Waited"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .title(" Pit Lane Queue ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(table, area);
}

fn draw_counters(f: &mut Frame, area: Rect, state: &DashboardState) {
    let line = match &state.report {
        Some(r) => Line::from(vec![
            Span::raw("Rows: "),
            Span::styled(r.stats.rows.to_string(), Style::default().fg(Color::Yellow)),
            Span::raw(" | Malformed: "),
            Span::styled(
                r.stats.malformed_rows.to_string(),
                Style::default().fg(if r.stats.malformed_rows > 0 { Color::Red } else { Color::Green }),
            ),
            Span::raw(" | Laps: "),
            Span::raw(r.stats.laps_recorded.to_string()),
            Span::raw(" | Scored: "),
            Span::raw(r.stats.stints_scored.to_string()),
            Span::raw(" | Queue: "),
            Span::raw(r.queue.len().to_string()),
        ]),
        None => Line::from(Span::styled("-", Style::default().fg(Color::DarkGray))),
    };

    let counters = Paragraph::new(line).block(Block::default().title(" Cycle ").borders(Borders::ALL));
    f.render_widget(counters, area);
}

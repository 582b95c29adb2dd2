/// warpspawn live visualizer — attach to any running launch at any time.
///
/// Run in a separate terminal:
///   cargo run --bin viz
///
/// Polls /tmp/warpspawn_live.json every 200ms and renders a live TUI
/// dashboard:
///
///   ┌ header: kernel / status ───────────────────────────────────┐
///   │ core heatmap (one cell per core) │ Stats: blocks, warps …  │
///   │ q/esc: quit  …footer…                                      │
///
/// Press q or Esc to quit. The launch keeps running unaffected.
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use std::{io, time::Duration};
use warpspawn::metrics::{read_metrics, LiveMetrics};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let metrics = read_metrics();
        terminal.draw(|f| render(f, metrics.as_ref()))?;

        // Non-blocking: poll for 200ms, then redraw regardless
        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Top-level layout
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, metrics: Option<&LiveMetrics>) {
    let area = f.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // heatmap + stats
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, rows[0], metrics);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(rows[1]);

    render_heatmap(f, cols[0], metrics);
    render_stats(f, cols[1], metrics);

    render_footer(f, rows[2]);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn render_header(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default()
        .title(Span::styled(
            " ⚡ warpspawn live monitor ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let (name, status) = metrics
        .map(|m| (m.kernel_name.as_str(), m.status.as_str()))
        .unwrap_or(("—", "idle"));

    let status_color = match status {
        "running" => Color::Green,
        "complete" => Color::Cyan,
        _ => Color::DarkGray,
    };

    let spans = vec![
        Span::styled("  kernel: ", Style::default().fg(Color::DarkGray)),
        Span::styled(name, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled("   status: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            status.to_uppercase(),
            Style::default().fg(status_color).add_modifier(Modifier::BOLD),
        ),
    ];

    f.render_widget(Paragraph::new(Line::from(spans)), inner);
}

// ---------------------------------------------------------------------------
// Core heatmap
// ---------------------------------------------------------------------------

fn render_heatmap(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default().title(" Core Activity ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let (assigned, executed): (Vec<u32>, Vec<u32>) = metrics
        .map(|m| (m.core_blocks_assigned.clone(), m.core_blocks_executed.clone()))
        .unwrap_or_else(|| (vec![0u32; 16], vec![0u32; 16]));

    // Fit as many cores per row as the panel width allows (each = 2 chars + 1 space)
    let cores_per_row = ((inner.width as usize).saturating_sub(1) / 3).max(1);

    // Legend line at top
    let legend = Line::from(vec![
        Span::styled("██", Style::default().fg(Color::Green)),
        Span::raw(" done   "),
        Span::styled("██", Style::default().fg(Color::Yellow)),
        Span::raw(" working   "),
        Span::styled("░░", Style::default().fg(Color::DarkGray)),
        Span::raw(" sitting out"),
    ]);

    let mut lines: Vec<Line> = vec![legend, Line::raw("")];

    let cells: Vec<(u32, u32)> = assigned.iter().copied().zip(executed.iter().copied()).collect();
    for row in cells.chunks(cores_per_row) {
        let spans: Vec<Span> = row
            .iter()
            .flat_map(|&(assigned, executed)| {
                let (symbol, color) = if assigned == 0 {
                    ("░░", Color::DarkGray)
                } else if executed >= assigned {
                    ("██", Color::Green)
                } else {
                    ("██", Color::Yellow)
                };
                vec![Span::styled(symbol, Style::default().fg(color)), Span::raw(" ")]
            })
            .collect();
        lines.push(Line::from(spans));
    }

    // Active-core summary below the grid
    let active_count = assigned.iter().filter(|&&b| b > 0).count();
    lines.push(Line::raw(""));
    lines.push(Line::from(vec![Span::styled(
        format!("  {}/{} cores active", active_count, assigned.len()),
        Style::default().fg(Color::DarkGray),
    )]));

    f.render_widget(Paragraph::new(lines), inner);
}

// ---------------------------------------------------------------------------
// Stats panel
// ---------------------------------------------------------------------------

fn render_stats(f: &mut Frame, area: Rect, metrics: Option<&LiveMetrics>) {
    let block = Block::default().title(" Stats ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // blocks gauge
            Constraint::Length(1), // spacer
            Constraint::Min(0),    // text stats
        ])
        .split(inner);

    match metrics {
        None => {
            let msg = Paragraph::new(vec![
                Line::raw(""),
                Line::from(Span::styled(
                    "  No launch running.",
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(Span::styled(
                    "  Start warpspawn to see live data.",
                    Style::default().fg(Color::DarkGray),
                )),
            ]);
            f.render_widget(msg, inner);
        }
        Some(m) => {
            // Block progress gauge
            let blk_pct = if m.blocks_total > 0 {
                ((m.blocks_executed as f32 / m.blocks_total as f32) * 100.0) as u16
            } else {
                0
            };
            let blk_gauge = Gauge::default()
                .block(Block::default().title("Blocks"))
                .gauge_style(Style::default().fg(Color::Blue))
                .percent(blk_pct.min(100))
                .label(format!("{} / {}", m.blocks_executed, m.blocks_total));
            f.render_widget(blk_gauge, rows[0]);

            // Text stats
            let text = vec![
                Line::from(vec![
                    Span::styled("Warps:        ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.warps_executed.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Threads:      ", Style::default().fg(Color::DarkGray)),
                    Span::raw(m.threads_executed.to_string()),
                ]),
                Line::from(vec![
                    Span::styled("Active cores: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(format!("{} / {}", m.active_cores, m.num_cores)),
                ]),
                Line::from(vec![
                    Span::styled("Warps/block:  ", Style::default().fg(Color::DarkGray)),
                    Span::styled(
                        if m.warps_per_group == 0 {
                            "— (task mode)".to_string()
                        } else {
                            m.warps_per_group.to_string()
                        },
                        Style::default().fg(Color::Yellow),
                    ),
                ]),
                Line::raw(""),
                Line::from(vec![
                    Span::styled("Grid:   ", Style::default().fg(Color::DarkGray)),
                    Span::raw(format!("({},{},{})", m.grid[0], m.grid[1], m.grid[2])),
                ]),
                Line::from(vec![
                    Span::styled("Block:  ", Style::default().fg(Color::DarkGray)),
                    Span::raw(format!("({},{},{})", m.block[0], m.block[1], m.block[2])),
                ]),
                Line::from(vec![
                    Span::styled("Device: ", Style::default().fg(Color::DarkGray)),
                    Span::raw(format!(
                        "{} cores x {} warps x {} lanes",
                        m.num_cores, m.warps_per_core, m.threads_per_warp
                    )),
                ]),
            ];
            f.render_widget(Paragraph::new(text), rows[2]);
        }
    }
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

fn render_footer(f: &mut Frame, area: Rect) {
    let text = Paragraph::new(Span::styled(
        "  q / esc: quit    auto-refreshes every 200ms    reads /tmp/warpspawn_live.json",
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(text, area);
}

use std::borrow::Cow;

use super::state::AppState;
use crate::engine::phase::Phase;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table},
    Frame,
};

pub fn draw(f: &mut Frame, state: &AppState) {
    if state.log_focus {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
            .split(f.area());

        draw_header(f, state, chunks[0]);
        draw_logs(f, state, chunks[1]);
        draw_footer(f, state, chunks[2]);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, state, chunks[0]);
    draw_countdown(f, state, chunks[1]);
    draw_events(f, state, chunks[2]);
    draw_logs(f, state, chunks[3]);
    draw_footer(f, state, chunks[4]);
}

fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::Stopped => Color::DarkGray,
        Phase::Betting => Color::Green,
        Phase::Game => Color::Yellow,
        Phase::Processing => Color::Magenta,
        Phase::Interval => Color::Cyan,
    }
}

fn draw_header(f: &mut Frame, state: &AppState, area: Rect) {
    let status = &state.status;
    let mode = if status.automatic { "AUTO" } else { "MANUAL" };
    let betting = if status.can_place_bet {
        Span::styled("OPEN", Style::default().fg(Color::Green))
    } else {
        Span::styled("CLOSED", Style::default().fg(Color::Red))
    };

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(
            status.phase.to_string().to_uppercase(),
            Style::default()
                .fg(phase_color(status.phase))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  {}  bets: ", mode)),
        betting,
        Span::raw(format!(
            "  market: {}  games: {}  markets: {}  up: {}",
            status.market_id.as_deref().unwrap_or("-"),
            state.active_games,
            state.markets_opened,
            state.uptime(),
        )),
    ];
    if state.simulated {
        spans.push(Span::styled("  SIM", Style::default().fg(Color::Magenta)));
    }

    let block = Block::default()
        .title(" Market Cycle ")
        .borders(Borders::ALL);
    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_countdown(f: &mut Frame, state: &AppState, area: Rect) {
    let status = &state.status;
    let total = match status.phase {
        Phase::Betting => status.durations.betting_secs,
        Phase::Game => status.durations.game_secs,
        Phase::Interval => status.durations.interval_secs,
        Phase::Stopped | Phase::Processing => 0,
    };
    let remaining = status.remaining();
    let ratio = if total == 0 {
        0.0
    } else {
        (remaining as f64 / total as f64).clamp(0.0, 1.0)
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Countdown "))
        .gauge_style(Style::default().fg(phase_color(status.phase)))
        .ratio(ratio)
        .label(format!("{}s / {}s", remaining, total));
    f.render_widget(gauge, area);
}

fn draw_events(f: &mut Frame, state: &AppState, area: Rect) {
    let visible = area.height.saturating_sub(3) as usize;

    let header = Row::new(vec!["Time", "Game", "Event", "Outcome", "Min", "Team"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = state
        .events
        .iter()
        .rev()
        .take(visible)
        .map(|e| {
            let outcome_cell = match &e.outcome {
                Some(o) => Cell::from(o.clone()).style(Style::default().fg(Color::Green)),
                None => Cell::from("-").style(Style::default().fg(Color::DarkGray)),
            };
            Row::new(vec![
                Cell::from(e.time.clone()),
                Cell::from(truncate_with_ellipsis(&e.game_id, 24).into_owned()),
                Cell::from(e.event_name.clone()),
                outcome_cell,
                Cell::from(e.match_time.map(|m| m.to_string()).unwrap_or_default()),
                Cell::from(e.competitor.clone().unwrap_or_default()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(25),
            Constraint::Min(14),
            Constraint::Length(8),
            Constraint::Length(4),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(format!(" Live Events ({}) ", state.events.len()))
            .borders(Borders::ALL),
    );
    f.render_widget(table, area);
}

fn draw_logs(f: &mut Frame, state: &AppState, area: Rect) {
    let max_width = area.width.saturating_sub(2) as usize; // borders
    let visible_lines = area.height.saturating_sub(2) as usize;

    let total = state.logs.len();
    let offset = if state.log_focus {
        state.log_scroll_offset.min(total.saturating_sub(visible_lines))
    } else {
        0
    };

    let lines: Vec<Line> = state
        .logs
        .iter()
        .rev()
        .skip(offset)
        .take(visible_lines)
        .map(|l| {
            let color = match l.level.as_str() {
                "ERROR" => Color::Red,
                "WARN" => Color::Yellow,
                _ => Color::DarkGray,
            };
            let prefix = format!(" {} [{}] ", l.time, l.level);
            let msg_max = max_width.saturating_sub(prefix.len());
            let msg = truncate_with_ellipsis(&l.message, msg_max);
            Line::from(vec![
                Span::styled(prefix, Style::default().fg(color)),
                Span::raw(msg.into_owned()),
            ])
        })
        .collect();

    let title = if state.log_focus {
        format!(" Cycle Log [{}/{} lines] ", offset + visible_lines.min(total), total)
    } else {
        " Cycle Log ".to_string()
    };

    let block = Block::default().title(title).borders(Borders::ALL);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_footer(f: &mut Frame, state: &AppState, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let line = if state.log_focus {
        Line::from(vec![
            key("  [Esc]"),
            Span::raw(" back  "),
            key("[j/k]"),
            Span::raw(" scroll  "),
        ])
    } else {
        Line::from(vec![
            key("  [q]"),
            Span::raw("uit  "),
            key("[s]"),
            Span::raw("tart  "),
            key("[x]"),
            Span::raw(" stop  "),
            key("[o]"),
            Span::raw("pen betting  "),
            key("[m]"),
            Span::raw("arket  "),
            key("[l]"),
            Span::raw("ogs  "),
        ])
    };
    f.render_widget(Paragraph::new(line), area);
}

fn truncate_with_ellipsis(s: &str, max_width: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= 1 {
        return Cow::Owned("…".chars().take(max_width).collect());
    }
    let kept: String = s.chars().take(max_width - 1).collect();
    Cow::Owned(format!("{}…", kept))
}

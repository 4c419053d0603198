use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Row, Table, Tabs};

use arena::{ConnectionId, ConnectionInfo, RoomInfo};

use crate::server::ServerStats;

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Connections,
    Rooms,
    Log,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Connections, Tab::Rooms, Tab::Log];

    fn title(self) -> &'static str {
        match self {
            Tab::Connections => "Connections",
            Tab::Rooms => "Rooms",
            Tab::Log => "Log",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
struct LogLine {
    level: LogLevel,
    uptime_secs: u64,
    message: String,
}

#[derive(Debug)]
pub struct TuiState {
    tab: Tab,
    log: VecDeque<LogLine>,
    scroll: usize,
    selected: usize,
    pending_kick: Option<ConnectionId>,
    uptime_secs: u64,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            tab: Tab::Connections,
            log: VecDeque::new(),
            scroll: 0,
            selected: 0,
            pending_kick: None,
            uptime_secs: 0,
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.tab
    }

    pub fn next_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + 1) % Tab::ALL.len()];
    }

    pub fn prev_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + Tab::ALL.len() - 1) % Tab::ALL.len()];
    }

    pub fn set_uptime(&mut self, secs: u64) {
        self.uptime_secs = secs;
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    fn push(&mut self, level: LogLevel, message: String) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(LogLine {
            level,
            uptime_secs: self.uptime_secs,
            message,
        });
    }

    /// Scroll is counted in lines back from the newest entry.
    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 10).min(self.log.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(10);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn select_prev(&mut self, count: usize) {
        if count > 0 {
            self.selected = self.selected.min(count - 1).saturating_sub(1);
        }
    }

    pub fn select_next(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + 1).min(count - 1);
        }
    }

    pub fn request_kick(&mut self, connections: &[ConnectionInfo]) {
        if let Some(info) = connections.get(self.selected) {
            self.pending_kick = Some(info.id);
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<ConnectionId> {
        self.pending_kick.take()
    }
}

pub fn render(
    frame: &mut Frame,
    state: &TuiState,
    stats: &ServerStats,
    connections: &[ConnectionInfo],
    rooms: &[RoomInfo],
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_tabs(frame, chunks[3], state.tab);
    match state.tab {
        Tab::Connections => render_connections(frame, chunks[4], connections, state.selected),
        Tab::Rooms => render_rooms(frame, chunks[4], rooms),
        Tab::Log => render_log(frame, chunks[4], state),
    }
    render_help(frame, chunks[5]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let title = format!(" Arena Server - Uptime: {} ", format_duration(stats.uptime_secs));
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Clients: {}  |  Rooms: {}/{}",
        stats.tick, stats.client_count, stats.room_count, stats.max_rooms
    );
    frame.render_widget(
        Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let ratio = if stats.max_clients == 0 {
        0.0
    } else {
        stats.client_count as f64 / stats.max_clients as f64
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(" Capacity ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} clients", stats.client_count, stats.max_clients));
    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let net = &stats.network_stats;
    let loss = net.loss_percent();
    let label = Style::default().fg(Color::Gray);
    let value = Style::default().fg(Color::White);

    let lines = vec![
        Line::from(vec![
            Span::styled("Packets: ", label),
            Span::styled(
                format!(
                    "{} sent / {} recv / {} malformed",
                    net.packets_sent, net.packets_received, net.packets_malformed
                ),
                value,
            ),
        ]),
        Line::from(vec![
            Span::styled("Bytes: ", label),
            Span::styled(
                format!(
                    "{} sent / {} recv",
                    format_bytes(net.bytes_sent),
                    format_bytes(net.bytes_received)
                ),
                value,
            ),
            Span::styled("  Simulated loss: ", label),
            Span::styled(
                format!("{loss:.1}%"),
                if loss > 5.0 {
                    Style::default().fg(Color::Red)
                } else {
                    value
                },
            ),
        ]),
    ];

    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_tabs(frame: &mut Frame, area: Rect, active: Tab) {
    let tabs = Tabs::new(Tab::ALL.iter().map(|t| t.title()))
        .select(active.index())
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn render_connections(
    frame: &mut Frame,
    area: Rect,
    connections: &[ConnectionInfo],
    selected: usize,
) {
    let header = Row::new([
        "Id", "Address", "Player", "Room", "Idle", "Pending", "RTT", "HP", "Score",
    ])
    .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

    let rows = connections.iter().enumerate().map(|(i, c)| {
        let room = if c.room == arena::net::LOBBY {
            "lobby".to_string()
        } else {
            c.room.to_string()
        };
        let row = Row::new(vec![
            c.id.to_string(),
            c.addr.to_string(),
            c.player.to_string(),
            room,
            format!("{:.1}s", c.idle.as_secs_f32()),
            c.pending.to_string(),
            format!("{:.0}ms", c.srtt_ms),
            c.health.to_string(),
            c.score.to_string(),
        ]);
        if i == selected {
            row.style(Style::default().fg(Color::Yellow))
        } else {
            row
        }
    });

    let widths = [
        Constraint::Length(4),
        Constraint::Length(22),
        Constraint::Length(7),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Length(8),
        Constraint::Length(7),
        Constraint::Length(4),
        Constraint::Length(6),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().title(" Connections ").borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn render_rooms(frame: &mut Frame, area: Rect, rooms: &[RoomInfo]) {
    let header = Row::new(["Room", "Players", "Objective"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

    let rows = rooms.iter().map(|room| {
        let players = room
            .players
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let objective = room
            .objective
            .map_or_else(|| "-".to_string(), |o| format!("({:.0}, {:.0})", o.x, o.y));
        Row::new(vec![room.id.to_string(), players, objective])
    });

    let widths = [Constraint::Length(6), Constraint::Length(20), Constraint::Min(12)];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().title(" Rooms ").borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = state
        .log
        .range(start..end)
        .map(|line| {
            let color = match line.level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", format_duration(line.uptime_secs)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(line.message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    let block = Block::default().title(" Log ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let help = "Tab switch view  ↑↓ select  K kick  PgUp/PgDn scroll  Q quit";
    let text = Paragraph::new(help).style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );
    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

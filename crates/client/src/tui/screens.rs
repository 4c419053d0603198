use std::collections::VecDeque;
use std::net::SocketAddr;

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Rectangle};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Row, Table};

use arena::{ClientState, ClientView, NetworkStats};

const ARENA_SIZE: f64 = 500.0;

pub fn render(
    frame: &mut Frame,
    view: &ClientView,
    stats: &NetworkStats,
    server: SocketAddr,
    selected: usize,
    log: &VecDeque<String>,
) {
    let area = frame.area();

    let block = Block::default()
        .title(" Arena ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(6),
            Constraint::Length(1),
        ])
        .split(area);

    render_status(frame, chunks[0], view, stats, server);
    match view.state {
        ClientState::Unconnected => {
            let message = format!("Contacting {}...", server);
            render_waiting(frame, chunks[1], " Connecting ", &message)
        }
        ClientState::InLobby => render_lobby(frame, chunks[1], view, selected),
        ClientState::AwaitingReset => {
            render_waiting(frame, chunks[1], " Joining ", "Waiting for the room to start...")
        }
        ClientState::InGame => render_game(frame, chunks[1], view),
    }
    render_log(frame, chunks[2], log);
    render_help(frame, chunks[3], view.state);
}

fn render_status(
    frame: &mut Frame,
    area: Rect,
    view: &ClientView,
    stats: &NetworkStats,
    server: SocketAddr,
) {
    let label = Style::default().fg(Color::Gray);
    let value = Style::default().fg(Color::White);

    let line = Line::from(vec![
        Span::styled("Server ", label),
        Span::styled(server.to_string(), value),
        Span::styled("  State ", label),
        Span::styled(view.state.as_str(), Style::default().fg(Color::Yellow)),
        Span::styled("  Player ", label),
        Span::styled(view.player.to_string(), value),
        Span::styled("  RTT ", label),
        Span::styled(format!("{:.0}ms", view.rtt_ms), value),
        Span::styled("  Packets ", label),
        Span::styled(
            format!("{} / {}", stats.packets_sent, stats.packets_received),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_waiting(frame: &mut Frame, area: Rect, title: &str, message: &str) {
    let dialog_area = centered_rect(44, 5, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Paragraph::new(message)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
    frame.render_widget(dialog, dialog_area);
}

fn render_lobby(frame: &mut Frame, area: Rect, view: &ClientView, selected: usize) {
    let items: Vec<ListItem> = if view.rooms.is_empty() {
        vec![
            ListItem::new("  No open rooms, press H to create one")
                .style(Style::default().fg(Color::DarkGray)),
        ]
    } else {
        view.rooms
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let label = format!("  Room {:<6} {} players", slot.room, slot.players);
                let item = ListItem::new(label);
                if i == selected {
                    item.style(
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    item.style(Style::default().fg(Color::White))
                }
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .title(" Lobby ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(list, centered_rect(48, 12, area));
}

fn render_game(frame: &mut Frame, area: Rect, view: &ClientView) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(34)])
        .split(area);

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(format!(" Room {} ", view.room))
                .borders(Borders::ALL),
        )
        .x_bounds([0.0, ARENA_SIZE])
        .y_bounds([0.0, ARENA_SIZE])
        .paint(|ctx| {
            ctx.draw(&Rectangle {
                x: 0.0,
                y: 0.0,
                width: ARENA_SIZE,
                height: ARENA_SIZE,
                color: Color::DarkGray,
            });
            if let Some(objective) = view.objective {
                ctx.print(
                    f64::from(objective.x),
                    f64::from(objective.y),
                    Span::styled("*", Style::default().fg(Color::Yellow)),
                );
            }
            for remote in &view.remotes {
                let position = remote.state.kinematics.position;
                let color = if remote.state.is_alive() { Color::Red } else { Color::DarkGray };
                ctx.print(
                    f64::from(position.x),
                    f64::from(position.y),
                    Span::styled(remote.player.to_string(), Style::default().fg(color)),
                );
            }
            let local = view.local.kinematics.position;
            ctx.print(
                f64::from(local.x),
                f64::from(local.y),
                Span::styled("@", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            );
        });
    frame.render_widget(canvas, chunks[0]);

    let mut rows = vec![Row::new(vec![
        format!("{} (you)", view.player),
        view.local.health.to_string(),
        view.local.score.to_string(),
        "-".to_string(),
    ])
    .style(Style::default().fg(Color::Green))];
    rows.extend(view.remotes.iter().map(|remote| {
        Row::new(vec![
            remote.player.to_string(),
            remote.state.health.to_string(),
            remote.state.score.to_string(),
            remote.shots_fired.to_string(),
        ])
    }));

    let widths = [
        Constraint::Length(10),
        Constraint::Length(5),
        Constraint::Length(6),
        Constraint::Length(6),
    ];
    let table = Table::new(rows, widths)
        .header(
            Row::new(["Player", "HP", "Score", "Shots"])
                .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().title(" Scores ").borders(Borders::ALL));
    frame.render_widget(table, chunks[1]);
}

fn render_log(frame: &mut Frame, area: Rect, log: &VecDeque<String>) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = log
        .iter()
        .skip(log.len().saturating_sub(visible))
        .map(|message| {
            Line::from(Span::styled(
                message.as_str(),
                Style::default().fg(Color::White),
            ))
        })
        .collect();

    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect, state: ClientState) {
    let text = match state {
        ClientState::InLobby => "↑↓ Select  H Create room  J/Enter Join  Q Quit",
        ClientState::InGame => "WASD/Arrows Move  Space Fire  L Leave room  Q Quit",
        ClientState::Unconnected | ClientState::AwaitingReset => "Q Quit",
    };
    let help = Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

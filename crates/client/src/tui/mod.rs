mod screens;

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use arena::ClientState;

use crate::net::{Direction, InputTracker, NetworkClient};

const MAX_LOG_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Move(Direction),
    Fire,
    SelectPrev,
    SelectNext,
    CreateRoom,
    JoinSelected,
    LeaveRoom,
}

pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    client: NetworkClient,
    input: InputTracker,
    frame_duration: Duration,
    selected: usize,
    log: VecDeque<String>,
    last_state: ClientState,
    should_quit: bool,
}

impl Tui {
    pub fn new(client: NetworkClient, tick_rate: u32) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            client,
            input: InputTracker::default(),
            frame_duration: Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1))),
            selected: 0,
            log: VecDeque::new(),
            last_state: ClientState::Unconnected,
            should_quit: false,
        })
    }

    pub fn run(&mut self) -> io::Result<()> {
        self.push_log(format!("Connecting to {}", self.client.server()));

        while !self.should_quit {
            let frame_start = Instant::now();

            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Release {
                        let action = self.handle_key(key.code, key.modifiers);
                        self.process_action(action);
                    }
                }
            }

            let input = self.input.sample(Instant::now());
            self.client.update(&input)?;
            self.observe_state();
            self.draw()?;

            let elapsed = frame_start.elapsed();
            if elapsed < self.frame_duration {
                std::thread::sleep(self.frame_duration - elapsed);
            }
        }

        Ok(())
    }

    fn draw(&mut self) -> io::Result<()> {
        let view = self.client.view();
        let stats = self.client.stats().clone();
        let server = self.client.server();
        let selected = self.selected;
        let log = &self.log;

        self.terminal.draw(|frame| {
            screens::render(frame, &view, &stats, server, selected, log);
        })?;

        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Action {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match self.client.view().state {
            ClientState::InLobby => self.handle_lobby_key(code),
            ClientState::InGame => self.handle_game_key(code),
            ClientState::Unconnected | ClientState::AwaitingReset => match code {
                KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
                _ => Action::None,
            },
        }
    }

    fn handle_lobby_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Up => Action::SelectPrev,
            KeyCode::Down => Action::SelectNext,
            KeyCode::Char('h') | KeyCode::Char('H') => Action::CreateRoom,
            KeyCode::Char('j') | KeyCode::Char('J') | KeyCode::Enter => Action::JoinSelected,
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => Action::None,
        }
    }

    fn handle_game_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Up | KeyCode::Char('w') => Action::Move(Direction::Up),
            KeyCode::Down | KeyCode::Char('s') => Action::Move(Direction::Down),
            KeyCode::Left | KeyCode::Char('a') => Action::Move(Direction::Left),
            KeyCode::Right | KeyCode::Char('d') => Action::Move(Direction::Right),
            KeyCode::Char(' ') => Action::Fire,
            KeyCode::Char('l') | KeyCode::Char('L') => Action::LeaveRoom,
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => Action::None,
        }
    }

    fn process_action(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Quit => self.should_quit = true,
            Action::Move(direction) => self.input.press(direction, Instant::now()),
            Action::Fire => self.input.fire(),
            Action::SelectPrev => self.selected = self.selected.saturating_sub(1),
            Action::SelectNext => {
                let count = self.client.view().rooms.len();
                self.selected = (self.selected + 1).min(count.saturating_sub(1));
            }
            Action::CreateRoom => {
                if self.client.create_room() {
                    self.push_log("Creating a room");
                }
            }
            Action::JoinSelected => {
                let room = self.client.view().rooms.get(self.selected).map(|slot| slot.room);
                match room {
                    Some(room) if self.client.join_room(room) => {
                        self.push_log(format!("Joining room {}", room));
                    }
                    Some(_) => {}
                    None => self.push_log("No room selected"),
                }
            }
            Action::LeaveRoom => {
                if self.client.leave_room() {
                    self.push_log("Leaving the room");
                }
            }
        }
    }

    fn observe_state(&mut self) {
        let view = self.client.view();
        if view.state != self.last_state {
            let message = match view.state {
                ClientState::Unconnected => "Lost the server, reconnecting".to_string(),
                ClientState::InLobby => match view.last_refusal {
                    Some(error) if self.last_state == ClientState::AwaitingReset => {
                        format!("Request refused: {}", error.as_str())
                    }
                    _ => "In the lobby".to_string(),
                },
                ClientState::AwaitingReset => "Waiting for the room".to_string(),
                ClientState::InGame => {
                    format!("Playing in room {} as player {}", view.room, view.player)
                }
            };
            self.push_log(message);
            self.input.release_all();
            self.last_state = view.state;
        }
        let count = view.rooms.len();
        self.selected = self.selected.min(count.saturating_sub(1));
    }

    fn push_log(&mut self, message: impl Into<String>) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(message.into());
    }

    pub fn restore_terminal(&mut self) -> io::Result<()> {
        terminal::disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            cursor::Show
        )?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = self.restore_terminal();
    }
}

pub fn run(client: NetworkClient, tick_rate: u32) -> io::Result<()> {
    let mut tui = Tui::new(client, tick_rate)?;
    let result = tui.run();
    tui.restore_terminal()?;
    result
}

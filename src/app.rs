//! App: terminal init, main loop, fall timer and key handling.

use crate::game::{GameState, Phase};
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use crate::{Args, GameConfig, highscores};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// DAS (Delayed Auto-Shift): delay before movement starts repeating when you hold a key.
const REPEAT_DELAY_MS: u64 = 170;
/// ARR (Auto-Repeat Rate): time between repeated moves while holding. 50 ms ≈ 20 moves/sec.
const REPEAT_INTERVAL_MS: u64 = 50;

/// Event-poll timeout per frame (~60 FPS rendering).
const FRAME_MS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Playing,
    GameOver,
    QuitMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOption {
    Resume,
    MainMenu,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuState {
    pub animation_start: Instant,
}

impl Default for MenuState {
    fn default() -> Self {
        Self {
            animation_start: Instant::now(),
        }
    }
}

pub struct App {
    args: Args,
    config: GameConfig,
    state: GameState,
    screen: Screen,
    paused: bool,
    last_frame: Instant,
    /// Elapsed fall time since the last automatic descent; compared against
    /// the level's drop interval. Reset on soft drop and on resume.
    drop_accumulator: Duration,
    repeat_state: Option<(Action, Instant)>,
    last_repeat_fire: Option<Instant>,
    /// TachyonFX fade effect for the match flash (created when a flash starts).
    match_effect: Option<Effect>,
    /// Last time we processed the match effect (for delta).
    match_effect_process_time: Option<Instant>,
    menu_state: MenuState,
    quit_selected: QuitOption,
    high_score: u32,
    new_high_score: bool,
}

impl App {
    pub fn new(args: Args, config: GameConfig, theme: Theme) -> Result<Self> {
        let state = GameState::new(theme, &config);
        let screen = if args.no_menu {
            Screen::Playing
        } else {
            Screen::Menu
        };
        let now = Instant::now();
        Ok(Self {
            args,
            config,
            state,
            screen,
            paused: false,
            last_frame: now,
            drop_accumulator: Duration::ZERO,
            repeat_state: None,
            last_repeat_fire: None,
            match_effect: None,
            match_effect_process_time: None,
            menu_state: MenuState::default(),
            quit_selected: QuitOption::Resume,
            high_score: highscores::load_high_score(),
            new_high_score: false,
        })
    }

    fn reset_game(&mut self) {
        self.state.restart(&self.config);
        self.screen = Screen::Playing;
        self.paused = false;
        self.last_frame = Instant::now();
        self.drop_accumulator = Duration::ZERO;
        self.repeat_state = None;
        self.last_repeat_fire = None;
        self.match_effect = None;
        self.match_effect_process_time = None;
        self.new_high_score = false;
    }

    fn apply_action(&mut self, action: Action, now: Instant) {
        match action {
            Action::MoveLeft => self.state.move_piece(-1),
            Action::MoveRight => self.state.move_piece(1),
            Action::Rotate => self.state.rotate(),
            Action::SoftDrop => {
                self.state.soft_drop(now);
                self.drop_accumulator = Duration::ZERO;
            }
            Action::HardDrop => {
                self.state.hard_drop(now);
                self.repeat_state = None;
            }
            Action::Pause | Action::Quit | Action::None => {}
        }
    }

    fn tick_repeat(&mut self) {
        let now = Instant::now();
        let (action, first) = match self.repeat_state {
            Some(s) => s,
            None => return,
        };
        if !matches!(
            action,
            Action::MoveLeft | Action::MoveRight | Action::SoftDrop
        ) {
            return;
        }
        if first.elapsed() < Duration::from_millis(REPEAT_DELAY_MS) {
            return;
        }
        let next = self.last_repeat_fire.unwrap_or(first) + Duration::from_millis(REPEAT_INTERVAL_MS);
        if now >= next {
            self.apply_action(action, now);
            self.last_repeat_fire = Some(now);
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Attempt to enable enhanced keyboard for Release events
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            terminal.draw(|f| {
                crate::ui::draw(
                    f,
                    self.screen,
                    &self.state,
                    self.paused,
                    f.area(),
                    &mut self.match_effect,
                    &mut self.match_effect_process_time,
                    &self.menu_state,
                    now,
                    self.args.no_animation,
                    (self.screen == Screen::QuitMenu).then_some(self.quit_selected),
                    self.high_score,
                    self.new_high_score,
                )
            })?;

            // The effect tracks one flash; drop it once the balls are gone.
            if !matches!(self.state.phase, Phase::Flashing { .. }) {
                self.match_effect = None;
                self.match_effect_process_time = None;
            }

            let timeout = Duration::from_millis(FRAME_MS).saturating_sub(now.elapsed());

            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        let action = key_to_action(key);

                        // Ignore OS repeats and only process first Press.
                        if key.kind != KeyEventKind::Press {
                            if key.kind == KeyEventKind::Release
                                && self.repeat_state.map(|(a, _)| a) == Some(action)
                            {
                                self.repeat_state = None;
                                self.last_repeat_fire = None;
                            }
                            continue;
                        }
                        // If we are already repeating this action, ignore subsequent OS Press events
                        if self.repeat_state.map(|(a, _)| a) == Some(action) {
                            continue;
                        }

                        match self.screen {
                            Screen::Menu => match action {
                                Action::Quit => return Ok(()),
                                Action::HardDrop => self.reset_game(),
                                _ => {}
                            },
                            Screen::Playing => {
                                if self.paused {
                                    if action == Action::Pause {
                                        self.paused = false;
                                        // Time spent paused is not credited to the fall timer.
                                        self.drop_accumulator = Duration::ZERO;
                                    } else if action == Action::Quit {
                                        self.screen = Screen::QuitMenu;
                                        self.quit_selected = QuitOption::Resume;
                                    }
                                } else if action == Action::Pause {
                                    self.paused = true;
                                } else if action == Action::Quit {
                                    self.screen = Screen::QuitMenu;
                                    self.quit_selected = QuitOption::Resume;
                                } else {
                                    self.apply_action(action, Instant::now());
                                    let repeatable = matches!(
                                        action,
                                        Action::MoveLeft | Action::MoveRight | Action::SoftDrop
                                    );
                                    if repeatable {
                                        self.repeat_state = Some((action, Instant::now()));
                                        self.last_repeat_fire = None;
                                    }
                                    // If the action caused a lock, clear repeat state to
                                    // prevent "input memory" on the next pair.
                                    if self.state.is_resolving() || self.state.piece.is_none() {
                                        self.repeat_state = None;
                                    }
                                }
                            }
                            Screen::QuitMenu => match action {
                                Action::SoftDrop | Action::MoveRight => {
                                    self.quit_selected = match self.quit_selected {
                                        QuitOption::Resume => QuitOption::MainMenu,
                                        QuitOption::MainMenu => QuitOption::Exit,
                                        QuitOption::Exit => QuitOption::Resume,
                                    };
                                }
                                Action::Rotate | Action::MoveLeft => {
                                    self.quit_selected = match self.quit_selected {
                                        QuitOption::Resume => QuitOption::Exit,
                                        QuitOption::MainMenu => QuitOption::Resume,
                                        QuitOption::Exit => QuitOption::MainMenu,
                                    };
                                }
                                Action::HardDrop => match self.quit_selected {
                                    QuitOption::Resume => self.screen = Screen::Playing,
                                    QuitOption::MainMenu => self.screen = Screen::Menu,
                                    QuitOption::Exit => return Ok(()),
                                },
                                Action::Pause | Action::Quit => {
                                    self.screen = Screen::Playing;
                                }
                                _ => {}
                            },
                            Screen::GameOver => {
                                if action == Action::Quit {
                                    return Ok(());
                                }
                                if action == Action::HardDrop
                                    || key.code == KeyCode::Char('r')
                                    || key.code == KeyCode::Char('R')
                                {
                                    self.reset_game();
                                }
                            }
                        }
                    }
                }
            }

            let now = Instant::now();
            let delta = now.saturating_duration_since(self.last_frame);
            self.last_frame = now;

            if self.screen == Screen::Playing {
                if !self.paused {
                    self.tick_repeat();
                    if self.state.phase == Phase::Falling {
                        self.drop_accumulator += delta;
                        if self.drop_accumulator >= self.state.drop_interval {
                            self.state.soft_drop(now);
                            self.drop_accumulator = Duration::ZERO;
                        }
                    } else {
                        self.drop_accumulator = Duration::ZERO;
                    }
                }

                // Cascade pacing is not gated on pause: a lock that started a
                // cascade resolves to completion.
                self.state.update(now);

                if self.state.score > self.high_score {
                    self.high_score = self.state.score;
                    self.new_high_score = true;
                }
                if self.state.game_over() {
                    let _ = highscores::save_high_score(self.high_score);
                    self.screen = Screen::GameOver;
                }
            }
        }
    }
}

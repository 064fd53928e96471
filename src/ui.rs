//! Layout and drawing: menu, board, pause, game over, next preview, colour strip, score.

use crate::app::{MenuState, QuitOption, Screen};
use crate::game::{self, BallColor, GameState, Phase};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Widget};
use std::collections::HashSet;
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Each grid cell is 2 terminal cells wide, 1 tall.
const CELL_WIDTH: u16 = 2;
const CELL_HEIGHT: u16 = 1;

/// Board size in terminal cells (grid + border).
const BOARD_PIXEL_W: u16 = game::COLS as u16 * CELL_WIDTH + 2;
const BOARD_PIXEL_H: u16 = game::ROWS as u16 * CELL_HEIGHT + 2;

const SIDEBAR_WIDTH: u16 = 20;

/// Duration of the match-pop fade (TachyonFX); matches the flash deadline.
const MATCH_FADE_MS: u32 = game::MATCH_FLASH_MS as u32;

/// Board inner rect (grid only, no border) for given area; matches draw_game layout.
fn board_inner_rect(area: Rect) -> Rect {
    let total_w = BOARD_PIXEL_W + SIDEBAR_WIDTH;
    let x = area.x + area.width.saturating_sub(total_w) / 2;
    let y = area.y + area.height.saturating_sub(BOARD_PIXEL_H) / 2;
    Rect {
        x: x + 1,
        y: y + 1,
        width: (game::COLS as u16 * CELL_WIDTH).min(area.width.saturating_sub(2)),
        height: (game::ROWS as u16 * CELL_HEIGHT).min(area.height.saturating_sub(2)),
    }
}

/// Build set of buffer (x, y) positions that belong to flashing cells.
fn flashing_buffer_positions(
    board_rect: Rect,
    matched: &[(usize, usize)],
) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for &(gx, gy) in matched {
        let x0 = board_rect.x + (gx as u16) * CELL_WIDTH;
        let y0 = board_rect.y + (gy as u16) * CELL_HEIGHT;
        for bx in x0..(x0 + CELL_WIDTH).min(board_rect.x + board_rect.width) {
            for by in y0..(y0 + CELL_HEIGHT).min(board_rect.y + board_rect.height) {
                set.insert((bx, by));
            }
        }
    }
    set
}

/// Create or update the match-pop fade effect and process it (TachyonFX:
/// fade the flashing balls to bg over the flash window).
fn apply_match_effect(
    frame: &mut Frame,
    state: &GameState,
    area: Rect,
    match_effect: &mut Option<Effect>,
    match_effect_process_time: &mut Option<Instant>,
    now: Instant,
) {
    let board_rect = board_inner_rect(area);
    let delta = match_effect_process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u128::from(u32::MAX)) as u32;
    let tfx_delta = TfxDuration::from_millis(delta_ms);
    *match_effect_process_time = Some(now);

    if match_effect.is_none() {
        let flashing_set = flashing_buffer_positions(board_rect, &state.matched);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            flashing_set.contains(&(pos.x, pos.y))
        }));
        let bg = state.theme.bg;
        let effect = fx::fade_to(bg, bg, (MATCH_FADE_MS, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board_rect);
        *match_effect = Some(effect);
    }

    if let Some(effect) = match_effect {
        frame.render_effect(effect, board_rect, tfx_delta);
    }
}

/// Draw current screen (menu, game, game over), with optional pause overlay.
/// While balls are flashing and !no_animation, applies the TachyonFX fade and
/// updates `match_effect` / `match_effect_process_time`.
pub fn draw(
    frame: &mut Frame,
    screen: Screen,
    state: &GameState,
    paused: bool,
    area: Rect,
    match_effect: &mut Option<Effect>,
    match_effect_process_time: &mut Option<Instant>,
    menu_state: &MenuState,
    now: Instant,
    no_animation: bool,
    quit_selected: Option<QuitOption>,
    high_score: u32,
    new_high_score: bool,
) {
    match screen {
        Screen::Menu => draw_menu(frame, state, menu_state, area, now, high_score),
        Screen::Playing => {
            draw_game(frame, state, area, high_score);
            if paused {
                draw_pause_overlay(frame, state, area);
            }
            if matches!(state.phase, Phase::Flashing { .. }) && !state.matched.is_empty() && !no_animation {
                apply_match_effect(
                    frame,
                    state,
                    area,
                    match_effect,
                    match_effect_process_time,
                    now,
                );
            }
        }
        Screen::QuitMenu => {
            draw_game(frame, state, area, high_score);
            if let Some(opt) = quit_selected {
                draw_quit_menu(frame, state, opt);
            }
        }
        Screen::GameOver => draw_game_over(frame, state, area, high_score, new_high_score),
    }
}

fn draw_menu(
    frame: &mut Frame,
    state: &GameState,
    menu_state: &MenuState,
    area: Rect,
    now: Instant,
    high_score: u32,
) {
    let popup_w = 46u16;
    let popup_h = 16u16;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(popup_w) / 2,
        y: area.y + area.height.saturating_sub(popup_h) / 2,
        width: popup_w.min(area.width),
        height: popup_h.min(area.height),
    };

    let title = Line::from(vec![
        Span::styled(
            " NEON ",
            Style::default().fg(Color::Rgb(255, 120, 220)).bold(),
        ),
        Span::styled(" DROP ", Style::default().fg(state.theme.main_fg).bold()),
    ]);

    let ball_line = Line::from(
        BallColor::ALL
            .iter()
            .map(|&c| Span::styled("● ", Style::default().fg(state.ball_color(c))))
            .collect::<Vec<_>>(),
    );

    let lines = vec![
        Line::from(""),
        title,
        Line::from(""),
        ball_line,
        Line::from(""),
        Line::from(Span::styled(
            " Connect 4+ same-colour balls to pop them. ",
            Style::default().fg(state.theme.main_fg),
        )),
        Line::from(Span::styled(
            " Chains double the score per step. ",
            Style::default().fg(state.theme.inactive_fg),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!(" Best: {} ", high_score),
            Style::default().fg(state.theme.title),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " [ ENTER / SPACE — START ] ",
            Style::default().fg(Color::Black).bg(state.theme.title).bold(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled(" ←→ ", Style::default().fg(state.theme.balls[3])),
            Span::from("MOVE  "),
            Span::styled(" ↑ ", Style::default().fg(state.theme.balls[3])),
            Span::from("ROTATE  "),
            Span::styled(" ↓ ", Style::default().fg(state.theme.balls[3])),
            Span::from("DROP"),
        ]),
        Line::from(Span::styled(
            " ⌁ [Q] QUIT ",
            Style::default().fg(Color::Rgb(255, 80, 80)),
        )),
    ];

    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(state.theme.div_line).bg(state.theme.bg)),
    );

    // Startup animation: slide in from bottom (ease-out cubic).
    let elapsed = now.duration_since(menu_state.animation_start).as_millis() as u32;
    let anim_duration = 500u32;
    let t = (elapsed as f32 / anim_duration as f32).min(1.0);
    let offset_t = 1.0 - (1.0 - t).powi(3);
    let anim_y_offset = ((1.0 - offset_t) * 10.0) as u16;
    let mut anim_popup = popup;
    anim_popup.y += anim_y_offset;

    p.render(anim_popup, frame.buffer_mut());
}

fn draw_pause_overlay(frame: &mut Frame, state: &GameState, area: Rect) {
    let popup_w = 28u16;
    let popup_h = 5u16;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(popup_w) / 2,
        y: area.y + area.height.saturating_sub(popup_h) / 2,
        width: popup_w.min(area.width),
        height: popup_h.min(area.height),
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P — Resume    Q — Quit ",
            Style::default().fg(state.theme.main_fg),
        )),
    ];
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(state.theme.div_line).bg(state.theme.bg)),
    );
    p.render(popup, frame.buffer_mut());
}

fn draw_game_over(
    frame: &mut Frame,
    state: &GameState,
    area: Rect,
    high_score: u32,
    new_high_score: bool,
) {
    let total_w = BOARD_PIXEL_W + SIDEBAR_WIDTH;
    let total_h = BOARD_PIXEL_H;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(total_w) / 2,
        y: area.y + area.height.saturating_sub(total_h) / 2,
        width: total_w.min(area.width),
        height: total_h.min(area.height),
    };
    let mut lines: Vec<Line> = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Game Over ",
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!(" Score: {} ", state.score),
            Style::default().fg(state.theme.main_fg),
        )),
        Line::from(Span::styled(
            format!(" Best: {} ", high_score),
            Style::default().fg(state.theme.main_fg),
        )),
        Line::from(Span::styled(
            format!(" Level: {} ", state.level),
            Style::default().fg(state.theme.main_fg),
        )),
    ];
    if new_high_score {
        lines.push(Line::from(Span::styled(
            " New record! ",
            Style::default().fg(Color::Yellow).bold(),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " R / SPACE — Retry    Q — Quit ",
        Style::default().fg(state.theme.main_fg),
    )));
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(state.theme.div_line).bg(state.theme.bg))
            .title(Span::styled(" neondrop ", state.theme.title)),
    );
    p.render(popup, frame.buffer_mut());
}

/// Draw game: board + sidebar; use full area and center the board.
fn draw_game(frame: &mut Frame, state: &GameState, area: Rect, high_score: u32) {
    let total_w = BOARD_PIXEL_W + SIDEBAR_WIDTH;

    let horiz_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);

    let vert_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(BOARD_PIXEL_H),
            Constraint::Fill(1),
        ])
        .split(horiz_chunks[1]);

    let (board_area, sidebar_area) = {
        let inner = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(BOARD_PIXEL_W),
                Constraint::Length(SIDEBAR_WIDTH),
            ])
            .split(vert_chunks[1]);
        (inner[0], inner[1])
    };

    draw_board(frame, state, board_area);
    draw_sidebar(frame, state, sidebar_area, high_score);
}

fn draw_board(frame: &mut Frame, state: &GameState, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(state.theme.div_line).bg(state.theme.bg))
        .title(Span::styled(" neondrop ", state.theme.title));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let flash_set: HashSet<(usize, usize)> = if matches!(state.phase, Phase::Flashing { .. }) {
        state.matched.iter().copied().collect()
    } else {
        HashSet::new()
    };

    // Active pair cells (rows above the grid stay hidden).
    let mut piece_cells: Vec<((i32, i32), BallColor)> = Vec::new();
    if let Some(ref piece) = state.piece {
        for (pos, color) in piece.positions().iter().zip(piece.colors) {
            if pos.1 >= 0 {
                piece_cells.push((*pos, color));
            }
        }
    }

    let buf = frame.buffer_mut();
    for y in 0..game::ROWS {
        for x in 0..game::COLS {
            let rx = inner.x + (x as u16) * CELL_WIDTH;
            let ry = inner.y + (y as u16) * CELL_HEIGHT;
            if rx >= inner.x + inner.width || ry >= inner.y + inner.height {
                continue;
            }

            let piece_color = piece_cells
                .iter()
                .find(|((px, py), _)| (*px, *py) == (x as i32, y as i32))
                .map(|&(_, color)| color);
            let ball = piece_color.or_else(|| state.board.get(x, y));

            let (symbol, style) = if flash_set.contains(&(x, y)) {
                (
                    "●",
                    Style::default().fg(Color::White).bg(state.theme.bg).bold(),
                )
            } else if let Some(color) = ball {
                (
                    "●",
                    Style::default()
                        .fg(state.ball_color(color))
                        .bg(state.theme.bg),
                )
            } else {
                (
                    "·",
                    Style::default()
                        .fg(state.theme.div_line)
                        .bg(state.theme.bg),
                )
            };
            buf[(rx, ry)].set_symbol(symbol).set_style(style);
            if rx + 1 < inner.x + inner.width {
                buf[(rx + 1, ry)]
                    .set_symbol(" ")
                    .set_style(Style::default().bg(state.theme.bg));
            }
        }
    }
}

fn sidebar_block_style(state: &GameState) -> Style {
    Style::default().fg(state.theme.div_line).bg(state.theme.bg)
}

fn draw_sidebar(frame: &mut Frame, state: &GameState, area: Rect, high_score: u32) {
    let title_style = Style::default().fg(state.theme.title);
    let fg_style = Style::default().fg(state.theme.main_fg);
    let border_style = sidebar_block_style(state);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Next (border + title + two stacked pairs)
            Constraint::Length(1), // gap
            Constraint::Length(4), // Colours (border + title + strip)
            Constraint::Length(1), // gap
            Constraint::Length(5), // Stats (border + score, best, level)
            Constraint::Length(1), // gap
            Constraint::Length(4), // Chain (border + chain + level progress)
        ])
        .split(area);

    // --- Next (own border) ---
    let next_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    let next_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(2)])
        .split(next_inner);
    Paragraph::new(Line::from(Span::styled("Next", title_style)))
        .render(next_layout[0], frame.buffer_mut());
    draw_next_preview(frame, state, next_layout[1]);

    // --- Colours (own border) ---
    let colours_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let colours_inner = colours_block.inner(chunks[2]);
    colours_block.render(chunks[2], frame.buffer_mut());
    let colours_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(colours_inner);
    Paragraph::new(Line::from(Span::styled("Colours", title_style)))
        .render(colours_layout[0], frame.buffer_mut());
    draw_colour_strip(frame, state, colours_layout[1]);

    // --- Stats (own border): Score, Best, Level ---
    let stats_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let stats_inner = stats_block.inner(chunks[4]);
    stats_block.render(chunks[4], frame.buffer_mut());
    let stats_lines = vec![
        Line::from(vec![
            Span::styled("Score: ", title_style),
            Span::styled(state.score.to_string(), fg_style),
        ]),
        Line::from(vec![
            Span::styled("Best: ", title_style),
            Span::styled(high_score.to_string(), fg_style),
        ]),
        Line::from(vec![
            Span::styled("Level: ", title_style),
            Span::styled(state.level.to_string(), fg_style),
        ]),
    ];
    Paragraph::new(ratatui::text::Text::from(stats_lines)).render(stats_inner, frame.buffer_mut());

    // --- Chain (own border): chain count above, level progress below ---
    let chain_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let chain_inner = chain_block.inner(chunks[6]);
    chain_block.render(chunks[6], frame.buffer_mut());
    let chain_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(chain_inner);
    let chain_label = if state.is_resolving() && state.chain > 0 {
        format!("Chain x{}", state.chain)
    } else {
        "Chain".to_string()
    };
    Paragraph::new(Line::from(Span::styled(chain_label, title_style)))
        .render(chain_layout[0], frame.buffer_mut());
    // Progress toward the next level (500 points per level).
    let progress = if state.level >= 10 {
        1.0
    } else {
        f64::from(state.score % 500) / 500.0
    };
    let gauge = Gauge::default()
        .ratio(progress)
        .label("")
        .gauge_style(Style::default().fg(state.theme.balls[0]).bg(state.theme.bg));
    gauge.render(chain_layout[1], frame.buffer_mut());
}

/// Draw the next 2 queued pairs side by side, each as a vertical pair
/// (slot 0 on top, the spawn orientation).
fn draw_next_preview(frame: &mut Frame, state: &GameState, area: Rect) {
    let pw = 5u16;
    for (i, pair) in state.queue.peek(2).enumerate() {
        let x = area.x + (i as u16) * pw;
        if x + 1 >= area.x + area.width {
            break;
        }
        for (j, &color) in pair.iter().enumerate() {
            let y = area.y + j as u16;
            if y >= area.y + area.height {
                break;
            }
            let style = Style::default()
                .fg(state.ball_color(color))
                .bg(state.theme.bg);
            frame.buffer_mut().set_string(x + 1, y, "●", style);
        }
    }
}

/// Draw a row of 4 coloured blocks (ball palette).
fn draw_colour_strip(frame: &mut Frame, state: &GameState, area: Rect) {
    let block_w = (area.width / 4).max(1);
    for i in 0..4u8 {
        let r = Rect {
            x: area.x + u16::from(i) * block_w,
            y: area.y,
            width: block_w,
            height: area.height.min(1),
        };
        let c = state.theme.ball_color(i);
        let p = Paragraph::new("█").style(Style::default().fg(c).bg(c));
        p.render(r, frame.buffer_mut());
    }
}

pub fn draw_quit_menu(frame: &mut Frame, state: &GameState, selected: QuitOption) {
    let area = frame.area();
    let qw = 24;
    let qh = 8;
    let quit_rect = Rect {
        x: area.x + area.width.saturating_sub(qw) / 2,
        y: area.y + area.height.saturating_sub(qh) / 2,
        width: qw,
        height: qh,
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(state.theme.title))
        .title(" Quit? ");

    // Clear background
    for y in quit_rect.y..quit_rect.y + quit_rect.height {
        for x in quit_rect.x..quit_rect.x + quit_rect.width {
            frame.buffer_mut()[(x, y)].set_style(Style::default().bg(state.theme.bg));
        }
    }

    let inner = block.inner(quit_rect);
    block.render(quit_rect, frame.buffer_mut());

    let options = [
        (QuitOption::Resume, " Resume "),
        (QuitOption::MainMenu, " Main Menu "),
        (QuitOption::Exit, " Exit "),
    ];

    for (i, (opt, label)) in options.iter().enumerate() {
        let style = if *opt == selected {
            Style::default()
                .fg(state.theme.bg)
                .bg(state.theme.title)
                .bold()
        } else {
            Style::default().fg(state.theme.title)
        };
        let rx = inner.x + (inner.width.saturating_sub(label.len() as u16)) / 2;
        let ry = inner.y + 1 + i as u16 * 2;
        frame.buffer_mut().set_string(rx, ry, label, style);
    }
}

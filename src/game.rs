//! Game state: board, falling pair, match detection, gravity, chains, scoring.

use crate::theme::Theme;
use rand::Rng;
use ratatui::style::Color;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

pub const COLS: usize = 6;
pub const ROWS: usize = 12;

/// Spawn column of the pivot ball (middle-left of the 6-wide grid).
const SPAWN_X: i32 = COLS as i32 / 2 - 1;
/// The pivot spawns one row above the visible grid.
const SPAWN_Y: i32 = -1;

/// Matched balls flash for this long before they are removed.
pub const MATCH_FLASH_MS: u64 = 350;
/// Pacing between gravity compaction and the next match scan.
pub const CASCADE_SETTLE_MS: u64 = 300;

/// Connected groups of at least this many same-colour balls pop.
const MATCH_MIN: usize = 4;

const BASE_DROP_MS: u64 = 1000;
const DROP_STEP_MS: u64 = 90;
const MIN_DROP_MS: u64 = 100;
const MAX_LEVEL: u32 = 10;
const LEVEL_SCORE_STEP: u32 = 500;

/// Ball colours (exactly 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BallColor {
    Green,
    Yellow,
    Red,
    Blue,
}

impl BallColor {
    pub const ALL: [Self; 4] = [Self::Green, Self::Yellow, Self::Red, Self::Blue];

    /// Colour index 0..4 for theme.ball_color().
    pub fn color_index(self) -> u8 {
        match self {
            Self::Green => 0,
            Self::Yellow => 1,
            Self::Red => 2,
            Self::Blue => 3,
        }
    }

    /// Uniform draw. Queue entries sample each ball independently; there is
    /// no bag or shuffle.
    pub fn random() -> Self {
        Self::ALL[rand::rng().random_range(0..Self::ALL.len())]
    }
}

/// Orientation of the falling pair: where ball slot 1 sits relative to the
/// pivot, and which grid cell each colour slot occupies. Colours stay
/// attached to their slot; flipped variants swap the geometry only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Slot 0 on the pivot, slot 1 directly below.
    Vertical,
    /// Slot 0 on the pivot, slot 1 to the right.
    Horizontal,
    /// Slot 0 below the pivot cell, slot 1 on it.
    VerticalFlipped,
    /// Slot 0 right of the pivot cell, slot 1 on it.
    HorizontalFlipped,
}

impl Orientation {
    /// (dx, dy) of each colour slot's cell relative to the pivot.
    pub const fn offsets(self) -> [(i32, i32); 2] {
        match self {
            Self::Vertical => [(0, 0), (0, 1)],
            Self::Horizontal => [(0, 0), (1, 0)],
            Self::VerticalFlipped => [(0, 1), (0, 0)],
            Self::HorizontalFlipped => [(1, 0), (0, 0)],
        }
    }

    pub const fn rotated_cw(self) -> Self {
        match self {
            Self::Vertical => Self::Horizontal,
            Self::Horizontal => Self::VerticalFlipped,
            Self::VerticalFlipped => Self::HorizontalFlipped,
            Self::HorizontalFlipped => Self::Vertical,
        }
    }
}

/// Falling pair: pivot position plus orientation. `y` may be negative while
/// part of the pair is still above the visible grid.
#[derive(Debug, Clone)]
pub struct Piece {
    pub x: i32,
    pub y: i32,
    pub orientation: Orientation,
    pub colors: [BallColor; 2],
}

impl Piece {
    pub fn new(colors: [BallColor; 2]) -> Self {
        Self {
            x: SPAWN_X,
            y: SPAWN_Y,
            orientation: Orientation::Vertical,
            colors,
        }
    }

    /// Grid cell of each colour slot. The two cells are always orthogonally
    /// adjacent.
    pub fn positions(&self) -> [(i32, i32); 2] {
        let offsets = self.orientation.offsets();
        [
            (self.x + offsets[0].0, self.y + offsets[0].1),
            (self.x + offsets[1].0, self.y + offsets[1].1),
        ]
    }

    /// No validation; the caller reverts when the new orientation does not fit.
    pub fn rotate_clockwise(&mut self) {
        self.orientation = self.orientation.rotated_cw();
    }
}

/// Playfield: 6x12 grid of balls. y=0 is the top row.
#[derive(Debug, Clone)]
pub struct Board {
    pub cols: usize,
    pub rows: usize,
    grid: Vec<Vec<Option<BallColor>>>,
}

impl Board {
    pub fn new() -> Self {
        Self {
            cols: COLS,
            rows: ROWS,
            grid: vec![vec![None; COLS]; ROWS],
        }
    }

    pub fn clear(&mut self) {
        for row in &mut self.grid {
            row.fill(None);
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<BallColor> {
        self.grid.get(y).and_then(|row| row.get(x)).copied().flatten()
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, cell: Option<BallColor>) {
        if x < self.cols && y < self.rows {
            self.grid[y][x] = cell;
        }
    }

    /// True if a pair at (x, y) with the given orientation fits: both cells
    /// inside the columns, above the floor, and not overlapping a settled
    /// ball. Rows above the grid (y < 0) are legal. Never mutates the board.
    pub fn is_valid_position(&self, x: i32, y: i32, orientation: Orientation) -> bool {
        for (dx, dy) in orientation.offsets() {
            let (cx, cy) = (x + dx, y + dy);
            if cx < 0 || cx >= self.cols as i32 {
                return false;
            }
            if cy >= self.rows as i32 {
                return false;
            }
            if cy >= 0 && self.get(cx as usize, cy as usize).is_some() {
                return false;
            }
        }
        true
    }

    /// Commit a pair into the grid, letting each ball fall to its resting
    /// row. The lower ball settles first so a vertical pair stacks without a
    /// gap. Balls still above the grid are skipped. The caller guarantees the
    /// position is legal.
    pub fn add_piece(&mut self, piece: &Piece) {
        let positions = piece.positions();
        let mut balls: Vec<(i32, i32, BallColor)> = positions
            .iter()
            .zip(piece.colors)
            .map(|(&(x, y), color)| (x, y, color))
            .collect();
        balls.sort_by_key(|&(_, y, _)| std::cmp::Reverse(y));

        for (x, y, color) in balls {
            if y < 0 {
                continue;
            }
            let x = x as usize;
            let mut landing = y as usize;
            while landing + 1 < self.rows && self.get(x, landing + 1).is_none() {
                landing += 1;
            }
            self.set(x, landing, Some(color));
        }
    }

    /// All cells belonging to 4-connected same-colour groups of 4 or more,
    /// collected across the whole grid in one scan. The visited set is shared
    /// between groups so every cell is expanded at most once.
    pub fn find_matches(&self) -> Vec<(usize, usize)> {
        let mut visited: HashSet<(usize, usize)> = HashSet::new();
        let mut matches = Vec::new();
        for y in 0..self.rows {
            for x in 0..self.cols {
                let Some(color) = self.get(x, y) else { continue };
                if visited.contains(&(x, y)) {
                    continue;
                }
                let group = self.flood_fill(x, y, color, &mut visited);
                if group.len() >= MATCH_MIN {
                    matches.extend(group);
                }
            }
        }
        matches
    }

    /// BFS over 4-adjacent cells of the same colour.
    fn flood_fill(
        &self,
        x: usize,
        y: usize,
        color: BallColor,
        visited: &mut HashSet<(usize, usize)>,
    ) -> Vec<(usize, usize)> {
        const NEIGHBOURS_4: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
        let mut queue = VecDeque::from([(x, y)]);
        let mut group = Vec::new();
        visited.insert((x, y));

        while let Some((cx, cy)) = queue.pop_front() {
            group.push((cx, cy));
            for (dx, dy) in NEIGHBOURS_4 {
                let nx = cx as i32 + dx;
                let ny = cy as i32 + dy;
                if nx < 0 || nx >= self.cols as i32 || ny < 0 || ny >= self.rows as i32 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if !visited.contains(&(nx, ny)) && self.get(nx, ny) == Some(color) {
                    visited.insert((nx, ny));
                    queue.push_back((nx, ny));
                }
            }
        }
        group
    }

    /// Empty the given cells; returns how many were cleared.
    pub fn remove_matches(&mut self, cells: &[(usize, usize)]) -> usize {
        for &(x, y) in cells {
            self.set(x, y, None);
        }
        cells.len()
    }

    /// Compact every column downward. Returns true if any ball moved.
    /// Afterwards no column has a hole below a ball.
    pub fn apply_gravity(&mut self) -> bool {
        let mut moved = false;
        for x in 0..self.cols {
            for y in (0..self.rows).rev() {
                if self.get(x, y).is_some() {
                    continue;
                }
                // Nearest ball above drops into this hole; rows it vacates
                // are re-checked as the outer scan moves up.
                for k in (0..y).rev() {
                    if let Some(color) = self.get(x, k) {
                        self.set(x, y, Some(color));
                        self.set(x, k, None);
                        moved = true;
                        break;
                    }
                }
            }
        }
        moved
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// Upcoming colour pairs, kept topped up to at least 3 entries.
#[derive(Debug, Clone)]
pub struct PieceQueue {
    queue: VecDeque<[BallColor; 2]>,
}

impl PieceQueue {
    pub fn new() -> Self {
        let mut q = Self {
            queue: VecDeque::with_capacity(4),
        };
        q.refill();
        q
    }

    fn refill(&mut self) {
        while self.queue.len() < 3 {
            self.queue.push_back([BallColor::random(), BallColor::random()]);
        }
    }

    pub fn next(&mut self) -> [BallColor; 2] {
        self.refill();
        self.queue
            .pop_front()
            .unwrap_or_else(|| [BallColor::random(), BallColor::random()])
    }

    /// Upcoming pairs for the preview, front first.
    pub fn peek(&self, n: usize) -> impl Iterator<Item = &[BallColor; 2]> {
        self.queue.iter().take(n)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for PieceQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller phase. The resolving steps carry their wake-up deadline;
/// `update` advances them once the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A pair is active and accepts input and fall ticks.
    Falling,
    /// Matched balls are flashing; removal happens at the deadline.
    Flashing { until: Instant },
    /// Gravity has run; the next match scan happens at the deadline.
    Settling { until: Instant },
    /// Terminal until restart. The final score stands.
    GameOver,
}

/// Game state: board, active pair, queue, score, level, cascade phase.
#[derive(Debug)]
pub struct GameState {
    pub theme: Theme,
    pub board: Board,
    pub piece: Option<Piece>,
    pub queue: PieceQueue,
    pub score: u32,
    pub level: u32,
    /// Cascade steps with a match since the last lock.
    pub chain: u32,
    pub drop_interval: Duration,
    pub phase: Phase,
    /// Cells that just matched, kept for the flash animation.
    pub matched: Vec<(usize, usize)>,
    /// When set, levelling up does not shorten the drop interval.
    relaxed: bool,
}

impl GameState {
    pub fn new(theme: Theme, config: &crate::GameConfig) -> Self {
        let mut state = Self {
            theme,
            board: Board::new(),
            piece: None,
            queue: PieceQueue::new(),
            score: 0,
            level: 1,
            chain: 0,
            drop_interval: drop_interval_for_level(1),
            phase: Phase::Falling,
            matched: Vec::new(),
            relaxed: config.relaxed,
        };
        state.restart(config);
        state
    }

    /// Reset the session for a new game: board emptied, queue refreshed,
    /// score and level back to their starting values, first pair spawned.
    pub fn restart(&mut self, config: &crate::GameConfig) {
        self.board.clear();
        self.queue = PieceQueue::new();
        self.score = 0;
        self.level = config.initial_level.clamp(1, MAX_LEVEL);
        self.chain = 0;
        self.drop_interval = drop_interval_for_level(self.level);
        self.matched.clear();
        self.relaxed = config.relaxed;
        self.spawn_piece();
    }

    pub fn game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    /// True while a cascade (flash or settle pacing) is in progress.
    pub fn is_resolving(&self) -> bool {
        matches!(self.phase, Phase::Flashing { .. } | Phase::Settling { .. })
    }

    /// Pop the next pair from the queue onto the field. A blocked spawn cell
    /// ends the game.
    fn spawn_piece(&mut self) {
        let piece = Piece::new(self.queue.next());
        if self.board.is_valid_position(piece.x, piece.y, piece.orientation) {
            self.piece = Some(piece);
            self.phase = Phase::Falling;
        } else {
            self.piece = None;
            self.phase = Phase::GameOver;
        }
    }

    /// Advance the cascade when a resolution deadline has passed. Called
    /// every frame. Not gated on pause: a cascade started by a lock runs to
    /// completion.
    pub fn update(&mut self, now: Instant) {
        match self.phase {
            Phase::Flashing { until } if now >= until => {
                let cleared = self.board.remove_matches(&self.matched);
                self.matched.clear();
                self.add_score(cleared as u32);
                self.board.apply_gravity();
                self.phase = Phase::Settling {
                    until: now + Duration::from_millis(CASCADE_SETTLE_MS),
                };
            }
            Phase::Settling { until } if now >= until => {
                self.resolve_step(now);
            }
            _ => {}
        }
    }

    /// One cascade iteration: no matches ends the cascade and spawns the next
    /// pair; otherwise the chain grows and the matched cells start flashing.
    fn resolve_step(&mut self, now: Instant) {
        let matches = self.board.find_matches();
        if matches.is_empty() {
            self.matched.clear();
            self.spawn_piece();
        } else {
            self.chain += 1;
            self.matched = matches;
            self.phase = Phase::Flashing {
                until: now + Duration::from_millis(MATCH_FLASH_MS),
            };
        }
    }

    fn lock_piece(&mut self, now: Instant) {
        if let Some(piece) = self.piece.take() {
            self.board.add_piece(&piece);
        }
        self.chain = 0;
        self.resolve_step(now);
    }

    /// Horizontal move; reverted if the pair would leave the grid or overlap.
    pub fn move_piece(&mut self, dx: i32) {
        if self.phase != Phase::Falling {
            return;
        }
        if let Some(ref mut piece) = self.piece {
            piece.x += dx;
            if !self.board.is_valid_position(piece.x, piece.y, piece.orientation) {
                piece.x -= dx;
            }
        }
    }

    /// Clockwise rotation with two wall kicks: one column left, then one
    /// column right of the original. If neither fits, the rotation is undone.
    pub fn rotate(&mut self) {
        if self.phase != Phase::Falling {
            return;
        }
        if let Some(ref mut piece) = self.piece {
            let original = piece.orientation;
            piece.rotate_clockwise();
            if self.board.is_valid_position(piece.x, piece.y, piece.orientation) {
                return;
            }
            piece.x -= 1;
            if self.board.is_valid_position(piece.x, piece.y, piece.orientation) {
                return;
            }
            piece.x += 2;
            if self.board.is_valid_position(piece.x, piece.y, piece.orientation) {
                return;
            }
            piece.x -= 1;
            piece.orientation = original;
        }
    }

    /// One-row descent, used by both the fall timer and the player. Landing
    /// locks the pair and starts the cascade.
    pub fn soft_drop(&mut self, now: Instant) {
        if self.phase != Phase::Falling {
            return;
        }
        let Some(ref mut piece) = self.piece else {
            return;
        };
        piece.y += 1;
        if !self.board.is_valid_position(piece.x, piece.y, piece.orientation) {
            piece.y -= 1;
            self.lock_piece(now);
        }
    }

    /// Drop to the lowest valid row and lock immediately.
    pub fn hard_drop(&mut self, now: Instant) {
        if self.phase != Phase::Falling {
            return;
        }
        let Some(ref mut piece) = self.piece else {
            return;
        };
        while self
            .board
            .is_valid_position(piece.x, piece.y + 1, piece.orientation)
        {
            piece.y += 1;
        }
        self.lock_piece(now);
    }

    /// cleared x 10, doubled per chain step past the first, scaled by level.
    /// Every 500 points is a level (capped at 10); levelling up shortens the
    /// drop interval by 90 ms per level down to the 100 ms floor.
    fn add_score(&mut self, cleared: u32) {
        let base = cleared * 10;
        let chain_bonus = if self.chain > 1 { 1 << (self.chain - 1) } else { 1 };
        self.score += base * chain_bonus * self.level;

        let new_level = (self.score / LEVEL_SCORE_STEP + 1).min(MAX_LEVEL);
        if new_level > self.level {
            self.level = new_level;
            if !self.relaxed {
                self.drop_interval = drop_interval_for_level(new_level);
            }
        }
    }

    pub fn ball_color(&self, color: BallColor) -> Color {
        self.theme.ball_color(color.color_index())
    }
}

fn drop_interval_for_level(level: u32) -> Duration {
    let ms = BASE_DROP_MS
        .saturating_sub(u64::from(level.saturating_sub(1)) * DROP_STEP_MS)
        .max(MIN_DROP_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use BallColor::{Blue, Green, Red, Yellow};

    fn test_config() -> crate::GameConfig {
        crate::GameConfig {
            initial_level: 1,
            relaxed: false,
        }
    }

    fn test_state() -> GameState {
        GameState::new(Theme::default(), &test_config())
    }

    fn fill(board: &mut Board, cells: &[(usize, usize, BallColor)]) {
        for &(x, y, color) in cells {
            board.set(x, y, Some(color));
        }
    }

    fn column_colors(board: &Board, x: usize) -> Vec<BallColor> {
        let mut colors: Vec<BallColor> = (0..board.rows).filter_map(|y| board.get(x, y)).collect();
        colors.sort_by_key(|c| c.color_index());
        colors
    }

    #[test]
    fn positions_follow_orientation_table() {
        let mut piece = Piece::new([Red, Blue]);
        piece.x = 2;
        piece.y = 5;
        assert_eq!(piece.positions(), [(2, 5), (2, 6)]);
        piece.rotate_clockwise();
        assert_eq!(piece.positions(), [(2, 5), (3, 5)]);
        piece.rotate_clockwise();
        // Flipped: slot 0 takes the lower cell, colours keep their slot.
        assert_eq!(piece.positions(), [(2, 6), (2, 5)]);
        piece.rotate_clockwise();
        assert_eq!(piece.positions(), [(3, 5), (2, 5)]);
        piece.rotate_clockwise();
        assert_eq!(piece.orientation, Orientation::Vertical);
    }

    #[test]
    fn valid_position_allows_rows_above_grid() {
        let board = Board::new();
        assert!(board.is_valid_position(2, -1, Orientation::Vertical));
        assert!(board.is_valid_position(2, -2, Orientation::Vertical));
    }

    #[test]
    fn valid_position_rejects_walls_floor_and_overlap() {
        let mut board = Board::new();
        assert!(!board.is_valid_position(-1, 5, Orientation::Vertical));
        assert!(!board.is_valid_position(5, 5, Orientation::Horizontal));
        assert!(!board.is_valid_position(2, 11, Orientation::Vertical));
        fill(&mut board, &[(2, 6, Red)]);
        assert!(!board.is_valid_position(2, 5, Orientation::Vertical));
        assert!(board.is_valid_position(2, 4, Orientation::Vertical));
    }

    #[test]
    fn valid_position_never_mutates() {
        let mut board = Board::new();
        fill(&mut board, &[(0, 11, Green), (3, 7, Red)]);
        let before = board.clone();
        board.is_valid_position(0, 10, Orientation::Vertical);
        board.is_valid_position(-3, 40, Orientation::HorizontalFlipped);
        assert_eq!(before.grid, board.grid);
    }

    #[test]
    fn vertical_pair_settles_without_gap() {
        let mut board = Board::new();
        let mut piece = Piece::new([Red, Blue]);
        piece.x = 0;
        piece.y = 2;
        board.add_piece(&piece);
        // Slot 1 (Blue) is the lower ball; it lands first, Red stacks on it.
        assert_eq!(board.get(0, 11), Some(Blue));
        assert_eq!(board.get(0, 10), Some(Red));
        assert_eq!(board.get(0, 9), None);
    }

    #[test]
    fn flipped_pair_settles_with_slot_zero_below() {
        let mut board = Board::new();
        let mut piece = Piece::new([Red, Blue]);
        piece.x = 3;
        piece.y = 0;
        piece.orientation = Orientation::VerticalFlipped;
        board.add_piece(&piece);
        assert_eq!(board.get(3, 11), Some(Red));
        assert_eq!(board.get(3, 10), Some(Blue));
    }

    #[test]
    fn horizontal_pair_settles_per_column() {
        let mut board = Board::new();
        fill(&mut board, &[(1, 11, Green)]);
        let mut piece = Piece::new([Red, Blue]);
        piece.x = 0;
        piece.y = 4;
        piece.orientation = Orientation::Horizontal;
        board.add_piece(&piece);
        assert_eq!(board.get(0, 11), Some(Red));
        assert_eq!(board.get(1, 10), Some(Blue));
    }

    #[test]
    fn add_piece_skips_balls_above_grid() {
        let mut board = Board::new();
        // Stack up column 2 so the pair locks at spawn height with the top
        // ball still off-screen.
        for y in 1..12 {
            board.set(2, y, Some(Green));
        }
        let piece = Piece::new([Red, Blue]);
        board.add_piece(&piece);
        assert_eq!(board.get(2, 0), Some(Blue));
        // Only 12 balls in the column: the off-screen Red was dropped.
        assert_eq!(column_colors(&board, 2).len(), 12);
    }

    #[test]
    fn find_matches_detects_bent_group_of_four() {
        let mut board = Board::new();
        fill(
            &mut board,
            &[(0, 11, Red), (1, 11, Red), (2, 11, Red), (2, 10, Red)],
        );
        let mut matches = board.find_matches();
        matches.sort_unstable();
        assert_eq!(matches, vec![(0, 11), (1, 11), (2, 10), (2, 11)]);
    }

    #[test]
    fn find_matches_ignores_groups_of_three() {
        let mut board = Board::new();
        fill(&mut board, &[(0, 11, Red), (1, 11, Red), (2, 11, Red)]);
        assert!(board.find_matches().is_empty());
    }

    #[test]
    fn find_matches_does_not_mix_colours() {
        let mut board = Board::new();
        fill(
            &mut board,
            &[(0, 11, Red), (1, 11, Red), (2, 11, Yellow), (3, 11, Red)],
        );
        assert!(board.find_matches().is_empty());
    }

    #[test]
    fn find_matches_returns_all_groups_in_one_pass() {
        let mut board = Board::new();
        fill(
            &mut board,
            &[
                (0, 8, Red),
                (0, 9, Red),
                (0, 10, Red),
                (0, 11, Red),
                (5, 8, Blue),
                (5, 9, Blue),
                (5, 10, Blue),
                (5, 11, Blue),
            ],
        );
        assert_eq!(board.find_matches().len(), 8);
    }

    #[test]
    fn gravity_compacts_and_preserves_columns() {
        let mut board = Board::new();
        fill(
            &mut board,
            &[(0, 2, Red), (0, 5, Blue), (0, 8, Green), (3, 0, Yellow)],
        );
        let before_col0 = column_colors(&board, 0);
        let moved = board.apply_gravity();
        assert!(moved);
        assert_eq!(column_colors(&board, 0), before_col0);
        assert_eq!(board.get(0, 11), Some(Green));
        assert_eq!(board.get(0, 10), Some(Blue));
        assert_eq!(board.get(0, 9), Some(Red));
        assert_eq!(board.get(3, 11), Some(Yellow));
        // Full compaction: no hole below any ball.
        for x in 0..board.cols {
            let mut seen_ball = false;
            for y in 0..board.rows {
                if board.get(x, y).is_some() {
                    seen_ball = true;
                } else {
                    assert!(!seen_ball, "hole below a ball in column {x}");
                }
            }
        }
        assert!(!board.apply_gravity());
    }

    #[test]
    fn remove_then_gravity_conserves_other_balls() {
        let mut board = Board::new();
        fill(
            &mut board,
            &[
                (1, 8, Yellow),
                (1, 9, Red),
                (1, 10, Red),
                (1, 11, Red),
                (2, 11, Red),
                (2, 10, Blue),
            ],
        );
        let matches = board.find_matches();
        assert_eq!(matches.len(), 4);
        assert_eq!(board.remove_matches(&matches), 4);
        board.apply_gravity();
        assert_eq!(board.get(1, 11), Some(Yellow));
        assert_eq!(board.get(2, 11), Some(Blue));
        let total: usize = (0..board.cols).map(|x| column_colors(&board, x).len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn score_four_at_chain_one_level_one() {
        let mut state = test_state();
        state.chain = 1;
        state.add_score(4);
        assert_eq!(state.score, 40);
        assert_eq!(state.level, 1);
    }

    #[test]
    fn score_doubles_on_second_chain_step() {
        let mut state = test_state();
        state.chain = 2;
        state.add_score(4);
        assert_eq!(state.score, 80);
        state.chain = 3;
        state.add_score(4);
        assert_eq!(state.score, 80 + 160);
    }

    #[test]
    fn level_up_at_500_shortens_drop_interval() {
        let mut state = test_state();
        state.score = 460;
        state.chain = 1;
        state.add_score(4);
        assert_eq!(state.score, 500);
        assert_eq!(state.level, 2);
        assert_eq!(state.drop_interval, Duration::from_millis(910));
    }

    #[test]
    fn level_caps_at_ten() {
        let mut state = test_state();
        state.score = 99_000;
        state.chain = 1;
        state.add_score(4);
        assert_eq!(state.level, 10);
        assert_eq!(state.drop_interval, Duration::from_millis(190));
    }

    #[test]
    fn relaxed_keeps_drop_interval_on_level_up() {
        let mut state = GameState::new(
            Theme::default(),
            &crate::GameConfig {
                initial_level: 1,
                relaxed: true,
            },
        );
        state.score = 499;
        state.chain = 1;
        state.add_score(4);
        assert_eq!(state.level, 2);
        assert_eq!(state.drop_interval, Duration::from_millis(1000));
    }

    #[test]
    fn rotate_kicks_off_right_wall() {
        let mut state = test_state();
        let mut piece = Piece::new([Red, Blue]);
        piece.x = 5;
        piece.y = 5;
        state.piece = Some(piece);
        state.rotate();
        let piece = state.piece.as_ref().unwrap();
        // Horizontal does not fit at column 5; the left kick lands it at 4.
        assert_eq!(piece.orientation, Orientation::Horizontal);
        assert_eq!(piece.x, 4);
    }

    #[test]
    fn rotate_reverts_when_no_kick_fits() {
        let mut state = test_state();
        fill(&mut state.board, &[(4, 5, Green)]);
        let mut piece = Piece::new([Red, Blue]);
        piece.x = 5;
        piece.y = 5;
        state.piece = Some(piece);
        state.rotate();
        let piece = state.piece.as_ref().unwrap();
        assert_eq!(piece.orientation, Orientation::Vertical);
        assert_eq!(piece.x, 5);
        assert_eq!(piece.y, 5);
    }

    #[test]
    fn move_reverts_at_walls() {
        let mut state = test_state();
        for _ in 0..10 {
            state.move_piece(-1);
        }
        assert_eq!(state.piece.as_ref().unwrap().x, 0);
        for _ in 0..10 {
            state.move_piece(1);
        }
        assert_eq!(state.piece.as_ref().unwrap().x, 5);
    }

    #[test]
    fn soft_drop_locks_on_floor_and_spawns_next() {
        let now = Instant::now();
        let mut state = test_state();
        state.piece = Some(Piece::new([Red, Blue]));
        while state.board.get(2, 11).is_none() {
            state.soft_drop(now);
        }
        assert_eq!(state.board.get(2, 11), Some(Blue));
        assert_eq!(state.board.get(2, 10), Some(Red));
        // Two balls cannot match; the cascade ends at once and the next pair
        // is already falling.
        assert_eq!(state.phase, Phase::Falling);
        assert_eq!(state.piece.as_ref().unwrap().y, -1);
    }

    #[test]
    fn hard_drop_matches_repeated_soft_drops() {
        let now = Instant::now();
        let mut soft = test_state();
        soft.piece = Some(Piece::new([Red, Blue]));
        while soft.board.get(2, 11).is_none() {
            soft.soft_drop(now);
        }
        let mut hard = test_state();
        hard.piece = Some(Piece::new([Red, Blue]));
        hard.hard_drop(now);
        assert_eq!(soft.board.grid, hard.board.grid);
        assert_eq!(hard.phase, Phase::Falling);
    }

    #[test]
    fn spawn_collision_is_game_over_with_score_kept() {
        let mut state = test_state();
        state.score = 1234;
        fill(&mut state.board, &[(2, 0, Green)]);
        state.spawn_piece();
        assert!(state.game_over());
        assert!(state.piece.is_none());
        assert_eq!(state.score, 1234);
    }

    #[test]
    fn cascade_resolves_chain_with_pacing() {
        let t0 = Instant::now();
        let mut state = test_state();
        state.piece = None;
        // Four reds stacked in column 0; yellows split so they only connect
        // after the reds pop and gravity pulls column 0 down.
        fill(
            &mut state.board,
            &[
                (0, 8, Red),
                (0, 9, Red),
                (0, 10, Red),
                (0, 11, Red),
                (0, 6, Yellow),
                (0, 7, Yellow),
                (1, 10, Yellow),
                (1, 11, Yellow),
            ],
        );
        state.chain = 0;
        state.resolve_step(t0);
        assert_eq!(state.chain, 1);
        assert_eq!(state.matched.len(), 4);
        assert!(matches!(state.phase, Phase::Flashing { .. }));

        // Before the flash deadline nothing moves.
        state.update(t0 + Duration::from_millis(100));
        assert!(matches!(state.phase, Phase::Flashing { .. }));
        assert_eq!(state.score, 0);

        let t1 = t0 + Duration::from_millis(MATCH_FLASH_MS);
        state.update(t1);
        assert_eq!(state.score, 40);
        assert!(matches!(state.phase, Phase::Settling { .. }));
        // Yellows have compacted into a 2x2 square.
        assert_eq!(state.board.get(0, 10), Some(Yellow));
        assert_eq!(state.board.get(0, 11), Some(Yellow));

        let t2 = t1 + Duration::from_millis(CASCADE_SETTLE_MS);
        state.update(t2);
        assert_eq!(state.chain, 2);
        assert!(matches!(state.phase, Phase::Flashing { .. }));

        let t3 = t2 + Duration::from_millis(MATCH_FLASH_MS);
        state.update(t3);
        assert_eq!(state.score, 40 + 80);

        let t4 = t3 + Duration::from_millis(CASCADE_SETTLE_MS);
        state.update(t4);
        assert_eq!(state.phase, Phase::Falling);
        assert!(state.piece.is_some());
    }

    #[test]
    fn input_is_ignored_while_resolving() {
        let t0 = Instant::now();
        let mut state = test_state();
        state.phase = Phase::Flashing {
            until: t0 + Duration::from_millis(MATCH_FLASH_MS),
        };
        let mut piece = Piece::new([Red, Blue]);
        piece.y = 5;
        state.piece = Some(piece);
        state.move_piece(1);
        state.rotate();
        state.soft_drop(t0);
        state.hard_drop(t0);
        let piece = state.piece.as_ref().unwrap();
        assert_eq!((piece.x, piece.y), (2, 5));
        assert_eq!(piece.orientation, Orientation::Vertical);
    }

    #[test]
    fn queue_keeps_at_least_three_pairs() {
        let mut queue = PieceQueue::new();
        assert!(queue.len() >= 3);
        for _ in 0..10 {
            queue.next();
            assert!(queue.len() >= 2);
        }
        assert_eq!(queue.peek(2).count(), 2);
    }

    #[test]
    fn new_session_starts_at_spawn() {
        let state = test_state();
        assert_eq!(state.score, 0);
        assert_eq!(state.level, 1);
        assert_eq!(state.drop_interval, Duration::from_millis(1000));
        assert_eq!(state.phase, Phase::Falling);
        let piece = state.piece.as_ref().unwrap();
        assert_eq!((piece.x, piece.y), (2, -1));
        assert_eq!(piece.orientation, Orientation::Vertical);
    }

    #[test]
    fn restart_after_game_over_clears_everything() {
        let mut state = test_state();
        state.score = 990;
        state.level = 2;
        fill(&mut state.board, &[(2, 0, Green), (0, 11, Red)]);
        state.spawn_piece();
        assert!(state.game_over());

        state.restart(&test_config());
        assert!(!state.game_over());
        assert_eq!(state.score, 0);
        assert_eq!(state.level, 1);
        assert_eq!(state.drop_interval, Duration::from_millis(1000));
        for x in 0..state.board.cols {
            assert!(column_colors(&state.board, x).is_empty());
        }
        assert!(state.piece.is_some());
    }
}

//! Neondrop — Puyo-style falling-ball chain-reaction puzzle in the terminal.

mod app;
mod game;
mod highscores;
mod input;
mod theme;
mod ui;

use anyhow::Result;
use app::App;
use clap::{Parser, ValueEnum};

/// Options derived from CLI that affect game behaviour.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub initial_level: u32,
    pub relaxed: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_default();
    let config = GameConfig {
        initial_level: args.initial_level,
        relaxed: args.relaxed,
    };
    let mut app = App::new(args, config, theme)?;
    app.run()?;
    Ok(())
}

/// Puyo-style chain-reaction puzzle game in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "neondrop",
    version,
    about = "Puyo-style falling-ball puzzle in the terminal. Connect 4 or more same-colour balls to pop them; chains multiply the score.",
    long_about = "Neondrop is a terminal puzzle game in the Puyo Puyo family.\n\n\
        Steer falling pairs of coloured balls onto a 6x12 board. Four or more \
        same-colour balls connected side-by-side pop; whatever was above them falls, \
        which can pop again — each extra chain step doubles the score. Every 500 \
        points is a level, and each level drops the balls faster.\n\n\
        CONTROLS (normal):\n  Left/Right  Move    Up         Rotate CW   Down       Soft drop\n  Enter/Space Hard drop   P          Pause      Q / Esc    Quit\n\n\
        CONTROLS (vim):\n  h/l         Move    k or x     Rotate CW   j          Soft drop\n  Space       Hard drop   p          Pause      q          Quit\n\n\
        Hold a movement key to keep the pair moving. Use --theme to load a btop-style theme (e.g. onedark.theme)."
)]
pub struct Args {
    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<std::path::PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Disable the match-pop animation (the cascade pacing itself is unchanged).
    #[arg(long)]
    pub no_animation: bool,

    /// Skip main menu and start game immediately.
    #[arg(long)]
    pub no_menu: bool,

    /// Initial level (e.g. for practice). Affects starting speed; clamped to 1-10.
    #[arg(long, default_value = "1", value_name = "N")]
    pub initial_level: u32,

    /// Relaxed mode: drop speed does not increase with level (fixed speed).
    #[arg(long)]
    pub relaxed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

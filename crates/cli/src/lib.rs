//! Command-line front end for the reveal controller.
//!
//! Parses a card draw from the command line, overlays it on the
//! environment configuration, and renders [`DisplayState`] changes as
//! terminal lines.

use arcana_core::generation::{validate_clip_seconds, validate_style};
use arcana_core::status::JobStatus;
use arcana_core::subject::{Card, Orientation, Subject};
use arcana_reveal::config::{ConfigError, RevealConfig};
use arcana_reveal::events::{DisplayState, RevealResult};
use clap::Parser;

/// Exit status when the reveal was interrupted with Ctrl-C.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Generate the reveal video for one tarot card.
#[derive(Debug, Parser)]
#[command(name = "arcana-reveal", version)]
pub struct Args {
    /// Card name, e.g. "The Tower"
    #[arg(long)]
    pub card: String,

    /// The card was drawn upside down
    #[arg(long)]
    pub reversed: bool,

    #[arg(long)]
    pub number: Option<u32>,

    /// Minor arcana suit
    #[arg(long)]
    pub suit: Option<String>,

    #[arg(long)]
    pub rank: Option<String>,

    #[arg(long)]
    pub rank_value: Option<u32>,

    /// Short interpretation passed to the generator
    #[arg(long)]
    pub meaning: Option<String>,

    /// Spread position, e.g. "past" or "outcome"
    #[arg(long, default_value = "present")]
    pub position: String,

    /// The question the reading answers
    #[arg(long)]
    pub question: String,

    /// Overrides REVEAL_STYLE
    #[arg(long)]
    pub style: Option<String>,

    /// Overrides REVEAL_SECONDS
    #[arg(long)]
    pub seconds: Option<u32>,

    /// Print every display state as a JSON line
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn subject(&self) -> Subject {
        let card = Card {
            name: self.card.clone(),
            number: self.number,
            suit: self.suit.clone(),
            rank: self.rank.clone(),
            rank_value: self.rank_value,
            meaning: self.meaning.clone(),
        };
        let orientation = if self.reversed {
            Orientation::Reversed
        } else {
            Orientation::Upright
        };
        Subject::new(card, orientation, self.position.as_str(), self.question.as_str())
    }

    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut RevealConfig) -> Result<(), ConfigError> {
        if let Some(style) = &self.style {
            validate_style(style)?;
            config.style = style.clone();
        }
        if let Some(seconds) = self.seconds {
            validate_clip_seconds(seconds)?;
            config.seconds = seconds;
        }
        Ok(())
    }

    /// `RUST_LOG` fallback for the requested verbosity.
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "arcana_cli=info,arcana_reveal=info",
            1 => "arcana_cli=debug,arcana_reveal=debug",
            _ => "arcana_cli=trace,arcana_reveal=trace,reqwest=debug",
        }
    }
}

/// One human-readable line for a display state.
pub fn render(state: &DisplayState) -> String {
    match (&state.status, &state.result) {
        (None, _) => "idle".to_string(),
        (Some(_), Some(RevealResult::Video(payload))) => match &payload.cache_key {
            Some(key) => format!("completed 100%  {}  (cache key {key})", payload.video),
            None => format!("completed 100%  {}", payload.video),
        },
        (Some(_), Some(RevealResult::Error { message, .. })) => format!("failed  {message}"),
        (Some(status), None) => format!("{:<10} {:>3}%", status.as_str(), state.progress),
    }
}

/// Process exit status for the state a reveal settled in.
pub fn exit_status(state: &DisplayState) -> u8 {
    match (&state.status, state.video()) {
        (Some(JobStatus::Completed), Some(_)) => 0,
        _ => 1,
    }
}

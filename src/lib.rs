use std::io::{stdin, stdout, BufWriter};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::errors::Res;
use crate::eval::PstEval;
use crate::games::chess::Chess;
use crate::games::line::Line;
use crate::games::{validate, Rules};
use crate::nn::HIDDEN_SIZE;
use crate::search::Searcher;
use crate::server::run_server;
use crate::train::Trainer;

pub mod errors;

pub mod eval;

pub mod games;

pub mod general;

pub mod nn;

pub mod search;

pub mod server;

pub mod train;

/// A board game engine driven by pluggable rule modules: the rule set
/// defines the board and the moves, the engine provides the search.
#[derive(Parser, Debug)]
#[command(name = "tabula", version, about, long_about = None)]
pub struct CommandLineArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a rule set and check that it produces well-formed output.
    Validate {
        #[arg(value_enum)]
        game: Game,
    },
    /// Answer search queries from an outer driver on stdin/stdout.
    Play {
        #[arg(value_enum)]
        game: Game,
        /// Extra search threads besides the serving thread.
        #[arg(long, short, default_value_t = default_threads())]
        threads: usize,
        /// Wall clock budget per move, in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        time_ms: u64,
        #[arg(long, default_value_t = search::MAX_DEPTH)]
        depth: i32,
    },
    /// Improve the value network by self play.
    Train {
        #[arg(value_enum)]
        game: Game,
        /// Where to load and checkpoint the network weights.
        weights: PathBuf,
        #[arg(long, default_value_t = 10)]
        games: usize,
        #[arg(long, default_value_t = 1_000)]
        time_ms: u64,
    },
}

impl Command {
    fn game(&self) -> Game {
        match self {
            Command::Validate { game }
            | Command::Play { game, .. }
            | Command::Train { game, .. } => *game,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, ValueEnum, Default, Debug)]
pub enum Game {
    /// Standard chess (queen-only promotion, no en passant).
    #[default]
    Chess,
    /// One-dimensional chess on a single rank.
    Line,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(2).min(10))
        .unwrap_or(0)
}

fn run_command<R: Rules>(mut rules: R, command: Command) -> Res<()> {
    match command {
        Command::Validate { .. } => {
            validate(&mut rules)?;
            println!("{0} {1}", rules.name(), "ok".green());
            Ok(())
        }
        Command::Play {
            threads,
            time_ms,
            depth,
            ..
        } => {
            validate(&mut rules)?;
            let (width, height) = rules.board_dims();
            let mut searcher = Searcher::new(rules.clone(), PstEval::new(width, height), threads);
            searcher.set_time_limit(Duration::from_millis(time_ms));
            searcher.set_max_depth(depth);
            let mut output = BufWriter::new(stdout().lock());
            run_server(rules, &searcher, stdin().lock(), &mut output)
        }
        Command::Train {
            weights,
            games,
            time_ms,
            ..
        } => {
            validate(&mut rules)?;
            let (width, height) = rules.board_dims();
            let squares = width as usize * height as usize;
            let mut searcher = Searcher::new(rules.clone(), PstEval::new(width, height), 0);
            searcher.set_time_limit(Duration::from_millis(time_ms));
            let mut trainer = Trainer::new(
                squares,
                rules.max_piece_code(),
                HIDDEN_SIZE,
                weights,
                games,
            );
            trainer.run(&mut rules, &searcher)
        }
    }
}

pub fn run_program() {
    env_logger::init();
    let args = CommandLineArgs::parse();
    let result = match args.command.game() {
        Game::Chess => run_command(Chess, args.command),
        Game::Line => run_command(Line, args.command),
    };
    if let Err(err) = result {
        eprintln!("{0}: {err}", "error".red());
        exit(1);
    }
}

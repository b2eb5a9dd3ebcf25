use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use derive_more::{BitXor, BitXorAssign};

use crate::errors::{EngineError, Res};

pub mod chess;
pub mod line;

/// Largest board the engine supports. Rule sets with `width * height`
/// beyond this are rejected by `validate`.
pub const BOARD_CAP: usize = 64;

/// A dense row-major board. Code 0 is an empty square; by convention
/// codes 1..=6 belong to side 0 and 7..=12 to side 1, although a rule set
/// is free to use fewer codes.
pub type Squares = [u8; BOARD_CAP];

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct Coord {
    pub i: u8,
    pub j: u8,
}

impl Coord {
    pub fn new(i: u8, j: u8) -> Self {
        Coord { i, j }
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({0}, {1})", self.i, self.j)
    }
}

/// A game state as the rule set sees it: the side to move and the board.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Position {
    pub next_player: u8,
    pub board: Squares,
}

impl Position {
    pub fn empty() -> Self {
        Position {
            next_player: 0,
            board: [0; BOARD_CAP],
        }
    }

    /// Plays `mov` by swapping its board into this position and flipping the
    /// side to move. The move afterwards holds the previous board, so
    /// `unapply` restores both exactly. No allocation either way.
    pub fn apply(&mut self, mov: &mut Move) {
        std::mem::swap(&mut self.board, &mut mov.board);
        self.next_player ^= 1;
    }

    pub fn unapply(&mut self, mov: &mut Move) {
        std::mem::swap(&mut self.board, &mut mov.board);
        self.next_player ^= 1;
    }

    /// An ASCII diagram, one rank per line, using the chess piece letters
    /// for codes up to 12 and `?` beyond.
    pub fn diagram(&self, width: usize, height: usize) -> String {
        let mut out = String::with_capacity(height * (width + 1));
        for i in 0..height {
            for j in 0..width {
                out.push(piece_char(self.board[i * width + j]));
            }
            out.push('\n');
        }
        out
    }
}

fn piece_char(code: u8) -> char {
    const NAMES: [char; 13] = [
        '.', 'P', 'N', 'B', 'R', 'Q', 'K', 'p', 'n', 'b', 'r', 'q', 'k',
    ];
    *NAMES.get(code as usize).unwrap_or(&'?')
}

/// An opaque transition produced by a rule set. The engine never interprets
/// `from`/`to`; they exist for ordering, display, and the wire protocol.
/// The full post-move board is carried along.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Move {
    pub from: Coord,
    pub to: Coord,
    pub board: Squares,
}

impl Display for Move {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{0} -> {1}", self.from, self.to)
    }
}

/// Terminal classification of a position, always from the perspective of
/// the side to move. `Ongoing` means the game is not over.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
    Ongoing,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        self != Outcome::Ongoing
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Ongoing => write!(f, "ongoing"),
        }
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Debug, Default, derive_more::Display, BitXor, BitXorAssign,
)]
pub struct PositionHash(pub u64);

/// The boundary between the engine and a rule module.
///
/// A rule set defines the board, the legal moves, and when the game is
/// over; the engine supplies the search. Handles are not assumed to be
/// thread-safe, so every search worker owns its own clone and the mutating
/// receiver leaves room for a stateful host (an embedded interpreter)
/// behind the same trait.
pub trait Rules: Send + Clone + 'static {
    /// The name of the game, such as "chess".
    fn name(&self) -> &'static str;

    /// Board dimensions as `(width, height)`; their product must not
    /// exceed `BOARD_CAP`.
    fn board_dims(&self) -> (u8, u8);

    /// The largest piece code this rule set places on the board.
    fn max_piece_code(&self) -> u8;

    /// Display names for piece codes.
    fn piece_names(&self) -> HashMap<u8, String>;

    /// The starting state. Side 0 moves first.
    fn initial_position(&mut self) -> Position;

    /// Appends every legal move for `pos.next_player`. An empty result
    /// means the position has no legal continuation.
    fn valid_moves(&mut self, pos: &Position, out: &mut Vec<Move>);

    /// Classifies `pos` for the side to move.
    fn classify(&mut self, pos: &Position) -> Outcome;
}

/// Exercises the whole rule surface once and checks the results for shape.
/// This is the place where a misbehaving rule module is caught; after a
/// successful validation the search trusts its output.
pub fn validate<R: Rules>(rules: &mut R) -> Res<()> {
    let (width, height) = rules.board_dims();
    let squares = width as usize * height as usize;
    if squares == 0 || squares > BOARD_CAP {
        return Err(EngineError::script(format!(
            "{0}x{1} board does not fit the {BOARD_CAP}-square capacity",
            width, height
        )));
    }

    let initial = rules.initial_position();
    check_board(&initial.board, squares, rules.max_piece_code())?;
    if initial.next_player != 0 {
        return Err(EngineError::script("initial position must have side 0 to move"));
    }
    if initial.board[..squares].iter().all(|&c| c == 0) {
        return Err(EngineError::script("initial board is empty"));
    }
    let names = rules.piece_names();
    for &code in initial.board[..squares].iter().filter(|&&c| c != 0) {
        if !names.contains_key(&code) {
            return Err(EngineError::script(format!(
                "piece code {code} appears on the initial board but has no name"
            )));
        }
    }

    let mut moves = Vec::new();
    rules.valid_moves(&initial, &mut moves);
    for mov in &moves {
        if mov.from.i >= height || mov.from.j >= width || mov.to.i >= height || mov.to.j >= width {
            return Err(EngineError::script(format!(
                "move {mov} is out of bounds on a {0}x{1} board",
                width, height
            )));
        }
        check_board(&mov.board, squares, rules.max_piece_code())?;
    }

    rules.classify(&initial);
    Ok(())
}

fn check_board(board: &Squares, squares: usize, max_code: u8) -> Res<()> {
    for (idx, &code) in board[..squares].iter().enumerate() {
        if code > max_code {
            return Err(EngineError::script(format!(
                "piece code {code} at square {idx} exceeds the declared maximum {max_code}"
            )));
        }
    }
    Ok(())
}

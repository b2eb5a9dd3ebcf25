use std::collections::HashMap;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::games::{Coord, Move, Outcome, Position, Rules, Squares};

pub const WIDTH: usize = 8;
pub const HEIGHT: usize = 8;

/// The six piece classes. The board codes are `Piece as u8` for side 0 and
/// `Piece as u8 + 6` for side 1.
#[derive(Copy, Clone, Eq, PartialEq, Debug, EnumIter)]
pub enum Piece {
    Pawn = 1,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl Piece {
    pub fn code(self, side: u8) -> u8 {
        debug_assert!(side < 2);
        self as u8 + 6 * side
    }

    fn letter(self) -> char {
        match self {
            Piece::Pawn => 'P',
            Piece::Knight => 'N',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::Queen => 'Q',
            Piece::King => 'K',
        }
    }
}

const KNIGHT_DIRS: [(i32, i32); 8] = [
    (-2, -1),
    (-1, -2),
    (1, -2),
    (2, -1),
    (2, 1),
    (1, 2),
    (-1, 2),
    (-2, 1),
];
const BISHOP_DIRS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
const ROOK_DIRS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const ROYAL_DIRS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
];

const INITIAL: [[u8; WIDTH]; HEIGHT] = [
    [4, 2, 3, 5, 6, 3, 2, 4],
    [1, 1, 1, 1, 1, 1, 1, 1],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [7, 7, 7, 7, 7, 7, 7, 7],
    [10, 8, 9, 11, 12, 9, 8, 10],
];

fn side_of(code: u8) -> Option<u8> {
    match code {
        0 => None,
        1..=6 => Some(0),
        _ => Some(1),
    }
}

fn class_of(code: u8) -> u8 {
    (code - 1) % 6 + 1
}

fn at(board: &Squares, i: i32, j: i32) -> u8 {
    board[i as usize * WIDTH + j as usize]
}

fn on_board(i: i32, j: i32) -> bool {
    (0..HEIGHT as i32).contains(&i) && (0..WIDTH as i32).contains(&j)
}

/// Side 0 pawns advance towards higher ranks, side 1 towards lower ones.
fn pawn_dir(side: u8) -> i32 {
    if side == 0 {
        1
    } else {
        -1
    }
}

fn home_row(side: u8) -> i32 {
    if side == 0 {
        0
    } else {
        HEIGHT as i32 - 1
    }
}

/// Is `(i, j)` attacked by any piece of `by`? Works directly off the board
/// instead of generating moves: pawn diagonals, knight and king offsets, and
/// the first blocker along each rook/bishop ray.
fn square_attacked(board: &Squares, i: i32, j: i32, by: u8) -> bool {
    let pawn = Piece::Pawn.code(by);
    let pi = i - pawn_dir(by);
    for dj in [-1, 1] {
        if on_board(pi, j + dj) && at(board, pi, j + dj) == pawn {
            return true;
        }
    }

    let knight = Piece::Knight.code(by);
    for (di, dj) in KNIGHT_DIRS {
        if on_board(i + di, j + dj) && at(board, i + di, j + dj) == knight {
            return true;
        }
    }
    let king = Piece::King.code(by);
    for (di, dj) in ROYAL_DIRS {
        if on_board(i + di, j + dj) && at(board, i + di, j + dj) == king {
            return true;
        }
    }

    let queen = Piece::Queen.code(by);
    for (dirs, slider) in [
        (ROOK_DIRS, Piece::Rook.code(by)),
        (BISHOP_DIRS, Piece::Bishop.code(by)),
    ] {
        for (di, dj) in dirs {
            let (mut x, mut y) = (i + di, j + dj);
            while on_board(x, y) {
                let code = at(board, x, y);
                if code != 0 {
                    if code == slider || code == queen {
                        return true;
                    }
                    break;
                }
                x += di;
                y += dj;
            }
        }
    }
    false
}

/// In check means the side's king is attacked; a board with the king already
/// captured counts as in check so that such positions classify as lost.
fn in_check(board: &Squares, side: u8) -> bool {
    let king = Piece::King.code(side);
    match board.iter().position(|&c| c == king) {
        Some(idx) => square_attacked(
            board,
            (idx / WIDTH) as i32,
            (idx % WIDTH) as i32,
            side ^ 1,
        ),
        None => true,
    }
}

struct Candidate {
    to_i: i32,
    to_j: i32,
    promotion: bool,
    castling: bool,
}

fn push_candidate(out: &mut Vec<Candidate>, to_i: i32, to_j: i32) {
    out.push(Candidate {
        to_i,
        to_j,
        promotion: false,
        castling: false,
    });
}

fn pawn_candidates(board: &Squares, side: u8, i: i32, j: i32, out: &mut Vec<Candidate>) {
    let dir = pawn_dir(side);
    let start_row = home_row(side) + dir;
    let promo_row = home_row(side ^ 1);

    let x = i + dir;
    if on_board(x, j) && at(board, x, j) == 0 {
        out.push(Candidate {
            to_i: x,
            to_j: j,
            promotion: x == promo_row,
            castling: false,
        });
        if i == start_row && at(board, i + 2 * dir, j) == 0 {
            push_candidate(out, i + 2 * dir, j);
        }
    }
    for dj in [-1, 1] {
        if on_board(x, j + dj) {
            let target = at(board, x, j + dj);
            if side_of(target) == Some(side ^ 1) {
                out.push(Candidate {
                    to_i: x,
                    to_j: j + dj,
                    promotion: x == promo_row,
                    castling: false,
                });
            }
        }
    }
}

fn castling_candidates(board: &Squares, side: u8, i: i32, j: i32, out: &mut Vec<Candidate>) {
    // Only a king standing on its original square may castle; rights are not
    // tracked across the game, the rook merely has to be back on its corner.
    if (i, j) != (home_row(side), 4) {
        return;
    }
    let rook = Piece::Rook.code(side);
    for rook_col in [0, 7] {
        if at(board, i, rook_col) != rook {
            continue;
        }
        let step = if rook_col > j { 1 } else { -1 };
        let mut col = j + step;
        let mut clear = true;
        while col != rook_col {
            if at(board, i, col) != 0 {
                clear = false;
                break;
            }
            col += step;
        }
        if !clear {
            continue;
        }
        // The king's square and both squares it crosses must be safe.
        if (0..=2).any(|off| square_attacked(board, i, j + off * step, side ^ 1)) {
            continue;
        }
        out.push(Candidate {
            to_i: i,
            to_j: j + 2 * step,
            promotion: false,
            castling: true,
        });
    }
}

fn piece_candidates(board: &Squares, code: u8, i: i32, j: i32, out: &mut Vec<Candidate>) {
    let side = side_of(code).expect("empty square has no moves");
    let class = class_of(code);
    if class == Piece::Pawn as u8 {
        pawn_candidates(board, side, i, j, out);
        return;
    }

    let (dirs, slides): (&[(i32, i32)], bool) = match class {
        c if c == Piece::Knight as u8 => (&KNIGHT_DIRS, false),
        c if c == Piece::Bishop as u8 => (&BISHOP_DIRS, true),
        c if c == Piece::Rook as u8 => (&ROOK_DIRS, true),
        c if c == Piece::Queen as u8 => (&ROYAL_DIRS, true),
        _ => (&ROYAL_DIRS, false),
    };
    for &(di, dj) in dirs {
        let (mut x, mut y) = (i + di, j + dj);
        while on_board(x, y) {
            let target = at(board, x, y);
            if target != 0 {
                if side_of(target) == Some(side ^ 1) {
                    push_candidate(out, x, y);
                }
                break;
            }
            push_candidate(out, x, y);
            if !slides {
                break;
            }
            x += di;
            y += dj;
        }
    }
    if class == Piece::King as u8 {
        castling_candidates(board, side, i, j, out);
    }
}

/// Materialises a candidate into a full post-move board.
fn build_board(board: &Squares, side: u8, i: i32, j: i32, cand: &Candidate) -> Squares {
    let mut next = *board;
    let mut code = next[i as usize * WIDTH + j as usize];
    next[i as usize * WIDTH + j as usize] = 0;
    if cand.promotion {
        code = Piece::Queen.code(side);
    }
    if cand.castling {
        let rook_col = if cand.to_j == 2 { 0 } else { 7 };
        let new_rook_col = if cand.to_j == 2 { 3 } else { 5 };
        next[i as usize * WIDTH + rook_col] = 0;
        next[i as usize * WIDTH + new_rook_col] = Piece::Rook.code(side);
    }
    next[cand.to_i as usize * WIDTH + cand.to_j as usize] = code;
    next
}

fn moves_for(board: &Squares, side: u8, out: &mut Vec<Move>) {
    let mut candidates = Vec::new();
    for i in 0..HEIGHT as i32 {
        for j in 0..WIDTH as i32 {
            let code = at(board, i, j);
            if side_of(code) != Some(side) {
                continue;
            }
            candidates.clear();
            piece_candidates(board, code, i, j, &mut candidates);
            for cand in &candidates {
                let next = build_board(board, side, i, j, cand);
                if in_check(&next, side) {
                    continue;
                }
                out.push(Move {
                    from: Coord::new(i as u8, j as u8),
                    to: Coord::new(cand.to_i as u8, cand.to_j as u8),
                    board: next,
                });
            }
        }
    }
}

/// Standard chess with queen-only promotion and no en passant; castling
/// needs the rook back on its corner and a safe, clear path. Draws by
/// repetition or the fifty-move rule are not modeled.
#[derive(Clone, Default, Debug)]
pub struct Chess;

impl Rules for Chess {
    fn name(&self) -> &'static str {
        "chess"
    }

    fn board_dims(&self) -> (u8, u8) {
        (WIDTH as u8, HEIGHT as u8)
    }

    fn max_piece_code(&self) -> u8 {
        12
    }

    fn piece_names(&self) -> HashMap<u8, String> {
        let mut names = HashMap::new();
        for side in 0..2u8 {
            for piece in Piece::iter() {
                let letter = piece.letter();
                let letter = if side == 0 {
                    letter
                } else {
                    letter.to_ascii_lowercase()
                };
                names.insert(piece.code(side), letter.to_string());
            }
        }
        names
    }

    fn initial_position(&mut self) -> Position {
        let mut pos = Position::empty();
        for (i, row) in INITIAL.iter().enumerate() {
            pos.board[i * WIDTH..(i + 1) * WIDTH].copy_from_slice(row);
        }
        pos
    }

    fn valid_moves(&mut self, pos: &Position, out: &mut Vec<Move>) {
        moves_for(&pos.board, pos.next_player, out);
    }

    fn classify(&mut self, pos: &Position) -> Outcome {
        let side = pos.next_player;
        let mut moves = Vec::new();
        moves_for(&pos.board, side, &mut moves);
        if moves.is_empty() {
            return if in_check(&pos.board, side) {
                Outcome::Loss
            } else {
                Outcome::Draw
            };
        }
        moves.clear();
        moves_for(&pos.board, side ^ 1, &mut moves);
        if moves.is_empty() {
            return if in_check(&pos.board, side ^ 1) {
                Outcome::Win
            } else {
                Outcome::Draw
            };
        }
        Outcome::Ongoing
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Finds and plays the move with the given from/to squares.
    pub(crate) fn play(rules: &mut Chess, pos: &mut Position, from: (u8, u8), to: (u8, u8)) {
        let mut moves = Vec::new();
        rules.valid_moves(pos, &mut moves);
        let mut mov = moves
            .into_iter()
            .find(|m| m.from == Coord::new(from.0, from.1) && m.to == Coord::new(to.0, to.1))
            .unwrap_or_else(|| panic!("no move from {from:?} to {to:?}"));
        pos.apply(&mut mov);
    }

    #[test]
    fn twenty_moves_from_the_start() {
        let mut rules = Chess::default();
        let pos = rules.initial_position();
        assert_eq!(rules.classify(&pos), Outcome::Ongoing);
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        assert_eq!(moves.len(), 20);
    }

    #[test]
    fn ruy_lopez_reply_count() {
        let mut rules = Chess::default();
        let mut pos = rules.initial_position();
        // e4 e5 Nf3 Nc6 Bb5
        play(&mut rules, &mut pos, (1, 4), (3, 4));
        play(&mut rules, &mut pos, (6, 4), (4, 4));
        play(&mut rules, &mut pos, (0, 6), (2, 5));
        play(&mut rules, &mut pos, (7, 1), (5, 2));
        play(&mut rules, &mut pos, (0, 5), (4, 1));
        assert_eq!(rules.classify(&pos), Outcome::Ongoing);
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        // 11 pawn moves, 8 knight, 5 bishop, 4 queen, Rb8 and Ke7.
        assert_eq!(moves.len(), 30);
    }

    #[test]
    fn quick_mate_classifies_as_loss() {
        let mut rules = Chess::default();
        let mut pos = rules.initial_position();
        // e4 f6 d4 g5 Qh5#
        play(&mut rules, &mut pos, (1, 4), (3, 4));
        play(&mut rules, &mut pos, (6, 5), (5, 5));
        play(&mut rules, &mut pos, (1, 3), (3, 3));
        play(&mut rules, &mut pos, (6, 6), (4, 6));
        play(&mut rules, &mut pos, (0, 3), (4, 7));
        assert_eq!(rules.classify(&pos), Outcome::Loss);
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        assert!(moves.is_empty());
    }

    #[test]
    fn bare_kings_are_ongoing() {
        // Insufficient material is not modeled, so this is not yet a draw.
        let mut rules = Chess::default();
        let mut pos = Position::empty();
        pos.board[4] = Piece::King.code(0);
        pos.board[7 * WIDTH + 4] = Piece::King.code(1);
        assert_eq!(rules.classify(&pos), Outcome::Ongoing);
    }

    #[test]
    fn kingside_castling_moves_the_rook() {
        let mut rules = Chess::default();
        let mut pos = rules.initial_position();
        // Clear f1 and g1, then castle.
        play(&mut rules, &mut pos, (1, 6), (3, 6));
        play(&mut rules, &mut pos, (6, 0), (5, 0));
        play(&mut rules, &mut pos, (0, 5), (2, 7));
        play(&mut rules, &mut pos, (6, 1), (5, 1));
        play(&mut rules, &mut pos, (0, 6), (2, 5));
        play(&mut rules, &mut pos, (6, 2), (5, 2));
        play(&mut rules, &mut pos, (0, 4), (0, 6));
        assert_eq!(pos.board[6], Piece::King.code(0));
        assert_eq!(pos.board[5], Piece::Rook.code(0));
        assert_eq!(pos.board[7], 0);
    }

    #[test]
    fn promotion_yields_a_queen() {
        let mut rules = Chess::default();
        let mut pos = Position::empty();
        pos.board[4] = Piece::King.code(0);
        pos.board[6 * WIDTH] = Piece::Pawn.code(0);
        pos.board[7 * WIDTH + 7] = Piece::King.code(1);
        play(&mut rules, &mut pos, (6, 0), (7, 0));
        assert_eq!(pos.board[7 * WIDTH], Piece::Queen.code(0));
    }
}

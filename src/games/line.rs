use std::collections::HashMap;

use crate::games::{Coord, Move, Outcome, Position, Rules, Squares};

use super::chess::Piece;

pub const WIDTH: usize = 8;

/// One-dimensional chess on a single rank: king, knight and rook per side.
/// The knight leaps exactly two squares (over anything), the rook slides,
/// the king steps one square, and the usual check rules apply. Small enough
/// that searches finish instantly, which also makes it the rule set of
/// choice for exercising the engine end to end.
#[derive(Clone, Default, Debug)]
pub struct Line;

const INITIAL: [u8; WIDTH] = [6, 2, 4, 0, 0, 10, 8, 12];

fn side_of(code: u8) -> Option<u8> {
    match code {
        0 => None,
        1..=6 => Some(0),
        _ => Some(1),
    }
}

fn square_attacked(board: &Squares, j: i32, by: u8) -> bool {
    for dj in [-1i32, 1, -2, 2] {
        let from = j + dj;
        if !(0..WIDTH as i32).contains(&from) {
            continue;
        }
        let code = board[from as usize];
        let want = if dj.abs() == 1 {
            Piece::King.code(by)
        } else {
            Piece::Knight.code(by)
        };
        if code == want {
            return true;
        }
    }
    let rook = Piece::Rook.code(by);
    for dir in [-1i32, 1] {
        let mut x = j + dir;
        while (0..WIDTH as i32).contains(&x) {
            let code = board[x as usize];
            if code != 0 {
                if code == rook {
                    return true;
                }
                break;
            }
            x += dir;
        }
    }
    false
}

fn in_check(board: &Squares, side: u8) -> bool {
    let king = Piece::King.code(side);
    match board[..WIDTH].iter().position(|&c| c == king) {
        Some(j) => square_attacked(board, j as i32, side ^ 1),
        None => true,
    }
}

fn try_push(board: &Squares, side: u8, to: i32, out: &mut Vec<i32>) {
    if (0..WIDTH as i32).contains(&to) && side_of(board[to as usize]) != Some(side) {
        out.push(to);
    }
}

fn targets(board: &Squares, code: u8, j: i32, out: &mut Vec<i32>) {
    let side = side_of(code).expect("empty square has no moves");
    let class = (code - 1) % 6 + 1;
    if class == Piece::King as u8 {
        try_push(board, side, j - 1, out);
        try_push(board, side, j + 1, out);
    } else if class == Piece::Knight as u8 {
        try_push(board, side, j - 2, out);
        try_push(board, side, j + 2, out);
    } else {
        for dir in [-1i32, 1] {
            let mut x = j + dir;
            while (0..WIDTH as i32).contains(&x) {
                if board[x as usize] != 0 {
                    if side_of(board[x as usize]) == Some(side ^ 1) {
                        out.push(x);
                    }
                    break;
                }
                out.push(x);
                x += dir;
            }
        }
    }
}

fn moves_for(board: &Squares, side: u8, out: &mut Vec<Move>) {
    let mut tos = Vec::new();
    for j in 0..WIDTH as i32 {
        let code = board[j as usize];
        if side_of(code) != Some(side) {
            continue;
        }
        tos.clear();
        targets(board, code, j, &mut tos);
        for &to in &tos {
            let mut next = *board;
            next[j as usize] = 0;
            next[to as usize] = code;
            if in_check(&next, side) {
                continue;
            }
            out.push(Move {
                from: Coord::new(0, j as u8),
                to: Coord::new(0, to as u8),
                board: next,
            });
        }
    }
}

impl Rules for Line {
    fn name(&self) -> &'static str {
        "line"
    }

    fn board_dims(&self) -> (u8, u8) {
        (WIDTH as u8, 1)
    }

    fn max_piece_code(&self) -> u8 {
        12
    }

    fn piece_names(&self) -> HashMap<u8, String> {
        let mut names = HashMap::new();
        for (piece, letter) in [(Piece::Knight, 'N'), (Piece::Rook, 'R'), (Piece::King, 'K')] {
            names.insert(piece.code(0), letter.to_string());
            names.insert(piece.code(1), letter.to_ascii_lowercase().to_string());
        }
        names
    }

    fn initial_position(&mut self) -> Position {
        let mut pos = Position::empty();
        pos.board[..WIDTH].copy_from_slice(&INITIAL);
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
mod tests {
    use super::*;

    #[test]
    fn initial_position_has_four_moves() {
        let mut rules = Line::default();
        let pos = rules.initial_position();
        assert_eq!(rules.classify(&pos), Outcome::Ongoing);
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        // Nd, Rd, Re and Rxf; the king is boxed in by its own knight.
        assert_eq!(moves.len(), 4);
    }

    #[test]
    fn knight_leaps_over_pieces() {
        let mut rules = Line::default();
        let pos = rules.initial_position();
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        assert!(moves
            .iter()
            .any(|m| m.from == Coord::new(0, 1) && m.to == Coord::new(0, 3)));
    }

    #[test]
    fn king_must_leave_check() {
        let mut rules = Line::default();
        let mut pos = Position::empty();
        // White king on a rook's open file must step away or stay lost.
        pos.board[0] = Piece::King.code(0);
        pos.board[5] = Piece::Rook.code(1);
        pos.board[7] = Piece::King.code(1);
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        assert!(moves.is_empty());
        assert_eq!(rules.classify(&pos), Outcome::Loss);
    }
}

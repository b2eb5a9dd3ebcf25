use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::str::FromStr;

use itertools::Itertools;
use log::info;
use num::PrimInt;

use crate::errors::{EngineError, Res};
use crate::eval::Eval;
use crate::games::{Coord, Move, Outcome, Position, Rules, Squares};
use crate::general::common::parse_int_from_str;
use crate::search::Searcher;

/// The wire protocol towards the outer driver, whitespace-separated
/// integers throughout. The driver opens with the board dimensions
/// `height width`, then issues queries:
///
/// - `0 <position>` answers the classification (`1` win, `0` draw, `-1`
///   loss, `-2` still going) followed by the legal move count and every
///   move.
/// - `1 <position>` answers the searched best move.
///
/// A position is `next_player` followed by `height * width` piece codes; a
/// move goes out as `from_i from_j to_i to_j height width board`. Each
/// answer is a single line.
pub fn run_server<R, E, In, Out>(
    mut rules: R,
    searcher: &Searcher<R, E>,
    input: In,
    output: &mut Out,
) -> Res<()>
where
    R: Rules,
    E: Eval,
    In: BufRead,
    Out: Write,
{
    let (width, height) = rules.board_dims();
    let (width, height) = (width as usize, height as usize);
    let squares = width * height;
    let max_code = rules.max_piece_code();

    let mut reader = TokenReader::new(input);
    let n: usize = reader.int("board height")?;
    let m: usize = reader.int("board width")?;
    if (n, m) != (height, width) {
        return Err(EngineError::protocol(format!(
            "driver announced a {n}x{m} board but {0} plays {height}x{width}",
            rules.name()
        )));
    }
    info!("serving {0} on a {height}x{width} board", rules.name());

    let mut out = OutBuf::default();
    let mut moves = Vec::new();
    loop {
        // Running out of input between queries is the normal way a session
        // ends; anywhere else it is a protocol violation.
        let Some(first) = reader.token()? else {
            return Ok(());
        };
        let query: u8 = parse_int_from_str(&first, "query kind")?;
        let pos = read_position(&mut reader, squares, max_code)?;
        match query {
            0 => {
                let kind = match rules.classify(&pos) {
                    Outcome::Win => 1,
                    Outcome::Draw => 0,
                    Outcome::Loss => -1,
                    Outcome::Ongoing => -2,
                };
                out.push(kind);
                moves.clear();
                rules.valid_moves(&pos, &mut moves);
                out.push(moves.len() as i64);
                for mov in &moves {
                    out.mov(mov, height, width);
                }
            }
            1 => {
                let report = searcher.search(&pos);
                let Some(best) = report.best else {
                    return Err(EngineError::protocol(
                        "best-move query on a position with no legal continuation",
                    ));
                };
                out.mov(&report.moves[best], height, width);
            }
            other => {
                return Err(EngineError::protocol(format!("unknown query kind {other}")));
            }
        }
        out.flush(output)?;
    }
}

fn read_position<In: BufRead>(
    reader: &mut TokenReader<In>,
    squares: usize,
    max_code: u8,
) -> Res<Position> {
    let mut pos = Position::empty();
    pos.next_player = reader.int("next player")?;
    if pos.next_player > 1 {
        return Err(EngineError::protocol("next player must be 0 or 1"));
    }
    for idx in 0..squares {
        let code: u8 = reader.int("piece code")?;
        if code > max_code {
            return Err(EngineError::protocol(format!(
                "piece code {code} at square {idx} exceeds the maximum {max_code}"
            )));
        }
        pos.board[idx] = code;
    }
    Ok(pos)
}

/// Pulls whitespace-separated tokens off the input, refilling line by line.
struct TokenReader<In> {
    input: In,
    line: String,
    tokens: VecDeque<String>,
}

impl<In: BufRead> TokenReader<In> {
    fn new(input: In) -> Self {
        TokenReader {
            input,
            line: String::new(),
            tokens: VecDeque::new(),
        }
    }

    fn token(&mut self) -> Res<Option<String>> {
        while self.tokens.is_empty() {
            self.line.clear();
            if self.input.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.tokens
                .extend(self.line.split_whitespace().map(String::from));
        }
        Ok(self.tokens.pop_front())
    }

    fn int<T: PrimInt + FromStr>(&mut self, name: &str) -> Res<T> {
        let token = self.token()?.ok_or_else(|| {
            EngineError::protocol(format!("input ended while reading {name}"))
        })?;
        parse_int_from_str(&token, name)
    }
}

/// Collects one answer's integers and writes them out as a single line,
/// so a query is always answered atomically.
#[derive(Default)]
struct OutBuf {
    out: Vec<i64>,
}

impl OutBuf {
    fn push(&mut self, value: i64) {
        self.out.push(value);
    }

    fn coord(&mut self, coord: Coord) {
        self.out.push(coord.i as i64);
        self.out.push(coord.j as i64);
    }

    fn board(&mut self, board: &Squares, height: usize, width: usize) {
        self.out.push(height as i64);
        self.out.push(width as i64);
        self.out
            .extend(board[..height * width].iter().map(|&c| c as i64));
    }

    fn mov(&mut self, mov: &Move, height: usize, width: usize) {
        self.coord(mov.from);
        self.coord(mov.to);
        self.board(&mov.board, height, width);
    }

    fn flush<W: Write>(&mut self, writer: &mut W) -> Res<()> {
        writeln!(writer, "{0}", self.out.iter().join(" "))?;
        writer.flush()?;
        self.out.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PstEval;
    use crate::games::chess::Chess;
    use crate::games::line::Line;
    use std::time::Duration;

    fn serve<R: Rules + Default>(input: &str, threads: usize) -> Res<Vec<i64>> {
        let rules = R::default();
        let eval = {
            let (w, h) = rules.board_dims();
            PstEval::new(w, h)
        };
        let mut searcher = Searcher::new(rules.clone(), eval, threads);
        searcher.set_time_limit(Duration::from_millis(50));
        searcher.set_max_depth(3);
        let mut output = Vec::new();
        run_server(rules, &searcher, input.as_bytes(), &mut output)?;
        let text = String::from_utf8(output).unwrap();
        Ok(text
            .split_whitespace()
            .map(|tok| tok.parse::<i64>().unwrap())
            .collect())
    }

    fn initial_query<R: Rules + Default>(query: u8) -> String {
        let mut rules = R::default();
        let (width, height) = rules.board_dims();
        let pos = rules.initial_position();
        let squares = width as usize * height as usize;
        let mut input = format!("{height} {width}\n{query} 0");
        for idx in 0..squares {
            input.push_str(&format!(" {0}", pos.board[idx]));
        }
        input.push('\n');
        input
    }

    #[test]
    fn classification_query_lists_all_moves() {
        let tokens = serve::<Chess>(&initial_query::<Chess>(0), 0).unwrap();
        assert_eq!(tokens[0], -2);
        assert_eq!(tokens[1], 20);
        // Every move is from/to plus a dimension-prefixed board.
        assert_eq!(tokens.len(), 2 + 20 * (4 + 2 + 64));
        assert_eq!(tokens[2 + 4], 8);
        assert_eq!(tokens[2 + 5], 8);
    }

    #[test]
    fn best_move_query_answers_with_a_legal_move() {
        let tokens = serve::<Line>(&initial_query::<Line>(1), 0).unwrap();
        assert_eq!(tokens.len(), 4 + 2 + 8);
        let (from_i, from_j, to_i, to_j) = (tokens[0], tokens[1], tokens[2], tokens[3]);
        assert_eq!(from_i, 0);
        assert_eq!(to_i, 0);
        let mut rules = Line;
        let pos = rules.initial_position();
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        assert!(moves
            .iter()
            .any(|m| m.from.j as i64 == from_j && m.to.j as i64 == to_j));
    }

    #[test]
    fn dimension_mismatch_is_a_protocol_error() {
        let err = serve::<Chess>("7 8\n", 0).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn truncated_positions_are_rejected() {
        let err = serve::<Chess>("8 8\n0 0 1 2 3\n", 0).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn out_of_range_codes_are_rejected() {
        let mut input = initial_query::<Chess>(0);
        input = input.replace(" 4 2 3 5 6 3 2 4", " 44 2 3 5 6 3 2 4");
        let err = serve::<Chess>(&input, 0).unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }
}

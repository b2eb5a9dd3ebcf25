use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::games::{Position, PositionHash, Squares};
use crate::search::{MAX_DEPTH, MIN_DEPTH};

pub const ZOBRIST_SEED: u64 = 123;

/// Zobrist hashing over the dense board: one 64-bit key per (piece code,
/// square) pair, one key for "side 1 to move", and one nonce per remaining
/// search depth. All keys come from a fixed-seed generator so hashes are
/// reproducible across runs and machines.
#[derive(Debug)]
pub struct Zobrist {
    squares: usize,
    side_key: u64,
    piece_square: Vec<u64>,
    depth_nonce: Vec<u64>,
}

impl Zobrist {
    pub fn new(max_code: u8, squares: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(ZOBRIST_SEED);
        let side_key = rng.next_u64();
        let mut piece_square = vec![0; max_code as usize * squares];
        for key in piece_square.iter_mut() {
            *key = rng.next_u64();
        }
        let mut depth_nonce = vec![0; (MIN_DEPTH + MAX_DEPTH + 1) as usize];
        for key in depth_nonce.iter_mut() {
            *key = rng.next_u64();
        }
        Zobrist {
            squares,
            side_key,
            piece_square,
            depth_nonce,
        }
    }

    fn key(&self, code: u8, idx: usize) -> u64 {
        debug_assert!(code != 0);
        self.piece_square[(code as usize - 1) * self.squares + idx]
    }

    /// Hashes a position from scratch.
    pub fn hash(&self, pos: &Position) -> PositionHash {
        let mut h = if pos.next_player == 1 { self.side_key } else { 0 };
        for idx in 0..self.squares {
            let code = pos.board[idx];
            if code != 0 {
                h ^= self.key(code, idx);
            }
        }
        PositionHash(h)
    }

    /// Rehashes across a move: XOR out and in every changed square and
    /// toggle the side key. Must agree exactly with `hash` of the new board.
    pub fn update(&self, h: PositionHash, old: &Squares, new: &Squares) -> PositionHash {
        let mut h = h ^ PositionHash(self.side_key);
        for idx in 0..self.squares {
            if old[idx] != new[idx] {
                if old[idx] != 0 {
                    h ^= PositionHash(self.key(old[idx], idx));
                }
                if new[idx] != 0 {
                    h ^= PositionHash(self.key(new[idx], idx));
                }
            }
        }
        h
    }

    /// Mixes the remaining depth into a position hash so that cache windows
    /// computed at different depths do not alias.
    pub fn depth_key(&self, h: PositionHash, depth: i32) -> PositionHash {
        let slot = (depth + MIN_DEPTH).clamp(0, self.depth_nonce.len() as i32 - 1) as usize;
        h ^ PositionHash(self.depth_nonce[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::chess::Chess;
    use crate::games::Rules;

    #[test]
    fn keys_are_reproducible() {
        let mut rules = Chess::default();
        let pos = rules.initial_position();
        let a = Zobrist::new(12, 64);
        let b = Zobrist::new(12, 64);
        assert_eq!(a.hash(&pos), b.hash(&pos));
    }

    #[test]
    fn side_to_move_changes_the_hash() {
        let mut rules = Chess::default();
        let zobrist = Zobrist::new(12, 64);
        let mut pos = rules.initial_position();
        let white = zobrist.hash(&pos);
        pos.next_player = 1;
        assert_ne!(white, zobrist.hash(&pos));
    }

    #[test]
    fn incremental_update_matches_full_rehash() {
        let mut rules = Chess::default();
        let zobrist = Zobrist::new(12, 64);
        let mut pos = rules.initial_position();
        let mut h = zobrist.hash(&pos);
        let mut moves = Vec::new();
        // Drive a deterministic game for a while; every applied move must
        // keep the incremental hash in lockstep with a full rehash.
        for ply in 0..24 {
            moves.clear();
            rules.valid_moves(&pos, &mut moves);
            if moves.is_empty() {
                break;
            }
            let mut mov = moves[ply % moves.len()];
            let old = pos.board;
            pos.apply(&mut mov);
            h = zobrist.update(h, &old, &pos.board);
            assert_eq!(h, zobrist.hash(&pos));
        }
    }

    #[test]
    fn depth_keys_do_not_collide_across_depths() {
        let zobrist = Zobrist::new(12, 64);
        let h = PositionHash(0xdead_beef);
        assert_ne!(zobrist.depth_key(h, 0), zobrist.depth_key(h, 1));
        assert_ne!(zobrist.depth_key(h, -MIN_DEPTH), zobrist.depth_key(h, MAX_DEPTH));
    }
}

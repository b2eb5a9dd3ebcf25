use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::eval::Eval;
use crate::games::{Move, Outcome, Position, Rules};
use crate::search::cache::{KillerTable, TranspositionCache};
use crate::search::mtd::{drive, BoundCtx, SearchNode};
use crate::search::pool::{Job, WorkerPool};
use crate::search::zobrist::Zobrist;

pub mod cache;
mod mtd;
pub mod pool;
pub mod zobrist;

/// Score sentinels. Terminal positions are scored exactly at the sentinel;
/// everything in between is a static evaluation. Both sit far enough inside
/// `i32` that negation can never overflow.
pub const LOSING: i32 = -100_000;
pub const WINNING: i32 = 100_000;

/// Futility margin: a reply must reach `static + QS - QS_A * depth` to be
/// worth a node of its own.
pub const QS: i32 = 40;
pub const QS_A: i32 = 140;

/// The bisection stops once the window is this tight.
pub const EVAL_ROUGHNESS: i32 = 15;

/// How many plies below zero quiescence may extend.
pub const MIN_DEPTH: i32 = 3;

pub const MAX_DEPTH: i32 = 64;

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10);

/// What a search produced: the classification of the root, its legal moves,
/// and (for unfinished positions) the index of the chosen move.
#[derive(Debug)]
pub struct SearchReport {
    pub outcome: Outcome,
    pub moves: Vec<Move>,
    pub best: Option<usize>,
    pub score: i32,
}

impl SearchReport {
    pub fn best_move(&self) -> Option<&Move> {
        self.best.map(|index| &self.moves[index])
    }
}

/// The engine: owns the hasher, the shared caches, the worker pool, and one
/// rule handle per participant. A single instance is reused across moves of
/// a game so the caches keep paying off; `forget` starts a game afresh.
pub struct Searcher<R: Rules, E: Eval> {
    zobrist: Arc<Zobrist>,
    cache: Arc<TranspositionCache>,
    killers: Arc<KillerTable>,
    handles: Arc<Vec<Mutex<R>>>,
    eval: Arc<E>,
    pool: WorkerPool,
    time_limit: Duration,
    max_depth: i32,
}

impl<R: Rules, E: Eval> Searcher<R, E> {
    pub fn new(rules: R, eval: E, threads: usize) -> Self {
        let (width, height) = rules.board_dims();
        let squares = width as usize * height as usize;
        let handles = (0..=threads).map(|_| Mutex::new(rules.clone())).collect();
        Searcher {
            zobrist: Arc::new(Zobrist::new(rules.max_piece_code(), squares)),
            cache: Arc::new(TranspositionCache::default()),
            killers: Arc::new(KillerTable::default()),
            handles: Arc::new(handles),
            eval: Arc::new(eval),
            pool: WorkerPool::new(threads),
            time_limit: DEFAULT_TIME_LIMIT,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn set_time_limit(&mut self, limit: Duration) {
        self.time_limit = limit;
    }

    pub fn set_max_depth(&mut self, depth: i32) {
        self.max_depth = depth.clamp(1, MAX_DEPTH);
    }

    /// Drops everything learned so far. Windows in the cache are only valid
    /// within one game tree, so a fresh game wants a fresh cache.
    pub fn forget(&self) {
        self.cache.clear();
        self.killers.clear();
    }

    /// Picks a move: iterative deepening, each depth bracketing the true
    /// score with null-window tests until the window is tight enough. The
    /// wall clock is only consulted between tests; a test that started in
    /// time is allowed to finish.
    pub fn search(&self, pos: &Position) -> SearchReport {
        let mut handle = self.handles[0].lock().unwrap();
        let outcome = handle.classify(pos);
        let mut report = SearchReport {
            outcome,
            moves: Vec::new(),
            best: None,
            score: 0,
        };
        if outcome.is_terminal() {
            return report;
        }
        handle.valid_moves(pos, &mut report.moves);
        drop(handle);

        let root_hash = self.zobrist.hash(pos);
        let start = Instant::now();
        'deepening: for depth in 1..=self.max_depth {
            let mut lo = LOSING;
            let mut hi = WINNING;
            while hi - lo > EVAL_ROUGHNESS {
                if start.elapsed() >= self.time_limit {
                    break 'deepening;
                }
                let mid = (hi + lo + 1) / 2;
                let (score, best) = self.bound(pos, mid, depth);
                if score >= mid {
                    lo = score;
                } else {
                    hi = score - 1;
                }
                if let Some(best) = best {
                    report.best = Some(best);
                    report.score = score;
                }
            }
            // A test resolved through the cache carries no move; the killer
            // table still knows the best child of the root.
            if let Some(killer) = self.killers.get(root_hash) {
                report.best = Some(killer as usize);
            }
            debug!(
                "depth {depth}: window [{lo}, {hi}], {0} cached positions",
                self.cache.len()
            );
        }

        if let Some(best) = report.best {
            assert!(best < report.moves.len(), "best move index out of range");
        }
        report
    }

    /// One null-window test: decides whether the value of `pos` at `depth`
    /// is at least `gamma` (returns a score `>= gamma`) or below it
    /// (returns a score `< gamma`), together with the root child that
    /// realised the score.
    pub fn bound(&self, pos: &Position, gamma: i32, depth: i32) -> (i32, Option<usize>) {
        let outcome = self.handles[0].lock().unwrap().classify(pos);
        let hash = self.zobrist.hash(pos);
        let static_score = match outcome {
            Outcome::Win => WINNING,
            Outcome::Loss => LOSING,
            Outcome::Draw => 0,
            Outcome::Ongoing => self.eval.eval(pos),
        };
        let root = SearchNode::root(*pos, hash, static_score, outcome, depth.min(self.max_depth));

        let ctx = Arc::new(BoundCtx {
            gamma,
            root_side: pos.next_player,
            stack: Mutex::new(vec![root]),
            done: AtomicBool::new(false),
            result: Mutex::new(None),
            zobrist: Arc::clone(&self.zobrist),
            cache: Arc::clone(&self.cache),
            killers: Arc::clone(&self.killers),
            handles: Arc::clone(&self.handles),
            eval: Arc::clone(&self.eval),
        });
        let job: Job = {
            let ctx = Arc::clone(&ctx);
            Arc::new(move |worker| drive(&ctx, worker))
        };
        self.pool.run(job);

        let result = ctx.result.lock().unwrap().take();
        result.expect("search finished without a root result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PstEval;
    use crate::games::chess::{Chess, Piece, WIDTH};
    use crate::games::line::Line;
    use crate::games::Rules;

    fn chess_searcher(threads: usize) -> Searcher<Chess, PstEval> {
        Searcher::new(Chess, PstEval::new(8, 8), threads)
    }

    /// Rook delivers mate on the back rank; everything else lets the king
    /// slip out.
    fn mate_in_one() -> Position {
        let mut pos = Position::empty();
        pos.board[7 * WIDTH] = Piece::King.code(1);
        pos.board[5 * WIDTH + 1] = Piece::King.code(0);
        pos.board[6 * WIDTH + 7] = Piece::Rook.code(0);
        pos
    }

    #[test]
    fn shallow_test_fails_low_at_the_start() {
        let searcher = chess_searcher(0);
        let mut rules = Chess;
        let pos = rules.initial_position();
        let (score, _) = searcher.bound(&pos, 1, 1);
        // Whatever one side gains in one ply, the mirrored reply recovers.
        assert!(score < 1);
    }

    #[test]
    fn finds_the_mating_move() {
        let searcher = chess_searcher(0);
        let pos = mate_in_one();
        let (score, best) = searcher.bound(&pos, WINNING - 10, 2);
        assert!(score >= WINNING - 10);
        let mut rules = Chess;
        let mut moves = Vec::new();
        rules.valid_moves(&pos, &mut moves);
        let mov = moves[best.expect("a winning line must carry its move")];
        assert_eq!((mov.from.i, mov.from.j), (6, 7));
        assert_eq!((mov.to.i, mov.to.j), (7, 7));
    }

    #[test]
    fn finds_the_mating_move_in_parallel() {
        let searcher = chess_searcher(3);
        let pos = mate_in_one();
        let (score, best) = searcher.bound(&pos, WINNING - 10, 2);
        assert!(score >= WINNING - 10);
        assert!(best.is_some());
    }

    #[test]
    fn single_threaded_bounds_are_deterministic() {
        let mut rules = Chess;
        let pos = rules.initial_position();
        for gamma in [-50, 0, 1, 30] {
            let a = chess_searcher(0).bound(&pos, gamma, 2);
            let b = chess_searcher(0).bound(&pos, gamma, 2);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn winning_positions_fail_high_at_any_threshold() {
        let searcher = chess_searcher(0);
        let pos = mate_in_one();
        // The true value is a mate, so every test must fail high, whether
        // answered by a fresh search or by an already-tightened window.
        for gamma in [-200, -15, 0, 25, 300] {
            let (score, _) = searcher.bound(&pos, gamma, 2);
            assert!((LOSING..=WINNING).contains(&score));
            assert!(score >= gamma);
        }
    }

    #[test]
    fn reduction_probe_seeds_the_killer_table() {
        let searcher = Searcher::new(Line, PstEval::new(8, 1), 0);
        let mut rules = Line;
        let pos = rules.initial_position();
        searcher.bound(&pos, 1, 4);
        let root_hash = searcher.zobrist.hash(&pos);
        assert!(searcher.killers.get(root_hash).is_some());
    }

    #[test]
    fn terminal_positions_come_back_unsearched() {
        let mut searcher = Searcher::new(Line, PstEval::new(8, 1), 0);
        searcher.set_time_limit(Duration::from_millis(50));
        let mut pos = Position::empty();
        pos.board[0] = Piece::King.code(0);
        pos.board[5] = Piece::Rook.code(1);
        pos.board[7] = Piece::King.code(1);
        let report = searcher.search(&pos);
        assert_eq!(report.outcome, Outcome::Loss);
        assert!(report.best.is_none());
        assert!(report.moves.is_empty());
    }

    #[test]
    fn self_play_on_the_line_game_stays_legal() {
        let mut searcher = Searcher::new(Line, PstEval::new(8, 1), 0);
        searcher.set_time_limit(Duration::from_millis(50));
        searcher.set_max_depth(4);
        let mut rules = Line;
        let mut pos = rules.initial_position();
        for _ in 0..20 {
            let report = searcher.search(&pos);
            if report.outcome.is_terminal() {
                break;
            }
            // A lost position may come back without a move; anything else
            // must pick one of its legal moves.
            let Some(best) = report.best else { break };
            let mut mov = report.moves[best];
            pos.apply(&mut mov);
        }
    }
}

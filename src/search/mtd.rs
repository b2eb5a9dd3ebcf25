use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use itertools::Itertools;

use crate::eval::Eval;
use crate::games::{Move, Outcome, Position, PositionHash, Rules};
use crate::search::cache::{KillerTable, TranspositionCache};
use crate::search::zobrist::Zobrist;
use crate::search::{LOSING, MIN_DEPTH, QS, QS_A, WINNING};

/// One frame of the explicit search stack.
///
/// A node is pushed unvisited, expanded on its first pop (pushing itself
/// back underneath its children), and completed on its second pop once every
/// child has reported. Children hold an `Arc` to their parent, so a parent
/// outlives everything that still needs to report into it.
pub(super) struct SearchNode {
    pos: Position,
    hash: PositionHash,
    static_score: i32,
    depth: i32,
    outcome: Outcome,
    /// A null-move reduction probe: same position and side as its parent.
    /// Its completion seeds the killer table for the shared hash but never
    /// flows into the parent's score (the negamax sign would be wrong).
    probe: bool,
    /// Which child of the parent this node is, for killer bookkeeping.
    move_index: usize,
    parent: Option<Arc<SearchNode>>,
    visited: AtomicBool,
    state: Mutex<NodeState>,
    children_done: Condvar,
}

struct NodeState {
    best: i32,
    best_child: Option<usize>,
    pending: usize,
    kill: bool,
    probed: bool,
}

impl NodeState {
    fn fresh() -> Self {
        NodeState {
            best: LOSING,
            best_child: None,
            pending: 0,
            kill: false,
            probed: false,
        }
    }
}

impl SearchNode {
    pub(super) fn root(
        pos: Position,
        hash: PositionHash,
        static_score: i32,
        outcome: Outcome,
        depth: i32,
    ) -> Arc<Self> {
        Arc::new(SearchNode {
            pos,
            hash,
            static_score,
            depth,
            outcome,
            probe: false,
            move_index: 0,
            parent: None,
            visited: AtomicBool::new(false),
            state: Mutex::new(NodeState::fresh()),
            children_done: Condvar::new(),
        })
    }
}

/// Everything a single null-window test shares between its participants.
pub(super) struct BoundCtx<R: Rules, E: Eval> {
    pub gamma: i32,
    pub root_side: u8,
    pub stack: Mutex<Vec<Arc<SearchNode>>>,
    pub done: AtomicBool,
    pub result: Mutex<Option<(i32, Option<usize>)>>,
    pub zobrist: Arc<Zobrist>,
    pub cache: Arc<TranspositionCache>,
    pub killers: Arc<KillerTable>,
    pub handles: Arc<Vec<Mutex<R>>>,
    pub eval: Arc<E>,
}

impl<R: Rules, E: Eval> BoundCtx<R, E> {
    /// The negamax re-flip: a node on the root's side is tested against
    /// `gamma`, the opposite side against `1 - gamma`. The same threshold a
    /// node sees here is used when its result tightens the cache.
    fn threshold(&self, side: u8) -> i32 {
        if side == self.root_side {
            self.gamma
        } else {
            1 - self.gamma
        }
    }
}

/// The worker loop: pop a node, process it, repeat. The stack can run dry
/// while other workers are still expanding, so idle workers spin until the
/// root has completed; with zero pool threads the caller drains everything
/// alone, in strict LIFO order.
pub(super) fn drive<R: Rules, E: Eval>(ctx: &BoundCtx<R, E>, worker: usize) {
    let mut moves = Vec::new();
    loop {
        if ctx.done.load(Ordering::Acquire) {
            return;
        }
        let node = ctx.stack.lock().unwrap().pop();
        match node {
            Some(node) => {
                if node.visited.load(Ordering::Acquire) {
                    second_visit(ctx, &node);
                } else {
                    first_visit(ctx, node, worker, &mut moves);
                }
            }
            None => std::hint::spin_loop(),
        }
    }
}

fn parent_killed(node: &SearchNode) -> bool {
    node.parent
        .as_ref()
        .map_or(false, |parent| parent.state.lock().unwrap().kill)
}

fn first_visit<R: Rules, E: Eval>(
    ctx: &BoundCtx<R, E>,
    node: Arc<SearchNode>,
    worker: usize,
    moves: &mut Vec<Move>,
) {
    let g = ctx.threshold(node.pos.next_player);

    let killed = parent_killed(&node);
    if killed {
        node.state.lock().unwrap().kill = true;
    }

    // A reduction probe may still be in flight from an earlier pass over
    // this node; its completion seeds the killer table for our hash. The
    // drain must happen even on the cancelled path: a node only ever
    // reports once its whole subtree has unwound, which is what lets the
    // root's completion end the run with an empty stack and no waiters.
    let probed = {
        let mut state = node.state.lock().unwrap();
        while state.pending > 0 {
            state = node.children_done.wait(state).unwrap();
        }
        state.probed
    };

    if killed {
        abort(ctx, &node);
        return;
    }

    let key = ctx.zobrist.depth_key(node.hash, node.depth);
    if let Some(window) = ctx.cache.probe(key) {
        if window.lo >= g {
            complete(ctx, &node, window.lo, None, g);
            return;
        }
        if window.hi < g {
            complete(ctx, &node, window.hi, None, g);
            return;
        }
    }

    // Stand pat: at the quiescence frontier a position already good enough
    // is taken at face value.
    if node.depth <= 0 && node.static_score >= g {
        complete(ctx, &node, node.static_score, None, g);
        return;
    }

    if node.outcome.is_terminal() || node.depth <= -MIN_DEPTH {
        complete(ctx, &node, node.static_score, None, g);
        return;
    }

    let killer = ctx.killers.get(node.hash);
    if killer.is_none() && node.depth > 2 && !probed {
        // Null-move reduction: search this very position three plies
        // shallower first. Whatever move it finds lands in the killer
        // table and steers the ordering of the full-depth expansion.
        {
            let mut state = node.state.lock().unwrap();
            state.pending = 1;
            state.probed = true;
        }
        let probe = Arc::new(SearchNode {
            pos: node.pos,
            hash: node.hash,
            static_score: node.static_score,
            depth: node.depth - 3,
            outcome: node.outcome,
            probe: true,
            move_index: 0,
            parent: Some(Arc::clone(&node)),
            visited: AtomicBool::new(false),
            state: Mutex::new(NodeState::fresh()),
            children_done: Condvar::new(),
        });
        let mut stack = ctx.stack.lock().unwrap();
        stack.push(node);
        stack.push(probe);
        return;
    }

    // Expand: enumerate the children, classifying and scoring each.
    let children = {
        let mut handle = ctx.handles[worker].lock().unwrap();
        moves.clear();
        handle.valid_moves(&node.pos, moves);
        assert!(
            !moves.is_empty(),
            "rule set returned no moves for an unfinished position"
        );
        let mut children = Vec::with_capacity(moves.len());
        for (index, mov) in moves.iter().enumerate() {
            let pos = Position {
                next_player: node.pos.next_player ^ 1,
                board: mov.board,
            };
            let hash = ctx.zobrist.update(node.hash, &node.pos.board, &pos.board);
            let outcome = handle.classify(&pos);
            let static_score = match outcome {
                Outcome::Win => WINNING,
                Outcome::Loss => LOSING,
                Outcome::Draw => 0,
                Outcome::Ongoing => ctx.eval.eval(&pos),
            };
            children.push((index, pos, hash, outcome, static_score));
        }
        children
    };

    // Order: killer first, then ascending by the child's own score, which
    // is descending by how good the move looks for us.
    let mut order: Vec<usize> = (0..children.len())
        .sorted_by_key(|&c| children[c].4)
        .collect();
    if let Some(killer) = killer {
        let killer = killer as usize;
        assert!(killer < children.len(), "killer index out of range");
        let at = order.iter().position(|&c| c == killer).unwrap();
        order.remove(at);
        order.insert(0, killer);
    }

    // Futility: past the first move, replies that do not even reach the
    // static floor are not worth a node.
    let min_score = node.static_score + QS - QS_A * node.depth;
    let kept: Vec<usize> = order
        .iter()
        .copied()
        .enumerate()
        .filter(|&(rank, c)| rank == 0 || -children[c].4 >= min_score)
        .map(|(_, c)| c)
        .collect();

    // At the frontier, settle for the best reply's static value when it
    // already fails low; no deeper line can lift it past the threshold.
    let first = kept[0];
    if node.depth <= 1 && -children[first].4 < g {
        complete(ctx, &node, -children[first].4, Some(children[first].0), g);
        return;
    }

    node.state.lock().unwrap().pending = kept.len();
    node.visited.store(true, Ordering::Release);
    let parent = Arc::clone(&node);
    let child_depth = (node.depth - 1).max(-MIN_DEPTH);
    let mut stack = ctx.stack.lock().unwrap();
    stack.push(node);
    // Reversed, so the most promising child is popped first.
    for &c in kept.iter().rev() {
        let (index, pos, hash, outcome, static_score) = children[c];
        stack.push(Arc::new(SearchNode {
            pos,
            hash,
            static_score,
            depth: child_depth,
            outcome,
            probe: false,
            move_index: index,
            parent: Some(Arc::clone(&parent)),
            visited: AtomicBool::new(false),
            state: Mutex::new(NodeState::fresh()),
            children_done: Condvar::new(),
        }));
    }
}

fn second_visit<R: Rules, E: Eval>(ctx: &BoundCtx<R, E>, node: &Arc<SearchNode>) {
    let g = ctx.threshold(node.pos.next_player);
    let killed = parent_killed(node);
    if killed {
        // Pass the cancellation on so in-flight children drain quickly.
        node.state.lock().unwrap().kill = true;
    }
    let (best, best_child) = {
        let mut state = node.state.lock().unwrap();
        while state.pending > 0 {
            state = node.children_done.wait(state).unwrap();
        }
        (state.best, state.best_child)
    };
    if killed {
        abort(ctx, node);
    } else {
        complete(ctx, node, best, best_child, g);
    }
}

/// Normal completion: remember the cutoff move, tighten the cache window
/// with the threshold this node was tested against, and report upwards.
fn complete<R: Rules, E: Eval>(
    ctx: &BoundCtx<R, E>,
    node: &Arc<SearchNode>,
    best: i32,
    best_child: Option<usize>,
    g: i32,
) {
    debug_assert!((LOSING..=WINNING).contains(&best), "score {best} out of range");
    if let Some(child) = best_child {
        ctx.killers.record(node.hash, child as u32);
    }
    ctx.cache
        .tighten(ctx.zobrist.depth_key(node.hash, node.depth), best, g);
    report(ctx, node, Some((best, best_child)));
}

/// Cancelled completion: no cache or killer writes (a placeholder score
/// would poison the monotone window), just the bookkeeping.
fn abort<R: Rules, E: Eval>(ctx: &BoundCtx<R, E>, node: &Arc<SearchNode>) {
    report(ctx, node, None);
}

fn report<R: Rules, E: Eval>(
    ctx: &BoundCtx<R, E>,
    node: &Arc<SearchNode>,
    outcome: Option<(i32, Option<usize>)>,
) {
    match &node.parent {
        None => {
            if let Some((best, best_child)) = outcome {
                *ctx.result.lock().unwrap() = Some((best, best_child));
            }
            ctx.done.store(true, Ordering::Release);
        }
        Some(parent) => {
            let mut state = parent.state.lock().unwrap();
            if let Some((best, _)) = outcome {
                if !node.probe && !state.kill {
                    let candidate = -best;
                    if candidate > state.best {
                        state.best = candidate;
                        state.best_child = Some(node.move_index);
                    }
                    if candidate >= ctx.threshold(parent.pos.next_player) {
                        // Cutoff: the remaining siblings cannot matter.
                        state.kill = true;
                    }
                }
            }
            state.pending -= 1;
            if state.pending == 0 {
                parent.children_done.notify_all();
            }
        }
    }
}

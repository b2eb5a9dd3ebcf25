use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use tabula::eval::PstEval;
use tabula::games::chess::Chess;
use tabula::games::line::Line;
use tabula::games::Rules;
use tabula::search::Searcher;

fn bench_chess_bound(c: &mut Criterion) {
    let mut rules = Chess;
    let pos = rules.initial_position();
    c.bench_function("chess bound depth 2", |b| {
        b.iter_batched(
            || Searcher::new(Chess, PstEval::new(8, 8), 0),
            |searcher| searcher.bound(&pos, 1, 2),
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_line_search(c: &mut Criterion) {
    let mut rules = Line;
    let pos = rules.initial_position();
    c.bench_function("line search depth 5", |b| {
        b.iter_batched(
            || {
                let mut searcher = Searcher::new(Line, PstEval::new(8, 1), 0);
                searcher.set_time_limit(Duration::from_secs(5));
                searcher.set_max_depth(5);
                searcher
            },
            |searcher| searcher.search(&pos),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_chess_bound, bench_line_search);
criterion_main!(benches);

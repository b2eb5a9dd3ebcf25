use std::path::PathBuf;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::Res;
use crate::eval::Eval;
use crate::games::{Outcome, Position, Rules};
use crate::nn::{encode_position, Network};
use crate::search::{Searcher, LOSING, WINNING};

const LEARNING_RATE: f32 = 0.0001;
const CHECKPOINT_EVERY: usize = 10;
/// Games without a natural end are cut off and scored as draws.
const MAX_PLIES: usize = 400;

struct GameRecord {
    positions: Vec<Position>,
    scores: Vec<i32>,
    outcome: Outcome,
}

/// Self-play training of the value network. The engine plays itself with
/// its regular evaluator; every game is then replayed backwards with
/// temporal-difference updates pulling each position's value towards a mix
/// of the next observed score and the final outcome.
pub struct Trainer {
    net: Network,
    squares: usize,
    weights_path: PathBuf,
    games: usize,
}

impl Trainer {
    /// Resumes from `weights_path` when it holds a matching network,
    /// otherwise starts from random weights.
    pub fn new(
        squares: usize,
        max_code: u8,
        hidden_size: usize,
        weights_path: PathBuf,
        games: usize,
    ) -> Self {
        let input_size = max_code as usize * squares;
        let net = match Network::load(&weights_path, input_size, hidden_size) {
            Ok(net) => {
                info!("resuming from {0}", weights_path.display());
                net
            }
            Err(_) => Network::new(input_size, hidden_size, &mut StdRng::seed_from_u64(0xbead)),
        };
        Trainer {
            net,
            squares,
            weights_path,
            games,
        }
    }

    pub fn run<R: Rules, E: Eval>(&mut self, rules: &mut R, searcher: &Searcher<R, E>) -> Res<()> {
        for game in 0..self.games {
            searcher.forget();
            let record = self.self_play(rules, searcher);
            info!(
                "game {0}/{1}: {2} after {3} plies",
                game + 1,
                self.games,
                record.outcome,
                record.positions.len()
            );
            self.learn(&record);
            if (game + 1) % CHECKPOINT_EVERY == 0 {
                self.net.save(&self.weights_path)?;
            }
        }
        self.net.save(&self.weights_path)
    }

    fn self_play<R: Rules, E: Eval>(&self, rules: &mut R, searcher: &Searcher<R, E>) -> GameRecord {
        let mut pos = rules.initial_position();
        let mut record = GameRecord {
            positions: Vec::new(),
            scores: Vec::new(),
            outcome: Outcome::Draw,
        };
        while record.positions.len() < MAX_PLIES {
            let report = searcher.search(&pos);
            if report.outcome.is_terminal() {
                record.outcome = report.outcome;
                break;
            }
            // A hopeless position can fail every window without ever
            // raising a best move; the game is over for our purposes.
            let Some(best) = report.best else {
                record.outcome = Outcome::Loss;
                break;
            };
            record.positions.push(pos);
            record.scores.push(report.score);
            let mut mov = report.moves[best];
            pos.apply(&mut mov);
        }
        record
    }

    fn learn(&mut self, record: &GameRecord) {
        let target = match record.outcome {
            Outcome::Win => WINNING as f32,
            Outcome::Loss => LOSING as f32,
            _ => 0.0,
        };
        for i in (0..record.positions.len()).rev() {
            let input = encode_position(&record.positions[i], self.squares, self.net.input_size());
            let current = self.net.forward(&input) * 100.0;
            let next_value = if i + 1 < record.scores.len() {
                record.scores[i + 1] as f32
            } else {
                target
            };
            let td_target = (current + LEARNING_RATE * (next_value - current)) / 100.0;
            self.net.backward(td_target, LEARNING_RATE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::PstEval;
    use crate::games::line::Line;
    use std::time::Duration;

    #[test]
    fn a_training_run_saves_weights() {
        let path = std::env::temp_dir().join("tabula_trainer_smoke.bin");
        let _ = std::fs::remove_file(&path);
        let mut rules = Line;
        let mut searcher = Searcher::new(Line, PstEval::new(8, 1), 0);
        searcher.set_time_limit(Duration::from_millis(5));
        searcher.set_max_depth(2);
        let mut trainer = Trainer::new(8, 12, 8, path.clone(), 1);
        trainer.run(&mut rules, &searcher).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}

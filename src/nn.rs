use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{EngineError, Res};
use crate::eval::Eval;
use crate::games::Position;

pub const HIDDEN_SIZE: usize = 1024;

/// A fixed two-layer network: one-hot piece-square planes in, a tanh hidden
/// layer, a single tanh output. Plain SGD, no batching. This is the
/// rudimentary value network the trainer updates from self-play; the search
/// itself keeps using the piece-square evaluator.
pub struct Network {
    input_size: usize,
    hidden_size: usize,
    hidden_weights: Vec<f32>,
    hidden_biases: Vec<f32>,
    output_weights: Vec<f32>,
    output_bias: f32,
    // Activations kept from the last forward pass for backpropagation.
    last_input: Vec<f32>,
    hidden: Vec<f32>,
    hidden_zs: Vec<f32>,
    output_z: f32,
    output: f32,
}

fn activation(z: f32) -> f32 {
    z.tanh()
}

fn activation_prime(z: f32) -> f32 {
    let t = z.tanh();
    1.0 - t * t
}

impl Network {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let spread_hidden = (2.0 / (input_size + hidden_size) as f32).sqrt();
        let spread_output = (2.0 / (1 + hidden_size) as f32).sqrt();
        Network {
            input_size,
            hidden_size,
            hidden_weights: (0..input_size * hidden_size)
                .map(|_| rng.gen_range(-spread_hidden..spread_hidden))
                .collect(),
            hidden_biases: vec![0.0; hidden_size],
            output_weights: (0..hidden_size)
                .map(|_| rng.gen_range(-spread_output..spread_output))
                .collect(),
            output_bias: 0.0,
            last_input: vec![0.0; input_size],
            hidden: vec![0.0; hidden_size],
            hidden_zs: vec![0.0; hidden_size],
            output_z: 0.0,
            output: 0.0,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Forward pass that keeps every intermediate value for `backward`.
    pub fn forward(&mut self, input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), self.input_size);
        self.last_input.copy_from_slice(input);
        for j in 0..self.hidden_size {
            let mut z = self.hidden_biases[j];
            for (i, &x) in input.iter().enumerate() {
                if x != 0.0 {
                    z += x * self.hidden_weights[i * self.hidden_size + j];
                }
            }
            self.hidden_zs[j] = z;
            self.hidden[j] = activation(z);
        }
        let mut out = self.output_bias;
        for j in 0..self.hidden_size {
            out += self.hidden[j] * self.output_weights[j];
        }
        self.output_z = out;
        self.output = activation(out);
        self.output
    }

    /// Evaluation-only forward pass; stores nothing.
    pub fn infer(&self, input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), self.input_size);
        let mut out = self.output_bias;
        for j in 0..self.hidden_size {
            let mut z = self.hidden_biases[j];
            for (i, &x) in input.iter().enumerate() {
                if x != 0.0 {
                    z += x * self.hidden_weights[i * self.hidden_size + j];
                }
            }
            out += activation(z) * self.output_weights[j];
        }
        activation(out)
    }

    /// One SGD step towards `target`, using the values stored by the last
    /// `forward`. Squared-error loss.
    pub fn backward(&mut self, target: f32, learning_rate: f32) {
        let dl_dz = 2.0 * (self.output - target) * activation_prime(self.output_z);

        let mut hidden_errors = vec![0.0f32; self.hidden_size];
        for j in 0..self.hidden_size {
            hidden_errors[j] = dl_dz * self.output_weights[j] * activation_prime(self.hidden_zs[j]);
            self.output_weights[j] -= learning_rate * self.hidden[j] * dl_dz;
        }
        self.output_bias -= learning_rate * dl_dz;

        for j in 0..self.hidden_size {
            let err = hidden_errors[j];
            if err == 0.0 {
                continue;
            }
            for i in 0..self.input_size {
                let x = self.last_input[i];
                if x != 0.0 {
                    self.hidden_weights[i * self.hidden_size + j] -= learning_rate * x * err;
                }
            }
            self.hidden_biases[j] -= learning_rate * err;
        }
    }

    pub fn save(&self, path: &Path) -> Res<()> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&(self.input_size as u32).to_le_bytes())?;
        out.write_all(&(self.hidden_size as u32).to_le_bytes())?;
        for value in self
            .hidden_weights
            .iter()
            .chain(self.hidden_biases.iter())
            .chain(self.output_weights.iter())
            .chain(std::iter::once(&self.output_bias))
        {
            out.write_all(&value.to_le_bytes())?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn load(path: &Path, input_size: usize, hidden_size: usize) -> Res<Self> {
        let mut input = BufReader::new(File::open(path)?);
        let mut word = [0u8; 4];
        input.read_exact(&mut word)?;
        let stored_input = u32::from_le_bytes(word) as usize;
        input.read_exact(&mut word)?;
        let stored_hidden = u32::from_le_bytes(word) as usize;
        if (stored_input, stored_hidden) != (input_size, hidden_size) {
            return Err(EngineError::script(format!(
                "weight file is {stored_input}x{stored_hidden}, expected {input_size}x{hidden_size}"
            )));
        }
        let read_f32 = |input: &mut BufReader<File>| -> Res<f32> {
            let mut word = [0u8; 4];
            input.read_exact(&mut word)?;
            Ok(f32::from_le_bytes(word))
        };
        let mut net = Network::new(input_size, hidden_size, &mut StdRng::seed_from_u64(0));
        for value in net
            .hidden_weights
            .iter_mut()
            .chain(net.hidden_biases.iter_mut())
            .chain(net.output_weights.iter_mut())
        {
            *value = read_f32(&mut input)?;
        }
        net.output_bias = read_f32(&mut input)?;
        Ok(net)
    }
}

/// One-hot encoding of a board: one plane per piece code, one input per
/// square of each plane.
pub fn encode_position(pos: &Position, squares: usize, input_size: usize) -> Vec<f32> {
    let mut input = vec![0.0; input_size];
    for idx in 0..squares {
        let code = pos.board[idx] as usize;
        if code != 0 {
            let plane = (code - 1) * squares + idx;
            if plane < input_size {
                input[plane] = 1.0;
            }
        }
    }
    input
}

/// Adapts a trained network to the evaluator interface: the tanh output is
/// scaled to roughly centipawns and negated for side 1, whose perspective
/// the absolute encoding does not carry.
pub struct NnEval {
    net: Network,
    squares: usize,
}

impl NnEval {
    pub fn new(net: Network, squares: usize) -> Self {
        NnEval { net, squares }
    }
}

impl Eval for NnEval {
    fn eval(&self, pos: &Position) -> i32 {
        let input = encode_position(pos, self.squares, self.net.input_size());
        let score = (self.net.infer(&input) * 100.0) as i32;
        if pos.next_player == 1 {
            -score
        } else {
            score
        }
    }
}

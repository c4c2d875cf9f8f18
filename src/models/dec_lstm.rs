use super::decoder::Decoder;
use crate::layers::{Dropout, EmbeddingT, LinearT, Lstm};
use crate::math::{softmax_cross_entropy, Matrix};

/// LSTM decoder for token sequences.
///
/// The latent code is concatenated to the word embedding at every time step
/// (so the decoder cannot ignore it entirely), followed by an LSTM and a
/// vocabulary projection.  Teacher forcing: step `t` consumes token `t` and
/// predicts token `t + 1`.  Dropout is applied to the embedding input and
/// the hidden output during training.
pub struct LstmDecoder {
    embed: EmbeddingT,
    lstm: Lstm,
    vocab_fc: LinearT,
    dropout_in: Dropout,
    dropout_out: Dropout,
    p_in: f32,
    p_out: f32,
    ni: usize,
    nz: usize,
    // token ids per input step from the last training forward
    step_ids: Vec<Vec<usize>>,
}

fn stack_rows(steps: &[Matrix]) -> Matrix {
    let rows: usize = steps.iter().map(|m| m.rows).sum();
    let cols = steps.first().map(|m| m.cols).unwrap_or(0);
    let mut data = Vec::with_capacity(rows * cols);
    for m in steps {
        data.extend_from_slice(&m.data);
    }
    Matrix::from_vec(rows, cols, data)
}

fn slice_rows(m: &Matrix, start: usize, count: usize) -> Matrix {
    Matrix::from_vec(
        count,
        m.cols,
        m.data[start * m.cols..(start + count) * m.cols].to_vec(),
    )
}

fn concat_cols(a: &Matrix, b: &Matrix) -> Matrix {
    assert_eq!(a.rows, b.rows);
    let mut out = Matrix::zeros(a.rows, a.cols + b.cols);
    for r in 0..a.rows {
        for c in 0..a.cols {
            out.set(r, c, a.get(r, c));
        }
        for c in 0..b.cols {
            out.set(r, a.cols + c, b.get(r, c));
        }
    }
    out
}

impl LstmDecoder {
    pub fn new(
        vocab_size: usize,
        ni: usize,
        nh: usize,
        nz: usize,
        p_in: f32,
        p_out: f32,
    ) -> Self {
        Self {
            embed: EmbeddingT::new(vocab_size, ni),
            lstm: Lstm::new(ni + nz, nh),
            vocab_fc: LinearT::new(nh, vocab_size),
            dropout_in: Dropout::new(),
            dropout_out: Dropout::new(),
            p_in,
            p_out,
            ni,
            nz,
            step_ids: Vec::new(),
        }
    }

    /// Input ids (all but the last token) and target ids (all but the
    /// first), flattened time-major to match the stacked step matrices.
    fn split_teacher_forcing(sents: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<usize>) {
        let steps = sents.first().map(|s| s.len()).unwrap_or(0) - 1;
        let mut ids = Vec::with_capacity(steps);
        let mut targets = Vec::with_capacity(steps * sents.len());
        for t in 0..steps {
            ids.push(sents.iter().map(|s| s[t]).collect());
            targets.extend(sents.iter().map(|s| s[t + 1]));
        }
        (ids, targets)
    }

    fn per_example_sums(losses: &[f32], steps: usize, batch: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; batch];
        for t in 0..steps {
            for b in 0..batch {
                out[b] += losses[t * batch + b];
            }
        }
        out
    }

    /// Greedy decoding from latent codes: start at `bos`, stop at `eos` or
    /// `max_len`.  Returns one id sequence per row of `z` (without `bos`).
    pub fn decode_greedy(&self, z: &Matrix, bos: usize, eos: usize, max_len: usize) -> Vec<Vec<usize>> {
        let n = z.rows;
        let mut h = Matrix::zeros(n, self.lstm.hidden_dim());
        let mut c = Matrix::zeros(n, self.lstm.hidden_dim());
        let mut current = vec![bos; n];
        let mut done = vec![false; n];
        let mut out = vec![Vec::new(); n];
        for _ in 0..max_len {
            let x_t = concat_cols(&self.embed.lookup(&current), z);
            let (h_new, c_new) = self.lstm.step_state(&x_t, &h, &c);
            h = h_new;
            c = c_new;
            let logits = self.vocab_fc.forward(&h);
            for b in 0..n {
                if done[b] {
                    continue;
                }
                let row = logits.row(b);
                let mut best = 0usize;
                let mut best_val = f32::NEG_INFINITY;
                for (i, &v) in row.iter().enumerate() {
                    if v > best_val {
                        best_val = v;
                        best = i;
                    }
                }
                if best == eos {
                    done[b] = true;
                } else {
                    out[b].push(best);
                }
                current[b] = best;
            }
            if done.iter().all(|&d| d) {
                break;
            }
        }
        out
    }
}

impl Decoder for LstmDecoder {
    type Input = Vec<Vec<usize>>;

    fn reconstruct_error(&self, sents: &Vec<Vec<usize>>, z: &Matrix) -> Vec<f32> {
        let batch = sents.len();
        let (ids, targets) = Self::split_teacher_forcing(sents);
        let steps = ids.len();
        let xs: Vec<Matrix> = ids
            .iter()
            .map(|ids_t| concat_cols(&self.embed.lookup(ids_t), z))
            .collect();
        let hs = self.lstm.forward(&xs);
        let logits = self.vocab_fc.forward(&stack_rows(&hs));
        let (losses, _) = softmax_cross_entropy(&logits, &targets);
        Self::per_example_sums(&losses, steps, batch)
    }

    fn reconstruct_error_train(
        &mut self,
        sents: &Vec<Vec<usize>>,
        z: &Matrix,
        grad_scale: f32,
    ) -> (Vec<f32>, Matrix) {
        let batch = sents.len();
        let (ids, targets) = Self::split_teacher_forcing(sents);
        let steps = ids.len();
        self.step_ids = ids;

        // one stacked embedding matrix so a single dropout mask covers the
        // whole sequence
        let embeds: Vec<Matrix> = self.step_ids.iter().map(|t| self.embed.lookup(t)).collect();
        let stacked = self.dropout_in.forward(&stack_rows(&embeds), self.p_in, true);
        let xs: Vec<Matrix> = (0..steps)
            .map(|t| concat_cols(&slice_rows(&stacked, t * batch, batch), z))
            .collect();

        let hs = self.lstm.forward_train(&xs);
        let hidden = self
            .dropout_out
            .forward(&stack_rows(&hs), self.p_out, true);
        let logits = self.vocab_fc.forward_train(&hidden);
        let (losses, mut grad) = softmax_cross_entropy(&logits, &targets);
        grad.scale(grad_scale);

        let grad_hidden = self.dropout_out.backward(&self.vocab_fc.backward(&grad));
        let grad_hs: Vec<Matrix> = (0..steps)
            .map(|t| slice_rows(&grad_hidden, t * batch, batch))
            .collect();
        let grad_xs = self.lstm.backward(&grad_hs);

        let mut grad_z = Matrix::zeros(batch, self.nz);
        let mut grad_embed_steps = Vec::with_capacity(steps);
        for g in &grad_xs {
            let mut ge = Matrix::zeros(batch, self.ni);
            for b in 0..batch {
                for c in 0..self.ni {
                    ge.set(b, c, g.get(b, c));
                }
                for c in 0..self.nz {
                    grad_z.data[b * self.nz + c] += g.get(b, self.ni + c);
                }
            }
            grad_embed_steps.push(ge);
        }
        let grad_embed = self.dropout_in.backward(&stack_rows(&grad_embed_steps));
        for (t, ids_t) in self.step_ids.iter().enumerate() {
            self.embed
                .backward(ids_t, &slice_rows(&grad_embed, t * batch, batch));
        }

        (Self::per_example_sums(&losses, steps, batch), grad_z)
    }

    fn zero_grad(&mut self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    fn parameters(&mut self) -> Vec<&mut LinearT> {
        let mut params = Vec::new();
        params.extend(self.embed.parameters());
        params.extend(self.lstm.parameters());
        params.extend(self.vocab_fc.parameters());
        params
    }
}

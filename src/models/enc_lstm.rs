use super::encoder::Encoder;
use crate::layers::{EmbeddingT, LinearT, Lstm};
use crate::math::Matrix;

/// Gaussian LSTM encoder for token sequences.
///
/// Embeds the tokens, runs the LSTM over the sequence and applies bias-free
/// mean / log-variance heads to the final hidden state.  Batches hold
/// same-length sequences, so no padding is involved.
pub struct LstmEncoder {
    embed: EmbeddingT,
    lstm: Lstm,
    mu_fc: LinearT,
    logvar_fc: LinearT,
    // token ids per time step from the last training forward
    step_ids: Vec<Vec<usize>>,
}

impl LstmEncoder {
    pub fn new(vocab_size: usize, ni: usize, nh: usize, nz: usize) -> Self {
        Self {
            embed: EmbeddingT::new(vocab_size, ni),
            lstm: Lstm::new(ni, nh),
            mu_fc: LinearT::new(nh, nz),
            logvar_fc: LinearT::new(nh, nz),
            step_ids: Vec::new(),
        }
    }

    fn step_inputs(&self, sents: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<Matrix>) {
        let seq_len = sents.first().map(|s| s.len()).unwrap_or(0);
        let mut ids = Vec::with_capacity(seq_len);
        let mut xs = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let ids_t: Vec<usize> = sents.iter().map(|s| s[t]).collect();
            xs.push(self.embed.lookup(&ids_t));
            ids.push(ids_t);
        }
        (ids, xs)
    }
}

impl Encoder for LstmEncoder {
    type Input = Vec<Vec<usize>>;

    fn forward(&self, sents: &Vec<Vec<usize>>) -> (Matrix, Matrix) {
        let (_, xs) = self.step_inputs(sents);
        let hs = self.lstm.forward(&xs);
        let last = hs.last().expect("empty sequence batch");
        (self.mu_fc.forward(last), self.logvar_fc.forward(last))
    }

    fn forward_train(&mut self, sents: &Vec<Vec<usize>>) -> (Matrix, Matrix) {
        let (ids, xs) = self.step_inputs(sents);
        self.step_ids = ids;
        let hs = self.lstm.forward_train(&xs);
        let last = hs.last().expect("empty sequence batch");
        (self.mu_fc.forward_train(last), self.logvar_fc.forward_train(last))
    }

    fn backward(&mut self, grad_mu: &Matrix, grad_logvar: &Matrix) {
        let grad_last = self
            .mu_fc
            .backward(grad_mu)
            .add(&self.logvar_fc.backward(grad_logvar));
        let seq_len = self.step_ids.len();
        let batch = grad_last.rows;
        let nh = grad_last.cols;
        // only the final hidden state feeds the posterior heads
        let mut grad_h = vec![Matrix::zeros(batch, nh); seq_len];
        grad_h[seq_len - 1] = grad_last;
        let grad_x = self.lstm.backward(&grad_h);
        for (ids_t, g) in self.step_ids.iter().zip(grad_x.iter()) {
            self.embed.backward(ids_t, g);
        }
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
        params.extend(self.mu_fc.parameters());
        params.extend(self.logvar_fc.parameters());
        params
    }
}

use super::linear::LinearT;
use super::{sigmoid, tanh};
use crate::math::Matrix;

fn elem_mul(a: &Matrix, b: &Matrix) -> Matrix {
    let mut v = vec![0.0; a.data.len()];
    for i in 0..v.len() {
        v[i] = a.data[i] * b.data[i];
    }
    Matrix::from_vec(a.rows, a.cols, v)
}

/// LSTM over a sequence of batch-major time steps.
///
/// Each time step is a `(batch, input_dim)` matrix.  The layer keeps a full
/// per-step cache (inputs, previous states and gate activations) so the
/// backward pass can run truncated-free BPTT over the whole sequence.
pub struct Lstm {
    pub w_ii: LinearT,
    pub w_if: LinearT,
    pub w_io: LinearT,
    pub w_ig: LinearT,
    pub w_hi: LinearT,
    pub w_hf: LinearT,
    pub w_ho: LinearT,
    pub w_hg: LinearT,
    cache: Vec<LstmStep>,
    input_dim: usize,
    hidden_dim: usize,
}

struct LstmStep {
    x: Matrix,
    h_prev: Matrix,
    c_prev: Matrix,
    i: Matrix,
    f: Matrix,
    o: Matrix,
    g: Matrix,
    c: Matrix,
}

impl Lstm {
    pub fn new(input_dim: usize, hidden_dim: usize) -> Self {
        Self {
            w_ii: LinearT::new(input_dim, hidden_dim),
            w_if: LinearT::new(input_dim, hidden_dim),
            w_io: LinearT::new(input_dim, hidden_dim),
            w_ig: LinearT::new(input_dim, hidden_dim),
            w_hi: LinearT::new(hidden_dim, hidden_dim),
            w_hf: LinearT::new(hidden_dim, hidden_dim),
            w_ho: LinearT::new(hidden_dim, hidden_dim),
            w_hg: LinearT::new(hidden_dim, hidden_dim),
            cache: Vec::new(),
            input_dim,
            hidden_dim,
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn step(
        &self,
        x_t: &Matrix,
        h_prev: &Matrix,
        c_prev: &Matrix,
    ) -> (Matrix, Matrix, Matrix, Matrix, Matrix, Matrix) {
        let mut i = self.w_ii.forward(x_t).add(&self.w_hi.forward(h_prev));
        sigmoid::forward_matrix(&mut i);
        let mut f = self.w_if.forward(x_t).add(&self.w_hf.forward(h_prev));
        sigmoid::forward_matrix(&mut f);
        let mut o = self.w_io.forward(x_t).add(&self.w_ho.forward(h_prev));
        sigmoid::forward_matrix(&mut o);
        let mut g = self.w_ig.forward(x_t).add(&self.w_hg.forward(h_prev));
        tanh::forward_matrix(&mut g);
        let c = elem_mul(&f, c_prev).add(&elem_mul(&i, &g));
        let mut h = c.clone();
        tanh::forward_matrix(&mut h);
        let h = elem_mul(&o, &h);
        (h, c, i, f, o, g)
    }

    /// Single inference step from an explicit state; returns the new (h, c).
    /// Used by greedy decoding where the sequence is produced token by token.
    pub fn step_state(&self, x_t: &Matrix, h: &Matrix, c: &Matrix) -> (Matrix, Matrix) {
        let (h, c, _, _, _, _) = self.step(x_t, h, c);
        (h, c)
    }

    /// Inference pass: returns the hidden state at every time step.
    pub fn forward(&self, xs: &[Matrix]) -> Vec<Matrix> {
        let batch = xs.first().map(|x| x.rows).unwrap_or(0);
        let mut h_prev = Matrix::zeros(batch, self.hidden_dim);
        let mut c_prev = Matrix::zeros(batch, self.hidden_dim);
        let mut outs = Vec::with_capacity(xs.len());
        for x_t in xs {
            debug_assert_eq!(x_t.cols, self.input_dim);
            let (h, c, _, _, _, _) = self.step(x_t, &h_prev, &c_prev);
            h_prev = h.clone();
            c_prev = c;
            outs.push(h);
        }
        outs
    }

    /// Training pass caching every step for [`Lstm::backward`].
    pub fn forward_train(&mut self, xs: &[Matrix]) -> Vec<Matrix> {
        self.cache.clear();
        let batch = xs.first().map(|x| x.rows).unwrap_or(0);
        let mut h_prev = Matrix::zeros(batch, self.hidden_dim);
        let mut c_prev = Matrix::zeros(batch, self.hidden_dim);
        let mut outs = Vec::with_capacity(xs.len());
        for x_t in xs {
            let (h, c, i, f, o, g) = self.step(x_t, &h_prev, &c_prev);
            self.cache.push(LstmStep {
                x: x_t.clone(),
                h_prev: h_prev.clone(),
                c_prev: c_prev.clone(),
                i,
                f,
                o,
                g,
                c: c.clone(),
            });
            outs.push(h.clone());
            h_prev = h;
            c_prev = c;
        }
        outs
    }

    /// BPTT over the cached sequence.  `grad_h` carries the loss gradient of
    /// each step's hidden output; returns the gradient for each step's input.
    pub fn backward(&mut self, grad_h: &[Matrix]) -> Vec<Matrix> {
        let seq_len = self.cache.len();
        assert_eq!(grad_h.len(), seq_len);
        let batch = grad_h.first().map(|g| g.rows).unwrap_or(0);
        let mut grad_x = vec![Matrix::zeros(batch, self.input_dim); seq_len];
        let mut dh_next = Matrix::zeros(batch, self.hidden_dim);
        let mut dc_next = Matrix::zeros(batch, self.hidden_dim);
        for t in (0..seq_len).rev() {
            let LstmStep {
                x,
                h_prev,
                c_prev,
                i,
                f,
                o,
                g,
                c,
            } = {
                // pull the step out so the gates can be borrowed while the
                // weight matrices are mutated below
                let s = &self.cache[t];
                LstmStep {
                    x: s.x.clone(),
                    h_prev: s.h_prev.clone(),
                    c_prev: s.c_prev.clone(),
                    i: s.i.clone(),
                    f: s.f.clone(),
                    o: s.o.clone(),
                    g: s.g.clone(),
                    c: s.c.clone(),
                }
            };
            let dh = grad_h[t].add(&dh_next);
            let mut tanh_c = c.clone();
            tanh::forward_matrix(&mut tanh_c);
            let mut do_gate = elem_mul(&dh, &tanh_c);
            sigmoid::backward(&mut do_gate, &o);
            let mut dc = elem_mul(&dh, &o);
            for (dcv, tc) in dc.data.iter_mut().zip(tanh_c.data.iter()) {
                *dcv *= 1.0 - tc * tc;
            }
            dc = dc.add(&dc_next);
            let mut di = elem_mul(&dc, &g);
            sigmoid::backward(&mut di, &i);
            let mut df = elem_mul(&dc, &c_prev);
            sigmoid::backward(&mut df, &f);
            let mut dg = elem_mul(&dc, &i);
            tanh::backward(&mut dg, &g);

            let mut gx = self.w_ii.backward_at(&x, &di);
            gx = gx.add(&self.w_if.backward_at(&x, &df));
            gx = gx.add(&self.w_io.backward_at(&x, &do_gate));
            gx = gx.add(&self.w_ig.backward_at(&x, &dg));
            grad_x[t] = gx;

            let mut dh_prev = self.w_hi.backward_at(&h_prev, &di);
            dh_prev = dh_prev.add(&self.w_hf.backward_at(&h_prev, &df));
            dh_prev = dh_prev.add(&self.w_ho.backward_at(&h_prev, &do_gate));
            dh_prev = dh_prev.add(&self.w_hg.backward_at(&h_prev, &dg));
            dh_next = dh_prev;
            dc_next = elem_mul(&dc, &f);
        }
        grad_x
    }

    pub fn zero_grad(&mut self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    pub fn parameters(&mut self) -> Vec<&mut LinearT> {
        let (w_ii, w_if, w_io, w_ig, w_hi, w_hf, w_ho, w_hg) = (
            &mut self.w_ii,
            &mut self.w_if,
            &mut self.w_io,
            &mut self.w_ig,
            &mut self.w_hi,
            &mut self.w_hf,
            &mut self.w_ho,
            &mut self.w_hg,
        );
        vec![w_ii, w_if, w_io, w_ig, w_hi, w_hf, w_ho, w_hg]
    }
}

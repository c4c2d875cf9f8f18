use super::linear::LinearT;
use crate::math::Matrix;
use std::fmt;

/// Autoregressive kernel mask for PixelCNN-style convolutions.
///
/// `A` hides the centre pixel and everything after it in raster order (first
/// layer: the output at a pixel must not see that pixel).  `B` hides only
/// the strictly-future positions (later layers: the centre is a feature of
/// already-visible context).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskKind {
    None,
    A,
    B,
}

/// 2D convolution using im2col and a linear weight matrix.
///
/// Inputs are `(batch, in_channels * height * width)` rows with
/// `height == width`.  An optional raster-order mask zeroes kernel positions
/// to make the convolution causal; masked weight rows start at zero and,
/// because the matching im2col columns are zeroed too, never receive
/// gradient, so they stay zero across optimizer steps.
pub struct Conv2d {
    pub w: LinearT,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    mask: Option<Vec<f32>>, // one entry per (ic, kh, kw) weight row
    // Cached shapes from the last training forward, required for backward.
    last_input_shape: (usize, usize, usize), // (batch, in_h, in_w)
    last_output_shape: (usize, usize),       // (out_h, out_w)
}

#[derive(Debug, PartialEq)]
pub enum ConvError {
    ChannelMismatch { features: usize, in_channels: usize },
    NonSquareInput { size: usize },
}

impl fmt::Display for ConvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvError::ChannelMismatch {
                features,
                in_channels,
            } => write!(
                f,
                "Input feature count {} is not divisible by in_channels {}",
                features, in_channels
            ),
            ConvError::NonSquareInput { size } => {
                write!(f, "Input spatial size {} is not a perfect square", size)
            }
        }
    }
}

impl std::error::Error for ConvError {}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        mask: MaskKind,
    ) -> Self {
        let in_dim = in_channels * kernel_size * kernel_size;
        let mut w = LinearT::new(in_dim, out_channels);
        let mask = match mask {
            MaskKind::None => None,
            kind => {
                let m = build_mask(in_channels, kernel_size, kind);
                // zero out masked weight rows so inputs never leak through
                for (row, &keep) in m.iter().enumerate() {
                    if keep == 0.0 {
                        for c in 0..out_channels {
                            w.w.set(row, c, 0.0);
                        }
                    }
                }
                Some(m)
            }
        };
        Self {
            w,
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            mask,
            last_input_shape: (0, 0, 0),
            last_output_shape: (0, 0),
        }
    }

    fn compute_shapes(&self, x: &Matrix) -> Result<(usize, usize, usize, usize, usize), ConvError> {
        let batch = x.rows;
        if x.cols % self.in_channels != 0 {
            return Err(ConvError::ChannelMismatch {
                features: x.cols,
                in_channels: self.in_channels,
            });
        }
        let in_hw = x.cols / self.in_channels;
        let in_h = (in_hw as f32).sqrt() as usize;
        if in_h * in_h != in_hw {
            return Err(ConvError::NonSquareInput { size: in_hw });
        }
        let in_w = in_h;
        let out_h = (in_h + 2 * self.padding - self.kernel_size) / self.stride + 1;
        let out_w = (in_w + 2 * self.padding - self.kernel_size) / self.stride + 1;
        Ok((batch, in_h, in_w, out_h, out_w))
    }

    fn im2col(&self, x: &Matrix, in_h: usize, in_w: usize, out_h: usize, out_w: usize) -> Matrix {
        let batch = x.rows;
        let mut cols = Matrix::zeros(
            batch * out_h * out_w,
            self.in_channels * self.kernel_size * self.kernel_size,
        );
        let mut row = 0;
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut col_idx = 0;
                    for ic in 0..self.in_channels {
                        for kh in 0..self.kernel_size {
                            for kw in 0..self.kernel_size {
                                let ihp = (oh * self.stride + kh) as isize - self.padding as isize;
                                let iwp = (ow * self.stride + kw) as isize - self.padding as isize;
                                let masked = self
                                    .mask
                                    .as_ref()
                                    .map(|m| m[col_idx] == 0.0)
                                    .unwrap_or(false);
                                if !masked
                                    && ihp >= 0
                                    && ihp < in_h as isize
                                    && iwp >= 0
                                    && iwp < in_w as isize
                                {
                                    let idx = b * x.cols
                                        + ic * in_h * in_w
                                        + ihp as usize * in_w
                                        + iwp as usize;
                                    cols.set(row, col_idx, x.data[idx]);
                                }
                                col_idx += 1;
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
        cols
    }

    fn col2im(
        &self,
        cols: &Matrix,
        batch: usize,
        in_h: usize,
        in_w: usize,
        out_h: usize,
        out_w: usize,
    ) -> Matrix {
        let mut img = Matrix::zeros(batch, self.in_channels * in_h * in_w);
        let mut row = 0;
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut col_idx = 0;
                    for ic in 0..self.in_channels {
                        for kh in 0..self.kernel_size {
                            for kw in 0..self.kernel_size {
                                let ihp = (oh * self.stride + kh) as isize - self.padding as isize;
                                let iwp = (ow * self.stride + kw) as isize - self.padding as isize;
                                if ihp >= 0
                                    && ihp < in_h as isize
                                    && iwp >= 0
                                    && iwp < in_w as isize
                                {
                                    let idx = b * img.cols
                                        + ic * in_h * in_w
                                        + ihp as usize * in_w
                                        + iwp as usize;
                                    img.data[idx] += cols.get(row, col_idx);
                                }
                                col_idx += 1;
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
        img
    }

    fn reshape_output(&self, out_cols: &Matrix, batch: usize, out_h: usize, out_w: usize) -> Matrix {
        let mut out = Matrix::zeros(batch, self.out_channels * out_h * out_w);
        let mut row = 0;
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    for oc in 0..self.out_channels {
                        let idx = oc * out_h * out_w + oh * out_w + ow;
                        out.set(b, idx, out_cols.get(row, oc));
                    }
                    row += 1;
                }
            }
        }
        out
    }

    /// Inference forward pass.
    pub fn forward(&self, x: &Matrix) -> Result<Matrix, ConvError> {
        let (batch, in_h, in_w, out_h, out_w) = self.compute_shapes(x)?;
        let cols = self.im2col(x, in_h, in_w, out_h, out_w);
        let out_cols = self.w.forward(&cols);
        Ok(self.reshape_output(&out_cols, batch, out_h, out_w))
    }

    /// Training forward pass caching shapes and the im2col input.
    pub fn forward_train(&mut self, x: &Matrix) -> Result<Matrix, ConvError> {
        let (batch, in_h, in_w, out_h, out_w) = self.compute_shapes(x)?;
        let cols = self.im2col(x, in_h, in_w, out_h, out_w);
        let out_cols = self.w.forward_train(&cols);
        self.last_input_shape = (batch, in_h, in_w);
        self.last_output_shape = (out_h, out_w);
        Ok(self.reshape_output(&out_cols, batch, out_h, out_w))
    }

    pub fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let (batch, in_h, in_w) = self.last_input_shape;
        let (out_h, out_w) = self.last_output_shape;
        let mut grad_cols = Matrix::zeros(batch * out_h * out_w, self.out_channels);
        let mut row = 0;
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    for oc in 0..self.out_channels {
                        let idx = oc * out_h * out_w + oh * out_w + ow;
                        grad_cols.set(row, oc, grad_out.get(b, idx));
                    }
                    row += 1;
                }
            }
        }
        let grad_in_cols = self.w.backward(&grad_cols);
        self.col2im(&grad_in_cols, batch, in_h, in_w, out_h, out_w)
    }

    pub fn zero_grad(&mut self) {
        self.w.zero_grad();
    }

    pub fn parameters(&mut self) -> Vec<&mut LinearT> {
        self.w.parameters()
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

fn build_mask(in_channels: usize, kernel_size: usize, kind: MaskKind) -> Vec<f32> {
    let centre = kernel_size / 2;
    let mut mask = vec![1.0; in_channels * kernel_size * kernel_size];
    let mut idx = 0;
    for _ic in 0..in_channels {
        for kh in 0..kernel_size {
            for kw in 0..kernel_size {
                let future = kh > centre
                    || (kh == centre && kw > centre)
                    || (kind == MaskKind::A && kh == centre && kw == centre);
                if future {
                    mask[idx] = 0.0;
                }
                idx += 1;
            }
        }
    }
    mask
}

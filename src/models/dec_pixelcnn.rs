use super::decoder::Decoder;
use crate::layers::{relu, Conv2d, LinearT, MaskKind};
use crate::math::{bernoulli_with_logits, Matrix};
use rand::Rng;

/// PixelCNN decoder over binarized images.
///
/// A mask-A convolution opens the stack, mask-B convolutions deepen it, and
/// every layer is conditioned on the latent code through a linear projection
/// added as a per-channel bias.  A final 1x1 convolution produces one
/// Bernoulli logit per pixel.  Masking keeps the logit at a pixel a function
/// of strictly preceding pixels, so the summed cross-entropy of a single
/// forward pass is the autoregressive reconstruction error.
pub struct PixelCnnDecoder {
    layers: Vec<PixelLayer>,
    out_conv: Conv2d,
    img_size: usize,
    nz: usize,
}

struct PixelLayer {
    conv: Conv2d,
    z_proj: LinearT,
    mask: Vec<f32>, // ReLU mask from the last training forward
}

fn add_channel_bias(out: &mut Matrix, cond: &Matrix, hw: usize) {
    for b in 0..out.rows {
        for oc in 0..cond.cols {
            let bias = cond.get(b, oc);
            for p in 0..hw {
                let idx = b * out.cols + oc * hw + p;
                out.data[idx] += bias;
            }
        }
    }
}

fn channel_bias_grad(g: &Matrix, channels: usize, hw: usize) -> Matrix {
    let mut grad = Matrix::zeros(g.rows, channels);
    for b in 0..g.rows {
        for oc in 0..channels {
            let mut sum = 0.0f32;
            for p in 0..hw {
                sum += g.data[b * g.cols + oc * hw + p];
            }
            grad.set(b, oc, sum);
        }
    }
    grad
}

impl PixelCnnDecoder {
    pub fn new(img_size: usize, feature_maps: usize, num_layers: usize, nz: usize) -> Self {
        assert!(num_layers >= 1);
        let mut layers = Vec::with_capacity(num_layers);
        // mask A first so the stack never sees the pixel it predicts
        layers.push(PixelLayer {
            conv: Conv2d::new(1, feature_maps, 7, 1, 3, MaskKind::A),
            z_proj: LinearT::new(nz, feature_maps),
            mask: Vec::new(),
        });
        for _ in 1..num_layers {
            layers.push(PixelLayer {
                conv: Conv2d::new(feature_maps, feature_maps, 3, 1, 1, MaskKind::B),
                z_proj: LinearT::new(nz, feature_maps),
                mask: Vec::new(),
            });
        }
        Self {
            layers,
            out_conv: Conv2d::new(feature_maps, 1, 1, 1, 0, MaskKind::B),
            img_size,
            nz,
        }
    }

    /// Per-pixel Bernoulli logits for `x` under latent code `z`.
    pub fn forward(&self, x: &Matrix, z: &Matrix) -> Matrix {
        let hw = self.img_size * self.img_size;
        let mut h = x.clone();
        for layer in &self.layers {
            let mut out = layer
                .conv
                .forward(&h)
                .expect("invalid input to conv forward");
            let cond = layer.z_proj.forward(z);
            add_channel_bias(&mut out, &cond, hw);
            relu::forward_matrix(&mut out);
            h = out;
        }
        self.out_conv
            .forward(&h)
            .expect("invalid input to conv forward")
    }

    fn forward_train(&mut self, x: &Matrix, z: &Matrix) -> Matrix {
        let hw = self.img_size * self.img_size;
        let mut h = x.clone();
        for layer in &mut self.layers {
            let mut out = layer
                .conv
                .forward_train(&h)
                .expect("invalid input to conv forward");
            let cond = layer.z_proj.forward_train(z);
            add_channel_bias(&mut out, &cond, hw);
            layer.mask = relu::forward_matrix(&mut out);
            h = out;
        }
        self.out_conv
            .forward_train(&h)
            .expect("invalid input to conv forward")
    }

    fn backward_to_z(&mut self, grad_logits: &Matrix) -> Matrix {
        let hw = self.img_size * self.img_size;
        let mut g = self.out_conv.backward(grad_logits);
        let mut grad_z = Matrix::zeros(grad_logits.rows, self.nz);
        for layer in self.layers.iter_mut().rev() {
            relu::backward(&mut g, &layer.mask);
            let channels = layer.conv.out_channels();
            let grad_cond = channel_bias_grad(&g, channels, hw);
            grad_z = grad_z.add(&layer.z_proj.backward(&grad_cond));
            g = layer.conv.backward(&g);
        }
        grad_z
    }

    /// Autoregressive sampling: raster-order pixel draws conditioned on `z`.
    /// Returns the binary samples and the per-pixel probabilities.
    pub fn sample(&self, z: &Matrix, rng: &mut impl Rng) -> (Matrix, Matrix) {
        let hw = self.img_size * self.img_size;
        let n = z.rows;
        let mut x = Matrix::zeros(n, hw);
        let mut probs = Matrix::zeros(n, hw);
        for p in 0..hw {
            let logits = self.forward(&x, z);
            for b in 0..n {
                let prob = 1.0 / (1.0 + (-logits.get(b, p)).exp());
                probs.set(b, p, prob);
                let bit = if rng.gen::<f32>() < prob { 1.0 } else { 0.0 };
                x.set(b, p, bit);
            }
        }
        (x, probs)
    }
}

impl Decoder for PixelCnnDecoder {
    type Input = Matrix;

    fn reconstruct_error(&self, x: &Matrix, z: &Matrix) -> Vec<f32> {
        let logits = self.forward(x, z);
        bernoulli_with_logits(&logits, x).0
    }

    fn reconstruct_error_train(
        &mut self,
        x: &Matrix,
        z: &Matrix,
        grad_scale: f32,
    ) -> (Vec<f32>, Matrix) {
        let logits = self.forward_train(x, z);
        let (losses, mut grad) = bernoulli_with_logits(&logits, x);
        grad.scale(grad_scale);
        let grad_z = self.backward_to_z(&grad);
        (losses, grad_z)
    }

    fn zero_grad(&mut self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    fn parameters(&mut self) -> Vec<&mut LinearT> {
        let mut params = Vec::new();
        for layer in &mut self.layers {
            params.extend(layer.conv.parameters());
            params.extend(layer.z_proj.parameters());
        }
        params.extend(self.out_conv.parameters());
        params
    }
}

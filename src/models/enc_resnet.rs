use super::encoder::Encoder;
use crate::layers::{relu, Conv2d, LinearT, MaskKind};
use crate::math::Matrix;

/// Convolutional residual encoder for binarized images.
///
/// Two strided convolutions downsample the image, a linear projection moves
/// the flattened features into the residual width, and a stack of
/// fully-connected residual blocks feeds the bias-free mean / log-variance
/// heads.
pub struct ResNetEncoder {
    conv1: Conv2d,
    conv2: Conv2d,
    proj: LinearT,
    blocks: Vec<ResidualBlock>,
    mu_fc: LinearT,
    logvar_fc: LinearT,
    // ReLU masks from the last training forward
    mask1: Vec<f32>,
    mask2: Vec<f32>,
    mask_proj: Vec<f32>,
}

struct ResidualBlock {
    fc1: LinearT,
    fc2: LinearT,
    mask_inner: Vec<f32>,
    mask_out: Vec<f32>,
}

impl ResidualBlock {
    fn new(width: usize) -> Self {
        Self {
            fc1: LinearT::new(width, width),
            fc2: LinearT::new(width, width),
            mask_inner: Vec::new(),
            mask_out: Vec::new(),
        }
    }

    fn forward(&self, h: &Matrix) -> Matrix {
        let mut z1 = self.fc1.forward(h);
        relu::forward_matrix(&mut z1);
        let mut z2 = self.fc2.forward(&z1).add(h);
        relu::forward_matrix(&mut z2);
        z2
    }

    fn forward_train(&mut self, h: &Matrix) -> Matrix {
        let mut z1 = self.fc1.forward_train(h);
        self.mask_inner = relu::forward_matrix(&mut z1);
        // fc2 must cache the activated z1, not the pre-activation
        let mut z2 = self.fc2.forward_train(&z1).add(h);
        self.mask_out = relu::forward_matrix(&mut z2);
        z2
    }

    fn backward(&mut self, grad_out: &Matrix) -> Matrix {
        let mut dz2 = grad_out.clone();
        relu::backward(&mut dz2, &self.mask_out);
        let mut dz1 = self.fc2.backward(&dz2);
        relu::backward(&mut dz1, &self.mask_inner);
        // skip connection feeds the block input directly
        self.fc1.backward(&dz1).add(&dz2)
    }
}

impl ResNetEncoder {
    pub fn new(img_size: usize, channels: usize, hidden: usize, num_blocks: usize, nz: usize) -> Self {
        let half = img_size.div_ceil(2);
        let quarter = half.div_ceil(2);
        let flat = 2 * channels * quarter * quarter;
        Self {
            conv1: Conv2d::new(1, channels, 3, 2, 1, MaskKind::None),
            conv2: Conv2d::new(channels, 2 * channels, 3, 2, 1, MaskKind::None),
            proj: LinearT::new(flat, hidden),
            blocks: (0..num_blocks).map(|_| ResidualBlock::new(hidden)).collect(),
            mu_fc: LinearT::new(hidden, nz),
            logvar_fc: LinearT::new(hidden, nz),
            mask1: Vec::new(),
            mask2: Vec::new(),
            mask_proj: Vec::new(),
        }
    }
}

impl Encoder for ResNetEncoder {
    type Input = Matrix;

    fn forward(&self, x: &Matrix) -> (Matrix, Matrix) {
        let mut h = self.conv1.forward(x).expect("invalid input to conv forward");
        relu::forward_matrix(&mut h);
        let mut h = self.conv2.forward(&h).expect("invalid input to conv forward");
        relu::forward_matrix(&mut h);
        let mut h = self.proj.forward(&h);
        relu::forward_matrix(&mut h);
        for blk in &self.blocks {
            h = blk.forward(&h);
        }
        (self.mu_fc.forward(&h), self.logvar_fc.forward(&h))
    }

    fn forward_train(&mut self, x: &Matrix) -> (Matrix, Matrix) {
        let mut h = self
            .conv1
            .forward_train(x)
            .expect("invalid input to conv forward");
        self.mask1 = relu::forward_matrix(&mut h);
        let mut h = self
            .conv2
            .forward_train(&h)
            .expect("invalid input to conv forward");
        self.mask2 = relu::forward_matrix(&mut h);
        let mut h = self.proj.forward_train(&h);
        self.mask_proj = relu::forward_matrix(&mut h);
        for blk in &mut self.blocks {
            h = blk.forward_train(&h);
        }
        (self.mu_fc.forward_train(&h), self.logvar_fc.forward_train(&h))
    }

    fn backward(&mut self, grad_mu: &Matrix, grad_logvar: &Matrix) {
        let mut grad_h = self
            .mu_fc
            .backward(grad_mu)
            .add(&self.logvar_fc.backward(grad_logvar));
        for blk in self.blocks.iter_mut().rev() {
            grad_h = blk.backward(&grad_h);
        }
        relu::backward(&mut grad_h, &self.mask_proj);
        let mut grad_h = self.proj.backward(&grad_h);
        relu::backward(&mut grad_h, &self.mask2);
        let mut grad_h = self.conv2.backward(&grad_h);
        relu::backward(&mut grad_h, &self.mask1);
        self.conv1.backward(&grad_h);
    }

    fn zero_grad(&mut self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }

    fn parameters(&mut self) -> Vec<&mut LinearT> {
        let mut params = Vec::new();
        params.extend(self.conv1.parameters());
        params.extend(self.conv2.parameters());
        params.extend(self.proj.parameters());
        for blk in &mut self.blocks {
            params.push(&mut blk.fc1);
            params.push(&mut blk.fc2);
        }
        params.extend(self.mu_fc.parameters());
        params.extend(self.logvar_fc.parameters());
        params
    }
}

use super::dataloader::BatchSource;
use crate::math::Matrix;
use mnist::MnistBuilder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const IDX_IMAGE_MAGIC: u32 = 2051;

/// One split of an image dataset, pixels normalised to [0, 1].
///
/// When `binarize` is set every drawn batch is re-sampled from the pixel
/// Bernoulli probabilities, the dynamic binarization the training loop
/// expects; evaluation splits return the raw intensities.
pub struct ImageSplit {
    images: Vec<Vec<f32>>,
    dim: usize,
    batch_size: usize,
    binarize: bool,
}

impl ImageSplit {
    fn new(images: Vec<Vec<f32>>, dim: usize, batch_size: usize, binarize: bool) -> Self {
        Self {
            images,
            dim,
            batch_size,
            binarize,
        }
    }

    /// Copy of this split with a different batch size (the importance
    /// weighted evaluation runs on 50-example batches).
    pub fn with_batch_size(&self, batch_size: usize) -> Self {
        Self {
            images: self.images.clone(),
            dim: self.dim,
            batch_size,
            binarize: self.binarize,
        }
    }

    fn build_batch(&self, idxs: &[usize], rng: &mut StdRng) -> Matrix {
        let mut out = Matrix::zeros(idxs.len(), self.dim);
        for (r, &i) in idxs.iter().enumerate() {
            for (c, &p) in self.images[i].iter().enumerate() {
                let v = if self.binarize {
                    if rng.gen::<f32>() < p {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    p
                };
                out.set(r, c, v);
            }
        }
        out
    }
}

impl BatchSource for ImageSplit {
    type Batch = Matrix;

    fn num_examples(&self) -> usize {
        self.images.len()
    }

    fn num_batches(&self) -> usize {
        self.images.len().div_ceil(self.batch_size)
    }

    fn epoch_batches(&self, rng: &mut StdRng) -> Vec<Matrix> {
        let mut idxs: Vec<usize> = (0..self.images.len()).collect();
        idxs.shuffle(rng);
        idxs.chunks(self.batch_size)
            .map(|chunk| self.build_batch(chunk, rng))
            .collect()
    }

    fn sample_batch(&self, rng: &mut StdRng) -> Matrix {
        let take = self.batch_size.min(self.images.len());
        let idxs = rand::seq::index::sample(rng, self.images.len(), take).into_vec();
        self.build_batch(&idxs, rng)
    }

    fn batch_examples(batch: &Matrix) -> usize {
        batch.rows
    }
}

/// Train/val/test splits for an image dataset.
pub struct ImageData {
    pub train: ImageSplit,
    pub val: ImageSplit,
    pub test: ImageSplit,
    pub img_size: usize,
}

impl ImageData {
    /// Load a dataset by name.  `mnist` comes through the `mnist` crate's
    /// downloader; anything else reads idx-ubyte files from `data_dir`.
    pub fn load(dataset: &str, data_dir: &str, batch_size: usize) -> io::Result<Self> {
        let (train, val, test, img_size) = if dataset == "mnist" {
            load_mnist()?
        } else {
            load_idx_dir(Path::new(data_dir))?
        };
        Ok(Self {
            train: ImageSplit::new(train, img_size * img_size, batch_size, true),
            val: ImageSplit::new(val, img_size * img_size, batch_size, false),
            test: ImageSplit::new(test, img_size * img_size, batch_size, false),
            img_size,
        })
    }
}

type RawSplits = (Vec<Vec<f32>>, Vec<Vec<f32>>, Vec<Vec<f32>>, usize);

fn load_mnist() -> io::Result<RawSplits> {
    let mnist = MnistBuilder::new()
        .training_set_length(50_000)
        .validation_set_length(10_000)
        .test_set_length(10_000)
        .download_and_extract()
        .finalize();
    let to_rows = |img: &[u8]| -> Vec<Vec<f32>> {
        img.chunks(28 * 28)
            .map(|px| px.iter().map(|&p| p as f32 / 255.0).collect())
            .collect()
    };
    Ok((
        to_rows(&mnist.trn_img),
        to_rows(&mnist.val_img),
        to_rows(&mnist.tst_img),
        28,
    ))
}

fn load_idx_dir(dir: &Path) -> io::Result<RawSplits> {
    let (train, size) = read_idx_images(&dir.join("train-images-idx3-ubyte"))?;
    let (val, val_size) = read_idx_images(&dir.join("valid-images-idx3-ubyte"))?;
    let (test, test_size) = read_idx_images(&dir.join("test-images-idx3-ubyte"))?;
    if val_size != size || test_size != size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "splits disagree on image size",
        ));
    }
    Ok((train, val, test, size))
}

/// Read an idx3-ubyte image file into normalised pixel rows.
fn read_idx_images(path: &PathBuf) -> io::Result<(Vec<Vec<f32>>, usize)> {
    let mut file = fs::File::open(path)?;
    let mut header = [0u8; 16];
    file.read_exact(&mut header)?;
    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic != IDX_IMAGE_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: not an idx3-ubyte image file", path.display()),
        ));
    }
    let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let rows = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let cols = u32::from_be_bytes([header[12], header[13], header[14], header[15]]) as usize;
    if rows != cols {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: non-square images", path.display()),
        ));
    }
    let mut pixels = Vec::new();
    file.read_to_end(&mut pixels)?;
    if pixels.len() != count * rows * cols {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: truncated image data", path.display()),
        ));
    }
    let images = pixels
        .chunks(rows * cols)
        .map(|px| px.iter().map(|&p| p as f32 / 255.0).collect())
        .collect();
    Ok((images, rows))
}

/// Write a grid of grayscale images (`nrow` per row) as a PNG.
pub fn save_image_grid(path: &Path, images: &Matrix, img_size: usize, nrow: usize) -> io::Result<()> {
    let n = images.rows;
    let grid_rows = n.div_ceil(nrow);
    let (w, h) = (nrow * img_size, grid_rows * img_size);
    let mut buf = vec![0u8; w * h];
    for i in 0..n {
        let (gr, gc) = (i / nrow, i % nrow);
        for y in 0..img_size {
            for x in 0..img_size {
                let v = images.get(i, y * img_size + x).clamp(0.0, 1.0);
                buf[(gr * img_size + y) * w + gc * img_size + x] = (v * 255.0) as u8;
            }
        }
    }
    let img = image::GrayImage::from_raw(w as u32, h as u32, buf)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "grid buffer size mismatch"))?;
    img.save(path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

pub mod dataloader;
pub mod image;
pub mod text;

pub use dataloader::BatchSource;
pub use image::{save_image_grid, ImageData, ImageSplit};
pub use text::{TextData, TextSplit, Vocab, BOS, EOS, PAD, UNK};

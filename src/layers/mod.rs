pub mod conv;
pub mod dropout;
pub mod embedding;
pub mod linear;
pub mod relu;
pub mod rnn;
pub mod sigmoid;
pub mod tanh;

pub use conv::{Conv2d, ConvError, MaskKind};
pub use dropout::Dropout;
pub use embedding::EmbeddingT;
pub use linear::LinearT;
pub use rnn::Lstm;

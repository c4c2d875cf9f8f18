pub mod dec_lstm;
pub mod dec_pixelcnn;
pub mod decoder;
pub mod enc_lstm;
pub mod enc_resnet;
pub mod encoder;
pub mod vae;

pub use dec_lstm::LstmDecoder;
pub use dec_pixelcnn::PixelCnnDecoder;
pub use decoder::Decoder;
pub use enc_lstm::LstmEncoder;
pub use enc_resnet::ResNetEncoder;
pub use encoder::Encoder;
pub use vae::{LossStats, Vae};

/// Image-domain VAE: residual conv encoder + PixelCNN decoder.
pub type ImageVae = Vae<ResNetEncoder, PixelCnnDecoder>;
/// Text-domain VAE: LSTM encoder + LSTM decoder.
pub type TextVae = Vae<LstmEncoder, LstmDecoder>;

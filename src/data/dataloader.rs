use rand::rngs::StdRng;

/// An in-memory dataset split that can hand out batches.
///
/// `epoch_batches` yields one shuffled pass over the split;
/// `sample_batch` draws a single random batch, which the aggressive inner
/// loop uses to refresh the encoder-only updates.
pub trait BatchSource {
    type Batch: Clone;

    fn num_examples(&self) -> usize;
    fn num_batches(&self) -> usize;
    fn epoch_batches(&self, rng: &mut StdRng) -> Vec<Self::Batch>;
    fn sample_batch(&self, rng: &mut StdRng) -> Self::Batch;
    fn batch_examples(batch: &Self::Batch) -> usize;
}

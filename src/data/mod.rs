/// Data plumbing for seq2seq training: emotions, pairs and the lookup table
pub mod emotion;
pub mod pairs;
pub mod vocab;

pub use emotion::Emotion;
pub use pairs::{PairDataset, PairLoader, TrainingPair};
pub use vocab::Vocabulary;

/// Source of training pairs consumed by the trainer
pub trait PairSource {
    /// Get the next pair, or `None` once the epoch is exhausted
    fn next_pair(&mut self) -> Option<TrainingPair>;

    /// Reset for a new epoch
    fn reset(&mut self);

    /// Total number of pairs per epoch
    fn num_pairs(&self) -> usize;
}

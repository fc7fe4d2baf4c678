/// Training infrastructure for the seq2seq chatbot

// Note: candle-nn's SGD carries no state, so no optimizer module is needed
pub mod checkpoint;
pub mod history;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointMetadata};
pub use history::LossHistory;
pub use trainer::{PairOutcome, Trainer, TrainingConfig};

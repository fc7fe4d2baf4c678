//! Emotion-conditioned seq2seq chatbot - Rust implementation
//!
//! A GRU encoder and an attention decoder trained with teacher forcing on
//! paired utterances, where every reply is biased by one of seven emotion
//! labels.
//!
//! # Architecture
//!
//! - **Encoder**: token embedding followed by a single-step GRU cell
//! - **Decoder**: per-step attention over the (zero-padded) encoder outputs,
//!   combined with a learned emotion embedding before the GRU step
//! - **Trainer**: stochastic teacher forcing, SGD, periodic checkpoints and
//!   loss logs
//!
//! # Example
//!
//! ```ignore
//! use emotion_chat::{Seq2SeqConfig, training::{Trainer, TrainingConfig}};
//!
//! let mut trainer = Trainer::new(Seq2SeqConfig::default(), TrainingConfig::default(), device)?;
//! let history = trainer.train(&mut train_loader, &test_pairs, &vocab)?;
//! ```

pub mod config;
pub mod data;
pub mod layers;
pub mod models;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::Seq2SeqConfig;
pub use data::{Emotion, TrainingPair};
pub use models::Seq2SeqModel;

/// Start-of-sentence token id
pub const SOS_TOKEN: u32 = 0;

/// End-of-sentence token id
pub const EOS_TOKEN: u32 = 1;

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum ChatbotError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatbotError>;

/// Neural network layer primitives
///
/// This module contains the building blocks for the seq2seq model:
/// - GRU cell (single time step)
/// - Step attention over padded encoder outputs
/// - Token embedding shared by encoder and decoder

pub mod attention;
pub mod embeddings;
pub mod recurrent;

pub use attention::StepAttention;
pub use embeddings::SharedEmbedding;
pub use recurrent::GruCell;

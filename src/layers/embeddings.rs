/// Token embedding table shared between encoder and decoder
use candle_core::{Module, Result, Tensor};
use candle_nn::{Embedding, VarBuilder};

/// Embedding whose clones all point at the same weight variable
#[derive(Debug, Clone)]
pub struct SharedEmbedding {
    embedding: Embedding,
}

impl SharedEmbedding {
    pub fn new(vocab_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let embedding = candle_nn::embedding(vocab_size, hidden_size, vb)?;
        Ok(Self { embedding })
    }

    /// Look up ids `[n]` -> `[n, hidden]`
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        self.embedding.forward(ids)
    }
}

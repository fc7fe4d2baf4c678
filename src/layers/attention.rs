/// Per-step attention over a fixed number of encoder slots
use candle_core::{Module, Result, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Attention whose scores come from the current decoder input and state
///
/// Unlike dot-product attention, the weights are produced by a linear layer
/// over `cat(embedded, hidden)` with one output per encoder slot, so the
/// encoder outputs must be zero-padded to exactly `max_length` rows.
pub struct StepAttention {
    attn: Linear,
    max_length: usize,
}

impl StepAttention {
    /// Create new StepAttention layer
    ///
    /// # Arguments
    /// * `hidden_size` - Size of the embedded token and of the hidden state
    /// * `max_length` - Number of encoder slots attended over
    /// * `vb` - VarBuilder for parameter initialization
    pub fn new(hidden_size: usize, max_length: usize, vb: VarBuilder) -> Result<Self> {
        let attn = linear(hidden_size * 2, max_length, vb.pp("attn"))?;
        Ok(Self { attn, max_length })
    }

    /// Attention weights `[batch, max_length]`, softmax-normalised per row
    pub fn weights(&self, embedded: &Tensor, hidden: &Tensor) -> Result<Tensor> {
        let query = Tensor::cat(&[embedded, hidden], 1)?;
        let scores = self.attn.forward(&query)?;
        candle_nn::ops::softmax_last_dim(&scores)
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `embedded` - Decoder input embedding `[1, hidden]`
    /// * `hidden` - Decoder hidden state `[1, hidden]`
    /// * `encoder_outputs` - Padded encoder outputs `[max_length, hidden]`
    ///
    /// # Returns
    /// Tuple of (context `[1, hidden]`, weights `[1, max_length]`)
    pub fn forward(
        &self,
        embedded: &Tensor,
        hidden: &Tensor,
        encoder_outputs: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let slots = encoder_outputs.dim(0)?;
        if slots != self.max_length {
            return Err(candle_core::Error::Msg(format!(
                "Expected {} encoder slots, got {}",
                self.max_length, slots
            )));
        }

        let weights = self.weights(embedded, hidden)?;
        let context = weights.matmul(encoder_outputs)?;
        Ok((context, weights))
    }
}

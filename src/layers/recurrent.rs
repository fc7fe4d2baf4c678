/// Gated recurrent unit, one time step at a time
use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

fn sigmoid(x: &Tensor) -> Result<Tensor> {
    (x.neg()?.exp()? + 1.0)?.recip()
}

/// Single-layer GRU cell
///
/// Gate layout follows the usual (reset, update, new) ordering, with
/// `weight_ih: [3 * hidden, input]` and `weight_hh: [3 * hidden, hidden]`:
///
/// ```text
/// r  = sigmoid(W_ir x + b_ir + W_hr h + b_hr)
/// z  = sigmoid(W_iz x + b_iz + W_hz h + b_hz)
/// n  = tanh(W_in x + b_in + r * (W_hn h + b_hn))
/// h' = (1 - z) * n + z * h
/// ```
#[derive(Debug, Clone)]
pub struct GruCell {
    weight_ih: Tensor,
    weight_hh: Tensor,
    bias_ih: Tensor,
    bias_hh: Tensor,
    hidden_size: usize,
}

impl GruCell {
    /// Create new GRU cell
    ///
    /// All parameters are drawn from U(-1/sqrt(hidden), 1/sqrt(hidden)).
    pub fn new(input_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let bound = 1. / (hidden_size as f64).sqrt();
        let init = Init::Uniform { lo: -bound, up: bound };

        let weight_ih = vb.get_with_hints((3 * hidden_size, input_size), "weight_ih", init)?;
        let weight_hh = vb.get_with_hints((3 * hidden_size, hidden_size), "weight_hh", init)?;
        let bias_ih = vb.get_with_hints(3 * hidden_size, "bias_ih", init)?;
        let bias_hh = vb.get_with_hints(3 * hidden_size, "bias_hh", init)?;

        Ok(Self {
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
            hidden_size,
        })
    }

    /// All-zero hidden state `[batch, hidden]`
    pub fn zero_state(&self, batch_size: usize) -> Result<Tensor> {
        Tensor::zeros(
            (batch_size, self.hidden_size),
            self.weight_hh.dtype(),
            self.weight_hh.device(),
        )
    }

    /// Advance one step
    ///
    /// # Arguments
    /// * `input` - `[batch, input_size]`
    /// * `hidden` - `[batch, hidden_size]`
    ///
    /// # Returns
    /// New hidden state `[batch, hidden_size]`
    pub fn step(&self, input: &Tensor, hidden: &Tensor) -> Result<Tensor> {
        let gi = input
            .matmul(&self.weight_ih.t()?)?
            .broadcast_add(&self.bias_ih)?;
        let gh = hidden
            .matmul(&self.weight_hh.t()?)?
            .broadcast_add(&self.bias_hh)?;

        let gi = gi.chunk(3, 1)?;
        let gh = gh.chunk(3, 1)?;

        let reset = sigmoid(&(&gi[0] + &gh[0])?)?;
        let update = sigmoid(&(&gi[1] + &gh[1])?)?;
        let candidate = (&gi[2] + reset.mul(&gh[2])?)?.tanh()?;

        // h' = n + z * (h - n)
        &candidate + update.mul(&(hidden - &candidate)?)?
    }
}

/// Encoder/decoder recurrent networks with attention and emotion conditioning
use candle_core::{Device, Module, Result, Tensor};
use candle_nn::{Dropout, Embedding, Linear, VarBuilder};

use crate::config::Seq2SeqConfig;
use crate::data::Emotion;
use crate::layers::{GruCell, SharedEmbedding, StepAttention};

pub mod decode;
pub mod loader;

pub use decode::Decoded;
pub use loader::{load_from_checkpoint, load_model};

/// Result of running the encoder over a whole input sentence
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Per-token outputs, zero-padded: [max_length, hidden_size]
    pub outputs: Tensor,
    /// Final hidden state: [1, hidden_size]
    pub hidden: Tensor,
}

/// GRU encoder consuming one token per step
pub struct EncoderRnn {
    embedding: SharedEmbedding,
    gru: GruCell,
    n_layers: usize,
    max_length: usize,
    vocab_size: usize,
    device: Device,
}

impl EncoderRnn {
    pub fn new(config: &Seq2SeqConfig, embedding: SharedEmbedding, vb: VarBuilder) -> Result<Self> {
        let gru = GruCell::new(config.hidden_size, config.hidden_size, vb.pp("gru"))?;

        Ok(Self {
            embedding,
            gru,
            n_layers: config.n_layers,
            max_length: config.max_length,
            vocab_size: config.vocab_size,
            device: vb.device().clone(),
        })
    }

    /// Zero hidden state [1, hidden_size]
    pub fn init_hidden(&self) -> Result<Tensor> {
        self.gru.zero_state(1)
    }

    /// One encoder step
    ///
    /// # Arguments
    /// * `token` - Token id tensor [1]
    /// * `hidden` - Previous hidden state [1, hidden_size]
    ///
    /// # Returns
    /// Tuple of (output, hidden), both [1, hidden_size]
    ///
    /// The same GRU cell is applied `n_layers` times, feeding its output back in.
    pub fn forward(&self, token: &Tensor, hidden: &Tensor) -> Result<(Tensor, Tensor)> {
        let mut output = self.embedding.forward(token)?;
        let mut hidden = hidden.clone();

        for _ in 0..self.n_layers {
            hidden = self.gru.step(&output, &hidden)?;
            output = hidden.clone();
        }

        Ok((output, hidden))
    }

    /// Encode a full input sentence
    pub fn encode(&self, input: &[u32]) -> crate::Result<EncoderOutput> {
        if input.is_empty() {
            return Err(crate::ChatbotError::Model("Cannot encode an empty input".to_string()));
        }
        if input.len() > self.max_length {
            return Err(crate::ChatbotError::Model(format!(
                "Input length {} exceeds max_length {}",
                input.len(),
                self.max_length
            )));
        }
        if let Some(&id) = input.iter().find(|&&id| id as usize >= self.vocab_size) {
            return Err(crate::ChatbotError::Model(format!(
                "Token id {} outside vocabulary of size {}",
                id, self.vocab_size
            )));
        }

        let mut hidden = self.init_hidden()?;
        let mut outputs = Vec::with_capacity(input.len());
        for &id in input {
            let token = Tensor::new(&[id], &self.device)?;
            let (output, new_hidden) = self.forward(&token, &hidden)?;
            outputs.push(output);
            hidden = new_hidden;
        }

        let outputs = Tensor::cat(&outputs, 0)?;
        let outputs = outputs.pad_with_zeros(0, 0, self.max_length - input.len())?;

        Ok(EncoderOutput { outputs, hidden })
    }
}

/// Output of a single decoder step
#[derive(Debug, Clone)]
pub struct DecoderStep {
    /// Log-probabilities over the vocabulary: [1, vocab_size]
    pub log_probs: Tensor,
    /// New hidden state: [1, hidden_size]
    pub hidden: Tensor,
    /// Attention weights over encoder slots: [1, max_length]
    pub attention: Tensor,
}

/// GRU decoder with step attention and an emotion embedding
pub struct AttnDecoderRnn {
    embedding: SharedEmbedding,
    emotion_embedding: Embedding,
    attention: StepAttention,
    attn_combine: Linear,
    dropout: Dropout,
    gru: GruCell,
    out: Linear,
    n_layers: usize,
    device: Device,
}

impl AttnDecoderRnn {
    pub fn new(config: &Seq2SeqConfig, embedding: SharedEmbedding, vb: VarBuilder) -> Result<Self> {
        let hidden_size = config.hidden_size;

        let emotion_embedding = candle_nn::embedding(
            config.num_emotions,
            config.emotion_embedding_dim,
            vb.pp("emotion_embedding"),
        )?;
        let attention = StepAttention::new(hidden_size, config.max_length, vb.clone())?;
        let attn_combine = candle_nn::linear(
            config.combine_input_size(),
            hidden_size,
            vb.pp("attn_combine"),
        )?;
        let gru = GruCell::new(hidden_size, hidden_size, vb.pp("gru"))?;
        let out = candle_nn::linear(hidden_size, config.vocab_size, vb.pp("out"))?;

        Ok(Self {
            embedding,
            emotion_embedding,
            attention,
            attn_combine,
            dropout: Dropout::new(config.dropout),
            gru,
            out,
            n_layers: config.n_layers,
            device: vb.device().clone(),
        })
    }

    /// One decoder step
    ///
    /// # Arguments
    /// * `token` - Previous token id tensor [1]
    /// * `hidden` - Previous hidden state [1, hidden_size]
    /// * `encoder_outputs` - Padded encoder outputs [max_length, hidden_size]
    /// * `emotion` - Emotion the reply is conditioned on
    /// * `train` - Enables dropout on the input embedding
    pub fn forward(
        &self,
        token: &Tensor,
        hidden: &Tensor,
        encoder_outputs: &Tensor,
        emotion: Emotion,
        train: bool,
    ) -> Result<DecoderStep> {
        let embedded = self.embedding.forward(token)?;
        let embedded = self.dropout.forward(&embedded, train)?;

        let (context, attention) = self.attention.forward(&embedded, hidden, encoder_outputs)?;

        let emotion = self.emotion_embedding.forward(&emotion.to_tensor(&self.device)?)?;
        let combined = Tensor::cat(&[&embedded, &context, &emotion], 1)?;
        let mut output = self.attn_combine.forward(&combined)?;

        let mut hidden = hidden.clone();
        for _ in 0..self.n_layers {
            output = output.relu()?;
            hidden = self.gru.step(&output, &hidden)?;
            output = hidden.clone();
        }

        let logits = self.out.forward(&output)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, candle_core::D::Minus1)?;

        Ok(DecoderStep {
            log_probs,
            hidden,
            attention,
        })
    }
}

/// Full seq2seq model: encoder and decoder sharing one token embedding
pub struct Seq2SeqModel {
    config: Seq2SeqConfig,
    encoder: EncoderRnn,
    decoder: AttnDecoderRnn,
    device: Device,
}

impl Seq2SeqModel {
    /// Create new Seq2SeqModel
    ///
    /// Variables are laid out as `embedding.*`, `encoder.*` and `decoder.*`.
    pub fn new(config: Seq2SeqConfig, vb: VarBuilder) -> crate::Result<Self> {
        config.validate()?;

        let device = vb.device().clone();
        let embedding = SharedEmbedding::new(
            config.vocab_size,
            config.hidden_size,
            vb.pp("embedding"),
        )?;
        let encoder = EncoderRnn::new(&config, embedding.clone(), vb.pp("encoder"))?;
        let decoder = AttnDecoderRnn::new(&config, embedding, vb.pp("decoder"))?;

        Ok(Self {
            config,
            encoder,
            decoder,
            device,
        })
    }

    pub fn config(&self) -> &Seq2SeqConfig {
        &self.config
    }

    pub fn encoder(&self) -> &EncoderRnn {
        &self.encoder
    }

    pub fn decoder(&self) -> &AttnDecoderRnn {
        &self.decoder
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Id of the most likely token in a `[1, vocab]` log-probability row
pub fn top_token(log_probs: &Tensor) -> Result<u32> {
    log_probs.flatten_all()?.argmax(0)?.to_scalar::<u32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn tiny_config() -> Seq2SeqConfig {
        Seq2SeqConfig {
            vocab_size: 12,
            hidden_size: 8,
            n_layers: 1,
            dropout: 0.1,
            max_length: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_encoder_pads_outputs() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Seq2SeqModel::new(tiny_config(), vb)?;

        let encoded = model.encoder().encode(&[0, 4, 5, 1])?;

        assert_eq!(encoded.outputs.dims(), &[6, 8]);
        assert_eq!(encoded.hidden.dims(), &[1, 8]);

        // Rows past the input are zero, the last real row is the final hidden
        let rows = encoded.outputs.to_vec2::<f32>()?;
        assert!(rows[4].iter().chain(rows[5].iter()).all(|&v| v == 0.0));
        assert_eq!(rows[3], encoded.hidden.to_vec2::<f32>()?[0]);

        Ok(())
    }

    #[test]
    fn test_encoder_rejects_bad_inputs() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Seq2SeqModel::new(tiny_config(), vb)?;

        assert!(model.encoder().encode(&[]).is_err());
        assert!(model.encoder().encode(&[2; 7]).is_err());
        assert!(model.encoder().encode(&[2, 12]).is_err());

        Ok(())
    }

    #[test]
    fn test_decoder_step_shapes() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Seq2SeqModel::new(tiny_config(), vb)?;

        let encoded = model.encoder().encode(&[0, 3, 1])?;
        let token = Tensor::new(&[0u32], &device)?;
        let step = model.decoder().forward(
            &token,
            &encoded.hidden,
            &encoded.outputs,
            Emotion::Fear,
            false,
        )?;

        assert_eq!(step.log_probs.dims(), &[1, 12]);
        assert_eq!(step.hidden.dims(), &[1, 8]);
        assert_eq!(step.attention.dims(), &[1, 6]);

        // log-softmax rows exponentiate to a distribution
        let total = step.log_probs.exp()?.sum_all()?.to_scalar::<f32>()?;
        assert!((total - 1.0).abs() < 1e-5);

        Ok(())
    }

    #[test]
    fn test_emotion_changes_prediction_distribution() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Seq2SeqModel::new(tiny_config(), vb)?;

        let encoded = model.encoder().encode(&[0, 3, 1])?;
        let token = Tensor::new(&[0u32], &device)?;
        let joy = model.decoder().forward(&token, &encoded.hidden, &encoded.outputs, Emotion::Joy, false)?;
        let anger = model.decoder().forward(&token, &encoded.hidden, &encoded.outputs, Emotion::Anger, false)?;

        let diff = (joy.log_probs - anger.log_probs)?.abs()?.sum_all()?.to_scalar::<f32>()?;
        assert!(diff > 0.0);

        Ok(())
    }

    #[test]
    fn test_embedding_is_shared() -> crate::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let _model = Seq2SeqModel::new(tiny_config(), vb)?;

        let data = varmap.data().lock().unwrap();
        let embedding_vars: Vec<_> = data
            .keys()
            .filter(|k| k.ends_with("embedding.weight"))
            .collect();
        // token table plus the decoder's emotion table
        assert_eq!(embedding_vars.len(), 2);
        assert!(data.contains_key("embedding.weight"));
        assert!(data.contains_key("decoder.emotion_embedding.weight"));

        Ok(())
    }

    #[test]
    fn test_top_token() -> Result<()> {
        let device = Device::Cpu;
        let log_probs = Tensor::new(&[[-3f32, -0.1, -2.0]], &device)?;
        assert_eq!(top_token(&log_probs)?, 1);
        Ok(())
    }
}

/// Greedy reply generation
use candle_core::Tensor;

use super::{top_token, Seq2SeqModel};
use crate::data::Emotion;

/// A generated reply and the attention used for each token
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Generated ids, without the terminating EOS
    pub tokens: Vec<u32>,
    /// One attention row ([max_length]) per decoding step
    pub attentions: Vec<Vec<f32>>,
}

impl Seq2SeqModel {
    /// Generate a reply by feeding back the most likely token
    ///
    /// Decoding starts from `sos_token` and stops at `eos_token` or after
    /// `max_steps` steps. Dropout is disabled.
    pub fn greedy_decode(
        &self,
        input: &[u32],
        emotion: Emotion,
        max_steps: usize,
    ) -> crate::Result<Decoded> {
        let encoded = self.encoder().encode(input)?;

        let mut hidden = encoded.hidden;
        let mut token = self.config().sos_token;
        let mut decoded = Decoded {
            tokens: Vec::new(),
            attentions: Vec::new(),
        };

        for _ in 0..max_steps {
            let input = Tensor::new(&[token], self.device())?;
            let step = self.decoder().forward(&input, &hidden, &encoded.outputs, emotion, false)?;

            decoded.attentions.push(step.attention.flatten_all()?.to_vec1::<f32>()?);
            hidden = step.hidden;
            token = top_token(&step.log_probs)?;

            if token == self.config().eos_token {
                break;
            }
            decoded.tokens.push(token);
        }

        log::debug!(
            "Decoded {} tokens ({} steps) for emotion {}",
            decoded.tokens.len(),
            decoded.attentions.len(),
            emotion
        );

        Ok(decoded)
    }
}

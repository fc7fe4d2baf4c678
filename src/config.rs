use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::data::Emotion;

/// Configuration for the emotion-conditioned seq2seq model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Seq2SeqConfig {
    /// Vocabulary size (shared by encoder input and decoder output)
    pub vocab_size: usize,

    /// Embedding/hidden dimension
    pub hidden_size: usize,

    /// Number of times the GRU cell is applied per step
    pub n_layers: usize,

    /// Dropout probability on decoder input embeddings
    pub dropout: f32,

    /// Maximum input length (number of attention slots)
    pub max_length: usize,

    /// Number of emotion classes
    pub num_emotions: usize,

    /// Emotion embedding dimension
    pub emotion_embedding_dim: usize,

    /// Start-of-sentence token used to seed free-running decoding
    pub sos_token: u32,

    /// End-of-sentence token
    pub eos_token: u32,
}

impl Default for Seq2SeqConfig {
    fn default() -> Self {
        Self {
            vocab_size: 10000,
            hidden_size: 500,
            n_layers: 1,
            dropout: 0.1,
            max_length: 128,
            num_emotions: Emotion::COUNT,
            emotion_embedding_dim: 16,
            sos_token: crate::SOS_TOKEN,
            eos_token: crate::EOS_TOKEN,
        }
    }
}

impl Seq2SeqConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.vocab_size == 0 || self.hidden_size == 0 {
            return Err(crate::ChatbotError::Config(
                "vocab_size and hidden_size must be > 0".to_string(),
            ));
        }

        if self.n_layers == 0 {
            return Err(crate::ChatbotError::Config(
                "n_layers must be > 0".to_string(),
            ));
        }

        if self.max_length == 0 || self.emotion_embedding_dim == 0 {
            return Err(crate::ChatbotError::Config(
                "max_length and emotion_embedding_dim must be > 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(crate::ChatbotError::Config(format!(
                "Invalid dropout: {}. Must be in [0, 1)",
                self.dropout
            )));
        }

        if self.num_emotions != Emotion::COUNT {
            return Err(crate::ChatbotError::Config(format!(
                "num_emotions must be {}, got {}",
                Emotion::COUNT,
                self.num_emotions
            )));
        }

        for (name, token) in [("sos_token", self.sos_token), ("eos_token", self.eos_token)] {
            if token as usize >= self.vocab_size {
                return Err(crate::ChatbotError::Config(format!(
                    "{} {} is outside the vocabulary (size {})",
                    name, token, self.vocab_size
                )));
            }
        }

        Ok(())
    }

    /// Width of the vector fed into `attn_combine`
    pub fn combine_input_size(&self) -> usize {
        self.hidden_size * 2 + self.emotion_embedding_dim
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = Seq2SeqConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.combine_input_size(), 500 * 2 + 16);
    }

    #[test]
    fn test_rejects_bad_dropout() {
        let config = Seq2SeqConfig {
            dropout: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tokens_outside_vocab() {
        let config = Seq2SeqConfig {
            vocab_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_wrong_emotion_count() {
        let config = Seq2SeqConfig {
            num_emotions: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_file_roundtrip() -> crate::Result<()> {
        let config = Seq2SeqConfig {
            vocab_size: 42,
            hidden_size: 8,
            max_length: 12,
            ..Default::default()
        };

        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        config.save(&path)?;

        assert_eq!(Seq2SeqConfig::from_file(&path)?, config);
        Ok(())
    }
}

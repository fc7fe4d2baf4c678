/// Emotion labels used to condition the decoder
use std::fmt;
use std::str::FromStr;

use candle_core::{Device, Result, Tensor};
use serde::{Deserialize, Serialize};

/// One of the seven emotion classes a reply can be conditioned on.
///
/// The discriminant is the row of the decoder's emotion embedding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "EmotionRepr")]
pub enum Emotion {
    Joy = 0,
    Love = 1,
    Sadness = 2,
    Anger = 3,
    Fear = 4,
    Thankfulness = 5,
    Surprise = 6,
}

impl Emotion {
    pub const COUNT: usize = 7;

    pub const ALL: [Emotion; Self::COUNT] = [
        Emotion::Joy,
        Emotion::Love,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Thankfulness,
        Emotion::Surprise,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Love => "love",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Thankfulness => "thankfulness",
            Emotion::Surprise => "surprise",
        }
    }

    /// Index tensor `[1]` suitable for an embedding lookup
    pub fn to_tensor(self, device: &Device) -> Result<Tensor> {
        Tensor::new(&[self as u32], device)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Emotion {
    type Err = crate::ChatbotError;

    /// Accepts either a class name (case-insensitive) or its numeric index
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(idx) = s.parse::<usize>() {
            return Self::from_index(idx).ok_or_else(|| {
                crate::ChatbotError::Data(format!("Emotion index {} out of range", idx))
            });
        }

        Self::ALL
            .iter()
            .copied()
            .find(|e| e.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::ChatbotError::Data(format!("Unknown emotion: {:?}", s)))
    }
}

/// Wire form accepted when deserializing: a name or an index
#[derive(Deserialize)]
#[serde(untagged)]
enum EmotionRepr {
    Index(usize),
    Name(String),
}

impl TryFrom<EmotionRepr> for Emotion {
    type Error = String;

    fn try_from(repr: EmotionRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            EmotionRepr::Index(idx) => {
                Emotion::from_index(idx).ok_or_else(|| format!("emotion index {} out of range", idx))
            }
            EmotionRepr::Name(name) => name.parse().map_err(|e: crate::ChatbotError| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_stable() {
        for (i, emotion) in Emotion::ALL.iter().enumerate() {
            assert_eq!(emotion.index(), i);
            assert_eq!(Emotion::from_index(i), Some(*emotion));
        }
        assert_eq!(Emotion::from_index(7), None);
        assert_eq!(Emotion::Thankfulness.index(), 5);
    }

    #[test]
    fn test_parse_name_or_index() {
        assert_eq!("Sadness".parse::<Emotion>().unwrap(), Emotion::Sadness);
        assert_eq!(" 6 ".parse::<Emotion>().unwrap(), Emotion::Surprise);
        assert!("boredom".parse::<Emotion>().is_err());
        assert!("9".parse::<Emotion>().is_err());
    }

    #[test]
    fn test_serde_forms() {
        assert_eq!(serde_json::to_string(&Emotion::Fear).unwrap(), "\"fear\"");
        let by_name: Emotion = serde_json::from_str("\"anger\"").unwrap();
        let by_index: Emotion = serde_json::from_str("1").unwrap();
        assert_eq!(by_name, Emotion::Anger);
        assert_eq!(by_index, Emotion::Love);
        assert!(serde_json::from_str::<Emotion>("12").is_err());
    }
}

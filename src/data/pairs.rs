/// Utterance/reply pairs and their loaders
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{Emotion, PairSource, Vocabulary};

/// One training example: an utterance, the reply, and the reply's emotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub input: Vec<u32>,
    pub target: Vec<u32>,
    pub emotion: Emotion,
}

impl TrainingPair {
    pub fn new(input: Vec<u32>, target: Vec<u32>, emotion: Emotion) -> Self {
        Self { input, target, emotion }
    }

    /// Check the pair fits a model with the given vocabulary and attention span
    pub fn validate(&self, vocab_size: usize, max_length: usize) -> crate::Result<()> {
        if self.input.is_empty() || self.input.len() > max_length {
            return Err(crate::ChatbotError::Data(format!(
                "Input length {} must be in 1..={}",
                self.input.len(),
                max_length
            )));
        }

        if self.target.len() < 2 {
            return Err(crate::ChatbotError::Data(format!(
                "Target needs at least 2 tokens, got {}",
                self.target.len()
            )));
        }

        if let Some(&id) = self
            .input
            .iter()
            .chain(self.target.iter())
            .find(|&&id| id as usize >= vocab_size)
        {
            return Err(crate::ChatbotError::Data(format!(
                "Token id {} outside vocabulary of size {}",
                id, vocab_size
            )));
        }

        Ok(())
    }

    /// Target ids as a `[target_len]` u32 tensor
    pub fn target_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::new(self.target.as_slice(), device)
    }
}

/// Validated collection of training pairs
#[derive(Debug, Clone)]
pub struct PairDataset {
    pairs: Vec<TrainingPair>,
}

impl PairDataset {
    /// Create a dataset, rejecting any pair that does not fit the model
    pub fn new(pairs: Vec<TrainingPair>, vocab_size: usize, max_length: usize) -> crate::Result<Self> {
        for (i, pair) in pairs.iter().enumerate() {
            pair.validate(vocab_size, max_length).map_err(|e| {
                crate::ChatbotError::Data(format!("Pair {}: {}", i, e))
            })?;
        }

        Ok(Self { pairs })
    }

    /// Load pre-indexed pairs from a JSON Lines file (blank lines ignored)
    pub fn from_jsonl<P: AsRef<Path>>(
        path: P,
        vocab_size: usize,
        max_length: usize,
    ) -> crate::Result<Self> {
        log::info!("Loading pairs from: {:?}", path.as_ref());

        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut pairs = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let pair: TrainingPair = serde_json::from_str(&line).map_err(|e| {
                crate::ChatbotError::Data(format!("Line {}: {}", line_no + 1, e))
            })?;
            pairs.push(pair);
        }

        let dataset = Self::new(pairs, vocab_size, max_length)?;
        log::info!("Loaded {} pairs", dataset.len());
        Ok(dataset)
    }

    /// Build pairs from a dialogue transcript and a parallel emotion file.
    ///
    /// Line `i` is the utterance and line `i + 1` the reply, labelled with the
    /// emotion on line `i + 1` of the emotion file. Both files must have the
    /// same number of lines, blank ones included. A blank dialogue line ends a
    /// conversation, so no pair is built across it. Pairs that do not fit the
    /// model (empty after encoding, or too long) are skipped.
    pub fn from_dialogue<P: AsRef<Path>, Q: AsRef<Path>>(
        dialogue_path: P,
        emotion_path: Q,
        vocab: &Vocabulary,
        max_length: usize,
    ) -> crate::Result<Self> {
        let lines = read_lines(dialogue_path.as_ref())?;
        let emotions = read_lines(emotion_path.as_ref())?
            .iter()
            .map(|l| match l.trim() {
                "" => Ok(None),
                name => name.parse::<Emotion>().map(Some),
            })
            .collect::<crate::Result<Vec<_>>>()?;

        if lines.len() != emotions.len() {
            return Err(crate::ChatbotError::Data(format!(
                "Dialogue has {} lines but emotion file has {}",
                lines.len(),
                emotions.len()
            )));
        }

        let mut pairs = Vec::new();
        let mut skipped = 0usize;
        for i in 1..lines.len() {
            if lines[i - 1].trim().is_empty() || lines[i].trim().is_empty() {
                continue;
            }
            let emotion = emotions[i].ok_or_else(|| {
                crate::ChatbotError::Data(format!("Dialogue line {} has no emotion label", i + 1))
            })?;

            let pair = TrainingPair::new(vocab.encode(&lines[i - 1]), vocab.encode(&lines[i]), emotion);
            // SOS + EOS alone carries no words
            if pair.input.len() <= 2 || pair.validate(vocab.len(), max_length).is_err() {
                skipped += 1;
                continue;
            }
            pairs.push(pair);
        }

        if skipped > 0 {
            log::warn!("Skipped {} dialogue pairs that do not fit the model", skipped);
        }
        log::info!("Built {} pairs from {:?}", pairs.len(), dialogue_path.as_ref());

        Self::new(pairs, vocab.len(), max_length)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&TrainingPair> {
        self.pairs.get(idx)
    }

    pub fn pairs(&self) -> &[TrainingPair] {
        &self.pairs
    }
}

/// Every line of `path`, blank ones included, so line numbers stay aligned
fn read_lines(path: &Path) -> crate::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().collect::<std::io::Result<Vec<_>>>()?)
}

/// Sequential or shuffled iteration over a dataset, one pair at a time
pub struct PairLoader {
    dataset: PairDataset,
    current_idx: usize,
    indices: Vec<usize>,
    shuffle: bool,
    rng: StdRng,
}

impl PairLoader {
    pub fn new(dataset: PairDataset, shuffle: bool, seed: u64) -> Self {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        let mut loader = Self {
            dataset,
            current_idx: 0,
            indices,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        };
        if loader.shuffle {
            loader.indices.shuffle(&mut loader.rng);
        }
        loader
    }

    pub fn dataset(&self) -> &PairDataset {
        &self.dataset
    }
}

impl PairSource for PairLoader {
    fn next_pair(&mut self) -> Option<TrainingPair> {
        let idx = *self.indices.get(self.current_idx)?;
        self.current_idx += 1;
        self.dataset.get(idx).cloned()
    }

    fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    fn num_pairs(&self) -> usize {
        self.dataset.len()
    }
}

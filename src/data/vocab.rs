/// Word <-> id lookup table
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::{EOS_TOKEN, SOS_TOKEN};

const SOS_WORD: &str = "<sos>";
const EOS_WORD: &str = "<eos>";

/// Vocabulary with the SOS/EOS markers reserved at ids 0 and 1
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    word2index: HashMap<String, u32>,
    index2word: Vec<String>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LookupTable {
    words: Vec<String>,
}

/// Split a line into lowercase word and punctuation tokens
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in line.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            current.extend(ch.to_lowercase());
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if matches!(ch, '.' | ',' | '!' | '?') {
            tokens.push(ch.to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

impl Vocabulary {
    /// Vocabulary holding only the reserved markers
    pub fn new() -> Self {
        let mut vocab = Self {
            word2index: HashMap::new(),
            index2word: Vec::new(),
        };
        vocab.push(SOS_WORD);
        vocab.push(EOS_WORD);
        vocab
    }

    /// Build from text lines, keeping the `max_size - 2` most frequent words.
    ///
    /// Ties are broken alphabetically so the table is deterministic.
    pub fn build<'a, I>(lines: I, max_size: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for line in lines {
            for token in tokenize(line) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut vocab = Self::new();
        for (word, _) in ranked {
            if vocab.len() >= max_size {
                break;
            }
            if word != SOS_WORD && word != EOS_WORD {
                vocab.push(&word);
            }
        }

        log::info!("Built vocabulary with {} entries", vocab.len());
        vocab
    }

    fn from_words(words: Vec<String>) -> crate::Result<Self> {
        if words.len() < 2 || words[SOS_TOKEN as usize] != SOS_WORD || words[EOS_TOKEN as usize] != EOS_WORD {
            return Err(crate::ChatbotError::Data(
                "Lookup table must start with the SOS and EOS markers".to_string(),
            ));
        }

        let mut vocab = Self {
            word2index: HashMap::with_capacity(words.len()),
            index2word: Vec::with_capacity(words.len()),
        };
        for word in &words {
            if vocab.word2index.contains_key(word) {
                return Err(crate::ChatbotError::Data(format!(
                    "Duplicate word in lookup table: {:?}",
                    word
                )));
            }
            vocab.push(word);
        }
        Ok(vocab)
    }

    fn push(&mut self, word: &str) {
        let id = self.index2word.len() as u32;
        self.word2index.insert(word.to_string(), id);
        self.index2word.push(word.to_string());
    }

    pub fn len(&self) -> usize {
        self.index2word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index2word.is_empty()
    }

    pub fn id(&self, word: &str) -> Option<u32> {
        self.word2index.get(word).copied()
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.index2word.get(id as usize).map(String::as_str)
    }

    /// Encode a sentence as `SOS words... EOS`, skipping unknown words
    pub fn encode(&self, sentence: &str) -> Vec<u32> {
        let mut ids = vec![SOS_TOKEN];
        ids.extend(tokenize(sentence).iter().filter_map(|w| self.id(w)));
        ids.push(EOS_TOKEN);
        ids
    }

    /// Decode ids into a space-joined sentence, stopping at EOS
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .copied()
            .take_while(|&id| id != EOS_TOKEN)
            .filter(|&id| id != SOS_TOKEN)
            .filter_map(|id| self.word(id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Persist the lookup table as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        let table = LookupTable {
            words: self.index2word.clone(),
        };
        serde_json::to_writer(writer, &table)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let table: LookupTable = serde_json::from_reader(reader)?;
        Self::from_words(table.words)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

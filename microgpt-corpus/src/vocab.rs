use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Word-level vocabulary: a bidirectional mapping between words and dense
/// token ids, in first-appearance order.
///
/// Encoding and decoding fail fast on unknown words and out-of-range ids;
/// nothing is silently inserted or clamped.
pub struct Vocabulary {
    word_to_id: HashMap<String, usize>,
    id_to_word: Vec<String>,
}

impl Vocabulary {
    /// Builds a vocabulary from cleaned corpus lines, assigning ids in
    /// order of first appearance.
    pub fn build<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut word_to_id = HashMap::new();
        let mut id_to_word = Vec::new();

        for line in lines {
            for word in line.as_ref().split_whitespace() {
                if !word_to_id.contains_key(word) {
                    word_to_id.insert(word.to_string(), id_to_word.len());
                    id_to_word.push(word.to_string());
                }
            }
        }

        Self { word_to_id, id_to_word }
    }

    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_word.is_empty()
    }

    pub fn id(&self, word: &str) -> Option<usize> {
        self.word_to_id.get(word).copied()
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.id_to_word.get(id).map(String::as_str)
    }

    /// Encodes whitespace-separated text into token ids.
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.split_whitespace()
            .map(|word| {
                self.id(word)
                    .ok_or_else(|| anyhow::anyhow!("Word '{word}' is not in the vocabulary"))
            })
            .collect()
    }

    /// Decodes token ids back into space-joined text.
    pub fn decode(&self, ids: &[usize]) -> Result<String> {
        let words: Vec<&str> = ids
            .iter()
            .map(|&id| {
                self.word(id).ok_or_else(|| {
                    anyhow::anyhow!("Token id {id} is outside the vocabulary of size {}", self.len())
                })
            })
            .collect::<Result<_>>()?;
        Ok(words.join(" "))
    }

    /// Writes the vocabulary as a binary sidecar file: a `u32` word count,
    /// then each word as `u32` byte length plus UTF-8 bytes, in id order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create vocabulary file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        writer.write_u32::<LittleEndian>(self.len() as u32)?;
        for word in &self.id_to_word {
            writer.write_u32::<LittleEndian>(word.len() as u32)?;
            writer.write_all(word.as_bytes())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Reads a vocabulary written by [`Vocabulary::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open vocabulary file: {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let count = reader
            .read_u32::<LittleEndian>()
            .context("Failed to read vocabulary word count")? as usize;

        let mut word_to_id = HashMap::with_capacity(count);
        let mut id_to_word = Vec::with_capacity(count);

        for id in 0..count {
            let len = reader
                .read_u32::<LittleEndian>()
                .with_context(|| format!("Failed to read length of word {id}"))?
                as usize;

            let mut bytes = vec![0u8; len];
            reader
                .read_exact(&mut bytes)
                .with_context(|| format!("Failed to read bytes of word {id}"))?;
            let word = String::from_utf8(bytes)
                .with_context(|| format!("Word {id} is not valid UTF-8"))?;

            word_to_id.insert(word.clone(), id);
            id_to_word.push(word);
        }

        Ok(Self { word_to_id, id_to_word })
    }
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary")
            .field("words", &self.len())
            .finish()
    }
}

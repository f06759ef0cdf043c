use std::path::Path;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tokenizers::Tokenizer;
use tracing::info;

use topicmap_core::error::{Error, Result};
use topicmap_core::traits::TextTokenizer;

/// HuggingFace `tokenizer.json` backed tokenizer.
pub struct HfTokenizer { inner: Tokenizer }

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = Tokenizer::from_file(path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to load tokenizer from {}: {}", path.display(), e)))?;
        Ok(Self { inner })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self.inner.encode(text, false).map_err(|e| Error::Operation(format!("Tokenization failed: {e}")))?;
        Ok(enc.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner.decode(ids, false).map_err(|e| Error::Operation(format!("Detokenization failed: {e}")))
    }
}

/// Tokens the character span of a split multi-byte character may occupy.
const SPLIT_CHAR_TOKENS: usize = 3;

/// `cl100k_base` byte-pair encoding, the vocabulary of every declared embedding model.
pub struct Cl100kTokenizer { bpe: CoreBPE }

impl Cl100kTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| Error::InvalidConfig(format!("Failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

impl TextTokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| u32::try_from(t).map_err(|_| Error::Format(format!("token {t} outside u32"))))
            .collect()
    }

    /// A slice whose edge cuts through a multi-byte character drops that character's
    /// partial bytes.
    fn decode(&self, ids: &[u32]) -> Result<String> {
        let ranks: Vec<usize> = ids.iter().map(|&t| t as usize).collect();
        if let Ok(text) = self.bpe.decode(ranks.clone()) { return Ok(text); }
        let n = ranks.len();
        for lead in 0..=SPLIT_CHAR_TOKENS.min(n) {
            for trail in 0..=SPLIT_CHAR_TOKENS.min(n - lead) {
                if let Ok(text) = self.bpe.decode(ranks[lead..n - trail].to_vec()) { return Ok(text); }
            }
        }
        Err(Error::Format(format!("{n} tokens do not decode to UTF-8")))
    }
}

/// One token per Unicode scalar; decode is exact.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharTokenizer;

impl TextTokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> { Ok(text.chars().map(u32::from).collect()) }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        ids.iter()
            .map(|&id| char::from_u32(id).ok_or_else(|| Error::Format(format!("invalid char token {id}"))))
            .collect()
    }
}

/// A configured `tokenizer.json`, otherwise `cl100k_base`.
pub fn default_tokenizer(tokenizer_file: Option<&Path>) -> Result<Box<dyn TextTokenizer>> {
    match tokenizer_file {
        Some(path) => { info!(path = %path.display(), "loading tokenizer"); Ok(Box::new(HfTokenizer::from_file(path)?)) }
        None => Ok(Box::new(Cl100kTokenizer::new()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_tokenizer_is_lossless() {
        let t = CharTokenizer;
        let ids = t.encode("héllo ✓").expect("encode");
        assert_eq!(ids.len(), 7);
        assert_eq!(t.decode(&ids[1..4]).expect("decode"), "éll");
    }

    #[test]
    fn cl100k_counts_subword_tokens() {
        let t = default_tokenizer(None).expect("cl100k");
        assert_eq!(t.encode("hello world").expect("encode").len(), 2);
        let text = "Rainwater from the gutters is filtered through a mesh screen before it reaches the barrel.";
        let ids = t.encode(text).expect("encode");
        assert!(ids.len() < text.chars().count() / 3, "{} tokens", ids.len());
        assert_eq!(t.decode(&ids).expect("decode"), text);
    }

    #[test]
    fn cl100k_slices_decode_across_split_characters() {
        let t = Cl100kTokenizer::new().expect("cl100k");
        let ids = t.encode("naïve café ✓✓✓ done").expect("encode");
        for cut in 1..ids.len() {
            assert!(t.decode(&ids[..cut]).is_ok(), "prefix of {cut} tokens");
            assert!(t.decode(&ids[cut..]).is_ok(), "suffix from {cut}");
        }
    }

    #[test]
    fn missing_tokenizer_file_is_config_error() {
        let err = HfTokenizer::from_file(Path::new("/definitely/not/here/tokenizer.json")).err();
        assert!(matches!(err, Some(Error::InvalidConfig(_))));
    }
}

//! Deterministic local embedding.
//!
//! Folds character, bigram and trigram hashes into `dimension` buckets,
//! adds boosted weight for a curated set of story-domain keywords, then
//! L2-normalizes. A pure function of the input text: FNV-1a is used
//! instead of `std`'s hasher so vectors are stable across processes and
//! toolchain versions.

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::error::Result;

const CHAR_WEIGHT: f32 = 0.2;
const BIGRAM_WEIGHT: f32 = 0.6;
const TRIGRAM_WEIGHT: f32 = 1.0;
const KEYWORD_BOOST: f32 = 4.0;

/// Inflected forms may extend a keyword by at most this many chars
const KEYWORD_SUFFIX_SLACK: usize = 3;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Words that carry most of the signal in personal stories
const DOMAIN_KEYWORDS: &[&str] = &[
    // relationships
    "love", "romantic", "romance", "partner", "dating", "relationship", "marriage", "wedding",
    "friend", "family", "lonely",
    // interests
    "travel", "art", "music", "painting", "photography", "hiking", "cooking", "reading",
    "writing", "dance", "sports", "fitness", "gaming", "nature", "adventure",
    // work
    "career", "job", "work", "startup", "founder", "engineer", "developer", "designer",
    "manager", "product", "teacher", "doctor", "nurse", "scientist", "research", "business",
    // subjects
    "quantum", "physics", "history", "archaeology", "technology", "science", "education",
    "health", "community",
];

/// Hash-based embedding provider
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Synchronous embedding; never fails
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        let normalized = text
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let chars: Vec<char> = normalized.chars().collect();

        for c in &chars {
            self.add(&mut vector, 1, std::slice::from_ref(c), CHAR_WEIGHT);
        }
        for pair in chars.windows(2) {
            self.add(&mut vector, 2, pair, BIGRAM_WEIGHT);
        }
        for triple in chars.windows(3) {
            self.add(&mut vector, 3, triple, TRIGRAM_WEIGHT);
        }

        for word in normalized.split(|c: char| !c.is_alphanumeric()) {
            if let Some(keyword) = domain_keyword(word) {
                let slot = self.bucket(fnv1a(FNV_OFFSET ^ 0xff, keyword.chars()));
                vector[slot] += KEYWORD_BOOST;
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn add(&self, vector: &mut [f32], order: u32, gram: &[char], weight: f32) {
        let slot = self.bucket(fnv1a(FNV_OFFSET ^ order, gram.iter().copied()));
        vector[slot] += weight;
    }

    fn bucket(&self, hash: u32) -> usize {
        hash as usize % self.dimension
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Divide by the Euclidean norm. A zero vector is left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn fnv1a(seed: u32, chars: impl Iterator<Item = char>) -> u32 {
    let mut hash = seed;
    let mut buf = [0u8; 4];
    for c in chars {
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

fn domain_keyword(word: &str) -> Option<&'static str> {
    if word.is_empty() {
        return None;
    }
    DOMAIN_KEYWORDS.iter().copied().find(|keyword| {
        word.starts_with(keyword) && word.len() <= keyword.len() + KEYWORD_SUFFIX_SLACK
    })
}

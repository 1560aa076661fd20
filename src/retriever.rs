// Retrieval of earlier material for drafting briefs
//
// Optional collaborator: the pipeline treats any failure here as "no snippets".

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One ranked passage from an earlier chapter
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub chapter_number: u32,
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Replace whatever was indexed for this chapter
    async fn index(&self, project_id: &str, chapter_number: u32, content: &str) -> Result<()>;

    /// Top `k` snippets for `query`, best first
    async fn search(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<Snippet>>;
}

struct Entry {
    chapter_number: u32,
    text: String,
    embedding: Vec<f32>,
}

/// In-memory retriever over hashed bag-of-words embeddings
pub struct HashEmbeddingRetriever {
    dimension: usize,
    chunk_words: usize,
    entries: DashMap<String, Vec<Entry>>,
}

impl Default for HashEmbeddingRetriever {
    fn default() -> Self {
        Self::new(384, 150)
    }
}

impl HashEmbeddingRetriever {
    pub fn new(dimension: usize, chunk_words: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            chunk_words: chunk_words.max(1),
            entries: DashMap::new(),
        }
    }

    /// Deterministic unit vector from lowercase word hashes
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.len() < 3 {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();
            for j in 0..2 {
                let idx = ((hash >> (j * 32)) as usize) % self.dimension;
                embedding[idx] += 1.0;
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }

    /// Paragraph-aligned chunks of roughly `chunk_words` words
    fn chunks(&self, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut words = 0;
        for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if words > 0 && words + paragraph.split_whitespace().count() > self.chunk_words {
                chunks.push(std::mem::take(&mut current));
                words = 0;
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            words += paragraph.split_whitespace().count();
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl Retriever for HashEmbeddingRetriever {
    async fn index(&self, project_id: &str, chapter_number: u32, content: &str) -> Result<()> {
        let new_entries: Vec<Entry> = self
            .chunks(content)
            .into_iter()
            .map(|text| Entry {
                chapter_number,
                embedding: self.embed(&text),
                text,
            })
            .collect();
        let count = new_entries.len();

        let mut entries = self.entries.entry(project_id.to_string()).or_default();
        entries.retain(|e| e.chapter_number != chapter_number);
        entries.extend(new_entries);
        tracing::debug!(project = project_id, chapter = chapter_number, chunks = count, "Chapter indexed");
        Ok(())
    }

    async fn search(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<Snippet>> {
        let Some(entries) = self.entries.get(project_id) else {
            return Ok(Vec::new());
        };
        let query = self.embed(query);
        let mut hits: Vec<Snippet> = entries
            .iter()
            .map(|e| Snippet {
                chapter_number: e.chapter_number,
                text: e.text.clone(),
                score: cosine_similarity(&query, &e.embedding),
            })
            .filter(|s| s.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

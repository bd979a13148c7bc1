//! In-memory embedding index over the knowledge base directory.
//!
//! `.txt` documents are chunked and embedded on the first search; the index is
//! kept for the lifetime of the process.

use crate::config::Settings;
use crate::core::error::{KnowledgeError, ModelError};
use crate::core::traits::{KnowledgeBase, KnowledgeSnippet};
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
const EMBEDDING_BATCH: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbedder {
    client: Client,
    settings: Ref<Settings>,
}

impl OpenAiEmbedder {
    pub fn new(settings: Ref<Settings>) -> Self {
        OpenAiEmbedder {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        if !self.settings.model_configured() {
            return Err(ModelError::MissingApiKey.into());
        }

        let resp = self
            .client
            .post(format!("{}/embeddings", self.settings.openai_base_url))
            .bearer_auth(&self.settings.openai_api_key)
            .json(&EmbeddingRequest {
                model: &self.settings.embedding_model,
                input: texts,
            })
            .send()
            .await
            .map_err(ModelError::from)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, message }.into());
        }

        let data: EmbeddingResponse = resp.json().await.map_err(ModelError::from)?;
        if data.data.len() != texts.len() {
            return Err(KnowledgeError::EmbeddingMismatch {
                expected: texts.len(),
                actual: data.data.len(),
            });
        }
        Ok(data.data.into_iter().map(|d| d.embedding).collect())
    }
}

struct IndexedChunk {
    content: String,
    source_label: String,
    embedding: Vec<f32>,
}

pub struct EmbeddingKnowledgeBase {
    directory: PathBuf,
    embedder: Box<dyn Embedder>,
    index: OnceCell<Vec<IndexedChunk>>,
}

#[injectable(KnowledgeBase)]
impl EmbeddingKnowledgeBase {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> EmbeddingKnowledgeBase {
        let directory = settings.knowledge_base_dir.clone();
        EmbeddingKnowledgeBase::new(directory, Box::new(OpenAiEmbedder::new(settings)))
    }
}

impl EmbeddingKnowledgeBase {
    pub fn new(directory: impl Into<PathBuf>, embedder: Box<dyn Embedder>) -> Self {
        EmbeddingKnowledgeBase {
            directory: directory.into(),
            embedder,
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&[IndexedChunk], KnowledgeError> {
        let index = self.index.get_or_try_init(|| self.build_index()).await?;
        Ok(index.as_slice())
    }

    async fn build_index(&self) -> Result<Vec<IndexedChunk>, KnowledgeError> {
        let documents = read_documents(&self.directory).await?;

        let mut pending: Vec<(String, String)> = Vec::new();
        for (label, text) in &documents {
            for chunk in chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP) {
                pending.push((label.clone(), chunk));
            }
        }

        let mut index = Vec::with_capacity(pending.len());
        for batch in pending.chunks(EMBEDDING_BATCH) {
            let texts: Vec<String> = batch.iter().map(|(_, chunk)| chunk.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(KnowledgeError::EmbeddingMismatch {
                    expected: batch.len(),
                    actual: embeddings.len(),
                });
            }

            index.extend(batch.iter().zip(embeddings).map(|((label, chunk), embedding)| {
                IndexedChunk {
                    content: chunk.clone(),
                    source_label: label.clone(),
                    embedding,
                }
            }));
        }

        info!(
            "Knowledge base indexed: {} documents, {} chunks from {}",
            documents.len(),
            index.len(),
            self.directory.display()
        );
        Ok(index)
    }
}

#[async_trait]
impl KnowledgeBase for EmbeddingKnowledgeBase {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, KnowledgeError> {
        let index = self.index().await?;
        if index.is_empty() || k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or(KnowledgeError::EmbeddingMismatch {
                expected: 1,
                actual: 0,
            })?;

        let mut scored: Vec<(f32, &IndexedChunk)> = index
            .iter()
            .map(|chunk| (cosine_similarity(&query_embedding, &chunk.embedding), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| KnowledgeSnippet {
                content: chunk.content.clone(),
                source_label: chunk.source_label.clone(),
                score,
            })
            .collect())
    }
}

/// `(file name, text)` of every `.txt` file in `directory`, sorted by name.
async fn read_documents(directory: &Path) -> Result<Vec<(String, String)>, KnowledgeError> {
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Knowledge base directory {} does not exist",
                directory.display()
            );
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !is_text {
            continue;
        }

        let label = entry.file_name().to_string_lossy().into_owned();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => documents.push((label, text)),
            Err(e) => warn!("Skipping knowledge document {label}: {e}"),
        }
    }

    documents.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(documents)
}

pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        if end >= chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
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

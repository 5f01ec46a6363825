//! Client for the Knowledge Pipeline's retrieval collaborator (§4.4 step 2).

use crate::util::from_reqwest;
use rsa_domain::error::{Error, Result};
use rsa_domain::keyword::KeywordSet;
use serde::{Deserialize, Serialize};

/// A ranked retrieval result returned by the RAG collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSnippet {
    pub content: String,
    pub source: String,
    pub similarity: f32,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[async_trait::async_trait]
pub trait RagClient: Send + Sync {
    /// Retrieve up to `top_k` ranked snippets matching `keywords`.
    async fn retrieve(&self, keywords: &KeywordSet, top_k: usize) -> Result<Vec<RagSnippet>>;
}

pub struct HttpRagClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRagClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl RagClient for HttpRagClient {
    async fn retrieve(&self, keywords: &KeywordSet, top_k: usize) -> Result<Vec<RagSnippet>> {
        let terms: Vec<&str> = keywords.as_slice().iter().map(|k| k.keyword.as_str()).collect();
        let body = serde_json::json!({ "keywords": terms, "top_k": top_k });

        let resp = self
            .client
            .post(format!("{}/retrieve", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !resp.status().is_success() {
            return Err(Error::Provider {
                provider: "rag".into(),
                message: format!("HTTP {}", resp.status()),
            });
        }

        let snippets: Vec<RagSnippet> = resp.json().await.map_err(from_reqwest)?;
        Ok(snippets)
    }
}

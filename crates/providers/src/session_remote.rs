//! HTTP client for the remote, authoritative half of the session store (§4.6).

use crate::util::from_reqwest;
use rsa_domain::chat_session::ChatSession;
use rsa_domain::error::{Error, Result};
use rsa_domain::session_backend::RemoteSessionBackend;

pub struct RemoteSessionClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl RemoteSessionClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn sessions_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{session_id}", self.base_url)
    }
}

#[async_trait::async_trait]
impl RemoteSessionBackend for RemoteSessionClient {
    async fn create(&self, session: &ChatSession) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .bearer_auth(&self.token)
            .json(session)
            .send()
            .await
            .map_err(from_reqwest)?;
        ensure_success(resp).await
    }

    async fn update(&self, session: &ChatSession) -> Result<()> {
        let resp = self
            .client
            .put(self.sessions_url(&session.session_id))
            .bearer_auth(&self.token)
            .json(session)
            .send()
            .await
            .map_err(from_reqwest)?;
        ensure_success(resp).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let resp = self
            .client
            .get(self.sessions_url(session_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(from_reqwest)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::PersistenceFailure(format!(
                "remote session load failed: HTTP {}",
                resp.status()
            )));
        }
        let session: ChatSession = resp.json().await.map_err(from_reqwest)?;
        Ok(Some(session))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.sessions_url(session_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(from_reqwest)?;
        ensure_success(resp).await
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/sessions", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            return Err(Error::PersistenceFailure(format!(
                "remote session list failed: HTTP {}",
                resp.status()
            )));
        }
        let ids: Vec<String> = resp.json().await.map_err(from_reqwest)?;
        Ok(ids)
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<()> {
    if resp.status().is_success() {
        Ok(())
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::PersistenceFailure(format!(
            "remote session store HTTP {status}: {body}"
        )))
    }
}

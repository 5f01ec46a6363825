//! Client for the credit/billing service used by §4.7 settlement.

use crate::util::from_reqwest;
use rsa_domain::credit::{
    CreditCheckRequest, CreditCheckResponse, CreditUpdateRequest, CreditUpdateResponse,
};
use rsa_domain::error::{Error, Result};

#[async_trait::async_trait]
pub trait CreditClient: Send + Sync {
    /// Boolean preflight: does the token have a positive balance?
    async fn check(&self, token: &str) -> Result<CreditCheckResponse>;

    /// Apply a credit delta (negative to deduct) and return the new balance.
    async fn update(&self, token: &str, delta: i64) -> Result<CreditUpdateResponse>;
}

pub struct HttpCreditClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCreditClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl CreditClient for HttpCreditClient {
    async fn check(&self, token: &str) -> Result<CreditCheckResponse> {
        let req = CreditCheckRequest {
            token: token.to_string(),
            n: 1,
        };
        let resp = self
            .client
            .post(format!("{}/credits/check", self.base_url))
            .json(&req)
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamAuth(format!("credit check HTTP {}", resp.status())));
        }
        resp.json().await.map_err(from_reqwest)
    }

    async fn update(&self, token: &str, delta: i64) -> Result<CreditUpdateResponse> {
        let req = CreditUpdateRequest {
            token: token.to_string(),
            delta,
        };
        let resp = self
            .client
            .post(format!("{}/credits/update", self.base_url))
            .json(&req)
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamAuth(format!("credit update HTTP {}", resp.status())));
        }
        resp.json().await.map_err(from_reqwest)
    }
}

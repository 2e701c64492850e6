//! HTTP relay transfer service
//!
//! Posts transfers to a signing relay that holds the treasury key and talks
//! to the chain. Request and response are small JSON bodies:
//!
//! ```text
//! POST {url}
//! { "reference": "...", "mint": "...", "destination": "...", "amount": 25000000000 }
//! 200 { "signature": "..." }
//! 4xx/5xx { "error": "..." }
//! ```

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{TokenTransferService, TransferRequest};
use crate::settlement::types::TransferOutcome;

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    reference: String,
    mint: &'a str,
    destination: &'a str,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    signature: Option<String>,
    error: Option<String>,
}

pub struct HttpTransferService {
    client: reqwest::Client,
    url: String,
}

impl HttpTransferService {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }

    async fn post(&self, request: &TransferRequest) -> Result<TransferOutcome, reqwest::Error> {
        let body = RelayRequest {
            reference: request.reference.to_string(),
            mint: &request.mint,
            destination: &request.destination,
            amount: request.amount_minor,
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed: Option<RelayResponse> = serde_json::from_str(&text).ok();

        let outcome = match (status.is_success(), parsed) {
            (true, Some(RelayResponse { signature: Some(sig), .. })) => TransferOutcome::Success(sig),
            (_, Some(RelayResponse { error: Some(err), .. })) => {
                TransferOutcome::Failed(format!("relay {}: {}", status, err))
            }
            _ => TransferOutcome::Failed(format!("relay {}: {}", status, text)),
        };
        Ok(outcome)
    }
}

#[async_trait]
impl TokenTransferService for HttpTransferService {
    async fn transfer(&self, request: &TransferRequest) -> TransferOutcome {
        match self.post(request).await {
            Ok(outcome) => outcome,
            Err(e) => TransferOutcome::Failed(format!("relay unreachable: {}", e)),
        }
    }

    fn name(&self) -> &str {
        "http-relay"
    }
}

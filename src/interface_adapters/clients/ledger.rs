use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const SETTLE_ATTEMPTS: u32 = 3;
const SETTLE_BACKOFF_STEP: Duration = Duration::from_millis(200);

// Verified entry returned by the ledger; the fee has already been charged.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedEntry {
    pub player_id: u64,
    pub display_name: String,
    pub entry_fee: u64,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettleRequest {
    pub session_id: String,
    pub player_id: u64,
    pub final_balance: u64,
}

#[derive(Debug, Serialize)]
struct VerifyEntryRequest<'a> {
    token: &'a str,
}

#[derive(Debug)]
pub enum LedgerError {
    InvalidToken,
    InsufficientFunds,
    UpstreamUnavailable,
    // Every settle attempt failed; the balance needs manual reconciliation.
    SettleUnconfirmed,
}

// Thin reqwest client for entry verification and cash-out settlement.
#[derive(Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub async fn verify_entry(&self, token: &str) -> Result<VerifiedEntry, LedgerError> {
        let url = format!("{}/ledger/verify-entry", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&VerifyEntryRequest { token })
            .send()
            .await
            .map_err(|_| LedgerError::UpstreamUnavailable)?;

        match response.status() {
            status if status.is_success() => response
                .json::<VerifiedEntry>()
                .await
                .map_err(|_| LedgerError::UpstreamUnavailable),
            StatusCode::UNAUTHORIZED => Err(LedgerError::InvalidToken),
            StatusCode::PAYMENT_REQUIRED => Err(LedgerError::InsufficientFunds),
            _ => Err(LedgerError::UpstreamUnavailable),
        }
    }

    /// Reports a final balance, retrying with linear backoff.
    ///
    /// Settlement is idempotent on the ledger side per session, so retries are safe.
    pub async fn settle(&self, request: &SettleRequest) -> Result<(), LedgerError> {
        let url = format!("{}/ledger/settle", self.base_url);

        for attempt in 1..=SETTLE_ATTEMPTS {
            match self.http.post(&url).json(request).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    warn!(
                        attempt,
                        status = %response.status(),
                        session_id = %request.session_id,
                        "ledger rejected settlement"
                    );
                    // Client errors will not succeed on retry.
                    if response.status().is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, session_id = %request.session_id, "settlement request failed");
                }
            }

            if attempt < SETTLE_ATTEMPTS {
                tokio::time::sleep(SETTLE_BACKOFF_STEP * attempt).await;
            }
        }

        Err(LedgerError::SettleUnconfirmed)
    }
}

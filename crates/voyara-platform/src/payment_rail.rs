use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;
use voyara_core::{DisbursementReceipt, DisbursementRequest, PaymentRail, PaymentRailError};

/// Sends the payout id as the provider's idempotency key.
#[derive(Clone)]
pub struct HttpPaymentRail {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpPaymentRail {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/disbursements", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> PaymentRailError {
        if err.is_timeout() {
            let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
            PaymentRailError::Timeout(millis)
        } else {
            PaymentRailError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl PaymentRail for HttpPaymentRail {
    async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReceipt, PaymentRailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", request.payout_id.to_string())
            .json(request)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        debug!(payout_id = %request.payout_id, status = %status, "payment rail responded");

        // The provider has accepted the money movement once it answers 2xx.
        if status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(payout_id = %request.payout_id, "unreadable payment rail receipt: {err}");
                    String::new()
                }
            };
            return Ok(receipt_from_body(request.payout_id, &body));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

/// A body without a transaction id falls back to the payout id.
fn receipt_from_body(payout_id: Uuid, body: &str) -> DisbursementReceipt {
    match serde_json::from_str::<DisbursementReceipt>(body) {
        Ok(receipt) if !receipt.transaction_id.trim().is_empty() => receipt,
        _ => {
            warn!(%payout_id, "payment rail accepted without a usable receipt");
            DisbursementReceipt {
                transaction_id: payout_id.to_string(),
            }
        }
    }
}

fn classify_failure(status: StatusCode, body: String) -> PaymentRailError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };

    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        PaymentRailError::Declined(detail)
    } else {
        PaymentRailError::Unavailable(detail)
    }
}

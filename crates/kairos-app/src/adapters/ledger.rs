//! Payment ledger spoken to as a JSON HTTP API.

use async_trait::async_trait;
use kairos_core::config::RemoteServiceConfig;
use kairos_core::constants::{LEDGER_CHARGES_PATH, LEDGER_PAYMENT_CHECK_PATH, LEDGER_REFUNDS_PATH};
use kairos_service::ledger::{ChargeRequest, Ledger, LedgerError, Receipt, RefundRequest};
use reqwest::StatusCode;
use serde::Deserialize;

use super::error_body;
use crate::config::http_client;
use crate::error::AppResult;

#[derive(Debug, Deserialize)]
struct PaymentCheck {
    paid: bool,
}

#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    remote: RemoteServiceConfig,
}

impl HttpLedger {
    /// ## Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(remote: RemoteServiceConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client(&remote)?,
            remote,
        })
    }

    async fn post_receipt<T: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Receipt, LedgerError> {
        let response = self
            .client
            .post(self.remote.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(LedgerError::Declined(error_body(response).await));
        }
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }
        response.json::<Receipt>().await.map_err(transport_error)
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, amount = request.amount))]
    async fn charge(&self, request: ChargeRequest) -> Result<Receipt, LedgerError> {
        let receipt = self.post_receipt(LEDGER_CHARGES_PATH, &request).await?;
        tracing::debug!(transaction_id = %receipt.transaction_id, "Charge accepted");
        Ok(receipt)
    }

    #[tracing::instrument(skip(self, request), fields(to_user_id = %request.to_user_id, amount = request.amount))]
    async fn refund(&self, request: RefundRequest) -> Result<Receipt, LedgerError> {
        let receipt = self.post_receipt(LEDGER_REFUNDS_PATH, &request).await?;
        tracing::debug!(transaction_id = %receipt.transaction_id, "Refund accepted");
        Ok(receipt)
    }

    #[tracing::instrument(skip(self))]
    async fn check_paid(&self, user_id: uuid::Uuid, reference: &str) -> Result<bool, LedgerError> {
        let mut url = reqwest::Url::parse(&self.remote.endpoint(LEDGER_PAYMENT_CHECK_PATH))
            .map_err(|err| LedgerError::Transport(format!("invalid ledger URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("user_id", &user_id.to_string())
            .append_pair("reference", reference);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }
        let check = response
            .json::<PaymentCheck>()
            .await
            .map_err(transport_error)?;
        Ok(check.paid)
    }
}

/// A timeout leaves the outcome unknown; everything else is a plain transport failure.
fn transport_error(err: reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::NoResponse
    } else {
        LedgerError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn ledger(server: &MockServer, timeout_secs: u64) -> HttpLedger {
        HttpLedger::new(RemoteServiceConfig {
            base_url: server.uri(),
            timeout_secs,
        })
        .expect("client builds")
    }

    fn charge() -> ChargeRequest {
        ChargeRequest {
            user_id: uuid::Uuid::now_v7(),
            amount: 1000,
            currency: "USD".to_string(),
            reason: "Evening climbing".to_string(),
            reference: format!("occurrence:{}", uuid::Uuid::now_v7()),
        }
    }

    #[test_log::test(tokio::test)]
    async fn charge_posts_request_and_reads_receipt() {
        let server = MockServer::start().await;
        let request = charge();
        Mock::given(method("POST"))
            .and(path("/charges"))
            .and(body_json(&request))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "transaction_id": "tx-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = ledger(&server, 10).charge(request).await.expect("charged");
        assert_eq!(receipt.transaction_id, "tx-1");
    }

    #[test_log::test(tokio::test)]
    async fn charge_maps_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/charges"))
            .respond_with(ResponseTemplate::new(402).set_body_string("insufficient funds"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/charges"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        let ledger = ledger(&server, 10);

        assert_eq!(
            ledger.charge(charge()).await,
            Err(LedgerError::Declined("insufficient funds".to_string()))
        );
        assert_eq!(
            ledger.charge(charge()).await,
            Err(LedgerError::Rejected {
                status: 503,
                body: "maintenance".to_string(),
            })
        );
    }

    #[test_log::test(tokio::test)]
    async fn slow_ledger_is_no_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refunds"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "transaction_id": "late" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let refund = RefundRequest {
            from_user_id: uuid::Uuid::now_v7(),
            to_user_id: uuid::Uuid::now_v7(),
            amount: 1000,
            currency: "USD".to_string(),
            reference: "occurrence:late".to_string(),
        };
        assert_eq!(
            ledger(&server, 1).refund(refund).await,
            Err(LedgerError::NoResponse)
        );
    }

    #[test_log::test(tokio::test)]
    async fn check_paid_sends_user_and_reference() {
        let server = MockServer::start().await;
        let user = uuid::Uuid::now_v7();
        Mock::given(method("GET"))
            .and(path("/payments/check"))
            .and(query_param("user_id", user.to_string()))
            .and(query_param("reference", "occurrence:abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "paid": true })))
            .mount(&server)
            .await;

        let ledger = ledger(&server, 10);
        assert_eq!(ledger.check_paid(user, "occurrence:abc").await, Ok(true));
        assert!(matches!(
            ledger.check_paid(user, "occurrence:other").await,
            Err(LedgerError::Rejected { status: 404, .. })
        ));
    }
}

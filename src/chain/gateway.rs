use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::traits::{BalanceFetcher, Receipt, ReceiptResolver, ReceiptStatus};
use crate::error::{AppError, AppResult, ResolverError};
use crate::ledger::models::Chain;

#[derive(Debug, Deserialize)]
struct ReceiptBody {
    status: ReceiptStatus,
    #[serde(default)]
    block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    native: Decimal,
}

/// Chain-agnostic JSON gateway in front of the chain RPC nodes
///
/// - `GET {base}/chains/{chain}/transactions/{hash}/receipt`
/// - `GET {base}/chains/{chain}/addresses/{address}/balance`
///
/// Every request carries the client-wide timeout. Hashes and addresses are
/// percent-encoded as single path segments.
pub struct HttpChainGateway {
    client: Client,
    base_url: Url,
}

impl HttpChainGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let raw = base_url.into();
        let base_url = Url::parse(&raw)
            .map_err(|e| AppError::Config(format!("Invalid gateway URL {}: {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Gateway URL {} cannot carry a path",
                raw
            )));
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Always Ok: `new` rejects cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn receipt_url(&self, chain: Chain, hash: &str) -> Url {
        self.endpoint(&["chains", chain.as_str(), "transactions", hash, "receipt"])
    }

    fn balance_url(&self, chain: Chain, address: &str) -> Url {
        self.endpoint(&["chains", chain.as_str(), "addresses", address, "balance"])
    }

    async fn get(&self, chain: Chain, url: Url) -> Result<reqwest::Response, ResolverError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(chain, e))
    }
}

fn transport_error(chain: Chain, error: reqwest::Error) -> ResolverError {
    if error.is_timeout() {
        ResolverError::Timeout { chain }
    } else if error.is_decode() {
        ResolverError::Decode {
            chain,
            message: error.to_string(),
        }
    } else {
        ResolverError::Transport {
            chain,
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl ReceiptResolver for HttpChainGateway {
    #[instrument(skip(self), fields(chain = %chain))]
    async fn get_receipt(&self, chain: Chain, hash: &str) -> AppResult<Receipt> {
        let response = self.get(chain, self.receipt_url(chain, hash)).await?;

        // Unknown to the node yet: still in the mempool or not propagated.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(hash = %hash, "receipt not found, treating as pending");
            return Ok(Receipt {
                chain,
                hash: hash.to_string(),
                status: ReceiptStatus::Pending,
                block_number: None,
            });
        }

        if !response.status().is_success() {
            return Err(ResolverError::UnexpectedStatus {
                chain,
                status: response.status().as_u16(),
            }
            .into());
        }

        let body: ReceiptBody = response
            .json()
            .await
            .map_err(|e| transport_error(chain, e))?;

        Ok(Receipt {
            chain,
            hash: hash.to_string(),
            status: body.status,
            block_number: body.block_number,
        })
    }
}

#[async_trait]
impl BalanceFetcher for HttpChainGateway {
    #[instrument(skip(self), fields(chain = %chain))]
    async fn get_native_balance(&self, chain: Chain, address: &str) -> AppResult<Decimal> {
        let response = self.get(chain, self.balance_url(chain, address)).await?;

        if !response.status().is_success() {
            return Err(ResolverError::UnexpectedStatus {
                chain,
                status: response.status().as_u16(),
            }
            .into());
        }

        let body: BalanceBody = response
            .json()
            .await
            .map_err(|e| transport_error(chain, e))?;

        Ok(body.native)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    async fn receipt(Path((chain, hash)): Path<(String, String)>) -> (AxumStatus, Json<Value>) {
        match (chain.as_str(), hash.as_str()) {
            ("ethereum", "0xconfirmed") => (
                AxumStatus::OK,
                Json(json!({"status": "confirmed", "block_number": 42})),
            ),
            ("ethereum", "0xfailed") => (AxumStatus::OK, Json(json!({"status": "failed"}))),
            ("ethereum", "0xodd/seg?q#frag") => (
                AxumStatus::OK,
                Json(json!({"status": "confirmed", "block_number": 7})),
            ),
            ("ethereum", "0xgarbage") => (AxumStatus::OK, Json(json!({"state": "??"}))),
            ("ethereum", "0xbroken") => (
                AxumStatus::BAD_GATEWAY,
                Json(json!({"error": "upstream down"})),
            ),
            ("ethereum", "0xslow") => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                (AxumStatus::OK, Json(json!({"status": "confirmed"})))
            }
            _ => (AxumStatus::NOT_FOUND, Json(json!({}))),
        }
    }

    async fn balance(Path((_chain, address)): Path<(String, String)>) -> Json<Value> {
        match address.as_str() {
            "0xrich" => Json(json!({"native": "12.345678901234567891"})),
            "acct#1/sub" => Json(json!({"native": "3.5"})),
            _ => Json(json!({"native": "0"})),
        }
    }

    async fn spawn_gateway() -> String {
        let app = Router::new()
            .route("/chains/:chain/transactions/:hash/receipt", get(receipt))
            .route("/chains/:chain/addresses/:address/balance", get(balance));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    async fn gateway() -> HttpChainGateway {
        HttpChainGateway::new(spawn_gateway().await, Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn test_confirmed_and_failed_receipts() {
        let gateway = gateway().await;

        let confirmed = gateway.get_receipt(Chain::Ethereum, "0xconfirmed").await.unwrap();
        assert_eq!(confirmed.status, ReceiptStatus::Confirmed);
        assert_eq!(confirmed.block_number, Some(42));

        let failed = gateway.get_receipt(Chain::Ethereum, "0xfailed").await.unwrap();
        assert_eq!(failed.status, ReceiptStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_hash_is_pending_not_an_error() {
        let gateway = gateway().await;
        let receipt = gateway.get_receipt(Chain::Ethereum, "0xunknown").await.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Pending);
    }

    #[tokio::test]
    async fn test_gateway_failures_are_resolver_errors() {
        let gateway = gateway().await;

        let broken = gateway.get_receipt(Chain::Ethereum, "0xbroken").await;
        assert!(matches!(
            broken,
            Err(AppError::Resolver(ResolverError::UnexpectedStatus { status: 502, .. }))
        ));

        let garbage = gateway.get_receipt(Chain::Ethereum, "0xgarbage").await;
        assert!(matches!(garbage, Err(AppError::Resolver(_))));
    }

    #[tokio::test]
    async fn test_slow_gateway_times_out() {
        let gateway = gateway().await;
        let slow = gateway.get_receipt(Chain::Ethereum, "0xslow").await;
        assert!(matches!(
            slow,
            Err(AppError::Resolver(ResolverError::Timeout { chain: Chain::Ethereum }))
        ));
    }

    #[tokio::test]
    async fn test_native_balance_keeps_full_precision() {
        let gateway = gateway().await;
        let amount = gateway
            .get_native_balance(Chain::Ethereum, "0xrich")
            .await
            .unwrap();
        assert_eq!(amount, dec!(12.345678901234567891));
    }

    #[tokio::test]
    async fn test_reserved_characters_stay_inside_one_path_segment() {
        let gateway = gateway().await;

        let receipt = gateway
            .get_receipt(Chain::Ethereum, "0xodd/seg?q#frag")
            .await
            .unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Confirmed);
        assert_eq!(receipt.block_number, Some(7));
        assert_eq!(receipt.hash, "0xodd/seg?q#frag");

        let amount = gateway
            .get_native_balance(Chain::Ethereum, "acct#1/sub")
            .await
            .unwrap();
        assert_eq!(amount, dec!(3.5));

        let url = gateway.receipt_url(Chain::Ethereum, "a/b");
        assert!(url.path().ends_with("/transactions/a%2Fb/receipt"));
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_base_path_is_kept_and_bad_urls_rejected() {
        let gateway =
            HttpChainGateway::new("http://gateway.local/v2/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            gateway.balance_url(Chain::Solana, "So1").as_str(),
            "http://gateway.local/v2/chains/solana/addresses/So1/balance"
        );

        assert!(matches!(
            HttpChainGateway::new("not a url", Duration::from_secs(1)),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            HttpChainGateway::new("mailto:ops@example.com", Duration::from_secs(1)),
            Err(AppError::Config(_))
        ));
    }
}

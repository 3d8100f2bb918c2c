use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;

use crate::error::{Result, TradeError};

/// Quote for one input/output pair at one amount and slippage.
///
/// Single use: the swap transaction must be built from the exact quote just fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub output_decimals: Option<u8>,
    /// Full aggregator response, echoed back verbatim when building the swap.
    pub route: Value,
}

impl Quote {
    pub fn from_json(route: Value) -> Result<Self> {
        let in_amount = amount_field(&route, "inAmount")?;
        let out_amount = amount_field(&route, "outAmount")?;
        let output_decimals = route
            .get("outputDecimals")
            .or_else(|| route.get("outputMint").and_then(|m| m.get("decimals")))
            .and_then(Value::as_u64)
            .and_then(|d| u8::try_from(d).ok());
        Ok(Self {
            in_amount,
            out_amount,
            output_decimals,
            route,
        })
    }
}

/// Aggregator amounts arrive as decimal strings; plain numbers are tolerated.
fn amount_field(v: &Value, key: &str) -> Result<u64> {
    let parsed = match v.get(key) {
        Some(Value::String(s)) => s.parse::<u64>().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        TradeError::QuoteUnavailable(format!("missing or non-numeric {key} in quote: {v}"))
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Smallest units of the input mint
    pub amount: u64,
    pub swap_mode: &'static str,
    pub slippage_bps: u16,
}

impl QuoteRequest {
    pub fn exact_in(input: &Pubkey, output: &Pubkey, amount: u64, slippage_bps: u16) -> Self {
        Self {
            input_mint: input.to_string(),
            output_mint: output.to_string(),
            amount,
            swap_mode: "ExactIn",
            slippage_bps,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_unwrap_sol: bool,
}

/// Route pricing and swap-transaction construction.
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    async fn quote(&self, req: &QuoteRequest) -> Result<Quote>;

    /// Base64 unsigned transaction for `quote`, paid by `user`.
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<String>;
}

#[derive(Clone)]
pub struct JupiterClient {
    base_url: String,
    http: Client,
}

impl JupiterClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl SwapAggregator for JupiterClient {
    async fn quote(&self, req: &QuoteRequest) -> Result<Quote> {
        let url = format!("{}/quote", self.base_url);
        let resp = self
            .http
            .get(url)
            .query(req)
            .send()
            .await
            .map_err(|e| TradeError::QuoteUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TradeError::QuoteUnavailable(format!("HTTP {status}: {body}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| TradeError::QuoteUnavailable(format!("malformed quote body: {e}")))?;
        let quote = Quote::from_json(body)?;
        debug!(in_amount = quote.in_amount, out_amount = quote.out_amount, "jupiter.quote");
        Ok(quote)
    }

    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> Result<String> {
        let url = format!("{}/swap", self.base_url);
        let resp = self
            .http
            .post(url)
            .json(&SwapRequest {
                quote_response: &quote.route,
                user_public_key: user.to_string(),
                wrap_unwrap_sol: true,
            })
            .send()
            .await
            .map_err(|e| TradeError::SwapBuildFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TradeError::SwapBuildFailed(format!("HTTP {status}: {body}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| TradeError::SwapBuildFailed(format!("malformed swap body: {e}")))?;
        body.get("swapTransaction")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TradeError::SwapBuildFailed(format!("missing swapTransaction: {body}")))
    }
}

/// base64 -> bincode -> `VersionedTransaction`.
pub fn decode_swap_transaction(encoded: &str) -> Result<VersionedTransaction> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| TradeError::SwapBuildFailed(format!("swap transaction is not base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| TradeError::SwapBuildFailed(format!("swap transaction does not decode: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// What the client under test sent.
    #[derive(Debug)]
    pub(crate) struct CapturedRequest {
        pub method: String,
        /// Path plus query string
        pub target: String,
        pub body: String,
    }

    impl CapturedRequest {
        pub(crate) fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// Answers exactly one HTTP request with the given status line and body,
    /// handing the parsed request back through the join handle.
    pub(crate) async fn serve_capture(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let header_end = loop {
                if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break i + 4;
                }
                let n = sock.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers ended");
                buf.extend_from_slice(&chunk[..n]);
            };
            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let resp = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();

            let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
            CapturedRequest {
                method: request_line.next().unwrap_or_default().to_string(),
                target: request_line.next().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
            }
        });
        (format!("http://{addr}"), handle)
    }

    pub(crate) async fn serve_once(status: &'static str, body: &'static str) -> String {
        serve_capture(status, body).await.0
    }

    fn sample_request() -> QuoteRequest {
        QuoteRequest::exact_in(&Pubkey::new_unique(), &Pubkey::new_unique(), 10_000_000, 1000)
    }

    #[tokio::test]
    async fn rate_limited_quote_is_unavailable() {
        let base = serve_once("429 Too Many Requests", "rate limited").await;
        let err = JupiterClient::new(base).quote(&sample_request()).await.unwrap_err();
        match err {
            TradeError::QuoteUnavailable(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_numeric_out_amount_is_unavailable() {
        let base = serve_once("200 OK", r#"{"inAmount":"10000000","outAmount":"lots"}"#).await;
        let err = JupiterClient::new(base).quote(&sample_request()).await.unwrap_err();
        assert!(matches!(err, TradeError::QuoteUnavailable(_)));
    }

    #[tokio::test]
    async fn well_formed_quote_parses() {
        let (base, request) = serve_capture(
            "200 OK",
            r#"{"inAmount":"10000000","outAmount":"123456","outputDecimals":6,"routePlan":[]}"#,
        )
        .await;
        let quote = JupiterClient::new(base).quote(&sample_request()).await.unwrap();
        let request = request.await.unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.target.starts_with("/quote?"));
        assert!(request.target.contains("swapMode=ExactIn"));
        assert!(request.target.contains("amount=10000000"));
        assert!(request.target.contains("slippageBps=1000"));
        assert_eq!(quote.in_amount, 10_000_000);
        assert_eq!(quote.out_amount, 123_456);
        assert_eq!(quote.output_decimals, Some(6));
        assert!(quote.route.get("routePlan").is_some());
    }

    #[test]
    fn decimals_read_from_nested_output_mint() {
        let quote = Quote::from_json(json!({
            "inAmount": 5,
            "outAmount": "7",
            "outputMint": { "decimals": 9 }
        }))
        .unwrap();
        assert_eq!(quote.output_decimals, Some(9));
    }

    #[test]
    fn quote_request_uses_aggregator_query_names() {
        let q = serde_json::to_value(sample_request()).unwrap();
        assert_eq!(q["swapMode"], "ExactIn");
        assert_eq!(q["slippageBps"], 1000);
        assert_eq!(q["amount"], 10_000_000);
        assert!(q.get("inputMint").is_some());
    }

    #[test]
    fn garbage_swap_transaction_is_rejected() {
        assert!(matches!(
            decode_swap_transaction("not base64!!"),
            Err(TradeError::SwapBuildFailed(_))
        ));
        assert!(matches!(
            decode_swap_transaction("AAAA"),
            Err(TradeError::SwapBuildFailed(_))
        ));
    }

    fn sample_quote() -> Quote {
        Quote::from_json(json!({"inAmount": "10000000", "outAmount": "42", "routePlan": [{"percent": 100}]}))
            .unwrap()
    }

    #[tokio::test]
    async fn swap_posts_quote_and_user_and_returns_transaction() {
        let (base, request) = serve_capture("200 OK", r#"{"swapTransaction":"AQID","lastValidBlockHeight":1}"#).await;
        let quote = sample_quote();
        let user = Pubkey::new_unique();

        let tx = JupiterClient::new(format!("{base}/"))
            .swap_transaction(&quote, &user)
            .await
            .unwrap();
        assert_eq!(tx, "AQID");

        let request = request.await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.target, "/swap");
        let body = request.json();
        assert_eq!(body["quoteResponse"], quote.route);
        assert_eq!(body["userPublicKey"], user.to_string());
        assert_eq!(body["wrapUnwrapSol"], true);
    }

    #[tokio::test]
    async fn swap_server_error_is_build_failure() {
        let base = serve_once("500 Internal Server Error", r#"{"error":"route expired"}"#).await;
        let err = JupiterClient::new(base)
            .swap_transaction(&sample_quote(), &Pubkey::new_unique())
            .await
            .unwrap_err();
        match err {
            TradeError::SwapBuildFailed(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("route expired"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn swap_body_without_transaction_is_build_failure() {
        let base = serve_once("200 OK", r#"{"simulationError":null}"#).await;
        let err = JupiterClient::new(base)
            .swap_transaction(&sample_quote(), &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::SwapBuildFailed(ref m) if m.contains("swapTransaction")));
    }
}

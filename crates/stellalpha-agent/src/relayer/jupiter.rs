use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::route::{QuoteRequest, RouteAccount, RouteInstruction, RoutePlan, RouteProvider};
use crate::error::RelayError;

/// Jupiter swap API (`/quote` + `/swap-instructions`).
pub struct JupiterClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_accounts: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAccount {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInstruction {
    program_id: String,
    #[serde(default)]
    accounts: Vec<WireAccount>,
    data: String,
}

impl From<WireInstruction> for RouteInstruction {
    fn from(ix: WireInstruction) -> Self {
        Self {
            program_id: ix.program_id,
            accounts: ix
                .accounts
                .into_iter()
                .map(|account| RouteAccount {
                    pubkey: account.pubkey,
                    is_signer: account.is_signer,
                    is_writable: account.is_writable,
                })
                .collect(),
            data: ix.data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsResponse {
    #[serde(default)]
    compute_budget_instructions: Vec<WireInstruction>,
    swap_instruction: WireInstruction,
    #[serde(default)]
    address_lookup_table_addresses: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuoteAmounts {
    in_amount: u64,
    out_amount: u64,
    other_amount_threshold: u64,
}

fn amount_field(quote: &Value, field: &str) -> Result<u64> {
    let raw = quote
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("quote is missing {field}"))?;
    raw.parse::<u64>()
        .with_context(|| format!("quote field {field} is not an integer: {raw:?}"))
}

fn parse_quote(quote: &Value) -> Result<QuoteAmounts> {
    if let Some(error) = quote.get("error").and_then(Value::as_str) {
        return Err(anyhow!("{error}"));
    }
    Ok(QuoteAmounts {
        in_amount: amount_field(quote, "inAmount")?,
        out_amount: amount_field(quote, "outAmount")?,
        other_amount_threshold: amount_field(quote, "otherAmountThreshold")?,
    })
}

fn parse_swap_instructions(body: Value, amounts: QuoteAmounts) -> Result<RoutePlan> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(anyhow!("{error}"));
    }
    let response: SwapInstructionsResponse =
        serde_json::from_value(body).context("malformed swap-instructions response")?;
    Ok(RoutePlan {
        in_amount: amounts.in_amount,
        out_amount: amounts.out_amount,
        min_amount_out: amounts.other_amount_threshold,
        swap: response.swap_instruction.into(),
        compute_budget: response
            .compute_budget_instructions
            .into_iter()
            .map(Into::into)
            .collect(),
        lookup_tables: response.address_lookup_table_addresses,
    })
}

impl JupiterClient {
    pub fn new(base_url: &str, api_key: &str, max_accounts: u8, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        let api_key = api_key.trim();
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
            max_accounts,
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("http {status}: {body}"));
        }
        response.json::<Value>().await.context("response is not json")
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Value> {
        let query = [
            ("inputMint", request.input_mint.to_string()),
            ("outputMint", request.output_mint.to_string()),
            ("amount", request.amount.to_string()),
            ("slippageBps", request.slippage_bps.to_string()),
            ("maxAccounts", self.max_accounts.to_string()),
        ];
        let response = self
            .with_key(self.http.get(format!("{}/quote", self.base_url)).query(&query))
            .send()
            .await
            .context("quote request failed")?;
        Self::read_json(response).await
    }

    async fn swap_instructions(&self, quote: Value, request: &QuoteRequest) -> Result<Value> {
        // The TraderState owns the token accounts; the vault program signs
        // for it, so no wallet-side wrapping or setup is wanted.
        let body = json!({
            "quoteResponse": quote,
            "userPublicKey": request.user.to_string(),
            "useSharedAccounts": true,
            "wrapAndUnwrapSol": false,
            "asLegacyTransaction": false,
            "dynamicComputeUnitLimit": true,
        });
        let response = self
            .with_key(
                self.http
                    .post(format!("{}/swap-instructions", self.base_url))
                    .json(&body),
            )
            .send()
            .await
            .context("swap-instructions request failed")?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl RouteProvider for JupiterClient {
    async fn route(&self, request: &QuoteRequest) -> Result<RoutePlan, RelayError> {
        let quote = self
            .quote(request)
            .await
            .map_err(|error| RelayError::QuoteUnavailable(format!("{error:#}")))?;
        let amounts =
            parse_quote(&quote).map_err(|error| RelayError::QuoteUnavailable(format!("{error:#}")))?;
        let body = self
            .swap_instructions(quote, request)
            .await
            .map_err(|error| RelayError::QuoteUnavailable(format!("{error:#}")))?;
        parse_swap_instructions(body, amounts)
            .map_err(|error| RelayError::RouteRejected(format!("{error:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> Value {
        json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "inAmount": "499500",
            "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "outAmount": "74925",
            "otherAmountThreshold": "74551",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "routePlan": []
        })
    }

    #[test]
    fn quote_amounts_are_parsed_from_strings() {
        let amounts = parse_quote(&quote()).unwrap();
        assert_eq!(
            amounts,
            QuoteAmounts {
                in_amount: 499_500,
                out_amount: 74_925,
                other_amount_threshold: 74_551,
            }
        );
    }

    #[test]
    fn quote_error_body_is_surfaced() {
        let error = parse_quote(&json!({"error": "No routes found"})).unwrap_err();
        assert_eq!(error.to_string(), "No routes found");
    }

    #[test]
    fn quote_with_non_numeric_amount_fails() {
        let mut quote = quote();
        quote["outAmount"] = json!("lots");
        assert!(parse_quote(&quote).is_err());
    }

    #[test]
    fn swap_instructions_map_into_plan() {
        let body = json!({
            "computeBudgetInstructions": [
                {"programId": "ComputeBudget111111111111111111111111111111", "accounts": [], "data": "AsBcAQA="}
            ],
            "setupInstructions": [],
            "swapInstruction": {
                "programId": "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
                "accounts": [
                    {"pubkey": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", "isSigner": false, "isWritable": false},
                    {"pubkey": "11111111111111111111111111111111", "isSigner": true, "isWritable": false}
                ],
                "data": "5RfLl3rjrSoBAAAAJmQAAQ=="
            },
            "cleanupInstruction": null,
            "addressLookupTableAddresses": ["D6XNrxMsDoABJVVY5YyHxJuAB6WGzYCXpZeKyNtqu2v4"]
        });
        let plan = parse_swap_instructions(body, parse_quote(&quote()).unwrap()).unwrap();
        assert_eq!(plan.min_amount_out, 74_551);
        assert_eq!(plan.swap.accounts.len(), 2);
        assert!(plan.swap.accounts[1].is_signer);
        assert_eq!(plan.compute_budget.len(), 1);
        assert_eq!(plan.lookup_tables.len(), 1);
    }

    #[test]
    fn swap_instructions_without_swap_are_rejected() {
        let body = json!({"computeBudgetInstructions": []});
        assert!(parse_swap_instructions(body, parse_quote(&quote()).unwrap()).is_err());
    }

    #[test]
    fn base_url_is_normalised() {
        let client =
            JupiterClient::new(" https://lite-api.jup.ag/swap/v1/ ", "", 40, Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url, "https://lite-api.jup.ag/swap/v1");
        assert!(client.api_key.is_none());
    }
}

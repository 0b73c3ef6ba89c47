//! # JSON-RPC Dispatch
//!
//! One method per registry operation, named the way EVM tooling names the
//! contract functions. Parameters are always a named object. Mutating
//! methods take the caller as `from`; this node does not authenticate it, so
//! expose the RPC port only to trusted callers.
//!
//! ## Error codes
//!
//! | Code     | Meaning                                   |
//! |----------|-------------------------------------------|
//! | -32600   | Invalid request envelope                  |
//! | -32601   | Unknown method (or devnet-only method)    |
//! | -32602   | Missing or malformed params               |
//! | -32603   | Internal error                            |
//! | -32001   | Token not found                           |
//! | -32010   | Caller is not the owner                   |
//! | -32011   | Invalid in the current lifecycle state    |
//! | -32012   | Input rejected (payment, reveal payload)  |
//! | -32013   | Capacity exhausted                        |
//! | -32014   | Grace period not finished                 |
//! | -32015   | Payout transfer failed                    |
//!
//! Registry errors carry `{"kind": ...}` in `data`.

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use veilmint_contracts::{ErrorKind, Receipt, RegistryError, TokenId};
use veilmint_protocol::crypto::{Commitment, RevealPayload};
use veilmint_protocol::identity::Address;
use veilmint_protocol::units::{wei_string, Wei};

use crate::api::AppState;

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -32001;

// ---------------------------------------------------------------------------
// Envelope Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named method parameters.
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

impl JsonRpcResponse {
    /// Wraps a dispatch outcome.
    pub fn new(id: Value, outcome: Result<Value, JsonRpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            jsonrpc: "2.0".into(),
            result,
            error,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The registry error kind, if this error came from the registry.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.data
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(|k| serde_json::from_value(k.clone()).ok())
    }
}

impl From<RegistryError> for JsonRpcError {
    fn from(err: RegistryError) -> Self {
        let kind = err.kind();
        Self {
            code: error_code(kind),
            message: err.to_string(),
            data: Some(json!({ "kind": kind })),
        }
    }
}

/// Stable error code for a registry error kind.
pub fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => NOT_FOUND,
        ErrorKind::Authorization => -32010,
        ErrorKind::State => -32011,
        ErrorKind::Validation => -32012,
        ErrorKind::Capacity => -32013,
        ErrorKind::Timing => -32014,
        ErrorKind::Transfer => -32015,
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FromParams {
    from: Address,
}

#[derive(Deserialize)]
struct HiddenUriParams {
    from: Address,
    uri: String,
}

#[derive(Deserialize)]
struct CommitParams {
    from: Address,
    commitment: Commitment,
}

#[derive(Deserialize)]
struct RevealParams {
    from: Address,
    #[serde(rename = "baseURI")]
    base_uri: String,
    #[serde(default)]
    secret: String,
}

#[derive(Deserialize)]
struct PriceParams {
    from: Address,
    #[serde(with = "wei_string")]
    price: Wei,
}

#[derive(Deserialize)]
struct MintParams {
    from: Address,
    #[serde(with = "wei_string")]
    value: Wei,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenParams {
    token_id: TokenId,
}

#[derive(Deserialize)]
struct OwnerParams {
    owner: Address,
}

#[derive(Deserialize)]
struct IncreaseTimeParams {
    seconds: u32,
}

fn params<T: DeserializeOwned>(raw: Option<&Value>) -> Result<T, JsonRpcError> {
    let value = raw.cloned().unwrap_or_else(|| json!({}));
    serde_json::from_value(value)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Internal error: {}", e)))
}

/// Refreshes the collection gauges after a mutation and returns the
/// receipt as JSON. Events already went out through the registry's sink.
fn commit<T: Serialize>(
    state: &AppState,
    receipt: Result<Receipt<T>, RegistryError>,
) -> Result<Value, JsonRpcError> {
    let receipt = receipt?;
    state.refresh_gauges();
    to_value(receipt)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Routes one JSON-RPC call to the registry.
pub fn dispatch(
    state: &AppState,
    method: &str,
    raw: Option<&Value>,
) -> Result<Value, JsonRpcError> {
    let registry = &state.registry;

    match method {
        // -- Mutations ------------------------------------------------------
        "setHiddenBaseURI" => {
            let p: HiddenUriParams = params(raw)?;
            commit(state, registry.set_hidden_base_uri(p.from, p.uri))
        }
        "commitMetadata" => {
            let p: CommitParams = params(raw)?;
            commit(state, registry.commit_metadata(p.from, p.commitment))
        }
        "revealMetadata" => {
            let p: RevealParams = params(raw)?;
            let payload = RevealPayload::new(p.secret, p.base_uri);
            commit(state, registry.reveal_metadata(p.from, &payload))
        }
        "startSale" => {
            let p: FromParams = params(raw)?;
            commit(state, registry.start_sale(p.from))
        }
        "stopSale" => {
            let p: FromParams = params(raw)?;
            commit(state, registry.stop_sale(p.from))
        }
        "setMintPrice" => {
            let p: PriceParams = params(raw)?;
            commit(state, registry.set_mint_price(p.from, p.price))
        }
        "mintNFT" => {
            let p: MintParams = params(raw)?;
            commit(state, registry.mint_nft(p.from, p.value))
        }
        "requestWithdraw" => {
            let p: FromParams = params(raw)?;
            commit(state, registry.request_withdraw(p.from))
        }
        "cancelWithdraw" => {
            let p: FromParams = params(raw)?;
            commit(state, registry.cancel_withdraw(p.from))
        }
        "executeWithdraw" => {
            let p: FromParams = params(raw)?;
            commit(state, registry.execute_withdraw(p.from))
        }

        // -- Queries --------------------------------------------------------
        "owner" => to_value(registry.owner()),
        "name" => to_value(registry.name()),
        "symbol" => to_value(registry.symbol()),
        "saleActive" => to_value(registry.sale_active()),
        "revealed" => to_value(registry.revealed()),
        "totalSupply" => to_value(registry.total_supply()),
        "maxSupply" => to_value(registry.max_supply()),
        "mintPrice" => to_value(registry.mint_price().to_string()),
        "hiddenBaseURI" => to_value(registry.hidden_base_uri()),
        "baseURI" => to_value(registry.base_uri()),
        "commitment" => to_value(registry.commitment()),
        "gracePeriod" => to_value(registry.grace_period().num_seconds()),
        "withdrawRequested" => to_value(registry.withdraw_requested()),
        "withdrawUnlockTime" => to_value(registry.withdraw_unlock_time()),
        "getContractBalance" => to_value(registry.contract_balance().to_string()),
        "status" => to_value(registry.status()),
        "balanceOf" => {
            let p: OwnerParams = params(raw)?;
            to_value(registry.balance_of(&p.owner))
        }
        "tokensOf" => {
            let p: OwnerParams = params(raw)?;
            to_value(registry.tokens_of(&p.owner))
        }
        "ownerOf" => {
            let p: TokenParams = params(raw)?;
            to_value(registry.owner_of(p.token_id)?)
        }
        "tokenURI" => {
            let p: TokenParams = params(raw)?;
            to_value(registry.token_uri(p.token_id)?)
        }

        // -- Devnet ---------------------------------------------------------
        "evm_increaseTime" => match &state.devnet_clock {
            Some(clock) => {
                let p: IncreaseTimeParams = params(raw)?;
                let now = clock
                    .advance(Duration::seconds(i64::from(p.seconds)))
                    .map_err(|e| JsonRpcError::new(INVALID_PARAMS, e.to_string()))?;
                tracing::info!(seconds = p.seconds, %now, "devnet clock advanced");
                to_value(now)
            }
            None => Err(method_not_found(method)),
        },

        _ => Err(method_not_found(method)),
    }
}

fn method_not_found(method: &str) -> JsonRpcError {
    JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_stable_codes() {
        let err = JsonRpcError::from(RegistryError::NotOwner);
        assert_eq!(err.code, -32010);
        assert_eq!(err.message, "not owner");
        assert_eq!(err.kind(), Some(ErrorKind::Authorization));

        let err = JsonRpcError::from(RegistryError::TokenNotFound(9));
        assert_eq!(err.code, NOT_FOUND);
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn codes_are_distinct_per_kind() {
        let kinds = [
            ErrorKind::Authorization,
            ErrorKind::State,
            ErrorKind::Validation,
            ErrorKind::Capacity,
            ErrorKind::Timing,
            ErrorKind::NotFound,
            ErrorKind::Transfer,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| error_code(*k)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn missing_params_are_invalid() {
        let err = params::<FromParams>(None).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn mint_params_accept_string_or_number() {
        let from = Address::derive("m");
        let a: MintParams =
            params(Some(&json!({ "from": from, "value": "10000000000000000" }))).unwrap();
        let b: MintParams = params(Some(&json!({ "from": from, "value": 5 }))).unwrap();
        assert_eq!(a.value, 10_000_000_000_000_000);
        assert_eq!(b.value, 5);
    }
}

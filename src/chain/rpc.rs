use async_trait::async_trait;
use launchguard_core::chain::ChainDataSource;
use launchguard_core::error::ChainError;
use launchguard_core::rate_limit::RequestPacer;
use launchguard_core::types::{
    AccountKeys, Block, BlockTransaction, LoadedAddresses, SignatureInfo, TokenBalance,
};
use serde_json::Value;
use solana_account_decoder::UiAccountData;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcBlockConfig, RpcTransactionConfig};
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::TransactionVersion;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransaction, EncodedTransactionWithStatusMeta, TransactionDetails, UiConfirmedBlock,
    UiMessage, UiTransactionEncoding,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// `ChainDataSource` over the Solana JSON-RPC API. Every call waits on the
/// shared pacer first.
pub struct RpcChainSource {
    client: RpcClient,
    pacer: Arc<RequestPacer>,
    commitment: CommitmentConfig,
}

impl std::fmt::Debug for RpcChainSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainSource")
            .field("url", &self.client.url())
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl RpcChainSource {
    pub fn new(
        url: impl Into<String>,
        commitment: CommitmentConfig,
        timeout: Duration,
        pacer: Arc<RequestPacer>,
    ) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(url.into(), timeout, commitment);
        Self {
            client,
            pacer,
            commitment,
        }
    }
}

#[async_trait]
impl ChainDataSource for RpcChainSource {
    #[instrument(skip(self))]
    async fn fetch_block(&self, slot: u64) -> Result<Option<Block>, ChainError> {
        self.pacer.acquire().await;
        let config = RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Json),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(false),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let block = self
            .client
            .get_block_with_config(slot, config)
            .await
            .map_err(map_client_error)?;
        Ok(convert_block(slot, block))
    }

    async fn address_history(
        &self,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        let pubkey = parse_pubkey(address)?;
        let before = before.map(parse_signature).transpose()?;

        self.pacer.acquire().await;
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        let entries = self
            .client
            .get_signatures_for_address_with_config(&pubkey, config)
            .await
            .map_err(map_client_error)?;

        Ok(entries
            .into_iter()
            .map(|entry| SignatureInfo {
                signature: entry.signature,
                slot: entry.slot,
                failed: entry.err.is_some(),
            })
            .collect())
    }

    async fn fetch_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<BlockTransaction>, ChainError> {
        let signature = parse_signature(signature)?;

        self.pacer.acquire().await;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let confirmed = self
            .client
            .get_transaction_with_config(&signature, config)
            .await
            .map_err(map_client_error)?;
        Ok(convert_transaction(confirmed.transaction))
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64, ChainError> {
        let owner = parse_pubkey(owner)?;
        let mint = parse_pubkey(mint)?;

        self.pacer.acquire().await;
        let accounts = self
            .client
            .get_token_accounts_by_owner(&owner, TokenAccountsFilter::Mint(mint))
            .await
            .map_err(map_client_error)?;

        let total: f64 = accounts
            .iter()
            .filter_map(|keyed| match &keyed.account.data {
                UiAccountData::Json(parsed) => parsed_ui_amount(&parsed.parsed),
                _ => None,
            })
            .sum();
        debug!(owner = %owner, mint = %mint, accounts = accounts.len(), total, "Token balance");
        Ok(total)
    }
}

fn map_client_error(err: ClientError) -> ChainError {
    ChainError::Rpc(err.to_string())
}

fn parse_pubkey(address: &str) -> Result<Pubkey, ChainError> {
    Pubkey::from_str(address).map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

fn parse_signature(signature: &str) -> Result<Signature, ChainError> {
    Signature::from_str(signature).map_err(|_| ChainError::InvalidAddress(signature.to_string()))
}

/// `uiAmount` of a jsonParsed SPL token account. Null amounts count as zero.
pub fn parsed_ui_amount(parsed: &Value) -> Option<f64> {
    let amount = parsed.pointer("/info/tokenAmount")?;
    Some(amount.get("uiAmount").and_then(Value::as_f64).unwrap_or(0.0))
}

/// `None` when the block carries no transactions.
pub fn convert_block(slot: u64, block: UiConfirmedBlock) -> Option<Block> {
    let transactions: Vec<BlockTransaction> = block
        .transactions?
        .into_iter()
        .filter_map(convert_transaction)
        .collect();
    if transactions.is_empty() {
        return None;
    }
    Some(Block { slot, transactions })
}

/// Converts one JSON-encoded transaction. Other encodings are skipped.
pub fn convert_transaction(tx: EncodedTransactionWithStatusMeta) -> Option<BlockTransaction> {
    let EncodedTransaction::Json(ui_tx) = tx.transaction else {
        return None;
    };

    let versioned = matches!(tx.version, Some(TransactionVersion::Number(_)));
    let (failed, loaded, post_token_balances) = match tx.meta {
        Some(meta) => {
            let loaded = match meta.loaded_addresses {
                OptionSerializer::Some(addresses) => Some(LoadedAddresses {
                    writable: addresses.writable,
                    readonly: addresses.readonly,
                }),
                _ => None,
            };
            let balances = match meta.post_token_balances {
                OptionSerializer::Some(balances) => balances
                    .into_iter()
                    .map(|balance| TokenBalance {
                        mint: balance.mint,
                        owner: match balance.owner {
                            OptionSerializer::Some(owner) => Some(owner),
                            _ => None,
                        },
                        ui_amount: balance.ui_token_amount.ui_amount,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            (meta.err.is_some(), loaded, balances)
        }
        // Without metadata success cannot be shown.
        None => (true, None, Vec::new()),
    };

    let account_keys = match ui_tx.message {
        UiMessage::Raw(raw) if versioned => AccountKeys::Versioned {
            static_keys: raw.account_keys,
            loaded,
        },
        UiMessage::Raw(raw) => AccountKeys::Legacy(raw.account_keys),
        // Parsed messages already list loaded addresses.
        UiMessage::Parsed(parsed) => {
            AccountKeys::Legacy(parsed.account_keys.into_iter().map(|k| k.pubkey).collect())
        }
    };

    Some(BlockTransaction {
        signatures: ui_tx.signatures,
        account_keys,
        failed,
        post_token_balances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(version: Value, err: Value, loaded: Option<Value>) -> EncodedTransactionWithStatusMeta {
        let mut meta = json!({
            "err": err,
            "status": { "Ok": null },
            "fee": 5000,
            "preBalances": [1_000_000_000u64, 0],
            "postBalances": [999_995_000u64, 0],
            "innerInstructions": [],
            "logMessages": ["Program log: Instruction: Buy"],
            "preTokenBalances": [],
            "postTokenBalances": [{
                "accountIndex": 1,
                "mint": "MintAddr",
                "owner": "buyer",
                "uiTokenAmount": {
                    "uiAmount": 35000.5,
                    "decimals": 6,
                    "amount": "35000500000",
                    "uiAmountString": "35000.5"
                }
            }],
            "rewards": []
        });
        if let Some(loaded) = loaded {
            meta["loadedAddresses"] = loaded;
        }

        let mut tx = json!({
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": ["buyer", "pool", "program"],
                    "header": {
                        "numRequiredSignatures": 1,
                        "numReadonlySignedAccounts": 0,
                        "numReadonlyUnsignedAccounts": 1
                    },
                    "recentBlockhash": "11111111111111111111111111111111",
                    "instructions": []
                }
            },
            "meta": meta
        });
        if !version.is_null() {
            tx["version"] = version;
        }
        serde_json::from_value(tx).unwrap()
    }

    #[test]
    fn legacy_transaction_keeps_flat_keys() {
        let tx = convert_transaction(encoded(json!("legacy"), Value::Null, None)).unwrap();
        assert_eq!(
            tx.account_keys,
            AccountKeys::Legacy(vec!["buyer".into(), "pool".into(), "program".into()])
        );
        assert!(!tx.failed);
        assert_eq!(tx.signature(), Some("sig1"));
        assert_eq!(tx.post_token_balances[0].mint, "MintAddr");
        assert_eq!(tx.post_token_balances[0].owner.as_deref(), Some("buyer"));
        assert_eq!(tx.post_token_balances[0].ui_amount, Some(35000.5));
    }

    #[test]
    fn versioned_transaction_carries_loaded_addresses() {
        let loaded = json!({ "writable": ["lutW"], "readonly": ["lutR"] });
        let tx = convert_transaction(encoded(json!(0), Value::Null, Some(loaded))).unwrap();
        assert_eq!(
            tx.account_keys,
            AccountKeys::Versioned {
                static_keys: vec!["buyer".into(), "pool".into(), "program".into()],
                loaded: Some(LoadedAddresses {
                    writable: vec!["lutW".into()],
                    readonly: vec!["lutR".into()],
                }),
            }
        );
    }

    #[test]
    fn versioned_transaction_without_loaded_addresses_is_trimmed() {
        let tx = convert_transaction(encoded(json!(0), Value::Null, None)).unwrap();
        assert!(matches!(
            tx.account_keys,
            AccountKeys::Versioned { loaded: None, .. }
        ));
    }

    #[test]
    fn error_in_meta_marks_failure() {
        let err = json!({ "InstructionError": [0, { "Custom": 6001 }] });
        let tx = convert_transaction(encoded(Value::Null, err, None)).unwrap();
        assert!(tx.failed);
    }

    #[test]
    fn reads_ui_amount_from_parsed_token_account() {
        let parsed = json!({
            "info": {
                "mint": "MintAddr",
                "owner": "buyer",
                "tokenAmount": { "uiAmount": 1234.5, "decimals": 6, "amount": "1234500000", "uiAmountString": "1234.5" }
            },
            "type": "account"
        });
        assert_eq!(parsed_ui_amount(&parsed), Some(1234.5));

        let empty = json!({ "info": { "tokenAmount": { "uiAmount": null, "amount": "0" } } });
        assert_eq!(parsed_ui_amount(&empty), Some(0.0));

        assert_eq!(parsed_ui_amount(&json!({ "info": {} })), None);
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(matches!(
            parse_pubkey("not-a-key"),
            Err(ChainError::InvalidAddress(_))
        ));
        assert!(parse_pubkey(launchguard_core::constants::PUMP_FUN_PROGRAM_ID).is_ok());
        assert!(matches!(
            parse_signature("xyz"),
            Err(ChainError::InvalidAddress(_))
        ));
    }
}

//! Ledger connection configuration
//!
//! Owns the RPC and WebSocket endpoints, the gatekeeper program address,
//! and the commitment level the listener subscribes at.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

use crate::infra::{GatewatchError, Result, RetryConfig};

/// Gatekeeper program deployed on devnet
pub const DEFAULT_PROGRAM_ID: &str = "GateF9qDULEJRgt6m1prkmUWrEXGVhDzYCgCJtGtnwu9";

const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Connection settings for the ledger node
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// HTTP RPC endpoint
    pub rpc_url: String,
    /// WebSocket endpoint for log subscriptions
    pub ws_url: String,
    /// Gatekeeper program whose logs we follow
    pub program_id: Pubkey,
    /// Finality level for subscriptions and account fetches
    pub commitment: CommitmentConfig,
    /// Reconnect policy for the subscription loop
    pub reconnect: RetryConfig,
}

impl ConnectionConfig {
    /// Load connection settings from environment variables.
    ///
    /// `SOLANA_WS_URL` defaults to the RPC endpoint with the scheme
    /// switched to WebSocket.
    pub fn from_env() -> Result<Self> {
        let rpc_url =
            std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let ws_url = std::env::var("SOLANA_WS_URL").unwrap_or_else(|_| derive_ws_url(&rpc_url));

        let program_id = std::env::var("GATEKEEPER_PROGRAM_ID")
            .unwrap_or_else(|_| DEFAULT_PROGRAM_ID.to_string());
        let program_id = program_id.parse::<Pubkey>().map_err(|e| {
            GatewatchError::configuration(format!(
                "invalid GATEKEEPER_PROGRAM_ID '{}': {}",
                program_id, e
            ))
        })?;

        let commitment = match std::env::var("SOLANA_COMMITMENT") {
            Ok(level) => parse_commitment(&level)?,
            Err(_) => CommitmentConfig::confirmed(),
        };

        Ok(Self {
            rpc_url,
            ws_url,
            program_id,
            commitment,
            reconnect: RetryConfig::reconnect(),
        })
    }

    /// Build a nonblocking RPC client at the configured commitment
    pub fn rpc_client(&self) -> RpcClient {
        RpcClient::new_with_commitment(self.rpc_url.clone(), self.commitment)
    }

    /// Open a pubsub connection to the WebSocket endpoint
    pub async fn pubsub_client(&self) -> Result<PubsubClient> {
        Ok(PubsubClient::new(&self.ws_url).await?)
    }

    /// Delay between reconnect attempts, for the status surface
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect.initial_delay
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let rpc_url = DEFAULT_RPC_URL.to_string();
        Self {
            ws_url: derive_ws_url(&rpc_url),
            rpc_url,
            // Hard-coded literal is known valid
            program_id: DEFAULT_PROGRAM_ID.parse().unwrap_or_default(),
            commitment: CommitmentConfig::confirmed(),
            reconnect: RetryConfig::reconnect(),
        }
    }
}

/// Read access to ledger account state and block metadata.
///
/// The listener confirms events against this before trusting them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Raw account data for an address; errors when the account is absent
    async fn account_data(&self, address: &Pubkey) -> Result<Vec<u8>>;

    /// Block time for a slot, in unix seconds
    async fn block_time(&self, slot: u64) -> Result<i64>;
}

/// [`LedgerReader`] backed by the nonblocking RPC client
pub struct RpcLedgerReader {
    rpc: RpcClient,
}

impl RpcLedgerReader {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            rpc: config.rpc_client(),
        }
    }
}

#[async_trait]
impl LedgerReader for RpcLedgerReader {
    async fn account_data(&self, address: &Pubkey) -> Result<Vec<u8>> {
        Ok(self.rpc.get_account_data(address).await?)
    }

    async fn block_time(&self, slot: u64) -> Result<i64> {
        Ok(self.rpc.get_block_time(slot).await?)
    }
}

fn parse_commitment(level: &str) -> Result<CommitmentConfig> {
    match level.to_ascii_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => Err(GatewatchError::configuration(format!(
            "unknown SOLANA_COMMITMENT '{}'",
            other
        ))),
    }
}

/// Derive a WebSocket URL from an HTTP RPC URL
fn derive_ws_url(rpc_url: &str) -> String {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        rpc_url.to_string()
    }
}

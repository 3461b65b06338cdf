//! Ledger-facing layer
//!
//! Connection settings and clients for the Solana RPC/WebSocket endpoints,
//! the gatekeeper event log parser, and the event listener that turns
//! confirmed on-chain facts into store and queue mutations.

mod connection;
mod listener;
mod parser;

pub use connection::{ConnectionConfig, LedgerReader, RpcLedgerReader, DEFAULT_PROGRAM_ID};
pub use listener::{EventListener, ListenerState};
pub use parser::{
    parse_transaction_logs, validate_event_table, CidHandleAccount, JobAccount, EVENT_LOG_PREFIX,
};

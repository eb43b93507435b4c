//! Wire types for the JSON-RPC methods the scraper consumes.

use serde::{Deserialize, Serialize};

use crate::{
    errors::{IndexError, Result},
    types::{BlockNumber, TxIndex},
};

#[derive(Deserialize, Debug)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct RpcRequest<'a, T> {
    pub jsonrpc: &'a str,
    pub id: u64,
    pub method: &'a str,
    pub params: T,
}

/// Block range filter for `eth_getLogs`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub from_block: String,
    pub to_block: String,
}

impl LogFilter {
    /// Filter selecting exactly one block
    #[must_use]
    pub fn single_block(block: BlockNumber) -> Self {
        Self {
            from_block: block.to_hex(),
            to_block: block.to_hex(),
        }
    }
}

/// The action part of a parity-style trace. Which fields are set depends on the trace type.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceAction {
    pub call_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub input: Option<String>,
    pub value: Option<String>,
    pub author: Option<String>,
    pub reward_type: Option<String>,
    pub address: Option<String>,
    pub refund_address: Option<String>,
    pub balance: Option<String>,
    pub init: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub gas_used: Option<String>,
    pub output: Option<String>,
    pub address: Option<String>,
}

/// One entry of a `trace_block` response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    #[serde(default)]
    pub action: TraceAction,
    pub block_hash: Option<String>,
    pub block_number: u64,
    pub error: Option<String>,
    pub result: Option<TraceResult>,
    #[serde(default)]
    pub subtraces: u64,
    #[serde(default)]
    pub trace_address: Vec<u64>,
    pub transaction_hash: Option<String>,
    pub transaction_position: Option<u64>,
    #[serde(rename = "type")]
    pub trace_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardType {
    Block,
    Uncle,
    External,
}

impl RewardType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "block" => Some(Self::Block),
            "uncle" => Some(Self::Uncle),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// A trace classified by type, borrowing the fields needed to locate participants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry<'a> {
    Call {
        from: Option<&'a str>,
        to: Option<&'a str>,
    },
    Create {
        from: Option<&'a str>,
        to: Option<&'a str>,
        created: Option<&'a str>,
        init: Option<&'a str>,
    },
    Suicide {
        address: Option<&'a str>,
        refund_address: Option<&'a str>,
    },
    Reward {
        author: Option<&'a str>,
        reward_type: Option<RewardType>,
        raw_reward_type: Option<&'a str>,
    },
}

impl Trace {
    /// Classifies the trace. Unknown trace types are an error: the extractor cannot
    /// vouch for completeness of data it does not understand.
    pub fn entry(&self) -> Result<TraceEntry<'_>> {
        let action = &self.action;
        match self.trace_type.as_str() {
            "call" => Ok(TraceEntry::Call {
                from: action.from.as_deref(),
                to: action.to.as_deref(),
            }),
            "create" => Ok(TraceEntry::Create {
                from: action.from.as_deref(),
                to: action.to.as_deref(),
                created: self.result.as_ref().and_then(|r| r.address.as_deref()),
                init: action.init.as_deref(),
            }),
            "suicide" => Ok(TraceEntry::Suicide {
                address: action.address.as_deref(),
                refund_address: action.refund_address.as_deref(),
            }),
            "reward" => Ok(TraceEntry::Reward {
                author: action.author.as_deref(),
                reward_type: action.reward_type.as_deref().and_then(RewardType::parse),
                raw_reward_type: action.reward_type.as_deref(),
            }),
            other => Err(IndexError::unknown_trace_type(self.block_number, other)),
        }
    }

    /// Whether this is a top-level trace of its transaction
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.trace_address.is_empty()
    }

    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.output.as_deref())
    }
}

/// One entry of an `eth_getLogs` response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub transaction_index: String,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl Log {
    pub fn tx_index(&self) -> Result<TxIndex> {
        TxIndex::from_hex(&self.transaction_index)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: Option<String>,
    pub transaction_index: Option<String>,
    pub contract_address: Option<String>,
    pub status: Option<String>,
}

/// The subset of a block header needed for the timestamp side-index
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockTimestampHeader {
    pub number: String,
    pub timestamp: String,
}

use crate::RpcResult;
use marketwatch_primitives::{Address, BlockInterval, BlockNumber, DateTime, Utc, B256};
use serde::{Deserialize, Serialize};

/// A transaction calling a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Hash of the transaction.
    pub tx_hash: B256,
    /// Block that included the transaction.
    pub block_number: BlockNumber,
    /// Sender of the transaction.
    pub from: Address,
    /// Called contract, `None` for contract creations.
    pub to: Option<Address>,
    /// Call data, starting with the function selector.
    pub input: Vec<u8>,
}

/// Read access to a ledger node.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait LedgerRpc: Send + Sync + std::fmt::Debug {
    /// Returns the number of the latest block.
    fn current_block_number(&self) -> RpcResult<BlockNumber>;

    /// Returns the timestamp of the block.
    ///
    /// `None` if the block does not exist or carries no valid timestamp, which is the case for
    /// blocks a node has pruned.
    fn block_timestamp(&self, block_number: BlockNumber) -> RpcResult<Option<DateTime<Utc>>>;

    /// Returns all transactions included in the interval that called a contract.
    fn contract_calls(&self, interval: &BlockInterval) -> RpcResult<Vec<ContractCall>>;
}

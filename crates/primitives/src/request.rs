use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a storage request.
pub type RequestId = B256;

/// Identifier of one slot of a storage request, `keccak256(requestId ++ uint256(slotIndex))`.
pub type SlotId = B256;

/// Parameters a client asks hosts to honour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ask {
    /// Number of slots the content is erasure coded into.
    pub slots: u64,
    /// Size of one slot in bytes.
    pub slot_size: u64,
    /// Storage duration in seconds, counted from the request creation.
    pub duration: u64,
    /// Average number of periods between two required proofs.
    pub proof_probability: u64,
    /// Price per byte per second.
    pub price_per_byte_per_second: u128,
    /// Collateral a host locks per byte.
    pub collateral_per_byte: u128,
    /// Number of slots that may be lost before the request fails.
    pub max_slot_loss: u64,
}

/// Content addressed by a storage request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Content identifier of the dataset.
    pub cid: Vec<u8>,
    /// Merkle root of the dataset.
    pub merkle_root: B256,
}

/// On-chain storage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Identifier of the request.
    pub id: RequestId,
    /// Address of the client that created the request.
    pub client: Address,
    /// What the client asks for.
    pub ask: Ask,
    /// What is stored.
    pub content: Content,
    /// Seconds after creation until the request expires if not all slots are filled.
    pub expiry: u64,
    /// Nonce making otherwise identical requests distinct.
    pub nonce: B256,
}

impl Request {
    /// Returns the slot id for the given slot index of this request.
    pub fn slot_id(&self, slot_index: u64) -> SlotId {
        slot_id(&self.id, slot_index)
    }
}

/// Derives the slot id of a request slot, as the marketplace contract does.
pub fn slot_id(request_id: &RequestId, slot_index: u64) -> SlotId {
    let mut encoded = [0u8; 64];
    encoded[..32].copy_from_slice(request_id.as_slice());
    encoded[56..].copy_from_slice(&slot_index.to_be_bytes());
    keccak256(encoded)
}

/// State of a storage request, in contract order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Waiting for hosts to fill the slots.
    New,
    /// All slots filled, hosts are storing.
    Started,
    /// Expired before all slots were filled.
    Cancelled,
    /// Duration elapsed without failure.
    Finished,
    /// Too many slots were lost.
    Failed,
}

impl RequestState {
    /// Returns `true` for states a request never leaves.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Finished | Self::Failed)
    }
}

impl TryFrom<u8> for RequestState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::New),
            1 => Ok(Self::Started),
            2 => Ok(Self::Cancelled),
            3 => Ok(Self::Finished),
            4 => Ok(Self::Failed),
            other => Err(other),
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids_differ_per_index() {
        let request_id = B256::repeat_byte(0x11);
        let first = slot_id(&request_id, 0);
        let second = slot_id(&request_id, 1);

        assert_ne!(first, second);
        assert_eq!(first, slot_id(&request_id, 0));
    }

    #[test]
    fn terminal_states() {
        assert!(!RequestState::New.is_terminal());
        assert!(!RequestState::Started.is_terminal());
        assert!(RequestState::Cancelled.is_terminal());
        assert!(RequestState::Finished.is_terminal());
        assert!(RequestState::Failed.is_terminal());
        assert_eq!(RequestState::try_from(3), Ok(RequestState::Finished));
        assert_eq!(RequestState::try_from(9), Err(9));
    }
}

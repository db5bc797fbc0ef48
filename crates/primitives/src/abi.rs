//! Function table of the marketplace contract.

use alloy_primitives::keccak256;
pub use alloy_primitives::Selector;
use std::collections::HashMap;

/// Whether a contract function mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Read-only function, only ever executed through `eth_call`.
    View,
    /// State mutating function, executed through a transaction.
    Transaction,
}

/// One function of the marketplace contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceFunction {
    /// Function name.
    pub name: &'static str,
    /// Canonical signature the selector is derived from.
    pub signature: &'static str,
    /// First four bytes of `keccak256(signature)`.
    pub selector: Selector,
    /// View or transaction.
    pub kind: FunctionKind,
}

impl MarketplaceFunction {
    /// Creates a function entry, deriving the selector from the signature.
    pub fn new(signature: &'static str, kind: FunctionKind) -> Self {
        let name = signature.split('(').next().unwrap_or(signature);
        let hash = keccak256(signature.as_bytes());
        Self { name, signature, selector: Selector::from_slice(&hash[..4]), kind }
    }
}

const VIEWS: &[&str] = &[
    "configuration()",
    "token()",
    "getRequest(bytes32)",
    "requestState(bytes32)",
    "requestEnd(bytes32)",
    "requestExpiry(bytes32)",
    "getHost(bytes32)",
    "getActiveSlot(bytes32)",
    "slotState(bytes32)",
    "missingProofs(bytes32)",
    "isProofRequired(bytes32)",
    "willProofBeRequired(bytes32)",
    "getChallenge(bytes32)",
    "getPointer(bytes32)",
    "canMarkProofAsMissing(bytes32,uint64)",
    "myRequests()",
    "mySlots()",
];

const TRANSACTIONS: &[&str] = &[
    concat!(
        "requestStorage((address,(uint64,uint256,uint256,uint64,uint64,uint256,uint64),",
        "(bytes,bytes32),uint64,bytes32))"
    ),
    "reserveSlot(bytes32,uint64)",
    concat!(
        "fillSlot(bytes32,uint64,",
        "((uint256,uint256),((uint256,uint256),(uint256,uint256)),(uint256,uint256)))"
    ),
    "freeSlot(bytes32)",
    "freeSlot(bytes32,address,address)",
    concat!(
        "submitProof(bytes32,",
        "((uint256,uint256),((uint256,uint256),(uint256,uint256)),(uint256,uint256)))"
    ),
    "markProofAsMissing(bytes32,uint64)",
    "withdrawFunds(bytes32)",
    "withdrawFunds(bytes32,address)",
];

/// Selector lookup for the marketplace contract functions.
#[derive(Debug, Clone)]
pub struct MarketplaceFunctions {
    by_selector: HashMap<Selector, MarketplaceFunction>,
}

impl MarketplaceFunctions {
    /// Creates a table from the given functions.
    pub fn new(functions: impl IntoIterator<Item = MarketplaceFunction>) -> Self {
        Self { by_selector: functions.into_iter().map(|f| (f.selector, f)).collect() }
    }

    /// Returns the function called by the given transaction input, if known.
    pub fn classify(&self, input: &[u8]) -> Option<&MarketplaceFunction> {
        if input.len() < 4 {
            return None
        }
        self.by_selector.get(&Selector::from_slice(&input[..4]))
    }

    /// Returns the function with the given selector, if known.
    pub fn get(&self, selector: &Selector) -> Option<&MarketplaceFunction> {
        self.by_selector.get(selector)
    }

    /// Returns the function with the given name. Overloads resolve to any of them.
    pub fn by_name(&self, name: &str) -> Option<&MarketplaceFunction> {
        self.by_selector.values().find(|f| f.name == name)
    }

    /// Number of known functions.
    pub fn len(&self) -> usize {
        self.by_selector.len()
    }

    /// Returns `true` if no functions are known.
    pub fn is_empty(&self) -> bool {
        self.by_selector.is_empty()
    }
}

impl Default for MarketplaceFunctions {
    fn default() -> Self {
        Self::new(
            VIEWS
                .iter()
                .map(|s| MarketplaceFunction::new(s, FunctionKind::View))
                .chain(
                    TRANSACTIONS
                        .iter()
                        .map(|s| MarketplaceFunction::new(s, FunctionKind::Transaction)),
                ),
        )
    }
}

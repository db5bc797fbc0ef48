use super::FunctionCallReport;
use crate::PeriodError;
use marketwatch_interfaces::ContractCall;
use marketwatch_primitives::{Address, FunctionKind, MarketplaceFunctions};
use tracing::trace;

/// Classifies the transactions calling the marketplace.
///
/// Calls to other contracts are skipped. A transaction calling a view function means the function
/// table is wrong, and fails the classification.
pub(crate) fn classify_calls(
    functions: &MarketplaceFunctions,
    marketplace: Address,
    calls: &[ContractCall],
) -> Result<Vec<FunctionCallReport>, PeriodError> {
    let mut reports = Vec::new();
    for call in calls.iter().filter(|call| call.to == Some(marketplace)) {
        let function = functions.classify(&call.input);
        if let Some(function) = function {
            if function.kind == FunctionKind::View {
                return Err(PeriodError::ViewFunctionInTransaction {
                    function: function.name,
                    block_number: call.block_number,
                    tx_hash: call.tx_hash,
                })
            }
        }
        trace!(
            target: "chain_state::period",
            tx = %call.tx_hash,
            function = ?function.map(|f| f.name),
            "Marketplace call"
        );
        reports.push(FunctionCallReport {
            block_number: call.block_number,
            tx_hash: call.tx_hash,
            from: call.from,
            function: function.map(|f| f.name),
        });
    }
    Ok(reports)
}

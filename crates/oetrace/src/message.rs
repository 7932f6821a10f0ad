//! Conversion of ad-hoc call parameters into an executable [`Message`].

use crate::backend::{Message, StateView};
use alloy_primitives::U256;
use oetrace_core::TraceCallParams;

/// Builds the message `params` describe, on top of `state`.
///
/// `gas_cap` bounds the gas of the message, `0` meaning no bound. `base_fee` is the base fee of
/// the block the message executes in, if the chain has one.
pub fn call_to_message(
    params: &TraceCallParams,
    gas_cap: u64,
    base_fee: Option<u64>,
    state: &dyn StateView,
) -> Message {
    let from = params.from.unwrap_or_default();

    let mut gas_limit = match params.gas {
        Some(gas) => gas.to::<u64>(),
        None if gas_cap != 0 => gas_cap,
        None => u64::MAX / 2,
    };
    if gas_cap != 0 && gas_limit > gas_cap {
        warn!(target: "rpc::trace", requested = gas_limit, cap = gas_cap, "caller gas above allowance, capping");
        gas_limit = gas_cap;
    }

    let (gas_price, max_fee_per_gas, max_priority_fee_per_gas) = match base_fee {
        None => {
            let price = params.gas_price.unwrap_or_default();
            (price, price, price)
        }
        Some(base_fee) => effective_fees(params, U256::from(base_fee)),
    };

    Message {
        from,
        to: params.to,
        nonce: state.nonce(from),
        value: params.value.unwrap_or_default(),
        gas_limit,
        gas_price,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        max_fee_per_blob_gas: params.max_fee_per_blob_gas.unwrap_or_default(),
        data: params.data.clone().unwrap_or_default(),
        access_list: params.access_list.clone().unwrap_or_default(),
    }
}

/// Returns `(gas_price, max_fee_per_gas, max_priority_fee_per_gas)` under a base fee.
fn effective_fees(params: &TraceCallParams, base_fee: U256) -> (U256, U256, U256) {
    if let Some(price) = params.gas_price {
        return (price, price, price)
    }
    let fee_cap = params.max_fee_per_gas.unwrap_or_default();
    let tip = params.max_priority_fee_per_gas.unwrap_or_default();
    if fee_cap.is_zero() && tip.is_zero() {
        return (base_fee, base_fee, base_fee)
    }
    let price = tip.saturating_add(base_fee).min(fee_cap);
    (price, fee_cap, tip)
}

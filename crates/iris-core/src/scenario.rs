//! FBR scenario code selection.
//!
//! `SN001` is the standard-rated sale to a registered buyer, `SN002` the same
//! sale to an unregistered buyer. A product declaring one of the two is
//! remapped to whichever matches the buyer. Every other declared code passes
//! through unchanged.

use crate::types::Channel;

/// Standard-rated sale to a registered buyer.
pub const SCENARIO_REGISTERED: &str = "SN001";

/// Standard-rated sale to an unregistered buyer.
pub const SCENARIO_UNREGISTERED: &str = "SN002";

/// Picks the `scenarioId` to emit.
///
/// `declared` is the scenario on the first reported line's product.
/// Returns `None` when the field should be omitted (ledger invoice whose
/// product declares nothing).
pub fn resolve_scenario(channel: Channel, declared: Option<&str>, buyer_has_tax_id: bool) -> Option<String> {
    let by_buyer = if buyer_has_tax_id {
        SCENARIO_REGISTERED
    } else {
        SCENARIO_UNREGISTERED
    };

    match declared.map(str::trim).filter(|s| !s.is_empty()) {
        Some(SCENARIO_REGISTERED) | Some(SCENARIO_UNREGISTERED) => Some(by_buyer.to_string()),
        Some(other) => Some(other.to_string()),
        None => match channel {
            Channel::PosOrder => Some(by_buyer.to_string()),
            Channel::Invoice => None,
        },
    }
}

//! POS service-fee line management.
//!
//! FBR charges a flat fee per POS invoice. The fee is carried on the order
//! as one untaxed line so the host's totals include it; the payload builder
//! then drops that line from `items` and reports the fee as `posServerFee`.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::policy::ChannelPolicy;
use crate::types::{Channel, InvoiceLine, InvoiceRecord};

const SERVICE_FEE_LINE_NAME: &str = "POS Service Fee";

/// Appends the service-fee line to a POS order if it is due and absent.
///
/// Returns true if a line was added.
///
/// ## Errors
/// `CoreError::ServiceFeeProductMissing` when a fee is configured but no
/// fee product code is set.
pub fn ensure_service_fee_line(record: &mut InvoiceRecord, policy: &ChannelPolicy) -> CoreResult<bool> {
    if record.channel != Channel::PosOrder || !policy.e_invoicing || policy.service_fee.is_zero() {
        debug!(ref_no = %record.ref_no, "POS service fee not applicable");
        return Ok(false);
    }

    let product_code = policy
        .service_fee_product_code
        .as_deref()
        .filter(|code| !code.trim().is_empty())
        .ok_or(CoreError::ServiceFeeProductMissing)?;

    if record.lines.iter().any(|line| policy.is_service_fee_line(line)) {
        debug!(ref_no = %record.ref_no, "POS service fee already present");
        return Ok(false);
    }

    let sequence = record.lines.iter().map(|l| l.sequence).max().unwrap_or(0) + 1;
    let mut line = InvoiceLine::new(sequence, product_code, policy.service_fee, Decimal::ONE);
    line.product_code = Some(product_code.to_string());
    line.product_name = Some(SERVICE_FEE_LINE_NAME.to_string());

    info!(ref_no = %record.ref_no, fee = %policy.service_fee, "Adding POS service fee line");
    record.host_grand_total += policy.service_fee;
    record.lines.push(line);
    Ok(true)
}

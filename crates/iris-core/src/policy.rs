//! Per-channel submission policy.
//!
//! The two channels share one pipeline. What differs between them is
//! captured here and handed to the pipeline by the caller.

use rust_decimal::Decimal;

use crate::types::{Channel, InvoiceLine};

/// Product code that marks the POS service-fee line.
pub const SERVICE_FEE_PRODUCT_CODE: &str = "SERVICE_FEE";

/// Channel-specific behavior for tax injection and the POS service fee.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPolicy {
    pub channel: Channel,
    /// Attach a default further-tax component for unregistered buyers.
    pub inject_further_tax: bool,
    /// Percentage used when injecting further tax.
    pub default_further_tax_percent: Decimal,
    /// E-invoicing switch; POS orders are only submitted when on.
    pub e_invoicing: bool,
    /// Flat FBR POS service fee, reported as `posServerFee`.
    pub service_fee: Decimal,
    /// Product code of the fee line. `None` means no fee product is set up.
    pub service_fee_product_code: Option<String>,
}

impl ChannelPolicy {
    /// Ledger invoice defaults: further tax injected, no service fee.
    pub fn invoice() -> Self {
        ChannelPolicy {
            channel: Channel::Invoice,
            inject_further_tax: true,
            default_further_tax_percent: Decimal::from(4),
            e_invoicing: true,
            service_fee: Decimal::ZERO,
            service_fee_product_code: None,
        }
    }

    /// POS defaults: no injection, fee product `SERVICE_FEE`.
    pub fn pos() -> Self {
        ChannelPolicy {
            channel: Channel::PosOrder,
            inject_further_tax: false,
            default_further_tax_percent: Decimal::from(4),
            e_invoicing: true,
            service_fee: Decimal::ZERO,
            service_fee_product_code: Some(SERVICE_FEE_PRODUCT_CODE.to_string()),
        }
    }

    /// Default policy for a channel.
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Invoice => ChannelPolicy::invoice(),
            Channel::PosOrder => ChannelPolicy::pos(),
        }
    }

    /// Fee reported on the payload. Always zero for ledger invoices.
    pub fn reported_service_fee(&self) -> Decimal {
        match self.channel {
            Channel::PosOrder => self.service_fee,
            Channel::Invoice => Decimal::ZERO,
        }
    }

    /// True if `line` is the POS fee line and must not be reported as an item.
    pub fn is_service_fee_line(&self, line: &InvoiceLine) -> bool {
        if self.channel != Channel::PosOrder {
            return false;
        }
        match (&self.service_fee_product_code, &line.product_code) {
            (Some(fee_code), Some(code)) => fee_code == code,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_service_fee_line_detection() {
        let mut fee = InvoiceLine::new(2, "fee", dec!(1), dec!(1));
        fee.product_code = Some(SERVICE_FEE_PRODUCT_CODE.to_string());
        let goods = InvoiceLine::new(1, "P1", dec!(100), dec!(1));

        let pos = ChannelPolicy::pos();
        assert!(pos.is_service_fee_line(&fee));
        assert!(!pos.is_service_fee_line(&goods));

        // Ledger invoices never filter lines.
        assert!(!ChannelPolicy::invoice().is_service_fee_line(&fee));
    }

    #[test]
    fn test_reported_fee_is_pos_only() {
        let mut invoice = ChannelPolicy::invoice();
        invoice.service_fee = dec!(1);
        assert_eq!(invoice.reported_service_fee(), Decimal::ZERO);

        let mut pos = ChannelPolicy::pos();
        pos.service_fee = dec!(1);
        assert_eq!(pos.reported_service_fee(), dec!(1));
    }
}

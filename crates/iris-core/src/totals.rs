//! # Totals Calculator
//!
//! Per-line tax breakdown and invoice aggregates.
//!
//! ## Line Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base       = unit_price × quantity × (1 − discount/100)                │
//! │  percentage = base × rate/100                                           │
//! │  fixed      = amount × quantity                                         │
//! │  total      = base + sales + extra + further + excise + withholding     │
//! │                                                                         │
//! │  Example: 100 × 2, no discount, 18% sales tax                           │
//! │    base 200.00   sales 36.00   total 236.00                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here rounds. Aggregates are summed from unrounded line figures and
//! the payload builder rounds each emitted figure exactly once.
//!
//! Every product and sum is checked. A figure that does not fit in a
//! `Decimal` is a validation error, so the record fails instead of the task.

use rust_decimal::Decimal;
use tracing::warn;

use crate::error::ValidationError;
use crate::money::{round_money, Percent};
use crate::tax::{resolve_taxes, ResolvedTaxes};
use crate::types::{InvoiceLine, RegistrationType};

/// Calculated figures for one line, unrounded.
#[derive(Debug, Clone, PartialEq)]
pub struct LineCalculation {
    pub sequence: u32,
    /// Value excluding sales tax.
    pub base: Decimal,
    pub sales_tax: Decimal,
    pub extra_tax: Decimal,
    pub further_tax: Decimal,
    pub excise_duty: Decimal,
    pub withholding_tax: Decimal,
    pub total: Decimal,
    pub resolved: ResolvedTaxes,
}

impl LineCalculation {
    /// Sum of every tax head on the line.
    pub fn tax_total(&self) -> Decimal {
        sum_saturating(&[self.sales_tax, self.extra_tax, self.further_tax, self.excise_duty, self.withholding_tax])
    }
}

/// Computes one line's breakdown.
///
/// ## Errors
/// `ValidationError::Invalid` if any figure overflows.
pub fn compute_line(line: &InvoiceLine, registration: RegistrationType) -> Result<LineCalculation, ValidationError> {
    let overflow = || out_of_range(format!("line {} amount", line.sequence));

    let resolved = resolve_taxes(&line.tax_components, registration);
    let quantity = line.quantity;
    let base = line
        .unit_price
        .checked_mul(quantity)
        .and_then(|gross| gross.checked_mul(Percent::new(line.discount_percent).remaining_fraction()))
        .ok_or_else(overflow)?;

    let sales_tax = resolved.sales_tax.compute(base, quantity).ok_or_else(overflow)?;
    let extra_tax = resolved.extra_tax.compute(base, quantity).ok_or_else(overflow)?;
    let further_tax = resolved.further_tax.compute(base, quantity).ok_or_else(overflow)?;
    let excise_duty = resolved.excise_duty.compute(base, quantity).ok_or_else(overflow)?;
    let withholding_tax = resolved.withholding_tax.compute(base, quantity).ok_or_else(overflow)?;

    let total = [sales_tax, extra_tax, further_tax, excise_duty, withholding_tax]
        .into_iter()
        .try_fold(base, Decimal::checked_add)
        .ok_or_else(overflow)?;

    Ok(LineCalculation {
        sequence: line.sequence,
        base,
        sales_tax,
        extra_tax,
        further_tax,
        excise_duty,
        withholding_tax,
        total,
        resolved,
    })
}

fn out_of_range(field: String) -> ValidationError {
    ValidationError::Invalid {
        field,
        reason: "out of range".to_string(),
    }
}

fn sum_saturating(values: &[Decimal]) -> Decimal {
    values.iter().fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v))
}

/// Aggregate figures across all reported lines, unrounded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvoiceTotals {
    pub lines: Vec<LineCalculation>,
    pub base: Decimal,
    pub sales_tax: Decimal,
    pub extra_tax: Decimal,
    pub further_tax: Decimal,
    pub excise_duty: Decimal,
    pub withholding_tax: Decimal,
    pub grand_total: Decimal,
}

impl InvoiceTotals {
    /// Sum of every tax head across all lines.
    pub fn tax_total(&self) -> Decimal {
        sum_saturating(&[self.sales_tax, self.extra_tax, self.further_tax, self.excise_duty, self.withholding_tax])
    }

    /// Grand total plus a reported service fee.
    ///
    /// ## Errors
    /// `ValidationError::Invalid` if the sum overflows.
    pub fn total_with_fee(&self, service_fee: Decimal) -> Result<Decimal, ValidationError> {
        self.grand_total
            .checked_add(service_fee)
            .ok_or_else(|| out_of_range("invoice total".to_string()))
    }

    fn add(&mut self, calc: &LineCalculation) -> Option<()> {
        self.base = self.base.checked_add(calc.base)?;
        self.sales_tax = self.sales_tax.checked_add(calc.sales_tax)?;
        self.extra_tax = self.extra_tax.checked_add(calc.extra_tax)?;
        self.further_tax = self.further_tax.checked_add(calc.further_tax)?;
        self.excise_duty = self.excise_duty.checked_add(calc.excise_duty)?;
        self.withholding_tax = self.withholding_tax.checked_add(calc.withholding_tax)?;
        self.grand_total = self.grand_total.checked_add(calc.total)?;
        Some(())
    }
}

/// Computes every line and sums the heads.
///
/// ## Errors
/// `ValidationError::NoLines` if `lines` is empty, `ValidationError::Invalid`
/// if a line or an aggregate overflows.
pub fn calculate_totals<'a, I>(lines: I, registration: RegistrationType) -> Result<InvoiceTotals, ValidationError>
where
    I: IntoIterator<Item = &'a InvoiceLine>,
{
    let mut totals = InvoiceTotals::default();

    for line in lines {
        let calc = compute_line(line, registration)?;
        totals
            .add(&calc)
            .ok_or_else(|| out_of_range("invoice total".to_string()))?;
        totals.lines.push(calc);
    }

    if totals.lines.is_empty() {
        return Err(ValidationError::NoLines);
    }
    Ok(totals)
}

/// Outcome of comparing calculated totals with the host's stored totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub calculated_tax: Decimal,
    pub calculated_total: Decimal,
    pub host_tax: Decimal,
    pub host_total: Decimal,
}

impl Reconciliation {
    pub fn tax_matches(&self) -> bool {
        self.calculated_tax == self.host_tax
    }

    pub fn total_matches(&self) -> bool {
        self.calculated_total == self.host_total
    }

    pub fn is_consistent(&self) -> bool {
        self.tax_matches() && self.total_matches()
    }
}

/// Advisory cross-check against the host record. Never blocks submission.
///
/// The service fee is part of the host's total on POS orders, so it is
/// added to the calculated grand total before comparing.
pub fn reconcile(
    ref_no: &str,
    totals: &InvoiceTotals,
    host_tax_total: Decimal,
    host_grand_total: Decimal,
    service_fee: Decimal,
) -> Reconciliation {
    let result = Reconciliation {
        calculated_tax: round_money(totals.tax_total()),
        calculated_total: round_money(totals.grand_total.saturating_add(service_fee)),
        host_tax: round_money(host_tax_total),
        host_total: round_money(host_grand_total),
    };

    if !result.is_consistent() {
        warn!(
            ref_no = %ref_no,
            calculated_tax = %result.calculated_tax,
            host_tax = %result.host_tax,
            calculated_total = %result.calculated_total,
            host_total = %result.host_total,
            "FBR tax calculation mismatch"
        );
    }

    result
}

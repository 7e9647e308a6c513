//! # Tax Component Resolver
//!
//! Picks the applicable value for each FBR tax head on a line.
//!
//! ## Resolution Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Line components (in attachment order)                                  │
//! │    [sales 18%] [further 4%] [sales 17%] [excise Rs 5/unit]              │
//! │         │           │            │              │                       │
//! │         ▼           ▼            ✗              ▼                       │
//! │  First match per kind wins. Later duplicates are ignored.               │
//! │                                                                         │
//! │  Further tax is dropped unless the buyer is Unregistered.               │
//! │                                                                         │
//! │  Result: ResolvedTaxes { sales 18%, further 4%, excise 5 fixed, ... }   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::money::Percent;
use crate::types::{InvoiceLine, RegistrationType, TaxComponent, TaxKind};

/// A resolved value for one tax head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedTax {
    /// Percentage, or per-unit currency amount when `is_fixed`.
    pub amount: Decimal,
    pub is_fixed: bool,
}

impl ResolvedTax {
    fn from_component(component: &TaxComponent) -> Self {
        ResolvedTax {
            amount: component.amount,
            is_fixed: component.amount_is_fixed,
        }
    }

    /// True if the head contributes nothing.
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Computes the tax for a line base and quantity, unrounded.
    ///
    /// Fixed amounts apply per unit; percentages apply to the base. `None`
    /// on overflow.
    pub fn compute(&self, base: Decimal, quantity: Decimal) -> Option<Decimal> {
        if self.is_fixed {
            self.amount.checked_mul(quantity)
        } else {
            Percent::new(self.amount).of(base)
        }
    }
}

/// The value selected for every tax head on one line. Absent heads are zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedTaxes {
    pub sales_tax: ResolvedTax,
    pub extra_tax: ResolvedTax,
    pub further_tax: ResolvedTax,
    pub excise_duty: ResolvedTax,
    pub withholding_tax: ResolvedTax,
    /// Authority rate description carried by the sales-tax component.
    pub sales_tax_label: Option<String>,
}

impl ResolvedTaxes {
    /// The resolved value for a given head.
    pub fn get(&self, kind: TaxKind) -> ResolvedTax {
        match kind {
            TaxKind::SalesTax => self.sales_tax,
            TaxKind::ExtraTax => self.extra_tax,
            TaxKind::FurtherTax => self.further_tax,
            TaxKind::ExciseDuty => self.excise_duty,
            TaxKind::WithholdingTax => self.withholding_tax,
        }
    }

    fn slot(&mut self, kind: TaxKind) -> &mut ResolvedTax {
        match kind {
            TaxKind::SalesTax => &mut self.sales_tax,
            TaxKind::ExtraTax => &mut self.extra_tax,
            TaxKind::FurtherTax => &mut self.further_tax,
            TaxKind::ExciseDuty => &mut self.excise_duty,
            TaxKind::WithholdingTax => &mut self.withholding_tax,
        }
    }

    /// True if excise is a per-unit amount.
    pub fn excise_is_fixed(&self) -> bool {
        self.excise_duty.is_fixed
    }

    /// The `rate` string FBR expects on each item.
    ///
    /// Uses the linked authority label, else the sales-tax percentage
    /// (`"18%"`), else `"0%"`.
    pub fn rate_label(&self) -> String {
        if let Some(label) = self.sales_tax_label.as_deref().filter(|l| !l.trim().is_empty()) {
            return label.to_string();
        }
        if self.sales_tax.is_fixed {
            return "0%".to_string();
        }
        Percent::new(self.sales_tax.amount).to_string()
    }
}

/// Selects the first component of each kind, honoring buyer registration.
pub fn resolve_taxes(components: &[TaxComponent], registration: RegistrationType) -> ResolvedTaxes {
    let mut resolved = ResolvedTaxes::default();
    let mut seen: Vec<TaxKind> = Vec::with_capacity(TaxKind::ALL.len());

    for component in components {
        if seen.contains(&component.kind) {
            continue;
        }
        seen.push(component.kind);

        if component.kind == TaxKind::FurtherTax && registration != RegistrationType::Unregistered {
            continue;
        }

        *resolved.slot(component.kind) = ResolvedTax::from_component(component);
        if component.kind == TaxKind::SalesTax {
            resolved.sales_tax_label = component.rate_label.clone();
        }
    }

    resolved
}

/// Attaches a default further-tax component for an unregistered buyer.
///
/// Returns true if a component was added. Lines already carrying a
/// further-tax component are left alone.
pub fn inject_further_tax(line: &mut InvoiceLine, registration: RegistrationType, default_percent: Decimal) -> bool {
    if registration != RegistrationType::Unregistered || default_percent.is_zero() {
        return false;
    }
    if line.has_tax(TaxKind::FurtherTax) {
        return false;
    }
    line.tax_components
        .push(TaxComponent::percent(TaxKind::FurtherTax, default_percent));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_first_match_wins() {
        let components = vec![
            TaxComponent::percent(TaxKind::SalesTax, dec!(18)),
            TaxComponent::percent(TaxKind::SalesTax, dec!(17)),
        ];
        let resolved = resolve_taxes(&components, RegistrationType::Registered);
        assert_eq!(resolved.sales_tax.amount, dec!(18));
    }

    #[test]
    fn test_absent_heads_are_zero() {
        let resolved = resolve_taxes(&[], RegistrationType::Registered);
        for kind in TaxKind::ALL {
            assert!(resolved.get(kind).is_zero());
        }
        assert_eq!(resolved.rate_label(), "0%");
    }

    #[test]
    fn test_further_tax_only_for_unregistered() {
        let components = vec![
            TaxComponent::percent(TaxKind::SalesTax, dec!(18)),
            TaxComponent::percent(TaxKind::FurtherTax, dec!(4)),
        ];

        let registered = resolve_taxes(&components, RegistrationType::Registered);
        assert!(registered.further_tax.is_zero());

        let unregistered = resolve_taxes(&components, RegistrationType::Unregistered);
        assert_eq!(unregistered.further_tax.amount, dec!(4));
    }

    #[test]
    fn test_excise_fixed_and_percent() {
        let fixed = ResolvedTax { amount: dec!(5), is_fixed: true };
        assert_eq!(fixed.compute(dec!(1000), dec!(3)), Some(dec!(15)));

        let percent = ResolvedTax { amount: dec!(10), is_fixed: false };
        assert_eq!(percent.compute(dec!(1000), dec!(3)), Some(dec!(100)));
        assert_eq!(fixed.compute(dec!(1000), Decimal::MAX), None);

        let resolved = resolve_taxes(
            &[TaxComponent::fixed(TaxKind::ExciseDuty, dec!(5))],
            RegistrationType::Registered,
        );
        assert!(resolved.excise_is_fixed());
    }

    #[test]
    fn test_rate_label() {
        let plain = resolve_taxes(
            &[TaxComponent::percent(TaxKind::SalesTax, dec!(18.00))],
            RegistrationType::Registered,
        );
        assert_eq!(plain.rate_label(), "18%");

        let labelled = resolve_taxes(
            &[TaxComponent::percent(TaxKind::SalesTax, dec!(0)).with_rate_label("Exempt")],
            RegistrationType::Registered,
        );
        assert_eq!(labelled.rate_label(), "Exempt");
    }

    #[test]
    fn test_inject_further_tax() {
        let mut line = InvoiceLine::new(1, "P1", dec!(100), dec!(1));

        assert!(!inject_further_tax(&mut line, RegistrationType::Registered, dec!(4)));
        assert!(line.tax_components.is_empty());

        assert!(inject_further_tax(&mut line, RegistrationType::Unregistered, dec!(4)));
        assert!(line.has_tax(TaxKind::FurtherTax));

        // Already present: no second component.
        assert!(!inject_further_tax(&mut line, RegistrationType::Unregistered, dec!(4)));
        assert_eq!(line.tax_components.len(), 1);
    }
}

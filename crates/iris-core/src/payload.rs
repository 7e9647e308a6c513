//! # Payload Builder
//!
//! Maps a record and its calculated figures onto the FBR IRIS
//! `postinvoicedata` JSON schema.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InvoiceRecord ──► validate ──► drop fee lines (POS)                    │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                         inject further tax (policy)                     │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                  calculate_totals ──► reconcile (warn only)             │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │  InvoicePayload { header fallbacks, items[1..n], scenarioId }           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fallbacks (first non-empty wins)
//! | Field                  | Source                 | Fallback             |
//! |------------------------|------------------------|----------------------|
//! | buyerNTNCNIC           | buyer tax id           | `""`                 |
//! | buyerBusinessName      | buyer name             | `Walking Customer`   |
//! | buyerProvince          | buyer region           | seller province      |
//! | buyerAddress           | FBR address, street    | `Unknown`            |
//! | paymentMode            | payment method / term  | `Cash`               |
//! | productDescription     | product name           | `Unknown Item`       |
//! | uoM                    | product FBR UOM        | `Pcs`                |
//!
//! Every monetary figure is rounded half-up to 2 places here and nowhere else.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreResult;
use crate::money::round_money;
use crate::policy::ChannelPolicy;
use crate::scenario::resolve_scenario;
use crate::tax::inject_further_tax;
use crate::totals::{calculate_totals, reconcile, LineCalculation};
use crate::types::{Channel, CompanyFbrConfig, InvoiceLine, InvoiceRecord, RegistrationType};
use crate::validation::validate_for_submission;

/// Constant `invoiceType` for every submission.
pub const INVOICE_TYPE_SALE: &str = "Sale Invoice";

const DEFAULT_BUYER_NAME: &str = "Walking Customer";
const DEFAULT_ADDRESS: &str = "Unknown";
const DEFAULT_PAYMENT_MODE: &str = "Cash";
const DEFAULT_ITEM_DESCRIPTION: &str = "Unknown Item";
const DEFAULT_UOM: &str = "Pcs";
/// `sroItemSerialNo` on invoices whose product names no SRO item.
const DEFAULT_INVOICE_SRO_ITEM: &str = "other";
const MASK: &str = "****";

// =============================================================================
// Wire Types
// =============================================================================

/// Request body for the FBR invoice submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub invoice_type: String,
    pub invoice_date: String,
    pub invoice_ref_no: String,
    pub seller_business_name: String,
    pub seller_province: String,
    pub seller_address: String,
    #[serde(rename = "sellerNTNCNIC")]
    pub seller_ntn_cnic: String,
    #[serde(rename = "buyerNTNCNIC")]
    pub buyer_ntn_cnic: String,
    pub buyer_business_name: String,
    pub buyer_province: String,
    pub buyer_address: String,
    pub buyer_registration_type: RegistrationType,
    pub payment_mode: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_invoice_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_sales_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pos_server_fee: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    pub items: Vec<ItemPayload>,
}

/// One entry in `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    #[serde(rename = "itemSNo")]
    pub item_sno: u32,
    pub hs_code: String,
    pub product_description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub rate: String,
    #[serde(rename = "uoM")]
    pub uom: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_values: Decimal,
    #[serde(rename = "valueSalesExcludingST", with = "rust_decimal::serde::float")]
    pub value_sales_excluding_st: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub fixed_notified_value_or_retail_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sales_tax_applicable: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sales_tax_withheld_at_source: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub extra_tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub further_tax: Decimal,
    pub sro_schedule_no: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub fed_payable: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    pub sale_type: String,
    pub sro_item_serial_no: String,
}

impl InvoicePayload {
    /// Copy with both NTN/CNIC fields replaced by `****`, for logging.
    pub fn masked(&self) -> InvoicePayload {
        let mut copy = self.clone();
        copy.seller_ntn_cnic = MASK.to_string();
        copy.buyer_ntn_cnic = MASK.to_string();
        copy
    }

    /// Serializes to a JSON value for the transport.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds the submission payload for a record.
///
/// ## Errors
/// Fails with a validation error (no lines, missing date) before any figure
/// is computed, or when a figure overflows. Reconciliation mismatches only
/// log.
pub fn build_payload(
    record: &InvoiceRecord,
    company: &CompanyFbrConfig,
    policy: &ChannelPolicy,
) -> CoreResult<InvoicePayload> {
    validate_for_submission(record, policy)?;

    let registration = record.buyer.effective_registration();
    let lines = reportable_lines(record, policy, registration);
    let totals = calculate_totals(&lines, registration)?;

    let service_fee = policy.reported_service_fee();
    let invoice_total = totals.total_with_fee(service_fee)?;
    reconcile(
        &record.ref_no,
        &totals,
        record.host_tax_total,
        record.host_grand_total,
        service_fee,
    );

    let items = lines
        .iter()
        .zip(totals.lines.iter())
        .enumerate()
        .map(|(index, (line, calc))| build_item(index as u32 + 1, record.channel, line, calc))
        .collect();

    let declared_scenario = lines.first().and_then(|l| l.scenario_id.as_deref());
    let scenario_id = resolve_scenario(record.channel, declared_scenario, record.buyer.has_tax_id());

    let payload = InvoicePayload {
        invoice_type: INVOICE_TYPE_SALE.to_string(),
        invoice_date: format_date(record.date),
        invoice_ref_no: record.ref_no.clone(),
        seller_business_name: company.seller_business_name.clone(),
        seller_province: company.seller_province.clone(),
        seller_address: company.seller_address.clone(),
        seller_ntn_cnic: company.seller_ntn.clone(),
        buyer_ntn_cnic: record.buyer.tax_id().unwrap_or_default().to_string(),
        buyer_business_name: first_non_empty(&[record.buyer.name.as_deref()])
            .unwrap_or(DEFAULT_BUYER_NAME)
            .to_string(),
        buyer_province: first_non_empty(&[record.buyer.province.as_deref()])
            .unwrap_or(company.seller_province.as_str())
            .to_string(),
        buyer_address: first_non_empty(&[record.buyer.fbr_address.as_deref(), record.buyer.street.as_deref()])
            .unwrap_or(DEFAULT_ADDRESS)
            .to_string(),
        buyer_registration_type: registration,
        payment_mode: first_non_empty(&[record.payment_mode.as_deref()])
            .unwrap_or(DEFAULT_PAYMENT_MODE)
            .to_string(),
        total_invoice_amount: round_money(invoice_total),
        total_sales_tax: round_money(totals.sales_tax),
        pos_server_fee: round_money(service_fee),
        scenario_id,
        items,
    };

    if let Ok(json) = serde_json::to_string(&payload.masked()) {
        debug!(ref_no = %record.ref_no, channel = %record.channel, payload = %json, "FBR payload assembled");
    }

    Ok(payload)
}

/// Lines that become payload items, with further tax injected when the
/// channel policy asks for it.
fn reportable_lines(record: &InvoiceRecord, policy: &ChannelPolicy, registration: RegistrationType) -> Vec<InvoiceLine> {
    record
        .lines
        .iter()
        .filter(|line| !policy.is_service_fee_line(line))
        .cloned()
        .map(|mut line| {
            if policy.inject_further_tax {
                inject_further_tax(&mut line, registration, policy.default_further_tax_percent);
            }
            line
        })
        .collect()
}

fn build_item(item_sno: u32, channel: Channel, line: &InvoiceLine, calc: &LineCalculation) -> ItemPayload {
    let base = round_money(calc.base);
    ItemPayload {
        item_sno,
        hs_code: line.hs_code.clone().unwrap_or_default(),
        product_description: first_non_empty(&[line.product_name.as_deref()])
            .unwrap_or(DEFAULT_ITEM_DESCRIPTION)
            .to_string(),
        unit_price: round_money(line.unit_price),
        rate: calc.resolved.rate_label(),
        uom: first_non_empty(&[line.unit_of_measure.as_deref()])
            .unwrap_or(DEFAULT_UOM)
            .to_string(),
        quantity: line.quantity,
        total_values: round_money(calc.total),
        value_sales_excluding_st: base,
        fixed_notified_value_or_retail_price: base,
        sales_tax_applicable: round_money(calc.sales_tax),
        sales_tax_withheld_at_source: round_money(calc.withholding_tax),
        extra_tax: round_money(calc.extra_tax),
        further_tax: round_money(calc.further_tax),
        sro_schedule_no: line.sro_schedule_ref.clone().unwrap_or_default(),
        fed_payable: round_money(calc.excise_duty),
        discount: round_money(line.discount_percent),
        sale_type: line.sale_type_ref.clone().unwrap_or_default(),
        sro_item_serial_no: sro_item_serial_no(channel, line),
    }
}

/// Invoices fall back to `other`; POS orders send an empty string.
fn sro_item_serial_no(channel: Channel, line: &InvoiceLine) -> String {
    match (first_non_empty(&[line.sro_item_ref.as_deref()]), channel) {
        (Some(item), _) => item.to_string(),
        (None, Channel::Invoice) => DEFAULT_INVOICE_SRO_ITEM.to_string(),
        (None, Channel::PosOrder) => String::new(),
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

//! # Domain Types
//!
//! Core domain types used throughout the FBR IRIS connector.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  InvoiceRecord  │   │   InvoiceLine   │   │  TaxComponent   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  channel + id   │──►│  sequence       │──►│  kind           │       │
//! │  │  ref_no, date   │   │  unit_price     │   │  amount         │       │
//! │  │  buyer          │   │  quantity       │   │  amount_is_fixed│       │
//! │  │  status fields  │   │  discount %     │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ReferenceOption  │   │SubmissionStatus │   │CompanyFbrConfig │       │
//! │  │  code + type    │   │  Draft          │   │  endpoint/token │       │
//! │  │  last_updated   │   │  Posted         │   │  seller identity│       │
//! │  └─────────────────┘   │  Failed         │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Channels, One Shape
//! Ledger invoices and POS orders carry the same fields. `Channel` records
//! which one a record came from so the pipeline can apply channel policy
//! (service fee, further-tax injection) without a second implementation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::money::Percent;

// =============================================================================
// Channel
// =============================================================================

/// Where a record originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Ledger (accounting) invoice.
    Invoice,
    /// Point-of-sale order.
    PosOrder,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Invoice => write!(f, "invoice"),
            Channel::PosOrder => write!(f, "pos_order"),
        }
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "invoice" | "move" => Ok(Channel::Invoice),
            "pos_order" | "pos" | "order" => Ok(Channel::PosOrder),
            other => Err(CoreError::configuration(format!(
                "Unknown channel: '{}'. Valid options: invoice, pos_order",
                other
            ))),
        }
    }
}

// =============================================================================
// Submission Status
// =============================================================================

/// FBR submission state persisted on each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Not yet accepted by FBR.
    #[default]
    Draft,
    /// Accepted; `authority_invoice_number` is set.
    Posted,
    /// Last submission exhausted its retries.
    Failed,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Draft => write!(f, "draft"),
            SubmissionStatus::Posted => write!(f, "posted"),
            SubmissionStatus::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Registration Type
// =============================================================================

/// Buyer's sales-tax registration status as FBR classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
pub enum RegistrationType {
    Registered,
    Unregistered,
}

impl RegistrationType {
    /// Parses the authority's `REGISTRATION_TYPE` value, case-insensitively.
    pub fn from_authority(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "registered" => Some(RegistrationType::Registered),
            "unregistered" => Some(RegistrationType::Unregistered),
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationType::Registered => write!(f, "Registered"),
            RegistrationType::Unregistered => write!(f, "Unregistered"),
        }
    }
}

// =============================================================================
// Tax Components
// =============================================================================

/// The FBR tax heads a line can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxKind {
    SalesTax,
    ExtraTax,
    FurtherTax,
    /// Federal excise duty (`fedPayable` on the wire).
    ExciseDuty,
    WithholdingTax,
}

impl TaxKind {
    /// All kinds, in payload field order.
    pub const ALL: [TaxKind; 5] = [
        TaxKind::SalesTax,
        TaxKind::ExtraTax,
        TaxKind::FurtherTax,
        TaxKind::ExciseDuty,
        TaxKind::WithholdingTax,
    ];
}

/// One configured tax applied to a line.
///
/// `amount_is_fixed` means `amount` is a currency value per unit rather
/// than a percentage of the line base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxComponent {
    pub kind: TaxKind,
    pub amount: Decimal,
    #[serde(default)]
    pub amount_is_fixed: bool,
    /// Authority rate description (e.g. `"18%"`) linked to this tax, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_label: Option<String>,
}

impl TaxComponent {
    /// A percentage component.
    pub fn percent(kind: TaxKind, rate: Decimal) -> Self {
        TaxComponent {
            kind,
            amount: rate,
            amount_is_fixed: false,
            rate_label: None,
        }
    }

    /// A fixed per-unit component.
    pub fn fixed(kind: TaxKind, per_unit: Decimal) -> Self {
        TaxComponent {
            kind,
            amount: per_unit,
            amount_is_fixed: true,
            rate_label: None,
        }
    }

    /// Attaches the authority rate description.
    pub fn with_rate_label(mut self, label: impl Into<String>) -> Self {
        self.rate_label = Some(label.into());
        self
    }

    /// The amount read as a percentage.
    #[inline]
    pub fn rate(&self) -> Percent {
        Percent::new(self.amount)
    }
}

// =============================================================================
// Invoice Line
// =============================================================================

/// A line item on an invoice or POS order.
///
/// Owned by its parent record; never edited after the parent is Posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// 1-based position within the parent record.
    pub sequence: u32,
    pub product_ref: String,
    pub product_name: Option<String>,
    /// Internal product code; `SERVICE_FEE` marks the POS fee product.
    pub product_code: Option<String>,
    pub hs_code: Option<String>,
    pub unit_of_measure: Option<String>,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub tax_components: Vec<TaxComponent>,
    pub sro_schedule_ref: Option<String>,
    pub sro_item_ref: Option<String>,
    pub sale_type_ref: Option<String>,
    /// FBR scenario declared on the product (`SN001`...`SN028`).
    pub scenario_id: Option<String>,
}

impl InvoiceLine {
    /// A bare line with no product metadata, for quick construction.
    pub fn new(sequence: u32, product_ref: impl Into<String>, unit_price: Decimal, quantity: Decimal) -> Self {
        InvoiceLine {
            sequence,
            product_ref: product_ref.into(),
            product_name: None,
            product_code: None,
            hs_code: None,
            unit_of_measure: None,
            unit_price,
            quantity,
            discount_percent: Decimal::ZERO,
            tax_components: Vec::new(),
            sro_schedule_ref: None,
            sro_item_ref: None,
            sale_type_ref: None,
            scenario_id: None,
        }
    }

    /// Adds a tax component.
    pub fn with_tax(mut self, component: TaxComponent) -> Self {
        self.tax_components.push(component);
        self
    }

    /// Sets the discount percentage.
    pub fn with_discount(mut self, discount_percent: Decimal) -> Self {
        self.discount_percent = discount_percent;
        self
    }

    /// True if a component of `kind` is attached.
    pub fn has_tax(&self, kind: TaxKind) -> bool {
        self.tax_components.iter().any(|c| c.kind == kind)
    }
}

// =============================================================================
// Buyer
// =============================================================================

/// Buyer identity snapshot taken from the host's partner record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    /// NTN or CNIC.
    pub tax_id: Option<String>,
    pub name: Option<String>,
    /// Region / state name.
    pub province: Option<String>,
    /// Address registered with FBR.
    pub fbr_address: Option<String>,
    pub street: Option<String>,
    /// Registration type if it has been checked against FBR.
    pub registration_type: Option<RegistrationType>,
}

impl Buyer {
    /// Tax id, ignoring blank strings.
    pub fn tax_id(&self) -> Option<&str> {
        self.tax_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// True if the buyer has a usable tax id.
    pub fn has_tax_id(&self) -> bool {
        self.tax_id().is_some()
    }

    /// Stored registration type, else derived from tax-id presence.
    pub fn effective_registration(&self) -> RegistrationType {
        match self.registration_type {
            Some(kind) => kind,
            None if self.has_tax_id() => RegistrationType::Registered,
            None => RegistrationType::Unregistered,
        }
    }
}

// =============================================================================
// Invoice Record
// =============================================================================

/// A ledger invoice or POS order as the pipeline sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub channel: Channel,
    pub id: String,
    /// Host reference number (invoice name / order name).
    pub ref_no: String,
    pub date: Option<NaiveDate>,
    pub buyer: Buyer,
    /// Recorded payment method or payment term name.
    pub payment_mode: Option<String>,
    pub lines: Vec<InvoiceLine>,
    /// Tax total as stored by the host (already rounded).
    pub host_tax_total: Decimal,
    /// Grand total as stored by the host (already rounded).
    pub host_grand_total: Decimal,
    pub submission_status: SubmissionStatus,
    pub authority_invoice_number: Option<String>,
    pub last_error_message: Option<String>,
    pub last_raw_response: Option<String>,
}

impl InvoiceRecord {
    /// Creates an empty Draft record.
    pub fn new(channel: Channel, id: impl Into<String>, ref_no: impl Into<String>) -> Self {
        InvoiceRecord {
            channel,
            id: id.into(),
            ref_no: ref_no.into(),
            date: None,
            buyer: Buyer::default(),
            payment_mode: None,
            lines: Vec::new(),
            host_tax_total: Decimal::ZERO,
            host_grand_total: Decimal::ZERO,
            submission_status: SubmissionStatus::Draft,
            authority_invoice_number: None,
            last_error_message: None,
            last_raw_response: None,
        }
    }

    /// True once FBR has accepted the record.
    pub fn is_posted(&self) -> bool {
        self.submission_status == SubmissionStatus::Posted
    }
}

/// Partial update of a record's submission fields.
///
/// `None` leaves a field untouched; `Some("")` clears a text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub submission_status: Option<SubmissionStatus>,
    pub authority_invoice_number: Option<String>,
    pub last_error_message: Option<String>,
    pub last_raw_response: Option<String>,
    pub buyer_registration_type: Option<RegistrationType>,
}

impl RecordPatch {
    /// Fields written when FBR accepts the invoice.
    pub fn posted(invoice_number: impl Into<String>, raw_response: impl Into<String>) -> Self {
        RecordPatch {
            submission_status: Some(SubmissionStatus::Posted),
            authority_invoice_number: Some(invoice_number.into()),
            last_error_message: Some(String::new()),
            last_raw_response: Some(raw_response.into()),
            buyer_registration_type: None,
        }
    }

    /// Fields written when a submission is given up on.
    pub fn failed(error_message: impl Into<String>, raw_response: impl Into<String>) -> Self {
        RecordPatch {
            submission_status: Some(SubmissionStatus::Failed),
            authority_invoice_number: None,
            last_error_message: Some(error_message.into()),
            last_raw_response: Some(raw_response.into()),
            buyer_registration_type: None,
        }
    }

    /// Applies the patch to an in-memory record.
    pub fn apply_to(&self, record: &mut InvoiceRecord) {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                *target = if v.is_empty() { None } else { Some(v.clone()) };
            }
        }

        if let Some(status) = self.submission_status {
            record.submission_status = status;
        }
        set(&mut record.authority_invoice_number, &self.authority_invoice_number);
        set(&mut record.last_error_message, &self.last_error_message);
        set(&mut record.last_raw_response, &self.last_raw_response);
        if let Some(kind) = self.buyer_registration_type {
            record.buyer.registration_type = Some(kind);
        }
    }
}

// =============================================================================
// Reference Options
// =============================================================================

/// Categories of authority lookup data mirrored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Province,
    DocType,
    HsCode,
    Uom,
    SaleType,
    Rate,
    SroSchedule,
    SroItem,
    SroItemGeneral,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptionType::Province => "province",
            OptionType::DocType => "doc_type",
            OptionType::HsCode => "hs_code",
            OptionType::Uom => "uom",
            OptionType::SaleType => "sale_type",
            OptionType::Rate => "rate",
            OptionType::SroSchedule => "sro_schedule",
            OptionType::SroItem => "sro_item",
            OptionType::SroItemGeneral => "sro_item_general",
        };
        f.write_str(s)
    }
}

impl FromStr for OptionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "province" => Ok(OptionType::Province),
            "doc_type" | "doctype" => Ok(OptionType::DocType),
            "hs_code" | "hscode" => Ok(OptionType::HsCode),
            "uom" => Ok(OptionType::Uom),
            "sale_type" => Ok(OptionType::SaleType),
            "rate" => Ok(OptionType::Rate),
            "sro_schedule" | "sro" => Ok(OptionType::SroSchedule),
            "sro_item" => Ok(OptionType::SroItem),
            "sro_item_general" => Ok(OptionType::SroItemGeneral),
            other => Err(CoreError::configuration(format!("Unknown option type: '{}'", other))),
        }
    }
}

/// One cached authority lookup entry. `code` is unique per `option_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOption {
    pub code: String,
    pub display_name: String,
    pub option_type: OptionType,
    /// Parent SRO schedule code, only for `SroItem`.
    pub parent_sro_ref: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl ReferenceOption {
    /// Label shown in pickers. HS codes read `"<code> - <description>"`.
    pub fn label(&self) -> String {
        match self.option_type {
            OptionType::HsCode if !self.code.is_empty() => {
                let name: String = self.display_name.chars().take(70).collect();
                format!("{} - {}", self.code, name)
            }
            _ => self.display_name.clone(),
        }
    }
}

// =============================================================================
// Seller Configuration
// =============================================================================

/// Per-seller FBR integration settings. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFbrConfig {
    #[serde(default)]
    pub integration_enabled: bool,
    /// Invoice submission endpoint.
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default)]
    pub seller_business_name: String,
    #[serde(default = "default_seller_province")]
    pub seller_province: String,
    #[serde(default)]
    pub seller_address: String,
    #[serde(default)]
    pub seller_ntn: String,
    #[serde(default = "default_origination_supplier")]
    pub default_origination_supplier: String,
}

fn default_seller_province() -> String {
    "Punjab".to_string()
}

fn default_origination_supplier() -> String {
    "1".to_string()
}

impl Default for CompanyFbrConfig {
    fn default() -> Self {
        CompanyFbrConfig {
            integration_enabled: false,
            api_base_url: String::new(),
            bearer_token: String::new(),
            seller_business_name: String::new(),
            seller_province: default_seller_province(),
            seller_address: String::new(),
            seller_ntn: String::new(),
            default_origination_supplier: default_origination_supplier(),
        }
    }
}

impl CompanyFbrConfig {
    /// Fails fast, before any network call, if submission cannot proceed.
    pub fn ensure_ready(&self) -> Result<(), CoreError> {
        if !self.integration_enabled {
            return Err(CoreError::configuration(
                "FBR integration is not enabled for this company",
            ));
        }
        if self.api_base_url.trim().is_empty() || self.bearer_token.trim().is_empty() {
            return Err(CoreError::configuration(
                "FBR submission URL or bearer token is missing",
            ));
        }
        Ok(())
    }
}

//! # Invoice Repository
//!
//! SQLite-backed [`InvoiceStore`] for ledger invoices and POS orders.
//!
//! ## Tables
//! ```text
//! invoices (channel, id)  1 ──── * invoice_lines (channel, invoice_id, sequence)
//!                                      └── tax_components: JSON array
//! ```
//!
//! Decimals are stored as TEXT and parsed back with `Decimal::from_str`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use iris_core::{
    Buyer, Channel, InvoiceLine, InvoiceRecord, RecordPatch, RegistrationType, SubmissionStatus, TaxComponent,
};

use crate::error::{DbError, DbResult};
use crate::store::{InvoiceFilter, InvoiceStore};

/// Repository for invoice/order records.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    async fn load_lines(&self, channel: Channel, id: &str) -> DbResult<Vec<InvoiceLine>> {
        let rows: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT sequence, product_ref, product_name, product_code, hs_code,
                   unit_of_measure, unit_price, quantity, discount_percent,
                   tax_components, sro_schedule_ref, sro_item_ref, sale_type_ref,
                   scenario_id
            FROM invoice_lines
            WHERE channel = ?1 AND invoice_id = ?2
            ORDER BY sequence ASC
            "#,
        )
        .bind(channel)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LineRow::into_line).collect()
    }

    async fn hydrate(&self, row: InvoiceRow) -> DbResult<InvoiceRecord> {
        let lines = self.load_lines(row.channel, &row.id).await?;
        row.into_record(lines)
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    async fn find_by_id(&self, channel: Channel, id: &str) -> DbResult<Option<InvoiceRecord>> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE channel = ?1 AND id = ?2"
        ))
        .bind(channel)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn update_fields(&self, channel: Channel, id: &str, patch: &RecordPatch) -> DbResult<()> {
        debug!(
            channel = %channel,
            id = %id,
            status = ?patch.submission_status,
            "Updating submission fields"
        );

        let mut tx = self.pool.begin().await?;

        // NULL parameter = leave column alone; '' = clear it.
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                submission_status = COALESCE(?1, submission_status),
                authority_invoice_number = CASE WHEN ?2 IS NULL THEN authority_invoice_number ELSE NULLIF(?2, '') END,
                last_error_message = CASE WHEN ?3 IS NULL THEN last_error_message ELSE NULLIF(?3, '') END,
                last_raw_response = CASE WHEN ?4 IS NULL THEN last_raw_response ELSE NULLIF(?4, '') END,
                buyer_registration_type = COALESCE(?5, buyer_registration_type),
                updated_at = ?6
            WHERE channel = ?7 AND id = ?8
            "#,
        )
        .bind(patch.submission_status)
        .bind(patch.authority_invoice_number.as_deref())
        .bind(patch.last_error_message.as_deref())
        .bind(patch.last_raw_response.as_deref())
        .bind(patch.buyer_registration_type)
        .bind(Utc::now())
        .bind(channel)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(channel.to_string(), id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, filter: &InvoiceFilter) -> DbResult<Vec<InvoiceRecord>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE 1 = 1"));

        if let Some(channel) = filter.channel {
            builder.push(" AND channel = ").push_bind(channel);
        }
        if let Some(status) = filter.status {
            builder.push(" AND submission_status = ").push_bind(status);
        }
        builder.push(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<InvoiceRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.hydrate(row).await?);
        }
        Ok(records)
    }

    async fn insert(&self, record: &InvoiceRecord) -> DbResult<()> {
        debug!(channel = %record.channel, id = %record.id, lines = record.lines.len(), "Inserting record");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                channel, id, ref_no, invoice_date,
                buyer_tax_id, buyer_name, buyer_province, buyer_fbr_address, buyer_street,
                buyer_registration_type, payment_mode, host_tax_total, host_grand_total,
                submission_status, authority_invoice_number, last_error_message, last_raw_response,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17,
                ?18, ?18
            )
            "#,
        )
        .bind(record.channel)
        .bind(&record.id)
        .bind(&record.ref_no)
        .bind(record.date)
        .bind(record.buyer.tax_id.as_deref())
        .bind(record.buyer.name.as_deref())
        .bind(record.buyer.province.as_deref())
        .bind(record.buyer.fbr_address.as_deref())
        .bind(record.buyer.street.as_deref())
        .bind(record.buyer.registration_type)
        .bind(record.payment_mode.as_deref())
        .bind(record.host_tax_total.to_string())
        .bind(record.host_grand_total.to_string())
        .bind(record.submission_status)
        .bind(record.authority_invoice_number.as_deref())
        .bind(record.last_error_message.as_deref())
        .bind(record.last_raw_response.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: format!("{}/{}", record.channel, record.id),
            },
            other => other,
        })?;

        for line in &record.lines {
            let components = serde_json::to_string(&line.tax_components)
                .map_err(|e| DbError::corrupt("tax_components", e))?;

            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    channel, invoice_id, sequence, product_ref, product_name, product_code,
                    hs_code, unit_of_measure, unit_price, quantity, discount_percent,
                    tax_components, sro_schedule_ref, sro_item_ref, sale_type_ref, scenario_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            )
            .bind(record.channel)
            .bind(&record.id)
            .bind(i64::from(line.sequence))
            .bind(&line.product_ref)
            .bind(line.product_name.as_deref())
            .bind(line.product_code.as_deref())
            .bind(line.hs_code.as_deref())
            .bind(line.unit_of_measure.as_deref())
            .bind(line.unit_price.to_string())
            .bind(line.quantity.to_string())
            .bind(line.discount_percent.to_string())
            .bind(components)
            .bind(line.sro_schedule_ref.as_deref())
            .bind(line.sro_item_ref.as_deref())
            .bind(line.sale_type_ref.as_deref())
            .bind(line.scenario_id.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

const INVOICE_COLUMNS: &str = "channel, id, ref_no, invoice_date, \
    buyer_tax_id, buyer_name, buyer_province, buyer_fbr_address, buyer_street, \
    buyer_registration_type, payment_mode, host_tax_total, host_grand_total, \
    submission_status, authority_invoice_number, last_error_message, last_raw_response";

#[derive(Debug, FromRow)]
struct InvoiceRow {
    channel: Channel,
    id: String,
    ref_no: String,
    invoice_date: Option<NaiveDate>,
    buyer_tax_id: Option<String>,
    buyer_name: Option<String>,
    buyer_province: Option<String>,
    buyer_fbr_address: Option<String>,
    buyer_street: Option<String>,
    buyer_registration_type: Option<RegistrationType>,
    payment_mode: Option<String>,
    host_tax_total: String,
    host_grand_total: String,
    submission_status: SubmissionStatus,
    authority_invoice_number: Option<String>,
    last_error_message: Option<String>,
    last_raw_response: Option<String>,
}

impl InvoiceRow {
    fn into_record(self, lines: Vec<InvoiceLine>) -> DbResult<InvoiceRecord> {
        Ok(InvoiceRecord {
            channel: self.channel,
            id: self.id,
            ref_no: self.ref_no,
            date: self.invoice_date,
            buyer: Buyer {
                tax_id: self.buyer_tax_id,
                name: self.buyer_name,
                province: self.buyer_province,
                fbr_address: self.buyer_fbr_address,
                street: self.buyer_street,
                registration_type: self.buyer_registration_type,
            },
            payment_mode: self.payment_mode,
            lines,
            host_tax_total: parse_decimal("host_tax_total", &self.host_tax_total)?,
            host_grand_total: parse_decimal("host_grand_total", &self.host_grand_total)?,
            submission_status: self.submission_status,
            authority_invoice_number: self.authority_invoice_number,
            last_error_message: self.last_error_message,
            last_raw_response: self.last_raw_response,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    sequence: i64,
    product_ref: String,
    product_name: Option<String>,
    product_code: Option<String>,
    hs_code: Option<String>,
    unit_of_measure: Option<String>,
    unit_price: String,
    quantity: String,
    discount_percent: String,
    tax_components: String,
    sro_schedule_ref: Option<String>,
    sro_item_ref: Option<String>,
    sale_type_ref: Option<String>,
    scenario_id: Option<String>,
}

impl LineRow {
    fn into_line(self) -> DbResult<InvoiceLine> {
        let tax_components: Vec<TaxComponent> =
            serde_json::from_str(&self.tax_components).map_err(|e| DbError::corrupt("tax_components", e))?;

        Ok(InvoiceLine {
            sequence: u32::try_from(self.sequence).map_err(|e| DbError::corrupt("sequence", e))?,
            product_ref: self.product_ref,
            product_name: self.product_name,
            product_code: self.product_code,
            hs_code: self.hs_code,
            unit_of_measure: self.unit_of_measure,
            unit_price: parse_decimal("unit_price", &self.unit_price)?,
            quantity: parse_decimal("quantity", &self.quantity)?,
            discount_percent: parse_decimal("discount_percent", &self.discount_percent)?,
            tax_components,
            sro_schedule_ref: self.sro_schedule_ref,
            sro_item_ref: self.sro_item_ref,
            sale_type_ref: self.sale_type_ref,
            scenario_id: self.scenario_id,
        })
    }
}

fn parse_decimal(column: &str, value: &str) -> DbResult<Decimal> {
    Decimal::from_str(value).map_err(|e| DbError::corrupt(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use iris_core::TaxKind;
    use rust_decimal_macros::dec;

    async fn setup() -> InvoiceRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().invoices()
    }

    fn sample(channel: Channel, id: &str) -> InvoiceRecord {
        let mut record = InvoiceRecord::new(channel, id, format!("REF/{id}"));
        record.date = NaiveDate::from_ymd_opt(2026, 2, 1);
        record.buyer.name = Some("Ali Textiles".to_string());
        record.buyer.tax_id = Some("3520212345678".to_string());
        record.host_tax_total = dec!(36.00);
        record.host_grand_total = dec!(236.00);
        record.lines.push(
            InvoiceLine::new(1, "P1", dec!(100), dec!(2))
                .with_tax(TaxComponent::percent(TaxKind::SalesTax, dec!(18)).with_rate_label("18%"))
                .with_tax(TaxComponent::fixed(TaxKind::ExciseDuty, dec!(5))),
        );
        record
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup().await;
        let record = sample(Channel::Invoice, "1");
        repo.insert(&record).await.unwrap();

        let loaded = repo.find_by_id(Channel::Invoice, "1").await.unwrap().unwrap();
        assert_eq!(loaded, record);

        // Same id on the other channel is a different record.
        assert!(repo.find_by_id(Channel::PosOrder, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let repo = setup().await;
        repo.insert(&sample(Channel::Invoice, "1")).await.unwrap();
        let err = repo.insert(&sample(Channel::Invoice, "1")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_fields() {
        let repo = setup().await;
        repo.insert(&sample(Channel::PosOrder, "5")).await.unwrap();

        repo.update_fields(Channel::PosOrder, "5", &RecordPatch::failed("timeout", ""))
            .await
            .unwrap();
        let failed = repo.find_by_id(Channel::PosOrder, "5").await.unwrap().unwrap();
        assert_eq!(failed.submission_status, SubmissionStatus::Failed);
        assert_eq!(failed.last_error_message.as_deref(), Some("timeout"));
        assert_eq!(failed.last_raw_response, None);

        repo.update_fields(
            Channel::PosOrder,
            "5",
            &RecordPatch::posted("7000007DI1747119701593", r#"{"invoiceNumber":"7000007DI1747119701593"}"#),
        )
        .await
        .unwrap();
        let posted = repo.find_by_id(Channel::PosOrder, "5").await.unwrap().unwrap();
        assert_eq!(posted.submission_status, SubmissionStatus::Posted);
        assert_eq!(posted.authority_invoice_number.as_deref(), Some("7000007DI1747119701593"));
        assert_eq!(posted.last_error_message, None);
    }

    #[tokio::test]
    async fn test_update_registration_only() {
        let repo = setup().await;
        repo.insert(&sample(Channel::Invoice, "2")).await.unwrap();

        let patch = RecordPatch {
            buyer_registration_type: Some(RegistrationType::Unregistered),
            ..RecordPatch::default()
        };
        repo.update_fields(Channel::Invoice, "2", &patch).await.unwrap();

        let loaded = repo.find_by_id(Channel::Invoice, "2").await.unwrap().unwrap();
        assert_eq!(loaded.buyer.registration_type, Some(RegistrationType::Unregistered));
        assert_eq!(loaded.submission_status, SubmissionStatus::Draft);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let repo = setup().await;
        let err = repo
            .update_fields(Channel::Invoice, "404", &RecordPatch::failed("x", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_by_status() {
        let repo = setup().await;
        for id in ["1", "2", "3"] {
            repo.insert(&sample(Channel::PosOrder, id)).await.unwrap();
        }
        repo.insert(&sample(Channel::Invoice, "4")).await.unwrap();
        repo.update_fields(Channel::PosOrder, "2", &RecordPatch::failed("rate limited", ""))
            .await
            .unwrap();
        repo.update_fields(Channel::Invoice, "4", &RecordPatch::failed("rate limited", ""))
            .await
            .unwrap();

        let failed = repo
            .query(&InvoiceFilter::by_status(Channel::PosOrder, SubmissionStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "2");
        assert_eq!(failed[0].lines.len(), 1);

        let all = repo.query(&InvoiceFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);

        let limited = repo.query(&InvoiceFilter::default().limit(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}

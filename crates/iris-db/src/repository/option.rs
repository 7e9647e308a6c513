//! # Reference Option Repository
//!
//! SQLite-backed [`OptionStore`] for the cached FBR lookup tables.
//!
//! ## First Write Wins
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reference_options  UNIQUE(option_type, code)                           │
//! │                                                                         │
//! │  insert_batch([0101 "Horses", 0102 "Cattle", 0101 "Live horses"])       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  BEGIN                                                                  │
//! │    INSERT OR IGNORE 0101 "Horses"       → 1 row                         │
//! │    INSERT OR IGNORE 0102 "Cattle"       → 1 row                         │
//! │    INSERT OR IGNORE 0101 "Live horses"  → 0 rows (code exists)          │
//! │  COMMIT                                  inserted = 2                   │
//! │                                                                         │
//! │  Same code under a different option_type is a different entry.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

use iris_core::{OptionType, ReferenceOption};

use crate::error::DbResult;
use crate::store::OptionStore;

/// Repository for cached reference options.
#[derive(Debug, Clone)]
pub struct OptionRepository {
    pool: SqlitePool,
}

impl OptionRepository {
    /// Creates a new OptionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OptionRepository { pool }
    }

    /// Number of cached entries of a type.
    pub async fn count(&self, option_type: OptionType) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reference_options WHERE option_type = ?1")
            .bind(option_type)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl OptionStore for OptionRepository {
    async fn codes_for(&self, option_type: OptionType) -> DbResult<HashSet<String>> {
        let codes: Vec<String> = sqlx::query_scalar("SELECT code FROM reference_options WHERE option_type = ?1")
            .bind(option_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(codes.into_iter().collect())
    }

    async fn latest_update(&self, option_type: OptionType) -> DbResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT last_updated FROM reference_options
            WHERE option_type = ?1
            ORDER BY last_updated DESC
            LIMIT 1
            "#,
        )
        .bind(option_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn insert_batch(&self, options: &[ReferenceOption]) -> DbResult<u64> {
        if options.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for option in options {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO reference_options (
                    option_type, code, display_name, parent_sro_ref, last_updated
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(option.option_type)
            .bind(&option.code)
            .bind(&option.display_name)
            .bind(option.parent_sro_ref.as_deref())
            .bind(option.last_updated)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(submitted = options.len(), inserted, "Reference options batch written");
        Ok(inserted)
    }

    async fn search(&self, option_type: OptionType, query: &str, limit: u32) -> DbResult<Vec<ReferenceOption>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows: Vec<OptionRow> = sqlx::query_as(
            r#"
            SELECT code, display_name, option_type, parent_sro_ref, last_updated
            FROM reference_options
            WHERE option_type = ?1
              AND (LOWER(code) LIKE ?2 OR LOWER(display_name) LIKE ?2)
            ORDER BY code ASC
            LIMIT ?3
            "#,
        )
        .bind(option_type)
        .bind(pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReferenceOption::from).collect())
    }

    async fn list(&self, option_type: OptionType) -> DbResult<Vec<ReferenceOption>> {
        let rows: Vec<OptionRow> = sqlx::query_as(
            r#"
            SELECT code, display_name, option_type, parent_sro_ref, last_updated
            FROM reference_options
            WHERE option_type = ?1
            ORDER BY code ASC
            "#,
        )
        .bind(option_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReferenceOption::from).collect())
    }
}

#[derive(Debug, FromRow)]
struct OptionRow {
    code: String,
    display_name: String,
    option_type: OptionType,
    parent_sro_ref: Option<String>,
    last_updated: DateTime<Utc>,
}

impl From<OptionRow> for ReferenceOption {
    fn from(row: OptionRow) -> Self {
        ReferenceOption {
            code: row.code,
            display_name: row.display_name,
            option_type: row.option_type,
            parent_sro_ref: row.parent_sro_ref,
            last_updated: row.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    async fn setup() -> OptionRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().options()
    }

    fn option(option_type: OptionType, code: &str, name: &str) -> ReferenceOption {
        ReferenceOption {
            code: code.to_string(),
            display_name: name.to_string(),
            option_type,
            parent_sro_ref: None,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_batch_skips_existing_codes() {
        let repo = setup().await;

        let existing: Vec<_> = (0..3)
            .map(|i| option(OptionType::HsCode, &format!("0101.{i:04}"), "Cached"))
            .collect();
        assert_eq!(repo.insert_batch(&existing).await.unwrap(), 3);

        // 12 fetched, 3 of them already cached
        let fetched: Vec<_> = (0..12)
            .map(|i| option(OptionType::HsCode, &format!("0101.{i:04}"), "Fetched"))
            .collect();
        assert_eq!(repo.insert_batch(&fetched).await.unwrap(), 9);
        assert_eq!(repo.count(OptionType::HsCode).await.unwrap(), 12);

        // Existing names were not overwritten.
        let first = repo.search(OptionType::HsCode, "0101.0000", 5).await.unwrap();
        assert_eq!(first[0].display_name, "Cached");

        // Second identical batch inserts nothing.
        assert_eq!(repo.insert_batch(&fetched).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_codes_unique_per_type_only() {
        let repo = setup().await;
        let batch = vec![
            option(OptionType::Rate, "413", "18%"),
            option(OptionType::SroSchedule, "413", "EIGHTH SCHEDULE"),
        ];
        assert_eq!(repo.insert_batch(&batch).await.unwrap(), 2);

        let codes = repo.codes_for(OptionType::Rate).await.unwrap();
        assert!(codes.contains("413"));
        assert_eq!(codes.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_update() {
        let repo = setup().await;
        assert!(repo.latest_update(OptionType::Province).await.unwrap().is_none());

        let mut old = option(OptionType::Province, "7", "PUNJAB");
        old.last_updated = Utc::now() - Duration::days(30);
        let recent = option(OptionType::Province, "8", "SINDH");
        let recent_at = recent.last_updated;
        repo.insert_batch(&[old, recent]).await.unwrap();

        let latest = repo.latest_update(OptionType::Province).await.unwrap().unwrap();
        assert_eq!(latest.timestamp(), recent_at.timestamp());
    }

    #[tokio::test]
    async fn test_search_case_insensitive() {
        let repo = setup().await;
        repo.insert_batch(&[
            option(OptionType::Uom, "13", "KG"),
            option(OptionType::Uom, "77", "Numbers, pieces, units"),
            option(OptionType::Province, "2", "Kpk"),
        ])
        .await
        .unwrap();

        let hits = repo.search(OptionType::Uom, "PIECES", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "77");

        let by_code = repo.search(OptionType::Uom, "13", 10).await.unwrap();
        assert_eq!(by_code[0].display_name, "KG");

        // "k" matches KG in uom only, not the province.
        assert_eq!(repo.search(OptionType::Uom, "k", 10).await.unwrap().len(), 1);
        assert_eq!(repo.list(OptionType::Uom).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sro_item_parent() {
        let repo = setup().await;
        let mut item = option(OptionType::SroItem, "724", "Item 1");
        item.parent_sro_ref = Some("389".to_string());
        repo.insert_batch(&[item]).await.unwrap();

        let items = repo.list(OptionType::SroItem).await.unwrap();
        assert_eq!(items[0].parent_sro_ref.as_deref(), Some("389"));
    }
}

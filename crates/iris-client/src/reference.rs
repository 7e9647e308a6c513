//! # Reference Data Cache
//!
//! Mirrors FBR lookup tables (provinces, HS codes, UOMs, sale types, rates,
//! SRO schedules and items) into the local [`OptionStore`].
//!
//! ## Refresh Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ReferenceCache::refresh                          │
//! │                                                                         │
//! │  BASE (6 workers)                                                       │
//! │  ─────────────────                                                      │
//! │  province  doc_type  hs_code  uom  sale_type  sro_item_general          │
//! │     │ fresh (< max_age)? ──► skip, no network call                      │
//! │     ▼                                                                   │
//! │  GET /pdi/v1/...  ──►  drop cached codes  ──►  insert_batch             │
//! │                                                                         │
//! │  DEPENDENT (10 workers)                                                 │
//! │  ──────────────────────                                                 │
//! │  sale_type codes (fetched first if none cached)                         │
//! │     │ per sale type                                                     │
//! │     ▼                                                                   │
//! │  GET /pdi/v2/SaleTypeToRate        ──► rate                             │
//! │     │ per rate id                                                       │
//! │     ▼                                                                   │
//! │  GET /pdi/v1/SroSchedule           ──► sro_schedule  (404/empty: skip)  │
//! │     │ per SRO id                                                        │
//! │     ▼                                                                   │
//! │  GET /pdi/v2/SROItem               ──► sro_item (parent_sro_ref)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures are per endpoint: each is logged and added to the
//! [`RefreshReport`], and the remaining categories carry on. Nothing here
//! is retried. Existing codes are never updated or removed.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use iris_core::validation::validate_search_query;
use iris_core::{OptionType, ReferenceOption};
use iris_db::OptionStore;

use crate::config::IrisConfig;
use crate::error::{IrisError, IrisResult};
use crate::http::IrisTransport;

// =============================================================================
// Endpoints
// =============================================================================

/// A lookup category fetched from a fixed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseCategory {
    pub option_type: OptionType,
    pub path: &'static str,
    pub code_key: &'static str,
    pub name_key: &'static str,
}

/// The six categories with no dependencies.
pub const BASE_CATEGORIES: [BaseCategory; 6] = [
    BaseCategory {
        option_type: OptionType::Province,
        path: "/pdi/v1/provinces",
        code_key: "stateProvinceCode",
        name_key: "stateProvinceDesc",
    },
    BaseCategory {
        option_type: OptionType::DocType,
        path: "/pdi/v1/doctypecode",
        code_key: "docTypeId",
        name_key: "docDescription",
    },
    BaseCategory {
        option_type: OptionType::HsCode,
        path: "/pdi/v1/itemdesccode",
        code_key: "hS_CODE",
        name_key: "description",
    },
    BaseCategory {
        option_type: OptionType::Uom,
        path: "/pdi/v1/uom",
        code_key: "uoM_ID",
        name_key: "description",
    },
    BaseCategory {
        option_type: OptionType::SaleType,
        path: "/pdi/v1/transtypecode",
        code_key: "transactioN_TYPE_ID",
        name_key: "transactioN_DESC",
    },
    BaseCategory {
        option_type: OptionType::SroItemGeneral,
        path: "/pdi/v1/sroitemcode",
        code_key: "srO_ITEM_ID",
        name_key: "srO_ITEM_DESC",
    },
];

const SALE_TYPE: BaseCategory = BASE_CATEGORIES[4];

const RATE_PATH: &str = "/pdi/v2/SaleTypeToRate";
const SRO_SCHEDULE_PATH: &str = "/pdi/v1/SroSchedule";
const SRO_ITEM_PATH: &str = "/pdi/v2/SROItem";

/// Date format the lookup endpoints expect, e.g. `17-Oct-2026`.
const LOOKUP_DATE_FORMAT: &str = "%d-%b-%Y";

// =============================================================================
// Report
// =============================================================================

/// Outcome of one refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// New rows per type.
    pub inserted: BTreeMap<OptionType, u64>,
    /// Types skipped because their cache was still fresh.
    pub skipped_fresh: Vec<OptionType>,
    /// One `IrisError::ReferenceFetch` per failed endpoint or write.
    pub failures: Vec<IrisError>,
}

impl RefreshReport {
    pub fn total_inserted(&self) -> u64 {
        self.inserted.values().sum()
    }

    pub fn inserted_for(&self, option_type: OptionType) -> u64 {
        self.inserted.get(&option_type).copied().unwrap_or(0)
    }

    /// True if every attempted endpoint succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, option_type: OptionType, inserted: u64) {
        *self.inserted.entry(option_type).or_insert(0) += inserted;
    }

    fn fail(&mut self, err: IrisError) {
        error!(error = %err, "Reference refresh step failed");
        self.failures.push(err);
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Keeps the local option tables in step with FBR.
#[derive(Clone)]
pub struct ReferenceCache {
    transport: Arc<dyn IrisTransport>,
    store: Arc<dyn OptionStore>,
    base_url: String,
    token: String,
    timeout: Duration,
    max_age: ChronoDuration,
    base_workers: usize,
    dependent_workers: usize,
    origination_supplier: String,
}

impl ReferenceCache {
    pub fn new(
        transport: Arc<dyn IrisTransport>,
        store: Arc<dyn OptionStore>,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        ReferenceCache {
            transport,
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: Duration::from_secs(5),
            max_age: ChronoDuration::days(7),
            base_workers: 6,
            dependent_workers: 10,
            origination_supplier: "1".to_string(),
        }
    }

    pub fn from_config(transport: Arc<dyn IrisTransport>, store: Arc<dyn OptionStore>, config: &IrisConfig) -> Self {
        let mut cache = ReferenceCache::new(
            transport,
            store,
            &config.api.reference_base_url,
            &config.company.bearer_token,
        );
        cache.timeout = config.lookup_timeout();
        cache.max_age = ChronoDuration::try_days(config.reference.max_age_days).unwrap_or(ChronoDuration::days(7));
        cache.base_workers = config.reference.base_workers.max(1);
        cache.dependent_workers = config.reference.dependent_workers.max(1);
        cache.origination_supplier = config.company.default_origination_supplier.clone();
        cache
    }

    pub fn max_age(mut self, max_age: ChronoDuration) -> Self {
        self.max_age = max_age;
        self
    }

    /// True if the newest entry of `option_type` is younger than the window.
    pub async fn is_fresh(&self, option_type: OptionType) -> IrisResult<bool> {
        self.is_fresh_at(option_type, Utc::now()).await
    }

    async fn is_fresh_at(&self, option_type: OptionType, now: DateTime<Utc>) -> IrisResult<bool> {
        let latest = self.store.latest_update(option_type).await?;
        Ok(matches!(latest, Some(at) if now - at < self.max_age))
    }

    /// Cached entries matching `query`, for pickers.
    pub async fn search(&self, option_type: OptionType, query: &str, limit: u32) -> IrisResult<Vec<ReferenceOption>> {
        let query = validate_search_query(query)?;
        Ok(self.store.search(option_type, &query, limit).await?)
    }

    /// Refreshes every category. `force` ignores the staleness window.
    pub async fn refresh(&self, force: bool) -> RefreshReport {
        let mut report = RefreshReport::default();
        let now = Utc::now();
        let date = lookup_date(now.date_naive());

        info!(force, "Starting FBR reference refresh");

        self.refresh_base(force, now, &mut report).await;

        match self.dependent_due(force, now).await {
            Ok(true) => self.refresh_dependent(&date, &mut report).await,
            Ok(false) => {
                info!("Rates are fresh, skipping dependent lookups");
                report.skipped_fresh.push(OptionType::Rate);
            }
            Err(e) => report.fail(as_fetch_error("rate cache", e)),
        }

        info!(
            inserted = report.total_inserted(),
            skipped = report.skipped_fresh.len(),
            failures = report.failures.len(),
            "FBR reference refresh finished"
        );
        report
    }

    // =========================================================================
    // Base categories
    // =========================================================================

    async fn refresh_base(&self, force: bool, now: DateTime<Utc>, report: &mut RefreshReport) {
        let mut due = Vec::new();
        for category in BASE_CATEGORIES {
            if !force {
                match self.is_fresh_at(category.option_type, now).await {
                    Ok(true) => {
                        info!(option_type = %category.option_type, "Using cached data");
                        report.skipped_fresh.push(category.option_type);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        report.fail(as_fetch_error(category.path, e));
                        continue;
                    }
                }
            }
            due.push((category, self.url(category.path)));
        }

        if due.is_empty() {
            return;
        }

        for (category, url, result) in self.fan_out(due, self.base_workers, false).await {
            match result {
                Ok(entries) => {
                    let options = parse_options(category.option_type, &entries, category.code_key, category.name_key, None);
                    match self.insert_missing(category.option_type, options).await {
                        Ok(n) => {
                            info!(option_type = %category.option_type, inserted = n, "Category loaded");
                            report.record(category.option_type, n);
                        }
                        Err(e) => report.fail(as_fetch_error(&url, e)),
                    }
                }
                Err(e) => report.fail(e),
            }
        }
    }

    // =========================================================================
    // Dependent categories
    // =========================================================================

    async fn dependent_due(&self, force: bool, now: DateTime<Utc>) -> IrisResult<bool> {
        if force {
            return Ok(true);
        }
        Ok(!self.is_fresh_at(OptionType::Rate, now).await?)
    }

    async fn refresh_dependent(&self, date: &str, report: &mut RefreshReport) {
        let sale_types = match self.sale_type_codes(report).await {
            Ok(codes) => codes,
            Err(e) => {
                report.fail(as_fetch_error(SALE_TYPE.path, e));
                return;
            }
        };
        if sale_types.is_empty() {
            info!("No sale types available, skipping rates");
            return;
        }

        // Rates per sale type
        let jobs = sale_types
            .iter()
            .map(|code| {
                let url = format!(
                    "{}{}?date={}&transTypeId={}&originationSupplier={}",
                    self.base_url, RATE_PATH, date, code, self.origination_supplier
                );
                ((), url)
            })
            .collect();
        let rate_codes = self
            .collect_level(jobs, OptionType::Rate, RATE_PATH, "ratE_ID", "ratE_DESC", false, report)
            .await;

        // SRO schedules per rate
        let jobs = rate_codes
            .iter()
            .map(|rate_id| {
                let url = format!(
                    "{}{}?rate_id={}&date={}&origination_supplier_csv={}",
                    self.base_url, SRO_SCHEDULE_PATH, rate_id, date, self.origination_supplier
                );
                ((), url)
            })
            .collect();
        let sro_codes = self
            .collect_level(jobs, OptionType::SroSchedule, SRO_SCHEDULE_PATH, "srO_ID", "srO_DESC", true, report)
            .await;

        // SRO items per schedule
        let jobs: Vec<(String, String)> = sro_codes
            .iter()
            .map(|sro_id| {
                let url = format!("{}{}?date={}&sro_id={}", self.base_url, SRO_ITEM_PATH, date, sro_id);
                (sro_id.clone(), url)
            })
            .collect();
        let mut items = Vec::new();
        for (sro_id, _, result) in self.fan_out(jobs, self.dependent_workers, true).await {
            match result {
                Ok(entries) => items.extend(parse_options(
                    OptionType::SroItem,
                    &entries,
                    "srO_ITEM_ID",
                    "srO_ITEM_DESC",
                    Some(&sro_id),
                )),
                Err(e) => report.fail(e),
            }
        }
        self.store_level(OptionType::SroItem, SRO_ITEM_PATH, items, report).await;
    }

    /// Cached sale-type codes, fetching them first when none are cached.
    async fn sale_type_codes(&self, report: &mut RefreshReport) -> IrisResult<BTreeSet<String>> {
        let cached = self.store.codes_for(OptionType::SaleType).await?;
        if !cached.is_empty() {
            return Ok(cached.into_iter().collect());
        }

        debug!("No cached sale types, fetching before rates");
        let url = self.url(SALE_TYPE.path);
        let entries = fetch_entries(self.transport.clone(), &url, &self.token, self.timeout, false).await?;
        let options = parse_options(OptionType::SaleType, &entries, SALE_TYPE.code_key, SALE_TYPE.name_key, None);
        let inserted = self.insert_missing(OptionType::SaleType, options).await?;
        report.record(OptionType::SaleType, inserted);

        Ok(self.store.codes_for(OptionType::SaleType).await?.into_iter().collect())
    }

    /// Fetches one dependent level, stores it as one batch, and returns
    /// every code seen.
    #[allow(clippy::too_many_arguments)]
    async fn collect_level(
        &self,
        jobs: Vec<((), String)>,
        option_type: OptionType,
        path: &str,
        code_key: &str,
        name_key: &str,
        missing_ok: bool,
        report: &mut RefreshReport,
    ) -> BTreeSet<String> {
        let mut options = Vec::new();
        for ((), url, result) in self.fan_out(jobs, self.dependent_workers, missing_ok).await {
            match result {
                Ok(entries) if entries.is_empty() => {
                    debug!(url = %url, "No {} entries", option_type);
                }
                Ok(entries) => options.extend(parse_options(option_type, &entries, code_key, name_key, None)),
                Err(e) => report.fail(e),
            }
        }

        let codes = options.iter().map(|o| o.code.clone()).collect();
        self.store_level(option_type, path, options, report).await;
        codes
    }

    /// Writes everything gathered for one category in a single batch.
    async fn store_level(
        &self,
        option_type: OptionType,
        path: &str,
        options: Vec<ReferenceOption>,
        report: &mut RefreshReport,
    ) {
        if options.is_empty() {
            return;
        }
        match self.insert_missing(option_type, options).await {
            Ok(n) => {
                info!(option_type = %option_type, inserted = n, "Category loaded");
                report.record(option_type, n);
            }
            Err(e) => report.fail(as_fetch_error(path, e)),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Runs GETs concurrently, at most `workers` at a time. Results come back
    /// in completion order; a failed task never cancels its siblings.
    async fn fan_out<K>(
        &self,
        jobs: Vec<(K, String)>,
        workers: usize,
        missing_ok: bool,
    ) -> Vec<(K, String, IrisResult<Vec<Value>>)>
    where
        K: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut set = JoinSet::new();

        for (key, url) in jobs {
            let semaphore = semaphore.clone();
            let transport = self.transport.clone();
            let token = self.token.clone();
            let timeout = self.timeout;
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_entries(transport, &url, &token, timeout, missing_ok).await,
                    Err(_) => Err(IrisError::ChannelError("fetch pool closed".into())),
                };
                (key, url, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Reference fetch task panicked"),
            }
        }
        results
    }

    /// Drops codes already cached for the type, then inserts the rest in one batch.
    async fn insert_missing(&self, option_type: OptionType, options: Vec<ReferenceOption>) -> IrisResult<u64> {
        if options.is_empty() {
            return Ok(0);
        }
        let existing = self.store.codes_for(option_type).await?;
        let mut seen = HashSet::new();
        let fresh: Vec<ReferenceOption> = options
            .into_iter()
            .filter(|o| !existing.contains(&o.code) && seen.insert(o.code.clone()))
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }
        Ok(self.store.insert_batch(&fresh).await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// One authenticated GET returning a JSON array.
///
/// With `missing_ok`, a 404 or an empty body reads as "no entries".
async fn fetch_entries(
    transport: Arc<dyn IrisTransport>,
    url: &str,
    token: &str,
    timeout: Duration,
    missing_ok: bool,
) -> IrisResult<Vec<Value>> {
    debug!(url, "Fetching FBR reference data");

    let reply = transport
        .get_json(url, token, timeout)
        .await
        .map_err(|e| fetch_error(url, e))?;

    if missing_ok && (reply.status == 404 || (reply.is_ok() && reply.body.trim().is_empty())) {
        return Ok(Vec::new());
    }

    if !reply.is_ok() {
        let body: String = reply.body.chars().take(200).collect();
        return Err(fetch_error(url, format!("HTTP {} - {}", reply.status, body)));
    }

    match reply.json() {
        Some(Value::Array(entries)) => Ok(entries),
        Some(Value::Null) if missing_ok => Ok(Vec::new()),
        _ => Err(fetch_error(url, "response is not a JSON array")),
    }
}

/// Turns raw entries into options. Entries without a code or a name are dropped.
fn parse_options(
    option_type: OptionType,
    entries: &[Value],
    code_key: &str,
    name_key: &str,
    parent_sro_ref: Option<&str>,
) -> Vec<ReferenceOption> {
    let now = Utc::now();
    entries
        .iter()
        .filter_map(|entry| {
            let code = code_string(entry.get(code_key)?)?;
            let name = entry.get(name_key)?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(ReferenceOption {
                code,
                display_name: name.to_string(),
                option_type,
                parent_sro_ref: parent_sro_ref.map(str::to_string),
                last_updated: now,
            })
        })
        .collect()
}

/// Codes arrive as strings on some endpoints and numbers on others.
fn code_string(value: &Value) -> Option<String> {
    let code = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!code.is_empty()).then_some(code)
}

fn lookup_date(date: NaiveDate) -> String {
    date.format(LOOKUP_DATE_FORMAT).to_string()
}

fn fetch_error(endpoint: &str, err: impl ToString) -> IrisError {
    IrisError::ReferenceFetch {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

/// Files any error under `endpoint`, keeping fetch errors as they are.
fn as_fetch_error(endpoint: &str, err: IrisError) -> IrisError {
    match err {
        e @ IrisError::ReferenceFetch { .. } => e,
        other => fetch_error(endpoint, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::HttpReply;
    use async_trait::async_trait;
    use iris_db::{Database, DbConfig};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers GETs by path prefix and counts the calls.
    #[derive(Default)]
    struct RoutedTransport {
        routes: Mutex<HashMap<String, HttpReply>>,
        calls: Mutex<Vec<String>>,
    }

    impl RoutedTransport {
        fn route(&self, path: &str, status: u16, body: Value) {
            self.routes
                .lock()
                .unwrap()
                .insert(path.to_string(), HttpReply::new(status, body.to_string()));
        }

        fn calls_to(&self, path: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| u.contains(path)).count()
        }
    }

    #[async_trait]
    impl IrisTransport for RoutedTransport {
        async fn post_json(&self, _: &str, _: &str, _: &Value, _: Duration) -> Result<HttpReply, TransportError> {
            unreachable!("lookups are GET only")
        }

        async fn get_json(&self, url: &str, _token: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
            self.calls.lock().unwrap().push(url.to_string());
            let path = url.trim_start_matches("https://gw.test");
            let path = path.split('?').next().unwrap_or(path);
            let routes = self.routes.lock().unwrap();
            match routes.get(path) {
                Some(reply) => Ok(reply.clone()),
                None => Err(TransportError::Connect(format!("no route for {path}"))),
            }
        }
    }

    async fn setup(transport: Arc<RoutedTransport>) -> (ReferenceCache, Arc<iris_db::OptionRepository>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = Arc::new(db.options());
        let cache = ReferenceCache::new(transport, store.clone(), "https://gw.test/", "token");
        (cache, store)
    }

    fn route_all_base(transport: &RoutedTransport) {
        transport.route(
            "/pdi/v1/provinces",
            200,
            json!([{"stateProvinceCode": 7, "stateProvinceDesc": "PUNJAB"}, {"stateProvinceCode": 8, "stateProvinceDesc": "SINDH"}]),
        );
        transport.route("/pdi/v1/doctypecode", 200, json!([{"docTypeId": 4, "docDescription": "Sale Invoice"}]));
        transport.route("/pdi/v1/itemdesccode", 200, json!([{"hS_CODE": "0101.2100", "description": "Horses"}]));
        transport.route("/pdi/v1/uom", 200, json!([{"uoM_ID": 13, "description": "KG"}]));
        transport.route(
            "/pdi/v1/transtypecode",
            200,
            json!([{"transactioN_TYPE_ID": 75, "transactioN_DESC": "Goods at standard rate"}]),
        );
        transport.route("/pdi/v1/sroitemcode", 200, json!([{"srO_ITEM_ID": 724, "srO_ITEM_DESC": "9"}]));
        transport.route("/pdi/v2/SaleTypeToRate", 200, json!([{"ratE_ID": 413, "ratE_DESC": "18%"}]));
        transport.route("/pdi/v1/SroSchedule", 200, json!([{"srO_ID": 389, "srO_DESC": "EIGHTH SCHEDULE"}]));
        transport.route("/pdi/v2/SROItem", 200, json!([{"srO_ITEM_ID": 17853, "srO_ITEM_DESC": "50"}]));
    }

    #[tokio::test]
    async fn test_full_refresh_then_idempotent() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        let (cache, store) = setup(transport.clone()).await;

        let report = cache.refresh(false).await;
        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(report.inserted_for(OptionType::Province), 2);
        assert_eq!(report.inserted_for(OptionType::Rate), 1);
        assert_eq!(report.inserted_for(OptionType::SroSchedule), 1);
        assert_eq!(report.inserted_for(OptionType::SroItem), 1);

        let items = store.list(OptionType::SroItem).await.unwrap();
        assert_eq!(items[0].parent_sro_ref.as_deref(), Some("389"));

        // Forced second pass hits the network and inserts nothing.
        let again = cache.refresh(true).await;
        assert_eq!(again.total_inserted(), 0);
        assert!(again.skipped_fresh.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_categories_are_not_fetched() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        let (cache, _store) = setup(transport.clone()).await;

        cache.refresh(false).await;
        assert_eq!(transport.calls_to("/pdi/v1/provinces"), 1);

        let report = cache.refresh(false).await;
        assert_eq!(transport.calls_to("/pdi/v1/provinces"), 1);
        assert_eq!(transport.calls_to("/pdi/v2/SaleTypeToRate"), 1);
        assert_eq!(report.skipped_fresh.len(), 7);
        assert_eq!(report.total_inserted(), 0);
    }

    #[tokio::test]
    async fn test_stale_category_is_refetched() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        let (cache, store) = setup(transport.clone()).await;

        store
            .insert_batch(&[ReferenceOption {
                code: "9".into(),
                display_name: "KPK".into(),
                option_type: OptionType::Province,
                parent_sro_ref: None,
                last_updated: Utc::now() - ChronoDuration::days(8),
            }])
            .await
            .unwrap();
        assert!(!cache.is_fresh(OptionType::Province).await.unwrap());

        let report = cache.refresh(false).await;
        assert_eq!(transport.calls_to("/pdi/v1/provinces"), 1);
        assert_eq!(report.inserted_for(OptionType::Province), 2);
        assert!(cache.is_fresh(OptionType::Province).await.unwrap());
    }

    #[tokio::test]
    async fn test_hs_codes_skip_cached() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        let entries: Vec<Value> = (0..12)
            .map(|i| json!({"hS_CODE": format!("0101.{i:04}"), "description": format!("Item {i}")}))
            .collect();
        transport.route("/pdi/v1/itemdesccode", 200, Value::Array(entries));
        let (cache, store) = setup(transport.clone()).await;

        // 3 of the 12 already cached, but old enough to be refreshed.
        let cached: Vec<ReferenceOption> = (0..3)
            .map(|i| ReferenceOption {
                code: format!("0101.{i:04}"),
                display_name: "Old".into(),
                option_type: OptionType::HsCode,
                parent_sro_ref: None,
                last_updated: Utc::now() - ChronoDuration::days(30),
            })
            .collect();
        store.insert_batch(&cached).await.unwrap();

        let report = cache.refresh(false).await;
        assert_eq!(report.inserted_for(OptionType::HsCode), 9);
        assert_eq!(store.count(OptionType::HsCode).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_others() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        transport.route("/pdi/v1/uom", 500, json!({"Message": "boom"}));
        transport.route("/pdi/v1/SroSchedule", 404, json!(null));
        let (cache, store) = setup(transport.clone()).await;

        let report = cache.refresh(false).await;
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(&report.failures[0], IrisError::ReferenceFetch { endpoint, .. } if endpoint.contains("/pdi/v1/uom")));
        assert_eq!(report.inserted_for(OptionType::Province), 2);
        assert_eq!(report.inserted_for(OptionType::Rate), 1);
        // 404 schedule: no schedules, no items, no failure.
        assert_eq!(report.inserted_for(OptionType::SroSchedule), 0);
        assert_eq!(transport.calls_to("/pdi/v2/SROItem"), 0);
        assert!(store.list(OptionType::Uom).await.unwrap().is_empty());
    }

    /// Wraps the real store and counts `insert_batch` calls per type.
    struct CountingStore {
        inner: iris_db::OptionRepository,
        batches: Mutex<Vec<OptionType>>,
    }

    impl CountingStore {
        fn batches_for(&self, option_type: OptionType) -> usize {
            self.batches.lock().unwrap().iter().filter(|t| **t == option_type).count()
        }
    }

    #[async_trait]
    impl OptionStore for CountingStore {
        async fn codes_for(&self, option_type: OptionType) -> iris_db::DbResult<HashSet<String>> {
            self.inner.codes_for(option_type).await
        }

        async fn latest_update(&self, option_type: OptionType) -> iris_db::DbResult<Option<DateTime<Utc>>> {
            self.inner.latest_update(option_type).await
        }

        async fn insert_batch(&self, options: &[ReferenceOption]) -> iris_db::DbResult<u64> {
            if let Some(first) = options.first() {
                self.batches.lock().unwrap().push(first.option_type);
            }
            self.inner.insert_batch(options).await
        }

        async fn search(&self, option_type: OptionType, query: &str, limit: u32) -> iris_db::DbResult<Vec<ReferenceOption>> {
            self.inner.search(option_type, query, limit).await
        }

        async fn list(&self, option_type: OptionType) -> iris_db::DbResult<Vec<ReferenceOption>> {
            self.inner.list(option_type).await
        }
    }

    #[tokio::test]
    async fn test_dependent_levels_insert_one_batch_per_category() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        transport.route(
            "/pdi/v1/transtypecode",
            200,
            json!([
                {"transactioN_TYPE_ID": 75, "transactioN_DESC": "Goods at standard rate"},
                {"transactioN_TYPE_ID": 18, "transactioN_DESC": "Services"},
                {"transactioN_TYPE_ID": 21, "transactioN_DESC": "Goods at reduced rate"}
            ]),
        );
        transport.route(
            "/pdi/v2/SaleTypeToRate",
            200,
            json!([{"ratE_ID": 413, "ratE_DESC": "18%"}, {"ratE_ID": 280, "ratE_DESC": "0%"}]),
        );
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = Arc::new(CountingStore {
            inner: db.options(),
            batches: Mutex::new(Vec::new()),
        });
        let cache = ReferenceCache::new(transport.clone(), store.clone(), "https://gw.test/", "token");

        let report = cache.refresh(false).await;
        assert!(report.is_complete(), "{:?}", report.failures);

        // Three sale types fetched rates three times, written once.
        assert_eq!(transport.calls_to("/pdi/v2/SaleTypeToRate"), 3);
        assert_eq!(store.batches_for(OptionType::Rate), 1);
        assert_eq!(report.inserted_for(OptionType::Rate), 2);

        assert_eq!(transport.calls_to("/pdi/v1/SroSchedule"), 2);
        assert_eq!(store.batches_for(OptionType::SroSchedule), 1);
        assert_eq!(store.batches_for(OptionType::SroItem), 1);
    }

    #[tokio::test]
    async fn test_rates_follow_newly_fetched_sale_types() {
        let transport = Arc::new(RoutedTransport::default());
        route_all_base(&transport);
        let (cache, store) = setup(transport.clone()).await;

        // Everything base is fresh except sale types, which are absent.
        let now = Utc::now();
        for category in BASE_CATEGORIES.iter().filter(|c| c.option_type != OptionType::SaleType) {
            store
                .insert_batch(&[ReferenceOption {
                    code: "x".into(),
                    display_name: "x".into(),
                    option_type: category.option_type,
                    parent_sro_ref: None,
                    last_updated: now,
                }])
                .await
                .unwrap();
        }

        let report = cache.refresh(false).await;
        assert_eq!(report.inserted_for(OptionType::SaleType), 1);
        assert_eq!(report.inserted_for(OptionType::Rate), 1);
        assert_eq!(store.codes_for(OptionType::SaleType).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_tolerates_unvalidated_max_age() {
        let transport = Arc::new(RoutedTransport::default());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = IrisConfig::default();
        config.reference.max_age_days = i64::MAX;

        let cache = ReferenceCache::from_config(transport, Arc::new(db.options()), &config);
        assert_eq!(cache.max_age, ChronoDuration::days(7));
    }

    #[test]
    fn test_parse_options() {
        let entries = vec![
            json!({"uoM_ID": 13, "description": "KG"}),
            json!({"uoM_ID": "77", "description": " Numbers, pieces, units "}),
            json!({"uoM_ID": null, "description": "no code"}),
            json!({"uoM_ID": 5, "description": ""}),
            json!({"description": "missing"}),
        ];
        let options = parse_options(OptionType::Uom, &entries, "uoM_ID", "description", None);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].code, "13");
        assert_eq!(options[1].code, "77");
        assert_eq!(options[1].display_name, "Numbers, pieces, units");
    }

    #[test]
    fn test_lookup_date_format() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 7).unwrap();
        assert_eq!(lookup_date(date), "07-Oct-2026");
    }

    #[tokio::test]
    async fn test_search_validates_query() {
        let transport = Arc::new(RoutedTransport::default());
        let (cache, _) = setup(transport).await;
        let long = "x".repeat(101);
        assert!(matches!(
            cache.search(OptionType::HsCode, &long, 10).await,
            Err(IrisError::Validation(_))
        ));
        assert!(cache.search(OptionType::HsCode, "horse", 10).await.unwrap().is_empty());
    }
}

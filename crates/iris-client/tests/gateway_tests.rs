//! # Gateway Integration Tests
//!
//! Drives the real reqwest transport and the SQLite store against a
//! wiremock FBR gateway: submission retries and persistence, 429 handling,
//! reference refresh and registration lookups.

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iris_client::{IrisConfig, IrisError, IrisService, IrisTransport, ReqwestTransport};
use iris_core::{Buyer, Channel, InvoiceLine, InvoiceRecord, OptionType, RegistrationType, SubmissionStatus};
use iris_core::{TaxComponent, TaxKind};
use iris_db::{Database, DbConfig, InvoiceRepository, InvoiceStore};

const SUBMIT_PATH: &str = "/di_data/v1/di/postinvoicedata";
const REGISTRATION_PATH: &str = "/dist/v1/Get_Reg_Type";

// ── Fixtures ────────────────────────────────────────────────────────────────

fn config(server: &MockServer) -> IrisConfig {
    let mut config = IrisConfig::default();
    config.company.integration_enabled = true;
    config.company.api_base_url = format!("{}{}", server.uri(), SUBMIT_PATH);
    config.company.bearer_token = "test-token".into();
    config.company.seller_ntn = "7654321".into();
    config.company.seller_business_name = "Seller Pvt Ltd".into();
    config.api.reference_base_url = server.uri();
    config.api.registration_url = format!("{}{}", server.uri(), REGISTRATION_PATH);
    config.submission.backoff_base_ms = 10;
    config
}

fn sale(channel: Channel, id: &str) -> InvoiceRecord {
    let mut record = InvoiceRecord::new(channel, id, format!("SALE/{id}"));
    record.date = NaiveDate::from_ymd_opt(2026, 10, 1);
    record.buyer = Buyer {
        tax_id: Some("1234567".into()),
        name: Some("Buyer Traders".into()),
        province: Some("Punjab".into()),
        ..Buyer::default()
    };
    record.lines.push(
        InvoiceLine::new(1, "P1", dec!(500), dec!(2)).with_tax(TaxComponent::percent(TaxKind::SalesTax, dec!(18))),
    );
    record.host_tax_total = dec!(180);
    record.host_grand_total = dec!(1180);
    record
}

async fn service(server: &MockServer) -> (IrisService, Arc<InvoiceRepository>) {
    let db = Database::new(DbConfig::in_memory()).await.expect("database");
    let invoices = Arc::new(db.invoices());
    let service = IrisService::new(
        config(server),
        invoices.clone(),
        Arc::new(db.options()),
        Arc::new(ReqwestTransport::new()),
    );
    (service, invoices)
}

fn accepted(number: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "invoiceNumber": number,
        "dated": "2026-10-01 10:00:00",
        "validationResponse": {"statusCode": "00", "status": "Valid", "error": ""}
    }))
}

// ── Transport ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn transport_sends_bearer_and_reads_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("Authorization", "Bearer abc"))
        .and(body_partial_json(json!({"hello": "fbr"})))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();
    let reply = transport
        .post_json(
            &format!("{}/echo", server.uri()),
            "Bearer abc",
            &json!({"hello": "fbr"}),
            Duration::from_secs(5),
        )
        .await
        .expect("reply");

    assert!(reply.is_rate_limited());
    assert_eq!(reply.retry_after, Some(7));
}

#[tokio::test]
async fn transport_reports_connection_failure() {
    let transport = ReqwestTransport::new();
    let result = transport
        .get_json("http://127.0.0.1:1/nothing", "t", Duration::from_secs(2))
        .await;
    assert!(result.is_err());
}

// ── Submission ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_posts_and_persists_invoice_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "invoiceType": "Sale Invoice",
            "invoiceRefNo": "SALE/1",
            "sellerNTNCNIC": "7654321",
            "buyerNTNCNIC": "1234567",
        })))
        .respond_with(accepted("7654321DI1759300000001"))
        .expect(1)
        .mount(&server)
        .await;

    let (service, invoices) = service(&server).await;
    invoices.insert(&sale(Channel::Invoice, "1")).await.unwrap();

    let submitted = service.submit(Channel::Invoice, "1").await.unwrap();
    assert_eq!(submitted.invoice_number, "7654321DI1759300000001");
    assert_eq!(submitted.attempts, 1);

    let stored = invoices.find_by_id(Channel::Invoice, "1").await.unwrap().unwrap();
    assert_eq!(stored.submission_status, SubmissionStatus::Posted);
    assert_eq!(stored.authority_invoice_number.as_deref(), Some("7654321DI1759300000001"));
    assert!(stored.last_raw_response.unwrap().contains("invoiceNumber"));
}

#[tokio::test]
async fn submit_gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"Message": "Gateway unavailable"})))
        .expect(3)
        .mount(&server)
        .await;

    let (service, invoices) = service(&server).await;
    invoices.insert(&sale(Channel::Invoice, "2")).await.unwrap();

    let err = service.submit(Channel::Invoice, "2").await.unwrap_err();
    assert!(matches!(err, IrisError::TerminalSubmission { attempts: 3, .. }));
    assert_eq!(err.to_string(), "FBR posting failed after 3 attempts: Gateway unavailable");

    let stored = invoices.find_by_id(Channel::Invoice, "2").await.unwrap().unwrap();
    assert_eq!(stored.submission_status, SubmissionStatus::Failed);
    assert_eq!(stored.last_error_message.as_deref(), Some("Gateway unavailable"));
}

#[tokio::test]
async fn submit_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(accepted("FBR-429"))
        .expect(1)
        .mount(&server)
        .await;

    let (service, invoices) = service(&server).await;
    invoices.insert(&sale(Channel::PosOrder, "3")).await.unwrap();

    let started = std::time::Instant::now();
    let submitted = service.submit(Channel::PosOrder, "3").await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(submitted.invoice_number, "FBR-429");
    assert_eq!(submitted.attempts, 2);
}

#[tokio::test]
async fn background_submission_posts_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SUBMIT_PATH))
        .respond_with(accepted("FBR-BG-1"))
        .expect(1)
        .mount(&server)
        .await;

    let (mut service, invoices) = service(&server).await;
    service.start_background();
    invoices.insert(&sale(Channel::PosOrder, "4")).await.unwrap();

    service.submit_in_background(Channel::PosOrder, "4").await.unwrap();
    service.shutdown().await.unwrap();

    let stored = invoices.find_by_id(Channel::PosOrder, "4").await.unwrap().unwrap();
    assert_eq!(stored.submission_status, SubmissionStatus::Posted);
    assert_eq!(stored.authority_invoice_number.as_deref(), Some("FBR-BG-1"));
}

// ── Reference data ──────────────────────────────────────────────────────────

async fn mount_reference(server: &MockServer) {
    let base = [
        ("/pdi/v1/provinces", json!([{"stateProvinceCode": 7, "stateProvinceDesc": "PUNJAB"}])),
        ("/pdi/v1/doctypecode", json!([{"docTypeId": 4, "docDescription": "Sale Invoice"}])),
        (
            "/pdi/v1/itemdesccode",
            json!([
                {"hS_CODE": "0101.2100", "description": "Horses"},
                {"hS_CODE": "0101.2900", "description": "Other horses"},
            ]),
        ),
        ("/pdi/v1/uom", json!([{"uoM_ID": 77, "description": "Square Metre"}])),
        (
            "/pdi/v1/transtypecode",
            json!([
                {"transactioN_TYPE_ID": 75, "transactioN_DESC": "Goods at standard rate"},
                {"transactioN_TYPE_ID": 80, "transactioN_DESC": "Services"},
            ]),
        ),
        ("/pdi/v1/sroitemcode", json!([{"srO_ITEM_ID": 724, "srO_ITEM_DESC": "9"}])),
    ];
    for (endpoint, body) in base {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/pdi/v2/SaleTypeToRate"))
        .and(query_param("transTypeId", "75"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"ratE_ID": 734, "ratE_DESC": "18%"}])))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pdi/v2/SaleTypeToRate"))
        .and(query_param("transTypeId", "80"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"ratE_ID": 280, "ratE_DESC": "0%"}])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pdi/v1/SroSchedule"))
        .and(query_param("rate_id", "734"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"srO_ID": 389, "srO_DESC": "Eighth Schedule"}])))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pdi/v1/SroSchedule"))
        .and(query_param("rate_id", "280"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/pdi/v2/SROItem"))
        .and(query_param("sro_id", "389"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"srO_ITEM_ID": 17853, "srO_ITEM_DESC": "70"},
            {"srO_ITEM_ID": 17854, "srO_ITEM_DESC": "71"},
        ])))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn reference_refresh_fills_cache_then_skips_fresh_data() {
    let server = MockServer::start().await;
    mount_reference(&server).await;
    let (service, _) = service(&server).await;

    let first = service.refresh_reference(false).await.unwrap();
    assert!(first.is_complete(), "failures: {:?}", first.failures);
    assert_eq!(first.inserted_for(OptionType::HsCode), 2);
    assert_eq!(first.inserted_for(OptionType::SaleType), 2);
    assert_eq!(first.inserted_for(OptionType::Rate), 2);
    assert_eq!(first.inserted_for(OptionType::SroSchedule), 1);
    assert_eq!(first.inserted_for(OptionType::SroItem), 2);

    // Every mock above expects one hit, so a second fetch would fail the test.
    let second = service.refresh_reference(false).await.unwrap();
    assert_eq!(second.total_inserted(), 0);
    assert_eq!(second.skipped_fresh.len(), 7);

    let items = service.search_options(OptionType::SroItem, "7", 10).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|o| o.parent_sro_ref.as_deref() == Some("389")));
}

// ── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_check_updates_buyer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(REGISTRATION_PATH))
        .and(body_partial_json(json!({"Registration_No": "1234567"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuscode": "00",
            "REGISTRATION_NO": "1234567",
            "REGISTRATION_TYPE": "unregistered"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, invoices) = service(&server).await;
    invoices.insert(&sale(Channel::Invoice, "5")).await.unwrap();

    let kind = service.check_buyer_registration(Channel::Invoice, "5").await.unwrap();
    assert_eq!(kind, Some(RegistrationType::Unregistered));

    let stored = invoices.find_by_id(Channel::Invoice, "5").await.unwrap().unwrap();
    assert_eq!(stored.buyer.registration_type, Some(RegistrationType::Unregistered));
}

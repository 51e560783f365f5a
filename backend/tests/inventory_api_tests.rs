//! External inventory API client against a mock server

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stock_ledger::config::ExternalConfig;
use stock_ledger::external::{InventoryApiClient, InventorySource};
use stock_ledger::AppError;

fn external_config(base_url: &str) -> ExternalConfig {
    ExternalConfig {
        base_url: base_url.to_string(),
        organization_id: "ORG1".to_string(),
        access_token: "test-token".to_string(),
        delivery_location_id: "LOC1".to_string(),
        timeout_secs: 5,
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
        page_size: 2,
        max_pages: 3,
        cache_ttl_secs: 60,
    }
}

#[tokio::test]
async fn test_bins_listing_follows_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bins"))
        .and(query_param("zone_id", "ZN1"))
        .and(query_param("organization_id", "ORG1"))
        .and(query_param("page", "1"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "bins": [
                {"bin_id": "B1", "bin_name": "Bin One"},
                {"bin_id": "B2", "bin_name": "Bin Two"}
            ],
            "page_context": {"page": 1, "has_more_page": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bins"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "bins": [{"bin_id": "B3", "bin_name": "Bin Three", "zone_id": "ZN1"}],
            "page_context": {"page": 2, "has_more_page": false}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = InventoryApiClient::new(&external_config(&server.uri())).unwrap();
    let bins = client.list_bins_for_zone("ZN1").await.unwrap();

    let ids: Vec<&str> = bins.iter().map(|b| b.bin_id.as_str()).collect();
    assert_eq!(ids, vec!["B1", "B2", "B3"]);
    // Zone id is filled in from the request when the record omits it
    assert!(bins.iter().all(|b| b.zone_id == "ZN1"));
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "zones": [{"zone_id": "ZN1", "zone_name": "Lagos Island"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = InventoryApiClient::new(&external_config(&server.uri())).unwrap();
    let zones = client.list_zones_for_location("LOC1").await.unwrap();

    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].location_id, "LOC1");
}

#[tokio::test]
async fn test_sustained_rate_limit_gives_up() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/locations"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = InventoryApiClient::new(&external_config(&server.uri())).unwrap();
    let err = client.list_locations().await.unwrap_err();

    assert!(matches!(err, AppError::RateLimit { attempts: 3 }), "{:?}", err);
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/locations"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid oauth token"))
        .expect(1)
        .mount(&server)
        .await;

    let client = InventoryApiClient::new(&external_config(&server.uri())).unwrap();
    let err = client.ping().await.unwrap_err();

    assert!(matches!(err, AppError::Auth(_)), "{:?}", err);
}

#[tokio::test]
async fn test_error_code_in_success_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/settings/warehouses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1002,
            "message": "Organization does not exist"
        })))
        .mount(&server)
        .await;

    let client = InventoryApiClient::new(&external_config(&server.uri())).unwrap();
    let err = client.list_warehouses().await.unwrap_err();

    assert!(matches!(err, AppError::ExternalService(ref m) if m.contains("1002")), "{:?}", err);
}

#[tokio::test]
async fn test_endless_pagination_is_cut_off() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "zones": [{"zone_id": "ZN1", "zone_name": "Lagos"}],
            "page_context": {"has_more_page": true}
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = InventoryApiClient::new(&external_config(&server.uri())).unwrap();
    let err = client.list_zones_for_location("LOC1").await.unwrap_err();

    assert!(matches!(err, AppError::ExternalService(_)), "{:?}", err);
}

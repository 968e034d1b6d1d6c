use jaccount::{
    AccessToken, ApiClient, ApiError, ApiUrl, CardTransaction, CardTransactionsOptions,
    HttpRequest, HttpResponse,
};

use chrono::{TimeZone, Utc};
use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use std::cell::RefCell;

mod common;

use crate::common::{init_log, json_response, FakeError, MockProvider, PanicIfFail, TEST_API_BASE_URL};

fn test_api_client() -> ApiClient {
    ApiClient::new(
        ApiUrl::new(TEST_API_BASE_URL).unwrap(),
        AccessToken::new("AT".to_string()),
    )
}

#[test]
fn test_transaction_paging() {
    init_log("test_transaction_paging");

    let pages = RefCell::new(vec![
        json!({"errno": 0, "total": 3, "entities": [{"amount": -3.0, "merchant": "二餐"}]}),
        json!({"errno": 0, "total": 3, "nextToken": "p2", "entities": [
            {"amount": -1.0, "merchant": "一餐"},
            {"amount": -2.0, "merchant": "一餐"}
        ]}),
    ]);
    let seen = RefCell::new(Vec::new());
    let http_client = |request: HttpRequest| -> Result<HttpResponse, FakeError> {
        seen.borrow_mut().push(request.uri().to_string());
        let page = pages.borrow_mut().pop().expect("unexpected request");
        Ok(json_response(StatusCode::OK, page.to_string()))
    };

    let options = CardTransactionsOptions::new()
        .set_begin_date(Utc.timestamp_opt(1_619_881_405, 0).unwrap())
        .set_end_date(Utc.timestamp_opt(1_619_967_805, 0).unwrap());
    let api_client = test_api_client();

    let first = api_client
        .card_transactions(&options, &http_client)
        .panic_if_fail("failed to list transactions");
    assert_eq!(first.total(), 3);
    assert_eq!(first.next_token(), Some("p2"));
    let mut transactions: Vec<CardTransaction> = first.into_entities();

    // Later pages are requested through the generic fetch with the continuation token.
    let second = api_client
        .fetch::<CardTransaction, _>(
            "/v1/me/card/transactions",
            &[("nextToken", "p2".to_string())],
            &http_client,
        )
        .panic_if_fail("failed to list transactions");
    assert_eq!(second.next_token(), None);
    transactions.extend(second.into_entities());

    assert_eq!(
        transactions
            .iter()
            .filter_map(|transaction| transaction.amount)
            .sum::<f64>(),
        -6.0
    );
    assert_eq!(
        *seen.borrow(),
        vec![
            "http://127.0.0.1:8080/api/v1/me/card/transactions?beginDate=1619881405000&endDate=1619967805000"
                .to_string(),
            "http://127.0.0.1:8080/api/v1/me/card/transactions?nextToken=p2".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_api_async() {
    init_log("test_api_async");

    let provider = MockProvider::new(None).with_api_entities(json!([{
        "account": "test",
        "name": "张三",
        "positions": [{
            "post": {"postCode": "P01", "postName": "教师", "formal": true},
            "dept": {"organizeId": "03700", "organizeName": "软件学院"}
        }]
    }]));
    let http_client = |request: HttpRequest| provider.respond_async(request);
    let api_client = test_api_client();

    let positions = api_client
        .user_positions_async(&http_client)
        .await
        .panic_if_fail("failed to fetch positions");
    assert_eq!(positions.name.as_deref(), Some("张三"));
    assert_eq!(
        positions.positions.as_ref().expect("missing positions")[0]
            .dept
            .as_ref()
            .and_then(|dept| dept.organize_name.as_deref()),
        Some("软件学院")
    );

    let profile = api_client
        .profile_async(&http_client)
        .await
        .panic_if_fail("failed to fetch profile");
    assert_eq!(profile.account.as_deref(), Some("test"));

    let transactions = api_client
        .card_transactions_async(&CardTransactionsOptions::default(), &http_client)
        .await
        .panic_if_fail("failed to list transactions");
    assert_eq!(transactions.entities().len(), 1);

    assert_eq!(
        *provider.requests.borrow(),
        vec![
            "http://127.0.0.1:8080/api/v1/enterprise/user/positions".to_string(),
            "http://127.0.0.1:8080/api/v1/me/profile".to_string(),
            "http://127.0.0.1:8080/api/v1/me/card/transactions".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_api_async_errors() {
    init_log("test_api_async_errors");

    let http_client = |_: HttpRequest| async {
        Ok::<_, FakeError>(json_response(
            StatusCode::FORBIDDEN,
            json!({"errno": 40301, "error": "scope not granted"}).to_string(),
        ))
    };
    match test_api_client().card_info_async(&http_client).await {
        Err(ApiError::Api {
            status,
            errno,
            error,
        }) => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(errno, 40301);
            assert_eq!(error, "scope not granted");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let http_client = |_: HttpRequest| async { Err::<HttpResponse, _>(FakeError::ConnectionRefused) };
    let err = test_api_client()
        .profile_async(&http_client)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Request(FakeError::ConnectionRefused)));
}

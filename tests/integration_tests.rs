use chrono::{Duration, Utc};
use donation_auction::handlers;
use donation_auction::notification::ChatSession;
use donation_auction::query::queries::CHAT_SESSIONS;
use donation_auction::session::{USER_ID_HEADER, USER_NAME_HEADER};
use donation_auction::store::memory::MemoryStore;
use donation_auction::store::{to_fields, DocPath, DocumentStore};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

/// 메모리 저장소로 서버를 띄우고 주소 반환
async fn spawn_server() -> (String, Arc<dyn DocumentStore>) {
    let store = MemoryStore::shared();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = handlers::router(Arc::clone(&store));
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (format!("http://{}", addr), store)
}

/// 테스트용 경매 생성
async fn create_test_auction(client: &Client, base: &str, starting_price: i64) -> Value {
    let response = client
        .post(format!("{}/auctions", base))
        .json(&json!({
            "title": "기부 경매 테스트 상품",
            "description": "입찰 기능 테스트를 위한 상품입니다.",
            "startingPrice": starting_price,
            "endTime": Utc::now() + Duration::hours(1),
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

async fn post_bid(
    client: &Client,
    base: &str,
    item_id: &str,
    user: Option<(&str, &str)>,
    body: Value,
) -> reqwest::Response {
    let mut request = client
        .post(format!("{}/auctions/{}/bids", base, item_id))
        .json(&body);
    if let Some((id, name)) = user {
        request = request
            .header(USER_ID_HEADER, id)
            .header(USER_NAME_HEADER, name);
    }
    request.send().await.expect("Failed to send request")
}

/// 경매 생성 및 조회
#[tokio::test]
async fn test_create_and_get_auction() {
    let (base, _store) = spawn_server().await;
    let client = Client::new();

    let created = create_test_auction(&client, &base, 1000).await;
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["currentBid"], 1000);
    assert_eq!(created["status"], "active");

    let item: Value = client
        .get(format!("{}/auctions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["title"], "기부 경매 테스트 상품");
    assert_ne!(item["timeRemaining"], "경매 종료");

    let items: Vec<Value> = client
        .get(format!("{}/auctions", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items.len(), 1);

    let missing = client
        .get(format!("{}/auctions/missing", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

/// 입찰 테스트
#[tokio::test]
async fn test_place_bid() {
    let (base, _store) = spawn_server().await;
    let client = Client::new();
    let item = create_test_auction(&client, &base, 1000).await;
    let id = item["id"].as_str().unwrap();

    // 로그인 정보 없이 입찰하면 거절
    let response = post_bid(&client, &base, id, None, json!({ "amount": 2000 })).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = post_bid(
        &client,
        &base,
        id,
        Some(("user-1", "hong")),
        json!({ "amount": 2000, "displayedBid": 1000 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["currentBid"], 2000);
    assert_eq!(body["receipt"]["previousBid"], 1000);

    // 같은 금액은 충돌
    let response = post_bid(
        &client,
        &base,
        id,
        Some(("user-2", "kim")),
        json!({ "amount": 2000 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "STALE_BID");
    assert_eq!(body["currentBid"], 2000);

    // 화면 금액 기준 사전 검증에서 걸러짐
    let response = post_bid(
        &client,
        &base,
        id,
        Some(("user-2", "kim")),
        json!({ "amount": 1500, "displayedBid": 2000 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post_bid(
        &client,
        &base,
        id,
        Some(("user-2", "kim")),
        json!({ "amount": -5 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bids: Vec<Value> = client
        .get(format!("{}/auctions/{}/bids", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0]["bidderName"], "hong");

    let item: Value = client
        .get(format!("{}/auctions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["highestBidderId"], "user-1");
}

/// 경매 종료 후 입찰
#[tokio::test]
async fn test_close_auction() {
    let (base, _store) = spawn_server().await;
    let client = Client::new();
    let item = create_test_auction(&client, &base, 1000).await;
    let id = item["id"].as_str().unwrap();

    let body: Value = client
        .post(format!("{}/auctions/{}/close", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["closed"], true);

    let response = post_bid(
        &client,
        &base,
        id,
        Some(("user-1", "hong")),
        json!({ "amount": 5000 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ALREADY_ENDED");

    let response = client
        .post(format!("{}/auctions/missing/close", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// 동시성 입찰 테스트
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bidding() {
    let (base, _store) = spawn_server().await;
    let client = Client::new();
    let item = create_test_auction(&client, &base, 1000).await;
    let id = item["id"].as_str().unwrap().to_string();

    let mut handles = vec![];
    for i in 1..=20 {
        let client = client.clone();
        let base = base.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let user = format!("user-{}", i);
            post_bid(
                &client,
                &base,
                &id,
                Some((user.as_str(), user.as_str())),
                json!({ "amount": 1000 + i * 1000 }),
            )
            .await
            .status()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        assert!(status == StatusCode::OK || status == StatusCode::CONFLICT);
        if status == StatusCode::OK {
            accepted += 1;
        }
    }

    let item: Value = client
        .get(format!("{}/auctions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(item["currentBid"], 21000);

    let bids: Vec<Value> = client
        .get(format!("{}/auctions/{}/bids", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bids.len(), accepted);
}

/// 알림 스트림 (SSE)
#[tokio::test]
async fn test_notification_stream() {
    let (base, store) = spawn_server().await;
    let client = Client::new();

    let unauthorized = client
        .get(format!("{}/notifications/stream", base))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let mut response = client
        .get(format!("{}/notifications/stream", base))
        .header(USER_ID_HEADER, "receiver-1")
        .header(USER_NAME_HEADER, "receiver")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let session = ChatSession {
        id: "chat-1".to_string(),
        participants: vec!["donor-1".to_string(), "receiver-1".to_string()],
        last_message: "후원 감사합니다".to_string(),
        last_sender_id: "donor-1".to_string(),
        last_updated: Utc::now() + Duration::seconds(1),
        donor_id: "donor-1".to_string(),
        donor_name: "기부자".to_string(),
        receiver_id: "receiver-1".to_string(),
        receiver_name: "수령자".to_string(),
    };
    store
        .set(
            DocPath::new(CHAT_SESSIONS, "chat-1"),
            to_fields(&session).unwrap(),
        )
        .await
        .unwrap();

    let received = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            bytes.extend_from_slice(&chunk);
            let text = String::from_utf8_lossy(&bytes);
            if text.contains("event: notification") && text.contains("후원 감사합니다") {
                break;
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
    .await
    .expect("알림 이벤트를 받지 못했습니다");

    assert!(received.contains("event: notification"));
    assert!(received.contains("기부자"));
}

use chrono::{Duration, Utc};
use donation_auction::bidding::{
    check_bid_intent, close_auction, close_expired_auctions, create_auction, place_bid,
    AuctionItem, AuctionStatus, BidError, NewAuction, PlaceBidCommand,
};
use donation_auction::query::{handlers, queries};
use donation_auction::store::memory::MemoryStore;
use donation_auction::store::{to_fields, DocumentStore};
use std::sync::Arc;
use tracing::info;

/// 트레이싱 초기화 (여러 테스트에서 호출해도 안전)
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// 테스트용 상품 저장 (종료 시각을 자유롭게 지정하기 위해 저장소에 직접 기록)
async fn seed_item(
    store: &dyn DocumentStore,
    id: &str,
    current_bid: i64,
    end_in: Duration,
) -> AuctionItem {
    let now = Utc::now();
    let item = AuctionItem {
        id: id.to_string(),
        title: format!("테스트 상품 {}", id),
        description: "기부 경매 테스트 상품입니다.".to_string(),
        image_url: String::new(),
        starting_price: current_bid,
        current_bid,
        highest_bidder_id: None,
        highest_bidder_name: None,
        end_time: now + end_in,
        status: AuctionStatus::Active,
        mission_id: None,
        created_at: now,
    };
    store
        .set(queries::auction_path(id), to_fields(&item).unwrap())
        .await
        .unwrap();
    item
}

fn bid(item_id: &str, bidder: &str, amount: i64) -> PlaceBidCommand {
    PlaceBidCommand {
        item_id: item_id.to_string(),
        bidder_id: bidder.to_string(),
        bidder_name: format!("{} 님", bidder),
        amount,
    }
}

async fn current(store: &dyn DocumentStore, id: &str) -> AuctionItem {
    handlers::get_auction(store, id).await.unwrap().unwrap()
}

/// 입찰 성공 시 최고가와 입찰 기록이 함께 반영된다
#[tokio::test]
async fn test_place_bid_updates_item_and_history() {
    init_tracing();
    let store = MemoryStore::shared();
    seed_item(store.as_ref(), "item-1", 1000, Duration::hours(1)).await;

    let receipt = place_bid(store.as_ref(), bid("item-1", "user-a", 1500))
        .await
        .unwrap();
    assert_eq!(receipt.previous_bid, 1000);
    assert_eq!(receipt.bid.amount, 1500);

    let item = current(store.as_ref(), "item-1").await;
    assert_eq!(item.current_bid, 1500);
    assert_eq!(item.highest_bidder_id.as_deref(), Some("user-a"));
    assert_eq!(item.highest_bidder_name.as_deref(), Some("user-a 님"));

    let history = handlers::bid_history(store.as_ref(), "item-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].bidder_id, "user-a");
    assert_eq!(history[0].amount, 1500);
    assert_eq!(history[0].id, receipt.bid.id);
}

/// 현재가와 같은 금액은 거절되고 아무것도 기록되지 않는다
#[tokio::test]
async fn test_equal_bid_is_rejected() {
    let store = MemoryStore::shared();
    seed_item(store.as_ref(), "item-1", 1000, Duration::hours(1)).await;

    place_bid(store.as_ref(), bid("item-1", "user-a", 1200))
        .await
        .unwrap();
    let err = place_bid(store.as_ref(), bid("item-1", "user-b", 1200))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BidError::StaleBid {
            amount: 1200,
            current_bid: 1200
        }
    );
    assert_eq!(err.code(), "STALE_BID");
    assert!(err.is_retryable());

    let item = current(store.as_ref(), "item-1").await;
    assert_eq!(item.highest_bidder_id.as_deref(), Some("user-a"));
    let history = handlers::bid_history(store.as_ref(), "item-1").await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_invalid_amount_and_missing_item() {
    let store = MemoryStore::shared();

    let err = place_bid(store.as_ref(), bid("item-1", "user-a", 0))
        .await
        .unwrap_err();
    assert_eq!(err, BidError::InvalidAmount(0));

    let err = place_bid(store.as_ref(), bid("missing", "user-a", 5000))
        .await
        .unwrap_err();
    assert_eq!(err, BidError::NotFound("missing".to_string()));
    assert_eq!(err.code(), "NOT_FOUND");
}

/// 종료 시각이 지났으면 상태가 아직 active여도 거절
#[tokio::test]
async fn test_bid_after_end_time_is_rejected() {
    let store = MemoryStore::shared();
    seed_item(store.as_ref(), "item-1", 1000, Duration::seconds(-5)).await;

    let err = place_bid(store.as_ref(), bid("item-1", "user-a", 2000))
        .await
        .unwrap_err();
    assert_eq!(err, BidError::AuctionEnded("item-1".to_string()));
    assert!(!err.is_retryable());

    let item = current(store.as_ref(), "item-1").await;
    assert_eq!(item.current_bid, 1000);
    assert!(handlers::bid_history(store.as_ref(), "item-1")
        .await
        .unwrap()
        .is_empty());
}

/// 화면 기준 사전 검증
#[test]
fn test_check_bid_intent() {
    assert_eq!(check_bid_intent(1500, 1000), Ok(()));
    assert_eq!(check_bid_intent(-10, 1000), Err(BidError::InvalidAmount(-10)));
    assert_eq!(
        check_bid_intent(1000, 1000),
        Err(BidError::StaleBid {
            amount: 1000,
            current_bid: 1000
        })
    );
}

/// 동시성 입찰 테스트
/// 최고 금액은 항상 낙찰 후보가 되고, 수락된 입찰마다 기록이 정확히 하나씩 남는다.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bidding() {
    init_tracing();
    let store: Arc<dyn DocumentStore> = MemoryStore::shared();
    seed_item(store.as_ref(), "item-1", 1000, Duration::hours(1)).await;

    let mut handles = vec![];
    for i in 1..=30 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            place_bid(store.as_ref(), bid("item-1", &format!("user-{}", i), 1000 + i * 100)).await
        }));
    }

    let mut accepted = vec![];
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => accepted.push(receipt),
            Err(BidError::StaleBid { .. }) => {}
            Err(e) => panic!("예상하지 못한 오류: {:?}", e),
        }
    }
    info!("수락된 입찰 {}건", accepted.len());

    let item = current(store.as_ref(), "item-1").await;
    assert_eq!(item.current_bid, 4000);
    assert_eq!(item.highest_bidder_id.as_deref(), Some("user-30"));

    let history = handlers::bid_history(store.as_ref(), "item-1").await.unwrap();
    assert_eq!(history.len(), accepted.len());

    // 수락 순서대로 최고가가 엄격히 증가하고, 각 입찰은 직전 수락 금액을 넘어섰다
    accepted.sort_by_key(|receipt| receipt.bid.amount);
    let mut previous = 1000;
    for receipt in &accepted {
        assert_eq!(receipt.previous_bid, previous);
        assert!(receipt.bid.amount > previous);
        previous = receipt.bid.amount;
    }
}

/// 같은 금액이 동시에 들어오면 하나만 수락
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_equal_bids() {
    let store: Arc<dyn DocumentStore> = MemoryStore::shared();
    seed_item(store.as_ref(), "item-1", 1000, Duration::hours(1)).await;

    let mut handles = vec![];
    for i in 1..=10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            place_bid(store.as_ref(), bid("item-1", &format!("user-{}", i), 5000)).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    let history = handlers::bid_history(store.as_ref(), "item-1").await.unwrap();
    assert_eq!(history.len(), 1);
}

/// 경매 생성 검증
#[tokio::test]
async fn test_create_auction() {
    let store = MemoryStore::shared();
    let new_auction = NewAuction {
        title: "기부 경매".to_string(),
        description: "미션 후원 상품".to_string(),
        image_url: String::new(),
        starting_price: 3000,
        end_time: Utc::now() + Duration::days(1),
        mission_id: Some("mission-1".to_string()),
    };

    let item = create_auction(store.as_ref(), new_auction.clone())
        .await
        .unwrap();
    assert!(!item.id.is_empty());
    assert_eq!(item.current_bid, 3000);
    assert_eq!(item.status, AuctionStatus::Active);
    assert_eq!(current(store.as_ref(), &item.id).await, item);

    let listed = handlers::list_auctions(store.as_ref()).await.unwrap();
    assert_eq!(listed.len(), 1);

    let err = create_auction(
        store.as_ref(),
        NewAuction {
            starting_price: 0,
            ..new_auction.clone()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_AUCTION");

    let err = create_auction(
        store.as_ref(),
        NewAuction {
            end_time: Utc::now() - Duration::minutes(1),
            ..new_auction
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_AUCTION");
}

/// 관리자 종료 후에는 입찰 불가
#[tokio::test]
async fn test_close_auction() {
    let store = MemoryStore::shared();
    seed_item(store.as_ref(), "item-1", 1000, Duration::hours(1)).await;

    assert!(close_auction(store.as_ref(), "item-1").await.unwrap());
    assert!(!close_auction(store.as_ref(), "item-1").await.unwrap());
    assert_eq!(
        current(store.as_ref(), "item-1").await.status,
        AuctionStatus::Ended
    );

    let err = place_bid(store.as_ref(), bid("item-1", "user-a", 2000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_ENDED");

    assert_eq!(
        close_auction(store.as_ref(), "missing").await,
        Err(BidError::NotFound("missing".to_string()))
    );
}

/// 기간 만료 경매만 종료
#[tokio::test]
async fn test_close_expired_auctions() {
    let store = MemoryStore::shared();
    seed_item(store.as_ref(), "expired-1", 1000, Duration::seconds(-30)).await;
    seed_item(store.as_ref(), "expired-2", 1000, Duration::seconds(-1)).await;
    seed_item(store.as_ref(), "running", 1000, Duration::hours(1)).await;

    let closed = close_expired_auctions(store.as_ref(), Utc::now())
        .await
        .unwrap();
    assert_eq!(closed, 2);

    assert_eq!(
        current(store.as_ref(), "expired-1").await.status,
        AuctionStatus::Ended
    );
    assert_eq!(
        current(store.as_ref(), "running").await.status,
        AuctionStatus::Active
    );

    // 다시 돌려도 이미 종료된 경매는 건드리지 않는다
    let closed = close_expired_auctions(store.as_ref(), Utc::now())
        .await
        .unwrap();
    assert_eq!(closed, 0);
}

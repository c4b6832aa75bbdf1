/// 입찰 관련 커맨드 처리
/// 1. 입찰
/// 2. 경매 생성
/// 3. 경매 종료 (관리자 종료, 기간 만료)
// region:    --- Imports
use super::error::BidError;
use super::model::{AuctionItem, AuctionStatus, Bid, NewAuction};
use crate::query::queries;
use crate::store::{
    new_document_id, to_fields, DocPath, DocumentStore, Fields, StoreError, Transaction,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands
/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub item_id: String,
    pub bidder_id: String,
    pub bidder_name: String,
    pub amount: i64,
}

/// 입찰 성공 결과
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidReceipt {
    pub item_id: String,
    pub previous_bid: i64,
    pub bid: Bid,
}

// 최대 재시도 횟수
pub const MAX_RETRIES: i32 = 100;

fn store_failure(e: StoreError) -> BidError {
    BidError::TransactionFailed(e.to_string())
}

/// 입찰 전 클라이언트 측 사전 검증
/// 화면에 표시된(오래되었을 수 있는) 최고가 기준이며, 최종 판단은 `place_bid`의 트랜잭션이 한다.
pub fn check_bid_intent(amount: i64, displayed_bid: i64) -> Result<(), BidError> {
    if amount <= 0 {
        return Err(BidError::InvalidAmount(amount));
    }
    if amount <= displayed_bid {
        return Err(BidError::StaleBid {
            amount,
            current_bid: displayed_bid,
        });
    }
    Ok(())
}

/// 1. 입찰
/// 트랜잭션 안에서 읽은 최고가보다 엄격히 높을 때만 최고가 갱신과 입찰 기록 생성을 함께 커밋한다.
pub async fn place_bid(
    store: &dyn DocumentStore,
    cmd: PlaceBidCommand,
) -> Result<BidReceipt, BidError> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);
    if cmd.amount <= 0 {
        return Err(BidError::InvalidAmount(cmd.amount));
    }

    let item_path = queries::auction_path(&cmd.item_id);
    let mut retries = 0;

    while retries < MAX_RETRIES {
        let mut tx = store.begin().await.map_err(store_failure)?;

        // 트랜잭션 안에서 최신 상태 조회
        let document = tx
            .get(&item_path)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| BidError::NotFound(cmd.item_id.clone()))?;
        let item = AuctionItem::from_document(&document).map_err(store_failure)?;

        let now = Utc::now();

        // 경매 상태 및 시간 검증
        if !item.is_open_at(now) {
            return Err(BidError::AuctionEnded(cmd.item_id.clone()));
        }

        // 동일 금액은 도착 순서와 무관하게 거절
        if cmd.amount <= item.current_bid {
            return Err(BidError::StaleBid {
                amount: cmd.amount,
                current_bid: item.current_bid,
            });
        }

        let bid = Bid {
            id: new_document_id(),
            bidder_id: cmd.bidder_id.clone(),
            bidder_name: cmd.bidder_name.clone(),
            amount: cmd.amount,
            timestamp: now,
        };

        let mut changes = Fields::new();
        changes.insert("currentBid".to_string(), json!(cmd.amount));
        changes.insert("highestBidderId".to_string(), json!(cmd.bidder_id));
        changes.insert("highestBidderName".to_string(), json!(cmd.bidder_name));

        tx.update(item_path.clone(), changes);
        tx.create(
            DocPath::new(queries::bids_collection(&cmd.item_id), bid.id.clone()),
            to_fields(&bid).map_err(store_failure)?,
        );

        match tx.commit().await {
            Ok(()) => {
                info!(
                    "{:<12} --> 입찰 성공: item={}, {} -> {}",
                    "Command", cmd.item_id, item.current_bid, cmd.amount
                );
                return Ok(BidReceipt {
                    item_id: cmd.item_id,
                    previous_bid: item.current_bid,
                    bid,
                });
            }
            Err(StoreError::Conflict) => {
                warn!(
                    "{:<12} --> 낙관적 업데이트로 인한 버전 충돌: 재시도",
                    "Command"
                );
                retries += 1;
            }
            Err(e) => return Err(store_failure(e)),
        }
    }

    Err(BidError::TransactionFailed("최대 재시도 횟수 초과".to_string()))
}

/// 2. 경매 생성
pub async fn create_auction(
    store: &dyn DocumentStore,
    new_auction: NewAuction,
) -> Result<AuctionItem, BidError> {
    info!("{:<12} --> 경매 생성 요청: {}", "Command", new_auction.title);
    let now = Utc::now();

    if new_auction.title.trim().is_empty() {
        return Err(BidError::InvalidAuction("제목이 비어 있습니다.".to_string()));
    }
    if new_auction.starting_price <= 0 {
        return Err(BidError::InvalidAuction(format!(
            "시작가는 0보다 커야 합니다: {}",
            new_auction.starting_price
        )));
    }
    if new_auction.end_time <= now {
        return Err(BidError::InvalidAuction(
            "종료 시각이 이미 지났습니다.".to_string(),
        ));
    }

    let mut item = AuctionItem {
        id: String::new(),
        title: new_auction.title,
        description: new_auction.description,
        image_url: new_auction.image_url,
        starting_price: new_auction.starting_price,
        current_bid: new_auction.starting_price,
        highest_bidder_id: None,
        highest_bidder_name: None,
        end_time: new_auction.end_time,
        status: AuctionStatus::Active,
        mission_id: new_auction.mission_id,
        created_at: now,
    };

    let fields = item.to_fields().map_err(store_failure)?;
    let path = store
        .add(queries::AUCTIONS, fields)
        .await
        .map_err(store_failure)?;
    item.id = path.id;
    info!("{:<12} --> 경매 생성 완료: id={}", "Command", item.id);
    Ok(item)
}

/// 3. 경매 종료
/// 이미 종료된 경매면 false를 반환한다.
pub async fn close_auction(store: &dyn DocumentStore, item_id: &str) -> Result<bool, BidError> {
    let item_path = queries::auction_path(item_id);
    let mut retries = 0;

    while retries < MAX_RETRIES {
        let mut tx = store.begin().await.map_err(store_failure)?;
        let document = tx
            .get(&item_path)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| BidError::NotFound(item_id.to_string()))?;
        let item = AuctionItem::from_document(&document).map_err(store_failure)?;

        if item.status == AuctionStatus::Ended {
            return Ok(false);
        }

        let mut changes = Fields::new();
        changes.insert("status".to_string(), json!(AuctionStatus::Ended));
        tx.update(item_path.clone(), changes);

        match tx.commit().await {
            Ok(()) => {
                info!(
                    "{:<12} --> 경매 종료: id={}, 최종가 {}",
                    "Command", item_id, item.current_bid
                );
                return Ok(true);
            }
            Err(StoreError::Conflict) => retries += 1,
            Err(e) => return Err(store_failure(e)),
        }
    }

    Err(BidError::TransactionFailed("최대 재시도 횟수 초과".to_string()))
}

/// 종료 시각이 지난 진행 중 경매를 모두 종료
pub async fn close_expired_auctions(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
) -> Result<usize, BidError> {
    let documents = store
        .query(&queries::active_auctions())
        .await
        .map_err(store_failure)?;

    let mut closed = 0;
    for document in &documents {
        let item = match AuctionItem::from_document(document) {
            Ok(item) => item,
            Err(e) => {
                warn!("{:<12} --> 상품 문서 변환 실패: {}", "Command", e);
                continue;
            }
        };
        if item.end_time <= now && close_auction(store, &item.id).await? {
            closed += 1;
        }
    }
    Ok(closed)
}

// endregion: --- Commands

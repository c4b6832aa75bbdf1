// region:    --- Imports
use super::queries;
use crate::bidding::model::{AuctionItem, Bid};
use crate::store::{DocumentStore, StoreError};
use tracing::info;

// endregion: --- Imports

// region:    --- Query Handlers

/// 상품 조회
pub async fn get_auction(
    store: &dyn DocumentStore,
    item_id: &str,
) -> Result<Option<AuctionItem>, StoreError> {
    info!("{:<12} --> 상품 조회 id: {}", "Query", item_id);
    store
        .get(&queries::auction_path(item_id))
        .await?
        .as_ref()
        .map(AuctionItem::from_document)
        .transpose()
}

/// 모든 상품 조회
pub async fn list_auctions(store: &dyn DocumentStore) -> Result<Vec<AuctionItem>, StoreError> {
    info!("{:<12} --> 모든 상품 조회", "Query");
    store
        .query(&queries::all_auctions())
        .await?
        .iter()
        .map(AuctionItem::from_document)
        .collect()
}

/// 입찰 이력 조회
pub async fn bid_history(store: &dyn DocumentStore, item_id: &str) -> Result<Vec<Bid>, StoreError> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "Query", item_id);
    store
        .query(&queries::bid_history(item_id))
        .await?
        .iter()
        .map(Bid::from_document)
        .collect()
}

// endregion: --- Query Handlers

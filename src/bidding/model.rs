use crate::store::{to_fields, Document, Fields, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Active,
    Ended,
}

// 경매 상품 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionItem {
    #[serde(skip)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub starting_price: i64,
    pub current_bid: i64,
    #[serde(default)]
    pub highest_bidder_id: Option<String>,
    #[serde(default)]
    pub highest_bidder_name: Option<String>,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    #[serde(default)]
    pub mission_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuctionItem {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut item: AuctionItem = document.decode()?;
        item.id = document.id.clone();
        Ok(item)
    }

    pub fn to_fields(&self) -> Result<Fields, StoreError> {
        to_fields(self)
    }

    /// 입찰 가능 여부 (종료 상태가 아니고 종료 시각 전)
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && now < self.end_time
    }
}

// 입찰 모델 (상품의 하위 컬렉션, 생성 후 변경 없음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    #[serde(skip)]
    pub id: String,
    pub bidder_id: String,
    pub bidder_name: String,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

impl Bid {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut bid: Bid = document.decode()?;
        bid.id = document.id.clone();
        Ok(bid)
    }
}

// 경매 생성 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuction {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub starting_price: i64,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub mission_id: Option<String>,
}

/// 경매 상태 업데이트 스케줄러
/// 종료 시각이 지난 진행 중 경매를 주기적으로 종료 상태로 바꾼다.
/// 입찰 엔진은 종료 시각을 직접 확인하므로, 이 작업은 저장된 상태를 맞추는 용도다.
// region:    --- Imports
use crate::bidding::commands::close_expired_auctions;
use crate::store::DocumentStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

// endregion: --- Imports

// region:    --- Auction Scheduler
/// 경매 상태 업데이트 스케줄러
pub struct AuctionScheduler {
    store: Arc<dyn DocumentStore>,
    period: Duration,
}

/// 경매 상태 업데이트 스케줄러 생성
impl AuctionScheduler {
    pub fn new(store: Arc<dyn DocumentStore>, period: Duration) -> Self {
        Self { store, period }
    }

    /// 경매 상태 업데이트 스케줄러 시작
    pub fn start(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let period = self.period;
        tokio::spawn(async move {
            let mut interval = interval(period);
            loop {
                interval.tick().await;
                Self::update_auction_statuses(store.as_ref()).await;
            }
        })
    }

    /// 경매 상태 업데이트
    async fn update_auction_statuses(store: &dyn DocumentStore) {
        match close_expired_auctions(store, Utc::now()).await {
            Ok(0) => debug!("{:<12} --> 종료할 경매 없음", "Scheduler"),
            Ok(closed) => info!("{:<12} --> 기간 만료 경매 {}건 종료", "Scheduler", closed),
            Err(e) => error!(
                "{:<12} --> 경매 상태 업데이트 중 오류 발생: {:?}",
                "Scheduler", e
            ),
        }
    }
}
// endregion: --- Auction Scheduler

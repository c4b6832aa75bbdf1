/// 입찰/경매 명령 오류
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BidError {
    #[error("입찰 금액은 0보다 커야 합니다: {0}")]
    InvalidAmount(i64),
    #[error("잘못된 경매 정보입니다: {0}")]
    InvalidAuction(String),
    #[error("존재하지 않는 경매입니다: {0}")]
    NotFound(String),
    #[error("경매가 이미 종료되었습니다: {0}")]
    AuctionEnded(String),
    #[error("입찰 금액({amount})이 현재 최고가({current_bid})보다 높아야 합니다")]
    StaleBid { amount: i64, current_bid: i64 },
    #[error("트랜잭션 실패: {0}")]
    TransactionFailed(String),
}

impl BidError {
    /// 클라이언트용 오류 코드
    pub fn code(&self) -> &'static str {
        match self {
            BidError::InvalidAmount(_) => "INVALID_AMOUNT",
            BidError::InvalidAuction(_) => "INVALID_AUCTION",
            BidError::NotFound(_) => "NOT_FOUND",
            BidError::AuctionEnded(_) => "ALREADY_ENDED",
            BidError::StaleBid { .. } => "STALE_BID",
            BidError::TransactionFailed(_) => "TRANSACTION_FAILED",
        }
    }

    /// 같은 요청(또는 더 높은 금액)으로 다시 시도할 수 있는지
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BidError::StaleBid { .. } | BidError::TransactionFailed(_)
        )
    }
}

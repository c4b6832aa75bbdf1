use crate::store::{DocPath, Direction, Query};

/// 경매 상품 컬렉션
pub const AUCTIONS: &str = "auctions";

/// 채팅 세션 컬렉션
pub const CHAT_SESSIONS: &str = "chatSessions";

/// 친구 요청 컬렉션
pub const FRIEND_REQUESTS: &str = "friendRequests";

/// 상품 문서 경로
pub fn auction_path(item_id: &str) -> DocPath {
    DocPath::new(AUCTIONS, item_id)
}

/// 상품별 입찰 하위 컬렉션
pub fn bids_collection(item_id: &str) -> String {
    format!("{}/{}/bids", AUCTIONS, item_id)
}

/// 모든 상품 조회 (최신순)
pub fn all_auctions() -> Query {
    Query::new(AUCTIONS).order_by("createdAt", Direction::Desc)
}

/// 진행 중인 상품 조회
pub fn active_auctions() -> Query {
    Query::new(AUCTIONS).where_eq("status", "active")
}

/// 입찰 이력 조회 (최신순)
pub fn bid_history(item_id: &str) -> Query {
    Query::new(bids_collection(item_id)).order_by("timestamp", Direction::Desc)
}

/// 사용자가 참여한 채팅 세션
pub fn chat_sessions_for(user_id: &str) -> Query {
    Query::new(CHAT_SESSIONS).where_array_contains("participants", user_id)
}

/// 사용자에게 온 대기 중인 친구 요청
pub fn pending_requests_for(user_id: &str) -> Query {
    Query::new(FRIEND_REQUESTS)
        .where_eq("toUserId", user_id)
        .where_eq("status", "pending")
}

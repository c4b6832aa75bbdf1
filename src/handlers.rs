// region:    --- Imports
use crate::bidding::commands::{
    check_bid_intent, close_auction, create_auction, place_bid, PlaceBidCommand,
};
use crate::bidding::countdown::time_remaining;
use crate::bidding::error::BidError;
use crate::bidding::model::NewAuction;
use crate::notification::NotificationFanout;
use crate::query;
use crate::session::UserIdentity;
use crate::store::{DocumentStore, StoreError};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Router
pub type AppState = Arc<dyn DocumentStore>;

/// 라우터 설정
pub fn router(store: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auctions", post(handle_create_auction).get(handle_get_auctions))
        .route("/auctions/:id", get(handle_get_auction))
        .route(
            "/auctions/:id/bids",
            post(handle_place_bid).get(handle_get_bid_history),
        )
        .route("/auctions/:id/close", post(handle_close_auction))
        .route("/notifications/stream", get(handle_notification_stream))
        .layer(cors)
        .with_state(store)
}

// endregion: --- Router

// region:    --- Error Responses
impl IntoResponse for BidError {
    fn into_response(self) -> Response {
        let status = match &self {
            BidError::InvalidAmount(_) | BidError::InvalidAuction(_) => StatusCode::BAD_REQUEST,
            BidError::NotFound(_) => StatusCode::NOT_FOUND,
            BidError::AuctionEnded(_) | BidError::StaleBid { .. } => StatusCode::CONFLICT,
            BidError::TransactionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        // 거절된 입찰은 현재 최고가를 다시 보여준다
        if let BidError::StaleBid { current_bid, .. } = &self {
            body["currentBid"] = serde_json::json!(current_bid);
        }
        (status, Json(body)).into_response()
    }
}

fn store_error(e: StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string(), "code": "STORE_ERROR" })),
    )
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "로그인이 필요합니다.", "code": "UNAUTHORIZED" })),
    )
        .into_response()
}

// endregion: --- Error Responses

// region:    --- Command Handlers

/// 입찰 요청 본문
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub amount: i64,
    /// 화면에 표시된 최고가 (사전 검증용)
    pub displayed_bid: Option<i64>,
}

/// 입찰 요청 처리
pub async fn handle_place_bid(
    State(store): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PlaceBidRequest>,
) -> Response {
    let Some(user) = UserIdentity::from_headers(&headers) else {
        return unauthorized();
    };
    info!(
        "{:<12} --> 입찰 요청: item={}, user={}, amount={}",
        "Handler", item_id, user.id, request.amount
    );

    // 화면 기준 사전 검증
    if let Some(displayed_bid) = request.displayed_bid {
        if let Err(e) = check_bid_intent(request.amount, displayed_bid) {
            return e.into_response();
        }
    }

    let cmd = PlaceBidCommand {
        item_id,
        bidder_id: user.id,
        bidder_name: user.display_name,
        amount: request.amount,
    };

    match place_bid(store.as_ref(), cmd).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "입찰이 성공적으로 처리되었습니다.",
                "currentBid": receipt.bid.amount,
                "receipt": receipt,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 생성 요청 처리
pub async fn handle_create_auction(
    State(store): State<AppState>,
    Json(new_auction): Json<NewAuction>,
) -> Response {
    match create_auction(store.as_ref(), new_auction).await {
        Ok(item) => (StatusCode::CREATED, Json(item_view(&item))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 종료 요청 처리
pub async fn handle_close_auction(
    State(store): State<AppState>,
    Path(item_id): Path<String>,
) -> Response {
    info!("{:<12} --> 경매 종료 요청: id={}", "Handler", item_id);
    match close_auction(store.as_ref(), &item_id).await {
        Ok(closed) => Json(serde_json::json!({ "id": item_id, "closed": closed })).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 상품 + 남은 시간
fn item_view(item: &crate::bidding::model::AuctionItem) -> serde_json::Value {
    let mut view = serde_json::to_value(item).unwrap_or_default();
    view["id"] = serde_json::json!(item.id);
    view["timeRemaining"] = serde_json::json!(time_remaining(item.end_time).to_string());
    view
}

/// 모든 상품 조회
pub async fn handle_get_auctions(State(store): State<AppState>) -> Response {
    match query::handlers::list_auctions(store.as_ref()).await {
        Ok(items) => Json(items.iter().map(item_view).collect::<Vec<_>>()).into_response(),
        Err(e) => store_error(e),
    }
}

/// 상품 조회
pub async fn handle_get_auction(
    State(store): State<AppState>,
    Path(item_id): Path<String>,
) -> Response {
    match query::handlers::get_auction(store.as_ref(), &item_id).await {
        Ok(Some(item)) => Json(item_view(&item)).into_response(),
        Ok(None) => BidError::NotFound(item_id).into_response(),
        Err(e) => store_error(e),
    }
}

/// 입찰 이력 조회
pub async fn handle_get_bid_history(
    State(store): State<AppState>,
    Path(item_id): Path<String>,
) -> Response {
    match query::handlers::bid_history(store.as_ref(), &item_id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(e) => store_error(e),
    }
}

// endregion: --- Query Handlers

// region:    --- Notification Stream

/// 알림 스트림 (SSE)
/// 연결이 유지되는 동안 로그인 상태로 보고, 연결이 끊기면 팬아웃이 정리된다.
pub async fn handle_notification_stream(
    State(store): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let Some(user) = UserIdentity::from_headers(&headers) else {
        return unauthorized();
    };
    info!("{:<12} --> 알림 스트림 연결: user={}", "Handler", user.id);

    let fanout = NotificationFanout::new(store);
    let events = fanout.events();
    fanout.login(user).await;

    let stream = futures::stream::unfold((fanout, events), |(fanout, mut events)| async move {
        loop {
            match events.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => return Some((Ok::<_, Infallible>(sse), (fanout, events))),
                    Err(e) => warn!("{:<12} --> 이벤트 직렬화 실패: {}", "Handler", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{:<12} --> 알림 이벤트 {}건 누락", "Handler", skipped)
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// endregion: --- Notification Stream

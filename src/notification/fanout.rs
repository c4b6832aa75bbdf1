/// 실시간 알림 팬아웃
/// 로그인한 사용자 기준으로 두 개의 구독(채팅 세션, 대기 중인 친구 요청)을 유지하고,
/// 세션 시작 이후에 생긴 변경에 대해서만 알림을 띄운다.
// region:    --- Imports
use super::center::{Channel, FanoutEvent, NotificationCenter, SubscriptionState};
use super::model::{ChatSession, FriendRequest, Notification, NotificationKind, PendingNotification};
use crate::query::queries;
use crate::session::{SessionContext, UserIdentity};
use crate::store::{ChangeKind, DocumentStore, Query, Subscription};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Notification Rules
/// 채팅 세션 변경에 대한 알림 판단
/// 세션 시작 이후 갱신, 내용 있음, 내가 보낸 메시지가 아님 세 조건을 모두 만족해야 한다.
pub fn chat_notification(
    session: &ChatSession,
    user: &UserIdentity,
    session_start: DateTime<Utc>,
) -> Option<PendingNotification> {
    if session.last_updated <= session_start
        || session.last_message.is_empty()
        || session.last_sender_id == user.id
    {
        return None;
    }
    Some(PendingNotification {
        kind: NotificationKind::Info,
        message: session.last_message.clone(),
        sender: Some(session.sender_name().to_string()),
    })
}

/// 친구 요청 변경에 대한 알림 판단 (새로 추가된 요청만)
pub fn friend_request_notification(
    kind: ChangeKind,
    request: &FriendRequest,
    session_start: DateTime<Utc>,
) -> Option<PendingNotification> {
    if kind != ChangeKind::Added || request.created_at <= session_start {
        return None;
    }
    Some(PendingNotification {
        kind: NotificationKind::Success,
        message: format!("{}님이 친구 요청을 보냈습니다.", request.from_user_name),
        sender: Some(request.from_user_name.clone()),
    })
}

// endregion: --- Notification Rules

// region:    --- Notification Fanout
#[derive(Clone)]
pub struct NotificationFanout {
    inner: Arc<FanoutInner>,
}

struct FanoutInner {
    store: Arc<dyn DocumentStore>,
    center: NotificationCenter,
    session: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    user: UserIdentity,
    started_at: DateTime<Utc>,
    workers: Vec<JoinHandle<()>>,
}

impl ActiveSession {
    fn stop(self) {
        for worker in self.workers {
            worker.abort();
        }
    }
}

impl Drop for FanoutInner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.stop();
        }
    }
}

/// 구독 작업이 공유하는 세션 정보
#[derive(Clone)]
struct WorkerContext {
    center: NotificationCenter,
    epoch: u64,
    user: UserIdentity,
    started_at: DateTime<Utc>,
}

impl NotificationFanout {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                store,
                center: NotificationCenter::new(),
                session: Mutex::new(None),
            }),
        }
    }

    /// 알림/배지 이벤트 수신기
    pub fn events(&self) -> broadcast::Receiver<FanoutEvent> {
        self.inner.center.subscribe()
    }

    /// 로그인: 기준 시각을 잡고 두 구독을 시작
    /// 다른 사용자의 세션이 남아 있으면 먼저 정리한다. 같은 사용자면 아무것도 하지 않는다.
    pub async fn login(&self, user: UserIdentity) {
        let mut session = self.inner.session.lock().await;
        if let Some(active) = session.as_ref() {
            if active.user.id == user.id {
                return;
            }
        }
        if let Some(previous) = session.take() {
            info!(
                "{:<12} --> 사용자 전환, 이전 세션 정리: {}",
                "Fanout", previous.user.id
            );
            previous.stop();
            self.inner.center.close_session().await;
        }

        let started_at = Utc::now();
        let epoch = self.inner.center.open_session().await;
        let ctx = WorkerContext {
            center: self.inner.center.clone(),
            epoch,
            user: user.clone(),
            started_at,
        };
        info!(
            "{:<12} --> 알림 구독 시작: user={}, since={}",
            "Fanout", user.id, started_at
        );

        let mut workers = Vec::with_capacity(2);
        let chat_query = queries::chat_sessions_for(&user.id);
        if let Some(subscription) = self.open(&ctx, Channel::ChatSessions, chat_query).await {
            workers.push(tokio::spawn(watch_chat_sessions(subscription, ctx.clone())));
        }
        let request_query = queries::pending_requests_for(&user.id);
        if let Some(subscription) = self.open(&ctx, Channel::FriendRequests, request_query).await {
            workers.push(tokio::spawn(watch_friend_requests(subscription, ctx.clone())));
        }

        *session = Some(ActiveSession {
            user,
            started_at,
            workers,
        });
    }

    /// 구독 시작. 실패하면 Stopped로 두고 None.
    async fn open(&self, ctx: &WorkerContext, channel: Channel, query: Query) -> Option<Subscription> {
        let center = &self.inner.center;
        center
            .set_subscription_state(ctx.epoch, channel, SubscriptionState::Subscribing)
            .await;
        match self.inner.store.subscribe(query).await {
            Ok(subscription) => {
                center
                    .set_subscription_state(ctx.epoch, channel, SubscriptionState::Active)
                    .await;
                Some(subscription)
            }
            Err(e) => {
                warn!(
                    "{:<12} --> 구독 실패 ({:?}): {}",
                    "Fanout", channel, e
                );
                center
                    .set_subscription_state(ctx.epoch, channel, SubscriptionState::Stopped)
                    .await;
                None
            }
        }
    }

    /// 로그아웃: 두 구독 취소, 목록 비우기, 배지 0
    pub async fn logout(&self) {
        let mut session = self.inner.session.lock().await;
        if let Some(previous) = session.take() {
            info!("{:<12} --> 알림 구독 종료: user={}", "Fanout", previous.user.id);
            previous.stop();
        }
        self.inner.center.close_session().await;
    }

    /// 세션 상태 변화에 따라 로그인/로그아웃
    pub fn follow(&self, session: &SessionContext) -> JoinHandle<()> {
        let fanout = self.clone();
        let mut identity = session.watch();
        tokio::spawn(async move {
            loop {
                let current = identity.borrow_and_update().clone();
                match current {
                    Some(user) => fanout.login(user).await,
                    None => fanout.logout().await,
                }
                if identity.changed().await.is_err() {
                    break;
                }
            }
            fanout.logout().await;
        })
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.inner.session.lock().await.as_ref().map(|s| s.user.clone())
    }

    /// 현재 세션의 기준 시각
    pub async fn session_start(&self) -> Option<DateTime<Utc>> {
        self.inner.session.lock().await.as_ref().map(|s| s.started_at)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.center.notifications().await
    }

    pub async fn pending_requests(&self) -> usize {
        self.inner.center.pending_requests().await
    }

    pub async fn subscription_state(&self, channel: Channel) -> SubscriptionState {
        self.inner.center.subscription_state(channel).await
    }
}

// endregion: --- Notification Fanout

// region:    --- Subscription Workers
/// 채팅 세션 구독 처리
async fn watch_chat_sessions(mut subscription: Subscription, ctx: WorkerContext) {
    while let Some(delivery) = subscription.next().await {
        let snapshot = match delivery {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{:<12} --> 채팅 구독 오류: {}", "Fanout", e);
                break;
            }
        };

        for change in &snapshot.changes {
            if change.kind == ChangeKind::Removed {
                continue;
            }
            let session = match ChatSession::from_document(&change.document) {
                Ok(session) => session,
                Err(e) => {
                    warn!("{:<12} --> 채팅 세션 변환 실패: {}", "Fanout", e);
                    continue;
                }
            };
            if let Some(pending) = chat_notification(&session, &ctx.user, ctx.started_at) {
                ctx.center.emit(ctx.epoch, pending).await;
            }
        }
    }
    ctx.center
        .set_subscription_state(ctx.epoch, Channel::ChatSessions, SubscriptionState::Stopped)
        .await;
}

/// 친구 요청 구독 처리
/// 배지 수는 매 전달마다 결과 집합 크기로 갱신하고, 알림은 새로 추가된 요청에만 띄운다.
async fn watch_friend_requests(mut subscription: Subscription, ctx: WorkerContext) {
    while let Some(delivery) = subscription.next().await {
        let snapshot = match delivery {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("{:<12} --> 친구 요청 구독 오류: {}", "Fanout", e);
                break;
            }
        };

        ctx.center.set_pending_requests(ctx.epoch, snapshot.len()).await;

        for change in &snapshot.changes {
            let request = match FriendRequest::from_document(&change.document) {
                Ok(request) => request,
                Err(e) => {
                    warn!("{:<12} --> 친구 요청 변환 실패: {}", "Fanout", e);
                    continue;
                }
            };
            if let Some(pending) = friend_request_notification(change.kind, &request, ctx.started_at) {
                ctx.center.emit(ctx.epoch, pending).await;
            }
        }
    }
    ctx.center
        .set_subscription_state(ctx.epoch, Channel::FriendRequests, SubscriptionState::Stopped)
        .await;
}

// endregion: --- Subscription Workers

// endregion: --- Tests

/// 세션 단위 알림 목록
/// 1. 알림 추가 및 5초 후 자동 제거
/// 2. 대기 중인 친구 요청 수(배지)
/// 3. 구독 상태
// region:    --- Imports
use super::model::{Notification, PendingNotification};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

// endregion: --- Imports

// region:    --- Types
/// 알림 유지 시간
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(5000);

static NOTIFICATION_SEQ: AtomicU64 = AtomicU64::new(1);

/// 구독 채널
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    ChatSessions,
    FriendRequests,
}

/// 구독 하나의 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    Subscribing,
    Active,
    /// 저장소 오류 등으로 멈춘 상태 (자체 재시도 없음)
    Stopped,
}

/// 화면 쪽으로 흘려보내는 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FanoutEvent {
    Notification(Notification),
    Expired { id: u64 },
    PendingRequests { count: usize },
}

impl FanoutEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FanoutEvent::Notification(_) => "notification",
            FanoutEvent::Expired { .. } => "expired",
            FanoutEvent::PendingRequests { .. } => "pendingRequests",
        }
    }
}

// endregion: --- Types

// region:    --- Notification Center
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

struct CenterInner {
    state: Mutex<CenterState>,
    events: broadcast::Sender<FanoutEvent>,
}

#[derive(Default)]
struct CenterState {
    /// 로그인/로그아웃마다 증가. 이전 세션의 작업이 보낸 값은 버린다.
    epoch: u64,
    notifications: Vec<Notification>,
    pending_requests: usize,
    chat_sessions: SubscriptionState,
    friend_requests: SubscriptionState,
}

impl CenterState {
    fn channel_mut(&mut self, channel: Channel) -> &mut SubscriptionState {
        match channel {
            Channel::ChatSessions => &mut self.chat_sessions,
            Channel::FriendRequests => &mut self.friend_requests,
        }
    }

    fn reset(&mut self) {
        self.epoch += 1;
        self.notifications.clear();
        self.pending_requests = 0;
        self.chat_sessions = SubscriptionState::Unsubscribed;
        self.friend_requests = SubscriptionState::Unsubscribed;
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(CenterInner {
                state: Mutex::new(CenterState::default()),
                events,
            }),
        }
    }

    /// 이벤트 수신기
    pub fn subscribe(&self) -> broadcast::Receiver<FanoutEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: FanoutEvent) {
        // 수신자가 없어도 무시
        let _ = self.inner.events.send(event);
    }

    /// 새 세션 시작. 새 epoch 반환.
    pub async fn open_session(&self) -> u64 {
        let mut state = self.inner.state.lock().await;
        state.reset();
        state.epoch
    }

    /// 세션 종료: 목록 비우기, 배지 0, 이후 이전 세션의 값은 모두 무시
    pub async fn close_session(&self) {
        let mut state = self.inner.state.lock().await;
        state.reset();
        self.publish(FanoutEvent::PendingRequests { count: 0 });
    }

    /// 알림 추가. 세션이 바뀌었으면 None.
    pub async fn emit(&self, epoch: u64, pending: PendingNotification) -> Option<Notification> {
        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            return None;
        }

        let notification = Notification {
            id: NOTIFICATION_SEQ.fetch_add(1, Ordering::Relaxed),
            kind: pending.kind,
            message: pending.message,
            sender: pending.sender,
        };
        state.notifications.push(notification.clone());
        self.publish(FanoutEvent::Notification(notification.clone()));
        drop(state);

        // 개별 알림의 만료는 취소하지 않는다
        let center = self.clone();
        let id = notification.id;
        tokio::spawn(async move {
            tokio::time::sleep(NOTIFICATION_TTL).await;
            center.expire(id).await;
        });

        debug!("{:<12} --> 알림 추가: id={}", "Notification", id);
        Some(notification)
    }

    async fn expire(&self, id: u64) {
        let mut state = self.inner.state.lock().await;
        let before = state.notifications.len();
        state.notifications.retain(|n| n.id != id);
        if state.notifications.len() != before {
            self.publish(FanoutEvent::Expired { id });
        }
    }

    pub async fn set_pending_requests(&self, epoch: u64, count: usize) {
        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        state.pending_requests = count;
        self.publish(FanoutEvent::PendingRequests { count });
    }

    pub async fn set_subscription_state(&self, epoch: u64, channel: Channel, next: SubscriptionState) {
        let mut state = self.inner.state.lock().await;
        if state.epoch == epoch {
            *state.channel_mut(channel) = next;
        }
    }

    /// 현재 떠 있는 알림
    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.state.lock().await.notifications.clone()
    }

    pub async fn pending_requests(&self) -> usize {
        self.inner.state.lock().await.pending_requests
    }

    pub async fn subscription_state(&self, channel: Channel) -> SubscriptionState {
        *self.inner.state.lock().await.channel_mut(channel)
    }
}

// endregion: --- Notification Center

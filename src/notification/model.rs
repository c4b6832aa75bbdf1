use crate::store::{Document, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 알림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// 화면에 잠깐 떴다 사라지는 알림 (저장하지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    pub sender: Option<String>,
}

/// 아직 id가 붙지 않은 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub kind: NotificationKind,
    pub message: String,
    pub sender: Option<String>,
}

// 채팅 세션 (알림에 필요한 필드만)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(skip)]
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_sender_id: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub donor_id: String,
    #[serde(default)]
    pub donor_name: String,
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub receiver_name: String,
}

impl ChatSession {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut session: ChatSession = document.decode()?;
        session.id = document.id.clone();
        Ok(session)
    }

    /// 마지막 발신자의 표시 이름 (기부자/수령자 역할로 판별)
    pub fn sender_name(&self) -> &str {
        if self.last_sender_id == self.donor_id {
            &self.donor_name
        } else {
            &self.receiver_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

// 친구 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    #[serde(skip)]
    pub id: String,
    pub from_user_id: String,
    pub from_user_name: String,
    pub to_user_id: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut request: FriendRequest = document.decode()?;
        request.id = document.id.clone();
        Ok(request)
    }
}

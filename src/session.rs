/// 인증된 사용자 정보와 현재 세션
// region:    --- Imports
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

// endregion: --- Imports

// region:    --- User Identity
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// 인증 제공자가 넘겨주는 사용자 식별 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// 게이트웨이가 채워 주는 헤더에서 사용자 정보 추출
    /// 이름 헤더가 없으면 id를 이름으로 사용한다.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let id = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim();
        if id.is_empty() {
            return None;
        }
        let name = headers
            .get(USER_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(id);
        Some(Self::new(id, name))
    }
}

// endregion: --- User Identity

// region:    --- Session Context
/// 현재 로그인한 사용자를 관찰 가능하게 보관
#[derive(Clone)]
pub struct SessionContext {
    current: Arc<watch::Sender<Option<UserIdentity>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            current: Arc::new(sender),
        }
    }

    pub fn sign_in(&self, user: UserIdentity) {
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        self.current.send_replace(None);
    }

    pub fn current(&self) -> Option<UserIdentity> {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.current.subscribe()
    }
}

// endregion: --- Session Context

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_requires_user_id_header() {
        let mut headers = HeaderMap::new();
        assert!(UserIdentity::from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        assert_eq!(
            UserIdentity::from_headers(&headers),
            Some(UserIdentity::new("u1", "u1"))
        );

        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Mina"));
        assert_eq!(
            UserIdentity::from_headers(&headers),
            Some(UserIdentity::new("u1", "Mina"))
        );
    }

    #[test]
    fn session_context_tracks_sign_in_and_out() {
        let session = SessionContext::new();
        let watcher = session.watch();
        session.sign_in(UserIdentity::new("u1", "Mina"));
        assert_eq!(session.current().map(|u| u.id), Some("u1".to_string()));
        assert!(watcher.has_changed().unwrap());
        session.sign_out();
        assert!(session.current().is_none());
    }
}

/// 문서 저장소 계약
/// 1. 문서/경로/필드 모델
/// 2. 낙관적 동시성 트랜잭션
/// 3. 실시간 구독(초기 스냅샷 + 변경 이벤트)
// region:    --- Imports
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use query::{Direction, Filter, FilterOp, OrderBy, Query, QueryView};

// endregion: --- Imports

// region:    --- Modules
pub mod memory;
pub mod postgres;
pub mod query;

// endregion: --- Modules

// region:    --- Document Model
/// 문서 본문 (스키마 없는 키/값 맵)
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// 컬렉션 안의 문서 경로
/// 하위 컬렉션은 `auctions/{id}/bids` 형태의 컬렉션 문자열로 표현한다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// 저장된 문서. `version`은 커밋마다 1씩 증가하며, 없는 문서는 0으로 취급한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub fields: Fields,
}

impl Document {
    /// 문서 본문을 타입으로 변환
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(serde_json::Value::Object(self.fields.clone()))
            .map_err(|e| StoreError::Decode(format!("{}: {}", self.id, e)))
    }
}

/// 직렬화 가능한 값을 문서 본문으로 변환
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value).map_err(|e| StoreError::Encode(e.to_string()))? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Encode(format!(
            "문서 본문은 객체여야 합니다: {}",
            other
        ))),
    }
}

/// 문서 id 생성 (UUID v4). 여러 서버 프로세스가 같은 테이블을 써도 겹치지 않는다.
pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

// endregion: --- Document Model

// region:    --- Change Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// 구독 쿼리 결과 집합 기준의 변경
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document,
}

/// 구독 전달 단위: 현재 결과 집합 전체 + 이번 전달을 만든 변경들
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
    pub changes: Vec<DocumentChange>,
    pub initial: bool,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// 커밋된 쓰기 하나 (쿼리와 무관한 원시 변경). 삭제는 `document = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: DocPath,
    pub document: Option<Document>,
}

// endregion: --- Change Events

// region:    --- Errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("문서를 찾을 수 없습니다: {0}")]
    NotFound(DocPath),
    #[error("이미 존재하는 문서입니다: {0}")]
    AlreadyExists(DocPath),
    #[error("버전 충돌")]
    Conflict,
    #[error("트랜잭션 안에서 쓰기 이후에는 읽을 수 없습니다")]
    ReadAfterWrite,
    #[error("이미 종료된 트랜잭션입니다")]
    Closed,
    #[error("문서 변환 실패: {0}")]
    Decode(String),
    #[error("문서 직렬화 실패: {0}")]
    Encode(String),
    #[error("저장소를 사용할 수 없습니다: {0}")]
    Unavailable(String),
}

// endregion: --- Errors

// region:    --- Transaction
/// 트랜잭션 안에 쌓이는 쓰기
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// 없는 문서에만 생성
    Create(Fields),
    /// 생성 또는 덮어쓰기
    Set(Fields),
    /// 기존 문서에 병합
    Update(Fields),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub path: DocPath,
    pub op: WriteOp,
}

/// 읽기 버전과 쓰기 목록을 모아두는 버퍼 (저장소 구현체 공용)
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    reads: BTreeMap<DocPath, u64>,
    writes: Vec<PendingWrite>,
    finished: bool,
}

impl TransactionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 읽은 문서의 버전 기록
    /// 삭제된 문서는 삭제 시점의 버전을 넘겨야 한다 (없던 문서만 0).
    pub fn record_read(&mut self, path: &DocPath, version: u64) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        if !self.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite);
        }
        self.reads.insert(path.clone(), version);
        Ok(())
    }

    pub fn push(&mut self, path: DocPath, op: WriteOp) {
        if !self.finished {
            self.writes.push(PendingWrite { path, op });
        }
    }

    /// 커밋 준비: 버퍼를 비우고 종료 상태로 전환
    pub fn finish(&mut self) -> Result<(BTreeMap<DocPath, u64>, Vec<PendingWrite>), StoreError> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        self.finished = true;
        Ok((
            std::mem::take(&mut self.reads),
            std::mem::take(&mut self.writes),
        ))
    }
}

/// 낙관적 동시성 트랜잭션
/// 커밋 시 모든 읽기 버전을 다시 확인하고, 하나라도 달라졌으면 `Conflict`로 전체를 버린다.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>, StoreError>;
    fn create(&mut self, path: DocPath, fields: Fields);
    fn set(&mut self, path: DocPath, fields: Fields);
    fn update(&mut self, path: DocPath, fields: Fields);
    fn delete(&mut self, path: DocPath);
    async fn commit(&mut self) -> Result<(), StoreError>;
}

// endregion: --- Transaction

// region:    --- Subscription
pub type Delivery = Result<Snapshot, StoreError>;

/// 실시간 구독 핸들. 취소하거나 drop하면 이후 전달은 관찰되지 않는다.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Delivery>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            receiver,
            worker: None,
        }
    }

    /// 변경을 밀어주는 백그라운드 작업을 함께 소유하는 구독
    pub fn with_worker(receiver: mpsc::UnboundedReceiver<Delivery>, worker: JoinHandle<()>) -> Self {
        Self {
            receiver,
            worker: Some(worker),
        }
    }

    /// 다음 전달 대기. 구독이 끝나면 None.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.receiver.close();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// endregion: --- Subscription

// region:    --- Document Store Trait
/// 문서 저장소 트레이트
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// 단발성 쿼리
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// 트랜잭션 시작
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// 실시간 구독 (첫 전달은 초기 스냅샷)
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    async fn set(&self, path: DocPath, fields: Fields) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.set(path, fields);
        tx.commit().await
    }

    async fn update(&self, path: DocPath, fields: Fields) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.update(path, fields);
        tx.commit().await
    }

    async fn delete(&self, path: DocPath) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.delete(path);
        tx.commit().await
    }

    /// 자동 id로 문서 생성
    async fn add(&self, collection: &str, fields: Fields) -> Result<DocPath, StoreError> {
        let path = DocPath::new(collection, new_document_id());
        let mut tx = self.begin().await?;
        tx.create(path.clone(), fields);
        tx.commit().await?;
        Ok(path)
    }
}

// endregion: --- Document Store Trait

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn document_ids_are_unique_uuids() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_document_id()).collect();
        assert_eq!(ids.len(), 10_000);
        for id in ids.iter().take(10) {
            let parsed = Uuid::parse_str(id).unwrap();
            assert_eq!(parsed.get_version_num(), 4);
        }
    }
}
// endregion: --- Tests

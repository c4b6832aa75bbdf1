/// 프로세스 내부 문서 저장소
/// 테스트와 기본 서버 구성에서 사용한다.
// region:    --- Imports
use super::{
    ChangeRecord, DocPath, Document, DocumentStore, Fields, PendingWrite, Query, QueryView,
    StoreError, Subscription, Transaction, TransactionBuffer, WriteOp,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

// endregion: --- Imports

// region:    --- Memory Store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<String, BTreeMap<String, Document>>,
    /// 삭제된 문서의 마지막 버전. 다시 만들어도 버전이 되돌아가지 않게 한다.
    tombstones: BTreeMap<DocPath, u64>,
    listeners: Vec<Listener>,
}

struct Listener {
    view: QueryView,
    sender: mpsc::UnboundedSender<super::Delivery>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn DocumentStore> {
        Arc::new(Self::new())
    }
}

impl MemoryState {
    fn read(&self, path: &DocPath) -> Option<Document> {
        self.collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .cloned()
    }

    fn version_of(&self, path: &DocPath) -> u64 {
        match self.read(path) {
            Some(document) => document.version,
            None => self.tombstones.get(path).copied().unwrap_or(0),
        }
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|docs| docs.values().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();
        query.sort(&mut documents);
        documents
    }

    /// 쓰기 목록을 원자적으로 적용. 하나라도 실패하면 아무것도 바뀌지 않는다.
    fn apply(&mut self, writes: Vec<PendingWrite>) -> Result<Vec<ChangeRecord>, StoreError> {
        let mut staged: BTreeMap<DocPath, (Option<Document>, u64)> = BTreeMap::new();

        for write in writes {
            let (current, current_version) = match staged.get(&write.path) {
                Some(pending) => pending.clone(),
                None => (self.read(&write.path), self.version_of(&write.path)),
            };
            let next_version = current_version + 1;
            let next = match write.op {
                WriteOp::Create(fields) => {
                    if current.is_some() {
                        return Err(StoreError::AlreadyExists(write.path));
                    }
                    Some(fields)
                }
                WriteOp::Set(fields) => Some(fields),
                WriteOp::Update(fields) => {
                    let Some(existing) = current else {
                        return Err(StoreError::NotFound(write.path));
                    };
                    let mut merged = existing.fields;
                    merged.extend(fields);
                    Some(merged)
                }
                WriteOp::Delete => {
                    // 없는 문서 삭제는 버전을 올리지 않는다
                    if current.is_none() {
                        staged.insert(write.path, (None, current_version));
                        continue;
                    }
                    None
                }
            };
            let document = next.map(|fields: Fields| Document {
                id: write.path.id.clone(),
                version: next_version,
                fields,
            });
            staged.insert(write.path, (document, next_version));
        }

        let mut records = Vec::with_capacity(staged.len());
        for (path, (document, version)) in staged {
            let collection = self.collections.entry(path.collection.clone()).or_default();
            match &document {
                Some(document) => {
                    collection.insert(path.id.clone(), document.clone());
                    self.tombstones.remove(&path);
                }
                None => {
                    collection.remove(&path.id);
                    if version > 0 {
                        self.tombstones.insert(path.clone(), version);
                    }
                }
            }
            records.push(ChangeRecord { path, document });
        }
        Ok(records)
    }

    /// 구독자에게 변경 전달. 닫힌 구독은 정리한다.
    fn notify(&mut self, records: &[ChangeRecord]) {
        self.listeners.retain_mut(|listener| {
            if listener.sender.is_closed() {
                return false;
            }
            match listener.view.apply_batch(records) {
                Some(snapshot) => listener.sender.send(Ok(snapshot)).is_ok(),
                None => true,
            }
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        Ok(self.state.lock().await.read(path))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(self.state.lock().await.run_query(query))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            buffer: TransactionBuffer::new(),
        }))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let mut state = self.state.lock().await;
        let initial = state.run_query(&query);
        let (view, snapshot) = QueryView::new(query, initial);
        let (sender, receiver) = mpsc::unbounded_channel();
        // 수신자가 살아 있으므로 실패하지 않는다
        let _ = sender.send(Ok(snapshot));
        debug!(
            "{:<12} --> 구독 등록: collection={}",
            "MemoryStore",
            view.query().collection
        );
        state.listeners.push(Listener { view, sender });
        Ok(Subscription::new(receiver))
    }
}

// endregion: --- Memory Store

// region:    --- Memory Transaction
pub struct MemoryTransaction {
    store: MemoryStore,
    buffer: TransactionBuffer,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let state = self.store.state.lock().await;
        let document = state.read(path);
        self.buffer.record_read(path, state.version_of(path))?;
        Ok(document)
    }

    fn create(&mut self, path: DocPath, fields: Fields) {
        self.buffer.push(path, WriteOp::Create(fields));
    }

    fn set(&mut self, path: DocPath, fields: Fields) {
        self.buffer.push(path, WriteOp::Set(fields));
    }

    fn update(&mut self, path: DocPath, fields: Fields) {
        self.buffer.push(path, WriteOp::Update(fields));
    }

    fn delete(&mut self, path: DocPath) {
        self.buffer.push(path, WriteOp::Delete);
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let (reads, writes) = self.buffer.finish()?;
        let mut state = self.store.state.lock().await;

        // 읽은 이후 다른 커밋이 끼어들었는지 확인
        if reads
            .iter()
            .any(|(path, version)| state.version_of(path) != *version)
        {
            return Err(StoreError::Conflict);
        }

        let records = state.apply(writes)?;
        state.notify(&records);
        Ok(())
    }
}

// endregion: --- Memory Transaction

// endregion: --- Tests

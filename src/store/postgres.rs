/// Postgres 문서 저장소
/// 문서는 JSONB로 저장하고, 커밋된 변경은 Kafka 변경 피드로 구독자에게 전달한다.
// region:    --- Imports
use super::{
    ChangeRecord, DocPath, Document, DocumentStore, Fields, FilterOp, PendingWrite, Query,
    QueryView, StoreError, Subscription, Transaction, TransactionBuffer, WriteOp,
};
use crate::database::DatabaseManager;
use crate::message_broker::{KafkaConsumer, KafkaManager, KafkaProducer};
use crate::store::Direction;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Queries
const SELECT_DOCUMENT: &str =
    "SELECT id, data, version FROM documents WHERE collection = $1 AND id = $2 AND NOT deleted";

// 삭제 표시된 행 포함 (트랜잭션 읽기 버전용)
const SELECT_ENTRY: &str =
    "SELECT id, data, version, deleted FROM documents WHERE collection = $1 AND id = $2";

const SELECT_VERSION_FOR_UPDATE: &str =
    "SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE";

const INSERT_DOCUMENT: &str = r#"
    INSERT INTO documents (collection, id, data, version, updated_at)
    VALUES ($1, $2, $3, 1, NOW())
    ON CONFLICT (collection, id)
    DO UPDATE SET data = EXCLUDED.data, version = documents.version + 1, deleted = FALSE, updated_at = NOW()
    WHERE documents.deleted
    RETURNING version
"#;

const UPSERT_DOCUMENT: &str = r#"
    INSERT INTO documents (collection, id, data, version, updated_at)
    VALUES ($1, $2, $3, 1, NOW())
    ON CONFLICT (collection, id)
    DO UPDATE SET data = EXCLUDED.data, version = documents.version + 1, deleted = FALSE, updated_at = NOW()
    RETURNING version
"#;

const MERGE_DOCUMENT: &str = r#"
    UPDATE documents SET data = data || $3, version = version + 1, updated_at = NOW()
    WHERE collection = $1 AND id = $2 AND NOT deleted
    RETURNING data, version
"#;

const DELETE_DOCUMENT: &str = r#"
    UPDATE documents SET data = '{}'::jsonb, deleted = TRUE, version = version + 1, updated_at = NOW()
    WHERE collection = $1 AND id = $2 AND NOT deleted
"#;

// endregion: --- Queries

// region:    --- Postgres Store
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            // unique_violation: 동시에 같은 문서를 생성한 경우
            Some(db) if db.code().as_deref() == Some("23505") => StoreError::Conflict,
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct PostgresStore {
    db: Arc<DatabaseManager>,
    producer: KafkaProducer,
    brokers: String,
    topic: String,
}

impl PostgresStore {
    pub fn new(db: Arc<DatabaseManager>, kafka: &KafkaManager) -> Self {
        Self {
            db,
            producer: kafka.get_producer(),
            brokers: kafka.brokers().to_string(),
            topic: kafka.topic().to_string(),
        }
    }
}

fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
    let id: String = row.try_get("id")?;
    let data: Value = row.try_get("data")?;
    let version: i64 = row.try_get("version")?;
    let fields = match data {
        Value::Object(fields) => fields,
        other => return Err(StoreError::Decode(format!("{}: 객체가 아닌 문서 {}", id, other))),
    };
    Ok(Document {
        id,
        version: version as u64,
        fields,
    })
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(SELECT_DOCUMENT)
            .bind(&path.collection)
            .bind(&path.id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, data, version FROM documents WHERE collection = ");
        builder.push_bind(query.collection.clone());
        builder.push(" AND NOT deleted");
        for filter in &query.filters {
            builder.push(" AND data -> ");
            builder.push_bind(filter.field.clone());
            match filter.op {
                FilterOp::Eq => {
                    builder.push(" = ");
                    builder.push_bind(filter.value.clone());
                }
                FilterOp::ArrayContains => {
                    builder.push(" @> ");
                    builder.push_bind(Value::Array(vec![filter.value.clone()]));
                }
            }
        }
        match &query.order_by {
            Some(order) => {
                builder.push(" ORDER BY data -> ");
                builder.push_bind(order.field.clone());
                builder.push(match order.direction {
                    Direction::Asc => " ASC, id ASC",
                    Direction::Desc => " DESC, id DESC",
                });
            }
            None => {
                builder.push(" ORDER BY id ASC");
            }
        }

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(PostgresTransaction {
            store: self.clone(),
            buffer: TransactionBuffer::new(),
        }))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        // 컨슈머를 먼저 붙인 뒤 초기 스냅샷을 읽는다
        let consumer = KafkaConsumer::for_subscription(&self.brokers, &self.topic)?;
        let initial = self.query(&query).await?;
        let (view, snapshot) = QueryView::new(query, initial);
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(Ok(snapshot));
        let worker = tokio::spawn(consumer.forward_changes(view, sender));
        Ok(Subscription::with_worker(receiver, worker))
    }
}

// endregion: --- Postgres Store

// region:    --- Postgres Transaction
pub struct PostgresTransaction {
    store: PostgresStore,
    buffer: TransactionBuffer,
}

/// 쓰기 하나를 적용하고 커밋 후 발행할 변경을 반환
async fn apply_write(conn: &mut PgConnection, write: PendingWrite) -> Result<ChangeRecord, StoreError> {
    let PendingWrite { path, op } = write;
    let document = match op {
        WriteOp::Create(fields) => {
            let version: Option<i64> = sqlx::query_scalar(INSERT_DOCUMENT)
                .bind(&path.collection)
                .bind(&path.id)
                .bind(Value::Object(fields.clone()))
                .fetch_optional(&mut *conn)
                .await?;
            let Some(version) = version else {
                return Err(StoreError::AlreadyExists(path));
            };
            Some(document_of(&path, version, fields))
        }
        WriteOp::Set(fields) => {
            let version: i64 = sqlx::query_scalar(UPSERT_DOCUMENT)
                .bind(&path.collection)
                .bind(&path.id)
                .bind(Value::Object(fields.clone()))
                .fetch_one(&mut *conn)
                .await?;
            Some(document_of(&path, version, fields))
        }
        WriteOp::Update(fields) => {
            let row = sqlx::query(MERGE_DOCUMENT)
                .bind(&path.collection)
                .bind(&path.id)
                .bind(Value::Object(fields))
                .fetch_optional(&mut *conn)
                .await?;
            let Some(row) = row else {
                return Err(StoreError::NotFound(path));
            };
            let data: Value = row.try_get("data")?;
            let version: i64 = row.try_get("version")?;
            let fields: Fields = match data {
                Value::Object(fields) => fields,
                _ => Fields::new(),
            };
            Some(document_of(&path, version, fields))
        }
        WriteOp::Delete => {
            sqlx::query(DELETE_DOCUMENT)
                .bind(&path.collection)
                .bind(&path.id)
                .execute(&mut *conn)
                .await?;
            None
        }
    };
    Ok(ChangeRecord { path, document })
}

fn document_of(path: &DocPath, version: i64, fields: Fields) -> Document {
    Document {
        id: path.id.clone(),
        version: version as u64,
        fields,
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(SELECT_ENTRY)
            .bind(&path.collection)
            .bind(&path.id)
            .fetch_optional(self.store.db.pool())
            .await?;
        let Some(row) = row else {
            self.buffer.record_read(path, 0)?;
            return Ok(None);
        };
        let document = row_to_document(&row)?;
        self.buffer.record_read(path, document.version)?;
        let deleted: bool = row.try_get("deleted")?;
        Ok((!deleted).then_some(document))
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

        let records = self
            .store
            .db
            .transaction(move |tx| {
                Box::pin(async move {
                    // 읽은 문서의 버전을 잠근 상태로 다시 확인
                    for (path, expected) in &reads {
                        let current: Option<i64> = sqlx::query_scalar(SELECT_VERSION_FOR_UPDATE)
                            .bind(&path.collection)
                            .bind(&path.id)
                            .fetch_optional(&mut **tx)
                            .await?;
                        if current.unwrap_or(0) as u64 != *expected {
                            return Err(StoreError::Conflict);
                        }
                    }

                    let mut records = Vec::with_capacity(writes.len());
                    for write in writes {
                        records.push(apply_write(&mut **tx, write).await?);
                    }
                    Ok::<_, StoreError>(records)
                })
            })
            .await?;

        for record in &records {
            if let Err(e) = self.store.producer.publish(record).await {
                error!(
                    "{:<12} --> 변경 발행 실패: {} ({})",
                    "PostgresStore", record.path, e
                );
            }
        }
        info!(
            "{:<12} --> 트랜잭션 커밋: {}건 변경",
            "PostgresStore",
            records.len()
        );
        Ok(())
    }
}

// endregion: --- Postgres Transaction

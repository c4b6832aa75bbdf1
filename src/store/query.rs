/// 쿼리 필터/정렬과 구독용 결과 집합 뷰
// region:    --- Imports
use super::{ChangeKind, ChangeRecord, Document, DocumentChange, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

// endregion: --- Imports

// region:    --- Query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, document: &Document) -> bool {
        let Some(actual) = document.fields.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::ArrayContains => actual
                .as_array()
                .map(|values| values.contains(&self.value))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// 컬렉션 쿼리 (AND 조건 필터 + 선택적 정렬)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::ArrayContains,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// 문서가 쿼리 조건을 모두 만족하는지 확인
    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(document))
    }

    /// 정렬 조건 적용. 정렬이 없으면 id 순서.
    pub fn sort(&self, documents: &mut [Document]) {
        match &self.order_by {
            Some(order) => documents.sort_by(|a, b| {
                let ordering = compare_values(a.fields.get(&order.field), b.fields.get(&order.field))
                    .then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            }),
            None => documents.sort_by(|a, b| a.id.cmp(&b.id)),
        }
    }
}

/// 정렬용 값 비교: 없음/null < bool < 숫자 < 문자열, 그 외 타입은 동일 취급
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// endregion: --- Query

// region:    --- Query View
/// 구독 하나의 현재 결과 집합
/// 원시 변경(`ChangeRecord`)을 쿼리 기준의 added/modified/removed로 바꾼다.
#[derive(Debug, Clone)]
pub struct QueryView {
    query: Query,
    documents: BTreeMap<String, Document>,
}

impl QueryView {
    /// 초기 결과로 뷰를 만들고, 모든 문서를 added로 담은 초기 스냅샷을 함께 반환
    pub fn new(query: Query, initial: Vec<Document>) -> (Self, Snapshot) {
        let documents: BTreeMap<String, Document> = initial
            .into_iter()
            .filter(|document| query.matches(document))
            .map(|document| (document.id.clone(), document))
            .collect();
        let view = Self { query, documents };
        let documents = view.documents();
        let changes = documents
            .iter()
            .cloned()
            .map(|document| DocumentChange {
                kind: ChangeKind::Added,
                document,
            })
            .collect();
        let snapshot = Snapshot {
            documents,
            changes,
            initial: true,
        };
        (view, snapshot)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// 정렬된 현재 결과 집합
    pub fn documents(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self.documents.values().cloned().collect();
        self.query.sort(&mut documents);
        documents
    }

    /// 원시 변경 하나를 반영하고, 결과 집합이 바뀌었으면 그 변경을 반환
    pub fn apply(&mut self, record: &ChangeRecord) -> Option<DocumentChange> {
        if record.path.collection != self.query.collection {
            return None;
        }
        let id = &record.path.id;
        match &record.document {
            Some(document) if self.query.matches(document) => {
                let kind = if self.documents.contains_key(id) {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Added
                };
                self.documents.insert(id.clone(), document.clone());
                Some(DocumentChange {
                    kind,
                    document: document.clone(),
                })
            }
            _ => self.documents.remove(id).map(|previous| DocumentChange {
                kind: ChangeKind::Removed,
                document: record.document.clone().unwrap_or(previous),
            }),
        }
    }

    /// 여러 변경을 한 번에 반영하고, 결과 집합이 바뀐 경우에만 스냅샷 생성
    pub fn apply_batch(&mut self, records: &[ChangeRecord]) -> Option<Snapshot> {
        let changes: Vec<DocumentChange> = records.iter().filter_map(|r| self.apply(r)).collect();
        if changes.is_empty() {
            return None;
        }
        Some(Snapshot {
            documents: self.documents(),
            changes,
            initial: false,
        })
    }
}

// endregion: --- Query View

// endregion: --- Tests

/// 문서 변경 피드 (Kafka)
/// 커밋된 변경(`ChangeRecord`)을 토픽에 발행하고, 구독마다 전용 컨슈머로 다시 읽는다.
// region:    --- Imports
use crate::store::{ChangeRecord, Delivery, QueryView, StoreError};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
    topic: String,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, StoreError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| StoreError::Unavailable(format!("Producer creation error: {}", e)))?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
            topic: topic.to_string(),
        })
    }

    /// 변경 발행 (문서 경로를 키로 사용해 같은 문서의 순서를 보장)
    pub async fn publish(&self, record: &ChangeRecord) -> Result<(), StoreError> {
        let key = record.path.to_string();
        let payload =
            serde_json::to_string(record).map_err(|e| StoreError::Encode(e.to_string()))?;
        debug!(
            "{:<12} --> Kafka 변경 발행: topic={}, key={}",
            "Producer", self.topic, key
        );
        let message = FutureRecord::to(&self.topic)
            .key(key.as_str())
            .payload(payload.as_str());

        self.producer
            .send(message, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| StoreError::Unavailable(format!("Error sending message: {:?}", e)))?;

        Ok(())
    }
}

// endregion: --- Kafka Producer

// region:    --- Kafka Consumer
static SUBSCRIBER_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    /// 구독 전용 컨슈머 생성
    /// 그룹 id를 구독마다 새로 만들어 모든 구독이 전체 변경을 받도록 하고, 구독 이후의 변경만 읽는다.
    pub fn for_subscription(brokers: &str, topic: &str) -> Result<Self, StoreError> {
        let group_id = format!(
            "document-subscriber-{}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros(),
            SUBSCRIBER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .set("fetch.max.bytes", "5242880")
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(|e| StoreError::Unavailable(format!("Consumer creation failed: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        info!(
            "{:<12} --> 변경 피드 구독 시작: topic={}, group={}",
            "Consumer", topic, group_id
        );

        Ok(KafkaConsumer { consumer })
    }

    /// 변경을 읽어 쿼리 뷰에 반영하고 결과 스냅샷을 구독자에게 전달
    /// 구독자가 떠나거나 수신 오류가 나면 종료한다.
    pub async fn forward_changes(self, mut view: QueryView, sender: mpsc::UnboundedSender<Delivery>) {
        loop {
            if sender.is_closed() {
                debug!("{:<12} --> 구독자 종료, 컨슈머 정리", "Consumer");
                return;
            }
            let record = match self.consumer.recv().await {
                Ok(message) => match message.payload() {
                    Some(payload) => match serde_json::from_slice::<ChangeRecord>(payload) {
                        Ok(record) => record,
                        Err(e) => {
                            error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e);
                            continue;
                        }
                    },
                    None => {
                        warn!("{:<12} --> 빈 페이로드 수신", "Consumer");
                        continue;
                    }
                },
                Err(e) => {
                    error!("{:<12} --> 메시지 수신 오류: {:?}", "Consumer", e);
                    let _ = sender.send(Err(StoreError::Unavailable(e.to_string())));
                    return;
                }
            };

            if let Some(snapshot) = view.apply_batch(std::slice::from_ref(&record)) {
                if sender.send(Ok(snapshot)).is_err() {
                    return;
                }
            }
        }
    }
}

// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    producer: KafkaProducer,
    brokers: String,
    topic: String,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, StoreError> {
        Ok(KafkaManager {
            producer: KafkaProducer::new(brokers, topic)?,
            brokers: brokers.to_string(),
            topic: topic.to_string(),
        })
    }

    /// 프로듀서 반환
    pub fn get_producer(&self) -> KafkaProducer {
        self.producer.clone()
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 변경 토픽 생성 (이미 있으면 성공으로 취급)
    pub async fn create_topic(
        &self,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), StoreError> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {}", "Manager", self.topic);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| StoreError::Unavailable(format!("AdminClient 생성 실패: {:?}", e)))?;

        let new_topic = NewTopic::new(
            &self.topic,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        let results = admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| {
                error!("{:<12} --> Kafka 토픽 생성 실패: {:?}", "Manager", e);
                StoreError::Unavailable(format!("토픽 생성 실패: {:?}", e))
            })?;

        for result in results {
            match result {
                Ok(topic) => info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic),
                Err((topic, code)) => warn!(
                    "{:<12} --> Kafka 토픽 생성 건너뜀: {} ({:?})",
                    "Manager", topic, code
                ),
            }
        }
        Ok(())
    }
}

// endregion: --- Kafka Manager

// region:    --- Imports
use donation_auction::config::{Config, StoreBackend};
use donation_auction::database::DatabaseManager;
use donation_auction::handlers;
use donation_auction::message_broker::KafkaManager;
use donation_auction::scheduler::AuctionScheduler;
use donation_auction::store::memory::MemoryStore;
use donation_auction::store::postgres::PostgresStore;
use donation_auction::store::DocumentStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;
    info!("{:<12} --> 저장소: {:?}", "Main", config.backend);

    let store = match config.backend {
        StoreBackend::Memory => MemoryStore::shared(),
        StoreBackend::Postgres => connect_postgres(&config).await?,
    };

    // 기간 만료 경매 정리
    let scheduler = AuctionScheduler::new(Arc::clone(&store), config.sweep_interval);
    scheduler.start();

    // 라우터 설정
    let routes_all = handlers::router(store);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}

/// Postgres 저장소 + Kafka 변경 피드 구성
async fn connect_postgres(
    config: &Config,
) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    let database_url = config.database_url.as_deref().unwrap_or_default();
    let db_manager =
        Arc::new(DatabaseManager::connect(database_url, config.database_max_connections).await?);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // Kafka 매니저 생성 및 토픽 생성
    let kafka_manager = KafkaManager::new(&config.kafka_brokers, &config.change_topic)?;
    kafka_manager.create_topic(5, 1).await?;
    info!("{:<12} --> Kafka 초기화 성공", "Main");

    Ok(Arc::new(PostgresStore::new(db_manager, &kafka_manager)))
}
// endregion: --- Main

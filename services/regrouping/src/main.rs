//! Regrouping Service - 分箱重组服务入口
//!
//! 配置了数据库时使用 PostgreSQL（启动时执行迁移），否则使用内存存储。

use std::sync::Arc;

use adapter_postgres::{
    IsolationLevel, PostgresConfig, TransactionOptions, check_connection, create_pool,
};
use anyhow::Context;
use config::AppConfig;
use ports::EventPublisher;
use regrouping::application::ListAvailablePositionsQuery;
use regrouping::domain::unit_of_work::UnitOfWorkFactory;
use regrouping::{InMemoryStore, LoggingEventPublisher, PostgresUnitOfWorkFactory, ServiceHandler};
use secrecy::ExposeSecret;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load("config").context("Failed to load configuration")?;
    telemetry::init(&config.telemetry.log_level, config.telemetry.json);

    if let Err(e) = telemetry::init_metrics() {
        warn!(error = %e, "Metrics recorder not installed");
    }

    info!(app = %config.app_name, env = %config.app_env, "Starting regrouping service");

    // 组装工作单元工厂
    let uow_factory: Arc<dyn UnitOfWorkFactory> = match &config.database {
        Some(db) => {
            let pg_config = PostgresConfig::new(db.url.expose_secret().clone())
                .with_max_connections(db.max_connections);
            let pool = create_pool(&pg_config).await?;
            check_connection(&pool).await?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;

            let isolation: IsolationLevel = db.isolation.parse()?;
            info!(isolation = isolation.as_sql(), "Using PostgreSQL storage");
            Arc::new(
                PostgresUnitOfWorkFactory::new(pool)
                    .with_options(TransactionOptions::new().with_isolation_level(isolation)),
            )
        }
        None => {
            warn!("No database configured, using in-memory storage");
            Arc::new(InMemoryStore::new())
        }
    };

    // 组装事件发布器
    let publisher: Arc<dyn EventPublisher> = Arc::new(LoggingEventPublisher);

    let handler = ServiceHandler::new(uow_factory, publisher, config.regrouping.clone())?;

    let available = handler
        .list_available_positions(ListAvailablePositionsQuery::all())
        .await?;
    info!(count = available.len(), "Available positions");
    for slot in &available {
        info!(unit = %slot.unit_name, position = %slot.position, "Free slot");
    }

    Ok(())
}

use crate::config::AppConfig;
use crate::entities::prelude::Uploads;
use anyhow::Context;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(config: &AppConfig) -> anyhow::Result<DatabaseConnection> {
    let db_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;

    let db = Database::connect(connect_options(db_url)).await?;

    info!(
        "✅ Database connected successfully ({:?})",
        db.get_database_backend()
    );

    run_migrations(&db).await?;

    Ok(db)
}

fn connect_options(db_url: &str) -> ConnectOptions {
    let mut opt = ConnectOptions::new(db_url);
    opt.connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    // Every connection to `sqlite::memory:` opens its own empty database
    if db_url.contains(":memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(20)
            .min_connections(2)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800));
    }

    opt
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    match db.get_database_backend() {
        DbBackend::Postgres => {
            info!("🔄 Running SQLx migrations for PostgreSQL...");
            let pool = db.get_postgres_connection_pool();
            sqlx::migrate!("./migrations")
                .run(pool)
                .await
                .context("failed to apply PostgreSQL migrations")?;
        }
        backend => {
            info!("🔄 Running SeaORM auto-migrations for {:?}...", backend);
            let schema = Schema::new(backend);
            let stmt = schema
                .create_table_from_entity(Uploads)
                .if_not_exists()
                .to_owned();
            db.execute(backend.build(&stmt)).await?;
        }
    }

    Ok(())
}

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use upload_server::entities::uploads;
use upload_server::infrastructure::database;
use uuid::Uuid;

const EXTENSIONS: [&str; 6] = ["png", "jpg", "gif", "webp", "pdf", "txt"];

pub async fn setup_test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// Fields `make_upload` should use instead of its generated values
#[derive(Debug, Clone, Default)]
pub struct UploadOverrides {
    pub id: Option<String>,
    pub name: Option<String>,
    pub remote_key: Option<String>,
    pub remote_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Random file name such as `k3J9xQb2Lm.png`
pub fn fake_file_name() -> String {
    let mut rng = rand::thread_rng();
    let stem: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let extension = EXTENSIONS[rng.gen_range(0..EXTENSIONS.len())];
    format!("{}.{}", stem, extension)
}

/// Inserts a synthetic upload row and returns it.
///
/// `remote_key` and `remote_url` are derived from the generated name, even when
/// `name` itself is overridden.
pub async fn make_upload(
    db: &DatabaseConnection,
    overrides: UploadOverrides,
) -> Result<uploads::Model, DbErr> {
    let file_name = fake_file_name();
    let unique_id = Uuid::new_v4();

    let mut record = uploads::ActiveModel {
        name: Set(file_name.clone()),
        remote_key: Set(format!("images/{}-{}", unique_id, file_name)),
        remote_url: Set(format!(
            "https://example.com/images/{}-{}",
            unique_id, file_name
        )),
        ..Default::default()
    };

    if let Some(id) = overrides.id {
        record.id = Set(id);
    }
    if let Some(name) = overrides.name {
        record.name = Set(name);
    }
    if let Some(remote_key) = overrides.remote_key {
        record.remote_key = Set(remote_key);
    }
    if let Some(remote_url) = overrides.remote_url {
        record.remote_url = Set(remote_url);
    }
    if let Some(created_at) = overrides.created_at {
        record.created_at = Set(created_at);
    }

    record.insert(db).await
}

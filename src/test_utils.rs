//! Shared helpers for unit tests: a fresh in-memory database and seeded rows.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::{database, entities, entities::product, entities::user, errors::Result};

pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = database::connect("sqlite::memory:").await?;
    entities::setup_schema(&db).await?;
    Ok(db)
}

/// In-stock product priced in minor units.
pub async fn create_test_product(
    db: &DatabaseConnection,
    name: &str,
    price: i64,
) -> Result<product::Model> {
    let product = product::ActiveModel {
        name: Set(name.to_owned()),
        description: Set(format!("{name} for tests")),
        price: Set(price),
        in_stock: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(product)
}

/// The password hash is not a real argon2 hash; use the accounts module when login matters.
pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> Result<user::Model> {
    let user = user::ActiveModel {
        username: Set(username.to_owned()),
        password: Set("not-a-hash".to_owned()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(user)
}

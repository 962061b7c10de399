pub mod cart;
pub mod cart_item;
pub mod delivery_tracking;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod payment_attempt;
pub mod product;
pub mod user;

use chrono::Utc;
use sea_orm::{
    sea_query::Index, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    Schema, Set, TransactionTrait,
};
use tracing::info;

use crate::core::accounts::hash_password;
use crate::errors::Result;

const DEMO_PRODUCTS: [(&str, &str, i64); 6] = [
    ("Blood Pressure Monitor", "Digital monitor with a large display and voice readout.", 250_000),
    ("Vitamin D Tablets", "Vitamin D3 supplements, 60 easy-to-swallow tablets.", 45_000),
    ("Walking Stick", "Adjustable aluminium walking stick with a soft grip.", 80_000),
    ("Glucose Monitor", "Blood glucose meter with 50 test strips.", 180_000),
    ("Reading Glasses", "Lightweight +2.0 reading glasses.", 60_000),
    ("Pill Organizer", "Weekly pill organizer with morning and evening slots.", 25_000),
];

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }

    Ok(())
}

/// Creates every table (parents first) plus the `(cart_id, product_id)` unique index.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, product::Entity).await?;
    create_table(db, &schema, cart::Entity).await?;
    create_table(db, &schema, cart_item::Entity).await?;
    create_table(db, &schema, order::Entity).await?;
    create_table(db, &schema, order_item::Entity).await?;
    create_table(db, &schema, delivery_tracking::Entity).await?;
    create_table(db, &schema, payment::Entity).await?;
    create_table(db, &schema, payment_attempt::Entity).await?;

    let cart_product_index = Index::create()
        .if_not_exists()
        .name("idx-cart_item-cart_product")
        .table(cart_item::Entity)
        .col(cart_item::Column::CartId)
        .col(cart_item::Column::ProductId)
        .unique()
        .to_owned();
    db.execute(db.get_database_backend().build(&cart_product_index))
        .await?;

    Ok(())
}

/// Seeds a demo account and a handful of products into an empty database.
pub async fn primary_setup(db: &DatabaseConnection) -> Result<()> {
    if user::Entity::find().count(db).await? > 0 {
        return Ok(());
    }

    let password_hash = hash_password("Secret15")?;

    let now = Utc::now();
    let demo_user = user::ActiveModel {
        username: Set("demo".to_owned()),
        password: Set(password_hash),
        created_at: Set(now),
        ..Default::default()
    };

    let products = DEMO_PRODUCTS
        .iter()
        .map(|(name, description, price)| product::ActiveModel {
            name: Set((*name).to_owned()),
            description: Set((*description).to_owned()),
            price: Set(*price),
            in_stock: Set(true),
            ..Default::default()
        });

    let txn = db.begin().await?;
    user::Entity::insert(demo_user).exec(&txn).await?;
    product::Entity::insert_many(products).exec(&txn).await?;
    txn.commit().await?;

    info!(products = DEMO_PRODUCTS.len(), "Seeded demo data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    #[tokio::test]
    async fn setup_schema_is_idempotent() -> Result<()> {
        let db = database::connect("sqlite::memory:").await?;
        setup_schema(&db).await?;
        setup_schema(&db).await?;

        assert_eq!(order::Entity::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn primary_setup_seeds_once() -> Result<()> {
        let db = database::connect("sqlite::memory:").await?;
        setup_schema(&db).await?;
        primary_setup(&db).await?;
        primary_setup(&db).await?;

        assert_eq!(user::Entity::find().count(&db).await?, 1);
        assert_eq!(
            product::Entity::find().count(&db).await?,
            DEMO_PRODUCTS.len() as u64
        );
        Ok(())
    }
}

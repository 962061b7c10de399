//! Cart store: one cart per identity, created on first access and emptied at checkout.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::identity::Identity;
use crate::entities::{cart, cart_item, product};
use crate::errors::{Error, Result};
use crate::money;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartLine {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub product_price: Decimal,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(skip)]
    pub(crate) unit_price_minor: i64,
    #[serde(skip)]
    pub(crate) subtotal_minor: i64,
}

impl CartLine {
    fn new(item: cart_item::Model, product: product::Model) -> Result<Self> {
        let subtotal_minor = product
            .price
            .checked_mul(i64::from(item.quantity))
            .ok_or_else(|| Error::Validation("Cart line total is out of range".to_owned()))?;

        Ok(Self {
            id: item.id,
            product_id: product.id,
            product_price: product.unit_price(),
            product_name: product.name,
            quantity: item.quantity,
            subtotal: money::from_minor(subtotal_minor),
            unit_price_minor: product.price,
            subtotal_minor,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartSummary {
    pub id: i32,
    pub items: Vec<CartLine>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    /// Number of distinct line items, not the summed quantity.
    pub total_items: usize,
}

impl CartSummary {
    fn new(cart_id: i32, items: Vec<CartLine>) -> Result<Self> {
        let total_minor = total_minor(&items)?;

        Ok(Self {
            id: cart_id,
            total_amount: money::from_minor(total_minor),
            total_items: items.len(),
            items,
        })
    }
}

/// Sum of line subtotals in minor units.
pub(crate) fn total_minor(lines: &[CartLine]) -> Result<i64> {
    lines
        .iter()
        .try_fold(0i64, |total, line| total.checked_add(line.subtotal_minor))
        .ok_or_else(|| Error::Validation("Cart total is out of range".to_owned()))
}

async fn find_cart<C>(db: &C, identity: &Identity) -> Result<Option<cart::Model>>
where
    C: ConnectionTrait,
{
    let query = match identity {
        Identity::AuthenticatedUser(id) => cart::Entity::find().filter(cart::Column::UserId.eq(*id)),
        Identity::AnonymousSession(key) => {
            cart::Entity::find().filter(cart::Column::SessionKey.eq(key.as_str()))
        }
    };

    Ok(query.one(db).await?)
}

pub async fn get_or_create_cart<C>(db: &C, identity: &Identity) -> Result<cart::Model>
where
    C: ConnectionTrait,
{
    if let Some(cart) = find_cart(db, identity).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let new_cart = cart::ActiveModel {
        user_id: Set(identity.user_id()),
        session_key: Set(identity.session_key().map(str::to_owned)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_cart.insert(db).await {
        Ok(cart) => {
            debug!(cart_id = cart.id, "Created cart");
            Ok(cart)
        }
        // Lost a race with another request for the same owner.
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            find_cart(db, identity)
                .await?
                .ok_or_else(|| Error::Database(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn load_lines<C>(db: &C, cart_id: i32) -> Result<Vec<CartLine>>
where
    C: ConnectionTrait,
{
    cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .find_also_related(product::Entity)
        .order_by_asc(cart_item::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| CartLine::new(item, product)))
        .collect()
}

pub(crate) async fn clear_items<C>(db: &C, cart_id: i32) -> Result<u64>
where
    C: ConnectionTrait,
{
    let deleted = cart_item::Entity::delete_many()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .exec(db)
        .await?
        .rows_affected;

    touch(db, cart_id).await?;
    Ok(deleted)
}

async fn touch<C>(db: &C, cart_id: i32) -> Result<()>
where
    C: ConnectionTrait,
{
    cart::Entity::update_many()
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(db)
        .await?;
    Ok(())
}

async fn find_line<C>(db: &C, cart_id: i32, item_id: i32) -> Result<cart_item::Model>
where
    C: ConnectionTrait,
{
    cart_item::Entity::find_by_id(item_id)
        .filter(cart_item::Column::CartId.eq(cart_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound("Cart item not found".to_owned()))
}

async fn line_for<C>(db: &C, item: cart_item::Model) -> Result<CartLine>
where
    C: ConnectionTrait,
{
    let product = product::Entity::find_by_id(item.product_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound("Product not found".to_owned()))?;

    CartLine::new(item, product)
}

pub async fn cart_summary(db: &DatabaseConnection, identity: &Identity) -> Result<CartSummary> {
    let cart = get_or_create_cart(db, identity).await?;
    let lines = load_lines(db, cart.id).await?;

    CartSummary::new(cart.id, lines)
}

/// Adds `quantity` of a product, merging into the existing line for that product if any.
#[instrument(skip(db))]
pub async fn add_item(
    db: &DatabaseConnection,
    identity: &Identity,
    product_id: i32,
    quantity: u32,
) -> Result<CartLine> {
    if quantity == 0 {
        return Err(Error::Validation("Quantity must be positive".to_owned()));
    }

    let txn = db.begin().await?;

    let product = product::Entity::find_by_id(product_id)
        .filter(product::Column::InStock.eq(true))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::NotFound("Product not found".to_owned()))?;

    let cart = get_or_create_cart(&txn, identity).await?;

    let existing = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .filter(cart_item::Column::ProductId.eq(product.id))
        .one(&txn)
        .await?;

    let item = match existing {
        Some(entry) => {
            let merged = entry
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| Error::Validation("Invalid quantity".to_owned()))?;
            let mut entry: cart_item::ActiveModel = entry.into();
            entry.quantity = Set(merged);
            entry.update(&txn).await?
        }
        None => {
            cart_item::ActiveModel {
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                added_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    touch(&txn, cart.id).await?;
    let line = CartLine::new(item, product)?;
    txn.commit().await?;

    Ok(line)
}

/// Sets an item's quantity. Zero removes the line and yields `None`.
#[instrument(skip(db))]
pub async fn update_item(
    db: &DatabaseConnection,
    identity: &Identity,
    item_id: i32,
    quantity: u32,
) -> Result<Option<CartLine>> {
    let txn = db.begin().await?;
    let cart = get_or_create_cart(&txn, identity).await?;
    let entry = find_line(&txn, cart.id, item_id).await?;

    let line = if quantity == 0 {
        cart_item::Entity::delete_by_id(entry.id).exec(&txn).await?;
        None
    } else {
        let mut entry: cart_item::ActiveModel = entry.into();
        entry.quantity = Set(quantity);
        let item = entry.update(&txn).await?;
        Some(line_for(&txn, item).await?)
    };

    touch(&txn, cart.id).await?;
    txn.commit().await?;

    Ok(line)
}

#[instrument(skip(db))]
pub async fn remove_item(db: &DatabaseConnection, identity: &Identity, item_id: i32) -> Result<()> {
    let txn = db.begin().await?;
    let cart = get_or_create_cart(&txn, identity).await?;
    let entry = find_line(&txn, cart.id, item_id).await?;

    cart_item::Entity::delete_by_id(entry.id).exec(&txn).await?;
    touch(&txn, cart.id).await?;
    txn.commit().await?;

    Ok(())
}

pub async fn clear(db: &DatabaseConnection, identity: &Identity) -> Result<()> {
    let txn = db.begin().await?;
    let cart = get_or_create_cart(&txn, identity).await?;
    clear_items(&txn, cart.id).await?;
    txn.commit().await?;

    Ok(())
}

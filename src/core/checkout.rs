//! Order factory and order read models.
//!
//! `create_order` snapshots the caller's cart into an order, its items and its delivery
//! tracking row, then empties the cart, all inside one database transaction. Reads go
//! through the access guard before anything is returned.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::ValidateEmail;

use crate::core::{access::authorize_order_access, cart, identity::Identity, ids};
use crate::entities::{
    delivery_tracking::{self, TrackingStatus},
    order::{self, PaymentMethod, Status},
    order_item,
};
use crate::errors::{Error, Result};
use crate::money;

/// Raw checkout body. Every field is optional so a missing one can be reported by name.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub pincode: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShippingDetails {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub pincode: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
}

/// "full_name" -> "Full Name"
fn field_label(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{} is required", field_label(field)))),
    }
}

impl CheckoutRequest {
    pub fn validate(self) -> Result<NewOrder> {
        let full_name = required("full_name", self.full_name)?;
        let phone = required("phone", self.phone)?;
        let address = required("address", self.address)?;
        let city = required("city", self.city)?;
        let pincode = required("pincode", self.pincode)?;
        let payment_method = required("payment_method", self.payment_method)?
            .parse::<PaymentMethod>()
            .map_err(|_| Error::Validation("Invalid payment method".to_owned()))?;

        let email = self.email.map(|e| e.trim().to_owned()).unwrap_or_default();
        if !email.is_empty() && !email.validate_email() {
            return Err(Error::Validation("Enter a valid email address".to_owned()));
        }

        Ok(NewOrder {
            shipping: ShippingDetails {
                full_name,
                phone,
                email,
                address,
                city,
                pincode,
            },
            payment_method,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItemView {
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub product_price: Decimal,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

impl From<order_item::Model> for OrderItemView {
    fn from(item: order_item::Model) -> Self {
        Self {
            product_name: item.product_name,
            product_price: money::from_minor(item.product_price),
            quantity: item.quantity,
            subtotal: money::from_minor(item.subtotal),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackingView {
    pub tracking_number: String,
    pub current_status: TrackingStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
}

impl From<delivery_tracking::Model> for TrackingView {
    fn from(tracking: delivery_tracking::Model) -> Self {
        Self {
            tracking_number: tracking.tracking_number,
            current_status: tracking.current_status,
            estimated_delivery: tracking.estimated_delivery,
            actual_delivery: tracking.actual_delivery,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderDetail {
    pub order_id: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub pincode: String,
    pub status: Status,
    pub payment_method: PaymentMethod,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub items: Vec<OrderItemView>,
    pub tracking: Option<TrackingView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderDetail {
    fn new(
        order: order::Model,
        items: Vec<order_item::Model>,
        tracking: Option<delivery_tracking::Model>,
    ) -> Self {
        Self {
            order_id: order.order_id,
            full_name: order.full_name,
            phone: order.phone,
            email: order.email,
            address: order.address,
            city: order.city,
            pincode: order.pincode,
            status: order.status,
            payment_method: order.payment_method,
            total_amount: money::from_minor(order.total_amount),
            items: items.into_iter().map(OrderItemView::from).collect(),
            tracking: tracking.map(TrackingView::from),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub full_name: String,
    pub status: Status,
    pub payment_method: PaymentMethod,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<order::Model> for OrderSummary {
    fn from(order: order::Model) -> Self {
        Self {
            order_id: order.order_id,
            full_name: order.full_name,
            status: order.status,
            payment_method: order.payment_method,
            total_amount: money::from_minor(order.total_amount),
            created_at: order.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackingInfo {
    pub order_id: String,
    pub tracking_number: String,
    pub current_status: TrackingStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub delivery_notes: String,
}

#[instrument(skip(db, new_order), fields(payment_method = ?new_order.payment_method))]
pub async fn create_order(
    db: &DatabaseConnection,
    identity: &Identity,
    new_order: NewOrder,
    delivery_window: Duration,
) -> Result<OrderDetail> {
    let txn = db.begin().await?;

    let cart = cart::get_or_create_cart(&txn, identity).await?;
    let lines = cart::load_lines(&txn, cart.id).await?;
    if lines.is_empty() {
        return Err(Error::EmptyCart);
    }
    let total_amount = cart::total_minor(&lines)?;

    let now = Utc::now();
    let shipping = new_order.shipping;
    let order = order::ActiveModel {
        order_id: Set(ids::order_id()),
        user_id: Set(identity.user_id()),
        session_key: Set(identity.session_key().map(str::to_owned)),
        full_name: Set(shipping.full_name),
        phone: Set(shipping.phone),
        email: Set(shipping.email),
        address: Set(shipping.address),
        city: Set(shipping.city),
        pincode: Set(shipping.pincode),
        status: Set(Status::Pending),
        payment_method: Set(new_order.payment_method),
        total_amount: Set(total_amount),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let items = lines.iter().map(|line| order_item::ActiveModel {
        order_id: Set(order.id),
        product_name: Set(line.product_name.clone()),
        product_price: Set(line.unit_price_minor),
        quantity: Set(line.quantity),
        subtotal: Set(line.subtotal_minor),
        ..Default::default()
    });
    order_item::Entity::insert_many(items).exec(&txn).await?;

    let tracking = delivery_tracking::ActiveModel {
        order_id: Set(order.id),
        tracking_number: Set(ids::tracking_number(&order.order_id)),
        current_status: Set(TrackingStatus::OrderPlaced),
        estimated_delivery: Set(Some(now + delivery_window)),
        actual_delivery: Set(None),
        delivery_notes: Set(String::new()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    cart::clear_items(&txn, cart.id).await?;

    let items = order_items(&txn, order.id).await?;
    txn.commit().await?;

    info!(
        order_id = %order.order_id,
        items = items.len(),
        total = %money::from_minor(order.total_amount),
        "Order placed"
    );
    Ok(OrderDetail::new(order, items, Some(tracking)))
}

async fn order_items<C>(db: &C, order_id: i32) -> Result<Vec<order_item::Model>>
where
    C: ConnectionTrait,
{
    Ok(order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await?)
}

pub(crate) async fn find_order<C>(db: &C, order_id: &str) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    order::Entity::find()
        .filter(order::Column::OrderId.eq(order_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound("Order not found".to_owned()))
}

/// Conditional status write: only applies if the row still holds the status we read.
pub(crate) async fn transition_order<C>(db: &C, order: &order::Model, next: Status) -> Result<()>
where
    C: ConnectionTrait,
{
    if !order.status.can_transition_to(next) {
        return Err(Error::InvalidState(format!(
            "Order cannot move from {} to {}",
            order.status, next
        )));
    }

    let result = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(next))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Status.eq(order.status))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::InvalidState(format!(
            "Order {} changed status concurrently",
            order.order_id
        )));
    }

    info!(order_id = %order.order_id, from = %order.status, to = %next, "Order status changed");
    Ok(())
}

pub async fn get_order(
    db: &DatabaseConnection,
    identity: &Identity,
    order_id: &str,
) -> Result<OrderDetail> {
    let order = find_order(db, order_id).await?;
    authorize_order_access(identity, &order)?;

    let items = order_items(db, order.id).await?;
    let tracking = order
        .find_related(delivery_tracking::Entity)
        .one(db)
        .await?;

    Ok(OrderDetail::new(order, items, tracking))
}

/// Newest first. Anonymous sessions have no order history.
pub async fn list_orders(db: &DatabaseConnection, identity: &Identity) -> Result<Vec<OrderSummary>> {
    let user_id = identity.user_id().ok_or(Error::AuthenticationRequired)?;

    let orders = order::Entity::find()
        .filter(order::Column::UserId.eq(user_id))
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(db)
        .await?;

    Ok(orders.into_iter().map(OrderSummary::from).collect())
}

pub async fn track_order(
    db: &DatabaseConnection,
    identity: &Identity,
    order_id: &str,
) -> Result<TrackingInfo> {
    let order = find_order(db, order_id).await?;
    authorize_order_access(identity, &order)?;

    let tracking = order
        .find_related(delivery_tracking::Entity)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound("Tracking information not available".to_owned()))?;

    Ok(TrackingInfo {
        order_id: order.order_id,
        tracking_number: tracking.tracking_number,
        current_status: tracking.current_status,
        estimated_delivery: tracking.estimated_delivery,
        actual_delivery: tracking.actual_delivery,
        delivery_notes: tracking.delivery_notes,
    })
}

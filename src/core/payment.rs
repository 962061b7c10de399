//! Payment coordinator.
//!
//! A payment is created 1:1 with an order and moves along the ladder in
//! `entities::payment::Status`. Every status write is a conditional update on the expected
//! status, so concurrent calls on the same payment have at most one winner.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    prelude::Json, sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::{
    access::authorize_order_access,
    checkout::{find_order, transition_order},
    gateway::{ChargeRequest, GatewayOutcome, PaymentGateway},
    identity::Identity,
    ids,
};
use crate::entities::{
    order::{self, PaymentMethod},
    payment::{self, Gateway, Status},
    payment_attempt,
};
use crate::errors::{Error, Result};
use crate::money;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentCreated {
    pub payment_id: String,
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub gateway: Gateway,
    pub status: Status,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentProcessed {
    pub payment_id: String,
    pub status: Status,
    pub gateway_payment_id: String,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RefundReceipt {
    pub message: &'static str,
    pub payment_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub refund_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentStatusView {
    pub payment_id: String,
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub status: Status,
    pub gateway: Gateway,
    pub gateway_payment_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loads a payment together with its order and checks the caller owns that order.
async fn find_owned_payment<C>(
    db: &C,
    identity: &Identity,
    payment_id: &str,
) -> Result<(payment::Model, order::Model)>
where
    C: ConnectionTrait,
{
    let (payment, order) = payment::Entity::find()
        .filter(payment::Column::PaymentId.eq(payment_id))
        .find_also_related(order::Entity)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound("Payment not found".to_owned()))?;

    let order = order.ok_or_else(|| Error::NotFound("Order not found".to_owned()))?;
    authorize_order_access(identity, &order)?;

    Ok((payment, order))
}

/// Moves the payment from `from` to `to` only if the row still holds `from`.
/// Returns false when another writer got there first.
///
/// Callers issue this as the first statement of their transaction, so a contending
/// transaction waits for the write lock instead of failing on a stale read.
async fn compare_and_set<C>(db: &C, payment_id: &str, from: Status, to: Status) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = payment::Entity::update_many()
        .col_expr(payment::Column::Status, Expr::value(to))
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment::Column::PaymentId.eq(payment_id))
        .filter(payment::Column::Status.eq(from))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

#[instrument(skip(db, identity))]
pub async fn create_payment(
    db: &DatabaseConnection,
    identity: &Identity,
    order_id: &str,
    method: PaymentMethod,
) -> Result<PaymentCreated> {
    let order = find_order(db, order_id).await?;
    authorize_order_access(identity, &order)?;

    let existing = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(Error::DuplicatePayment);
    }

    let now = Utc::now();
    let new_payment = payment::ActiveModel {
        order_id: Set(order.id),
        payment_id: Set(ids::payment_id()),
        gateway: Set(method.gateway()),
        gateway_payment_id: Set(String::new()),
        amount: Set(order.total_amount),
        status: Set(Status::Pending),
        gateway_response: Set(Json::Object(Default::default())),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let payment = match new_payment.insert(db).await {
        Ok(payment) => payment,
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            warn!(order_id, "Concurrent payment creation lost the race");
            return Err(Error::DuplicatePayment);
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        payment_id = %payment.payment_id,
        order_id = %order.order_id,
        gateway = payment.gateway.as_str(),
        "Payment created"
    );

    Ok(PaymentCreated {
        payment_id: payment.payment_id,
        order_id: order.order_id,
        amount: money::from_minor(payment.amount),
        gateway: payment.gateway,
        status: payment.status,
    })
}

#[instrument(skip(db, gateway, identity, payload))]
pub async fn process_payment(
    db: &DatabaseConnection,
    gateway: &dyn PaymentGateway,
    identity: &Identity,
    payment_id: &str,
    payload: Json,
) -> Result<PaymentProcessed> {
    let txn = db.begin().await?;

    // Dropping `txn` on an error return rolls the claim back.
    let claimed = compare_and_set(&txn, payment_id, Status::Pending, Status::Processing).await?;
    let (payment, order) = find_owned_payment(&txn, identity, payment_id).await?;
    if !claimed {
        return Err(Error::InvalidState("Payment is not in pending status".to_owned()));
    }

    let outcome = match payment.gateway {
        Gateway::Cod => GatewayOutcome::Approved {
            gateway_payment_id: format!("COD_{}", payment.payment_id),
        },
        Gateway::Stripe | Gateway::Razorpay => gateway.charge(&ChargeRequest {
            gateway: payment.gateway,
            payment_id: &payment.payment_id,
            amount: money::from_minor(payment.amount),
            payload: &payload,
        }),
    };

    let (status, error_message) = match &outcome {
        GatewayOutcome::Approved { .. } => (Status::Completed, String::new()),
        GatewayOutcome::Declined { reason, .. } => (Status::Failed, reason.clone()),
    };
    let gateway_payment_id = outcome.gateway_payment_id().to_owned();

    let settled = payment::Entity::update_many()
        .col_expr(payment::Column::Status, Expr::value(status))
        .col_expr(
            payment::Column::GatewayPaymentId,
            Expr::value(gateway_payment_id.clone()),
        )
        .col_expr(payment::Column::GatewayResponse, Expr::value(payload.clone()))
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment::Column::Id.eq(payment.id))
        .filter(payment::Column::Status.eq(Status::Processing))
        .exec(&txn)
        .await?;
    if settled.rows_affected == 0 {
        return Err(Error::InvalidState("Payment is not in processing status".to_owned()));
    }

    payment_attempt::ActiveModel {
        payment_id: Set(payment.id),
        gateway_response: Set(payload),
        success: Set(outcome.is_approved()),
        error_message: Set(error_message),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    if status == Status::Completed {
        transition_order(&txn, &order, order::Status::Confirmed).await?;
    }

    txn.commit().await?;

    if outcome.is_approved() {
        info!(payment_id, order_id = %order.order_id, %status, "Payment processed");
    } else {
        warn!(payment_id, order_id = %order.order_id, %status, "Payment declined");
    }

    Ok(PaymentProcessed {
        payment_id: payment.payment_id,
        status,
        gateway_payment_id,
        success: outcome.is_approved(),
    })
}

/// `refund_amount` defaults to the full payment amount. A partial refund still moves the
/// payment to refunded.
#[instrument(skip(db, identity))]
pub async fn refund_payment(
    db: &DatabaseConnection,
    identity: &Identity,
    payment_id: &str,
    refund_amount: Option<Decimal>,
) -> Result<RefundReceipt> {
    let txn = db.begin().await?;

    let claimed = compare_and_set(&txn, payment_id, Status::Completed, Status::Refunded).await?;
    let (payment, order) = find_owned_payment(&txn, identity, payment_id).await?;
    if !claimed {
        return Err(Error::InvalidState(
            "Only completed payments can be refunded".to_owned(),
        ));
    }

    let paid = money::from_minor(payment.amount);
    let requested = refund_amount.unwrap_or(paid);
    if requested > paid {
        return Err(Error::Validation(
            "Refund amount cannot exceed payment amount".to_owned(),
        ));
    }
    if requested <= Decimal::ZERO {
        return Err(Error::Validation("Refund amount must be positive".to_owned()));
    }
    let refund_amount = money::from_minor(money::to_minor(requested)?);

    transition_order(&txn, &order, order::Status::Cancelled).await?;

    txn.commit().await?;
    info!(payment_id, order_id = %order.order_id, %refund_amount, "Payment refunded");

    Ok(RefundReceipt {
        message: "Refund processed successfully",
        payment_id: payment.payment_id,
        refund_amount,
    })
}

pub async fn get_status(
    db: &DatabaseConnection,
    identity: &Identity,
    payment_id: &str,
) -> Result<PaymentStatusView> {
    let (payment, order) = find_owned_payment(db, identity, payment_id).await?;

    Ok(PaymentStatusView {
        payment_id: payment.payment_id,
        order_id: order.order_id,
        amount: money::from_minor(payment.amount),
        status: payment.status,
        gateway: payment.gateway,
        gateway_payment_id: payment.gateway_payment_id,
        created_at: payment.created_at,
        updated_at: payment.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cart::add_item;
    use crate::core::checkout::{create_order, CheckoutRequest};
    use crate::core::gateway::{DecliningGateway, SimulatedGateway};
    use crate::test_utils::{create_test_product, setup_test_db};
    use chrono::Duration;
    use sea_orm::PaginatorTrait;
    use serde_json::json;

    fn session(key: &str) -> Identity {
        Identity::AnonymousSession(key.to_owned())
    }

    /// Places a Widget 100.00 x 2 order for session S1.
    async fn place_order(db: &DatabaseConnection, method: &str) -> Result<String> {
        let widget = create_test_product(db, "Widget", 10_000).await?;
        add_item(db, &session("S1"), widget.id, 2).await?;

        let request = CheckoutRequest {
            full_name: Some("Asha Rao".into()),
            phone: Some("9876543210".into()),
            address: Some("12 MG Road".into()),
            city: Some("Pune".into()),
            pincode: Some("411001".into()),
            payment_method: Some(method.into()),
            ..Default::default()
        };
        let order = create_order(db, &session("S1"), request.validate()?, Duration::days(5)).await?;
        Ok(order.order_id)
    }

    async fn attempts(db: &DatabaseConnection) -> Result<u64> {
        Ok(payment_attempt::Entity::find().count(db).await?)
    }

    #[tokio::test]
    async fn cash_on_delivery_flow_confirms_order() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "cod").await?;

        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Cod).await?;
        assert_eq!(created.amount, Decimal::new(20_000, 2));
        assert_eq!(created.gateway, Gateway::Cod);
        assert_eq!(created.status, Status::Pending);
        assert!(created.payment_id.starts_with("PAY"));

        let processed = process_payment(
            &db,
            &SimulatedGateway,
            &session("S1"),
            &created.payment_id,
            json!({}),
        )
        .await?;
        assert!(processed.success);
        assert_eq!(processed.status, Status::Completed);
        assert_eq!(processed.gateway_payment_id, format!("COD_{}", created.payment_id));

        let order = find_order(&db, &order_id).await?;
        assert_eq!(order.status, order::Status::Confirmed);
        assert_eq!(attempts(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn second_payment_for_an_order_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "card").await?;

        create_payment(&db, &session("S1"), &order_id, PaymentMethod::Card).await?;
        let again = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Card).await;

        assert!(matches!(again, Err(Error::DuplicatePayment)));
        assert_eq!(payment::Entity::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn card_payment_goes_through_the_gateway() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "card").await?;
        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Card).await?;
        assert_eq!(created.gateway, Gateway::Stripe);

        let payload = json!({"token": "tok_visa"});
        let processed = process_payment(
            &db,
            &SimulatedGateway,
            &session("S1"),
            &created.payment_id,
            payload.clone(),
        )
        .await?;
        assert_eq!(processed.gateway_payment_id, format!("GW_{}", created.payment_id));

        let stored = payment::Entity::find()
            .filter(payment::Column::PaymentId.eq(created.payment_id.as_str()))
            .one(&db)
            .await?
            .expect("payment row");
        assert_eq!(stored.gateway_response, payload);
        Ok(())
    }

    #[tokio::test]
    async fn declined_charge_fails_payment_and_keeps_order_pending() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "upi").await?;
        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Upi).await?;

        let gateway = DecliningGateway::new("Insufficient funds");
        let processed =
            process_payment(&db, &gateway, &session("S1"), &created.payment_id, json!({})).await?;
        assert!(!processed.success);
        assert_eq!(processed.status, Status::Failed);

        let attempt = payment_attempt::Entity::find()
            .one(&db)
            .await?
            .expect("attempt row");
        assert!(!attempt.success);
        assert_eq!(attempt.error_message, "Insufficient funds");
        assert_eq!(find_order(&db, &order_id).await?.status, order::Status::Pending);

        // Failed is terminal.
        let retry =
            process_payment(&db, &SimulatedGateway, &session("S1"), &created.payment_id, json!({}))
                .await;
        assert!(matches!(retry, Err(Error::InvalidState(_))));
        Ok(())
    }

    #[tokio::test]
    async fn processing_twice_logs_no_new_attempt() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "cod").await?;
        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Cod).await?;
        process_payment(&db, &SimulatedGateway, &session("S1"), &created.payment_id, json!({}))
            .await?;

        let second =
            process_payment(&db, &SimulatedGateway, &session("S1"), &created.payment_id, json!({}))
                .await;

        assert!(matches!(
            second,
            Err(Error::InvalidState(msg)) if msg == "Payment is not in pending status"
        ));
        assert_eq!(attempts(&db).await?, 1);
        let status = get_status(&db, &session("S1"), &created.payment_id).await?;
        assert_eq!(status.status, Status::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn refund_rules() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "cod").await?;
        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Cod).await?;

        let early = refund_payment(&db, &session("S1"), &created.payment_id, None).await;
        assert!(matches!(
            early,
            Err(Error::InvalidState(msg)) if msg == "Only completed payments can be refunded"
        ));

        process_payment(&db, &SimulatedGateway, &session("S1"), &created.payment_id, json!({}))
            .await?;

        let too_much = refund_payment(
            &db,
            &session("S1"),
            &created.payment_id,
            Some(Decimal::new(20_001, 2)),
        )
        .await;
        assert!(matches!(too_much, Err(Error::Validation(_))));
        let negative =
            refund_payment(&db, &session("S1"), &created.payment_id, Some(Decimal::NEGATIVE_ONE))
                .await;
        assert!(matches!(negative, Err(Error::Validation(_))));
        let sub_cent =
            refund_payment(&db, &session("S1"), &created.payment_id, Some(Decimal::new(1, 3)))
                .await;
        assert!(matches!(sub_cent, Err(Error::Validation(_))));
        let huge =
            refund_payment(&db, &session("S1"), &created.payment_id, Some(Decimal::MAX)).await;
        assert!(matches!(
            huge,
            Err(Error::Validation(msg)) if msg == "Refund amount cannot exceed payment amount"
        ));
        assert_eq!(
            get_status(&db, &session("S1"), &created.payment_id).await?.status,
            Status::Completed
        );

        let receipt = refund_payment(&db, &session("S1"), &created.payment_id, None).await?;
        assert_eq!(receipt.refund_amount, Decimal::new(20_000, 2));
        assert_eq!(receipt.message, "Refund processed successfully");
        assert_eq!(
            get_status(&db, &session("S1"), &created.payment_id).await?.status,
            Status::Refunded
        );
        assert_eq!(find_order(&db, &order_id).await?.status, order::Status::Cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn other_sessions_cannot_touch_the_payment() -> Result<()> {
        let db = setup_test_db().await?;
        let order_id = place_order(&db, "cod").await?;

        assert!(matches!(
            create_payment(&db, &session("S2"), &order_id, PaymentMethod::Cod).await,
            Err(Error::PermissionDenied)
        ));

        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Cod).await?;
        assert!(matches!(
            process_payment(&db, &SimulatedGateway, &session("S2"), &created.payment_id, json!({}))
                .await,
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            get_status(&db, &session("S2"), &created.payment_id).await,
            Err(Error::PermissionDenied)
        ));
        assert_eq!(attempts(&db).await?, 0);

        // The denied call left the payment pending for its owner.
        let status = get_status(&db, &session("S1"), &created.payment_id).await?;
        assert_eq!(status.status, Status::Pending);
        let processed =
            process_payment(&db, &SimulatedGateway, &session("S1"), &created.payment_id, json!({}))
                .await?;
        assert!(processed.success);
        assert!(matches!(
            refund_payment(&db, &session("S2"), &created.payment_id, None).await,
            Err(Error::PermissionDenied)
        ));
        let status = get_status(&db, &session("S1"), &created.payment_id).await?;
        assert_eq!(status.status, Status::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_payment_drops_its_attempts() -> Result<()> {
        use sea_orm::ModelTrait;

        let db = setup_test_db().await?;
        let order_id = place_order(&db, "cod").await?;
        let created = create_payment(&db, &session("S1"), &order_id, PaymentMethod::Cod).await?;
        process_payment(&db, &SimulatedGateway, &session("S1"), &created.payment_id, json!({}))
            .await?;

        find_order(&db, &order_id).await?.delete(&db).await?;

        assert_eq!(payment::Entity::find().count(&db).await?, 0);
        assert_eq!(attempts(&db).await?, 0);
        Ok(())
    }
}

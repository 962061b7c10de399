use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::payment::Gateway;

/// Snapshot of a cart at checkout. Only `status` (and `updated_at`) change after insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_id: String,
    #[sea_orm(indexed, nullable)]
    pub user_id: Option<i32>,
    #[sea_orm(indexed, nullable)]
    pub session_key: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    #[sea_orm(column_type = "Text")]
    pub address: String,
    pub city: String,
    pub pincode: String,
    pub status: Status,
    pub payment_method: PaymentMethod,
    /// Minor units.
    pub total_amount: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_one = "super::delivery_tracking::Entity")]
    DeliveryTracking,
    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
}

impl ActiveModelBehavior for ActiveModel {}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::delivery_tracking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryTracking.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(
    enum_name = "order_status_enum",
    db_type = "String(StringLen::N(20))",
    rs_type = "String"
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl Status {
    pub fn allowed_next(self) -> &'static [Status] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Shipped, Self::Cancelled],
            Self::Shipped => &[Self::Delivered, Self::Cancelled],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: Status) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(
    enum_name = "payment_method_enum",
    db_type = "String(StringLen::N(10))",
    rs_type = "String"
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "card")]
    Card,
    #[sea_orm(string_value = "upi")]
    Upi,
    #[sea_orm(string_value = "cod")]
    Cod,
}

impl PaymentMethod {
    pub fn gateway(self) -> Gateway {
        match self {
            Self::Card => Gateway::Stripe,
            Self::Upi => Gateway::Razorpay,
            Self::Cod => Gateway::Cod,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(Self::Card),
            "upi" => Ok(Self::Upi),
            "cod" => Ok(Self::Cod),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_and_delivered_are_terminal() {
        assert!(Status::Cancelled.allowed_next().is_empty());
        assert!(Status::Delivered.allowed_next().is_empty());
    }

    #[test]
    fn pending_order_can_only_be_confirmed_or_cancelled() {
        assert!(Status::Pending.can_transition_to(Status::Confirmed));
        assert!(Status::Pending.can_transition_to(Status::Cancelled));
        assert!(!Status::Pending.can_transition_to(Status::Shipped));
        assert!(!Status::Pending.can_transition_to(Status::Pending));
    }

    #[test]
    fn payment_method_maps_to_gateway() {
        assert_eq!(PaymentMethod::Card.gateway(), Gateway::Stripe);
        assert_eq!(PaymentMethod::Upi.gateway(), Gateway::Razorpay);
        assert_eq!(PaymentMethod::Cod.gateway(), Gateway::Cod);
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }
}

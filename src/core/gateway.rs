//! Payment gateway seam. Card and UPI charges go through a `PaymentGateway`; cash on
//! delivery never leaves the coordinator.

use rust_decimal::Decimal;
use sea_orm::prelude::Json;
use tracing::debug;

use crate::entities::payment::Gateway;

pub struct ChargeRequest<'a> {
    pub gateway: Gateway,
    pub payment_id: &'a str,
    pub amount: Decimal,
    /// Whatever the client sent alongside the process call.
    pub payload: &'a Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approved { gateway_payment_id: String },
    Declined { gateway_payment_id: String, reason: String },
}

impl GatewayOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn gateway_payment_id(&self) -> &str {
        match self {
            Self::Approved { gateway_payment_id } | Self::Declined { gateway_payment_id, .. } => {
                gateway_payment_id
            }
        }
    }
}

pub trait PaymentGateway: Send + Sync {
    fn charge(&self, request: &ChargeRequest<'_>) -> GatewayOutcome;
}

/// Approves every charge. Stands in for Stripe and Razorpay until real clients exist.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedGateway;

impl PaymentGateway for SimulatedGateway {
    fn charge(&self, request: &ChargeRequest<'_>) -> GatewayOutcome {
        debug!(
            gateway = request.gateway.as_str(),
            payment_id = request.payment_id,
            amount = %request.amount,
            "Simulated charge"
        );

        GatewayOutcome::Approved {
            gateway_payment_id: format!("GW_{}", request.payment_id),
        }
    }
}

/// Declines every charge with a fixed reason.
#[derive(Clone, Debug)]
pub struct DecliningGateway {
    pub reason: String,
}

impl DecliningGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PaymentGateway for DecliningGateway {
    fn charge(&self, request: &ChargeRequest<'_>) -> GatewayOutcome {
        GatewayOutcome::Declined {
            gateway_payment_id: format!("GW_{}", request.payment_id),
            reason: self.reason.clone(),
        }
    }
}

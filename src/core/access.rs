use tracing::warn;

use crate::core::identity::Identity;
use crate::entities::order;
use crate::errors::{Error, Result};

/// Grants access only when the requester is the order's owner. There is no fallback path.
pub fn authorize_order_access(identity: &Identity, order: &order::Model) -> Result<()> {
    if identity.owns(order.user_id, order.session_key.as_deref()) {
        Ok(())
    } else {
        warn!(order_id = %order.order_id, "Order access denied");
        Err(Error::PermissionDenied)
    }
}

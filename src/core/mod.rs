//! Domain logic. Handlers resolve an `Identity` and call in here; nothing below this module
//! knows about HTTP.

pub mod access;
pub mod accounts;
pub mod cart;
pub mod checkout;
pub mod gateway;
pub mod identity;
pub mod ids;
pub mod payment;

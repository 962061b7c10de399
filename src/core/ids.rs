//! Public identifiers. The timestamp keeps them readable; the random suffix keeps two
//! same-second requests apart. Uniqueness is still enforced by the columns.

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

const SUFFIX_LEN: usize = 6;

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect()
}

fn stamped(prefix: &str) -> String {
    format!("{}{}{}", prefix, Utc::now().timestamp(), random_suffix())
}

pub fn order_id() -> String {
    stamped("VC")
}

pub fn payment_id() -> String {
    stamped("PAY")
}

pub fn tracking_number(order_id: &str) -> String {
    format!("TRK{order_id}")
}

pub fn session_key() -> String {
    Uuid::new_v4().simple().to_string()
}

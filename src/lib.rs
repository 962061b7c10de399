pub mod api;
pub mod config;
pub mod core;
pub mod database;
pub mod entities;
pub mod errors;
pub mod middleware;
pub mod money;

#[cfg(test)]
mod test_utils;

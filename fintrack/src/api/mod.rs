//! Bend API access: transport, authentication flows and data fetchers.

mod auth;
mod client;
mod decode;
#[cfg(test)]
pub(crate) mod mock;
mod ratelimit;
mod transactions;
mod transport;

pub use auth::OtpExchange;
pub use client::BendClient;
pub use transactions::{TransactionFilters, TransactionSet, SORT_BY_TIMESTAMP, SORT_DESC};
pub use transport::{TransportConfig, HTTP_LOG_TARGET};

//! Data models for Bend records.

mod account;
mod envelope;
mod session;
mod transaction;
mod user;

pub use account::{Account, AccountData};
pub use envelope::{describe_error, ApiResponse, ResponseMeta};
pub use session::Session;
pub use transaction::{Transaction, TransactionCount, TransactionPage};
pub use user::{UserData, UserInfo};

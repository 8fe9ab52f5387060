//! Shared types for the pointmine workspace: configuration, errors,
//! user identity, point balances and structured trace events.

pub mod balance;
pub mod config;
pub mod error;
pub mod identity;
pub mod trace;

pub use balance::{Balance, BalanceError};
pub use error::{Error, Result};
pub use identity::UserId;

//! Point ledger: wallets, the `BalanceStore` contract and its backends.

pub mod accrue;
pub mod bounded;
pub mod file;
pub mod memory;
pub mod store;
pub mod types;

pub use accrue::accrue_points;
pub use bounded::{bounded, BoundedStore};
pub use file::FileBalanceStore;
pub use memory::MemoryBalanceStore;
pub use store::BalanceStore;
pub use types::{
    BalanceChange, MovementKind, MovementTarget, TransactionMovement, Wallet, WalletKind,
};

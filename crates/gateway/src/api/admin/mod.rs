//! Admin endpoints: manual accrual, session listing, shutdown.
//!
//! All of them use the `AdminGuard` extractor (see `guard.rs`), which
//! enforces the token named by `[admin] token_env`. If that env var is
//! unset, the endpoints are accessible without auth (dev mode).

mod accrual;
mod guard;
mod sessions;
mod system;

pub use guard::AdminGuard;

pub use accrual::run_accrual;
pub use sessions::list_sessions;
pub use system::shutdown;

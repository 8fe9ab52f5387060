pub mod accrual;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod sessions;
pub mod state;

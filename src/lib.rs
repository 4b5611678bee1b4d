pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod tui;

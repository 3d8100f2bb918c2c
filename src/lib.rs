pub mod amount;
pub mod bundler;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exit;
pub mod jupiter;
pub mod monitor;
pub mod position;
pub mod price;
pub mod relay;
pub mod rpc;
pub mod store;
pub mod telemetry;
pub mod trailing;

#[cfg(test)]
mod testkit;

pub use error::{FundsMoved, Result, TradeError};

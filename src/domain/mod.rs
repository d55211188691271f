//! Core domain types and logic: indicators, signals, risk, accounting and the
//! bar-by-bar driver.

pub mod config;
pub mod config_validation;
pub mod driver;
pub mod error;
pub mod fills;
pub mod indicator;
pub mod ledger;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod risk;
pub mod signal;
pub mod source;
pub mod universe;

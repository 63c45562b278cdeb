//! vintry - adaptive multi-tier product page acquisition.
//!
//! Retrieves product pages from hostile, inconsistent web sources by
//! routing each URL through progressively more expensive fetch strategies
//! (direct request, headless browser, paid rendering service), classifying
//! soft failures a status code would miss, and learning per-domain behavior
//! so future fetches start smarter.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod ledger;
pub mod models;
pub mod store;

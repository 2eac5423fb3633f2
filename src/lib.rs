//! AppointSync - Cross-language synchronization for appointment products
//!
//! Keeps the translations of an appointable product consistent: staff
//! relationships and availability rules follow the product into every
//! language, cross-reference metadata holds the whole translation group of the
//! record it points at, and reads resolve those references to the caller's
//! language.

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod classify;
pub mod latch;
pub mod reconcile;
pub mod crossref;
pub mod reader;
pub mod hooks;

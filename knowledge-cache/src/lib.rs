//! Knowledge Cache for Clinical Order Validation
//!
//! Provides the two-tier clinical knowledge base backing order validation:
//! - ICD-10-CM diagnosis and CPT procedure code lookup
//! - Appropriateness mappings between diagnoses and procedures
//! - Guideline document retrieval and keyword search
//! - Durable Postgres tier with a Redis (or in-process) fast tier
//! - Per-domain TTLs and graceful degradation on tier failure

pub mod store;
pub mod models;
pub mod tier;
pub mod cached;
pub mod postgres;
pub mod memory;
pub mod config;
pub mod error;

pub use store::*;
pub use models::*;
pub use tier::*;
pub use cached::*;
pub use postgres::*;
pub use memory::*;
pub use config::*;
pub use error::*;

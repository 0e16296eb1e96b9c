//! Clinical Order Validation Engine
//!
//! Validates imaging-order dictations against specialty policy and the
//! shared clinical knowledge base:
//! - Keyword extraction and knowledge-excerpt gathering
//! - Specialty word budgets and review checklists
//! - Prompt composition and generative review (API or offline heuristic)
//! - Tolerant normalization of model output into canonical verdicts
//! - Bounded-retry attempt tracking with governed physician overrides

pub mod attempts;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod policy;
pub mod prompt;
pub mod providers;
pub mod response;
pub mod service;

pub use attempts::*;
pub use config::*;
pub use error::*;
pub use extraction::*;
pub use models::*;
pub use policy::*;
pub use prompt::*;
pub use providers::*;
pub use response::*;
pub use service::*;

//! Câmara dos Deputados open data API.
//!
//! # Architecture
//!
//! - [`CamaraApiClient`] - Trait defining the endpoints the pipeline reads
//! - [`HttpCamaraClient`] - Real HTTP implementation using reqwest
//! - [`mock::MockCamaraClient`] - Scripted client for unit tests (behind `test-utils` feature)
//!
//! Typed records for the rows read back by consumers live in [`types`].

mod client;
pub mod types;

pub use client::{ApiError, CamaraApiClient, ExpenseQuery, HttpCamaraClient};
pub use types::{
    ExpenseRecord, LegislatorOffice, LegislatorSummary, Link, Record, ENVELOPE_FIELD,
    LEGISLATOR_FK,
};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock;

//! Data models for vintry.

mod fetch;
mod profile;

pub use fetch::{
    CostRecord, DomainCookie, FailureRecord, FetchAttempt, FetchHints, FetchResult, SoftFailure,
    Tier, TransportError, TransportResponse,
};
pub use profile::DomainProfile;

// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod cache;
pub mod config;
pub mod extract;
pub mod metrics;
pub mod normalize;
pub mod resolve;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cache::{CacheEntry, DebugTrace, ValueCache};
pub use crate::extract::{Candidate, CandidatePool, Origin};
pub use crate::resolve::{
    BodyShape, EndpointSpec, ExtractionResult, Fetch, FetchResponse, HttpFetcher, ValueResolver,
};

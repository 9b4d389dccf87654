// ABOUTME: Dispatch module — bounded, deadline-enforcing access to the upstream services.
// ABOUTME: Includes the phrase-cache fast path that can answer without an upstream call.

pub mod phrases;
pub mod pool;

pub use phrases::{PhraseCache, PhraseRule};
pub use pool::{DispatchPool, DispatchResult, DispatchStats};

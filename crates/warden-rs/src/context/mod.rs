//! Context budget allocation.
//!
//! Before each worker turn the allocator turns a [`ContextSnapshot`] into
//! [`ScoringCandidate`]s, ranks them, and keeps whatever fits in the token
//! budget:
//!
//! - [`budget`]: token estimation and the greedy skip-not-stop fill.
//! - [`candidate`]: candidate snippets and their scoring signals.
//! - [`scoring`]: weights, decision decay, and ranking.
//! - [`injector`]: snapshot model and [`ContextAllocator`].

pub mod budget;
pub mod candidate;
pub mod injector;
pub mod scoring;

pub use budget::{BudgetFill, DEFAULT_CHARS_PER_TOKEN, estimate_tokens, estimate_tokens_with, fill_budget};
pub use candidate::{CandidateKind, CandidateSignals, ScoringCandidate};
pub use injector::{
    CONTEXT_HEADER, ContextAllocator, ContextInjection, ContextSnapshot, DecisionRecord,
    KEY_DECISIONS, PeerActivity, TaskContext, TaskStatus,
};
pub use scoring::{
    ContextScoringConfig, DecayMode, DecisionDecay, ScoredCandidate, ScoringWeights,
    rank_candidates, score_candidate,
};

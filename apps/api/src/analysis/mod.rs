// Photo-to-meal analysis workflow.
// Implements: the per-session state machine, the in-memory session registry,
// and the HTTP handlers driving both. All provider calls go through
// llm_client — no direct HTTP calls to inference APIs here.

pub mod handlers;
pub mod pipeline;
pub mod sessions;

//! Stage-gated workflow engine for LLM-assisted book production.
//!
//! A book moves through outline generation, a human outline gate, chapter
//! decomposition, per-chapter generation with cross-chapter context
//! chaining, a human chapter gate, and final compilation. This crate owns
//! the lifecycle rules and invariants; persistence, text generation,
//! notification delivery, and artifact export are injected collaborators
//! ([`folio_db::store::Store`], [`generator::Generator`],
//! [`notify::Notifier`], [`export::BookExporter`]).

pub mod book;
pub mod chapter;
pub mod compile;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod generator;
pub mod notify;
pub mod outline;
pub mod workflow;

pub use config::EngineConfig;
pub use error::EngineError;
pub use workflow::Engine;

//! Core types and trait definitions for the Rubric evaluation engine.
//!
//! This crate is deliberately free of HTTP and database dependencies;
//! every other crate in the workspace depends on it.
//!
//! The scoring engine itself ([`normalize`], [`aggregate`]) is pure and
//! synchronous: it reads its inputs and returns fresh results, so it is
//! safe to call from any number of threads. Persistence and transition
//! serialization live behind the [`store::EvaluationStore`] trait.

pub mod aggregate;
pub mod criterion;
pub mod error;
pub mod normalize;
pub mod score;
pub mod session;
pub mod store;
pub mod template;

pub use aggregate::aggregate;
pub use error::{Error, Result};
pub use normalize::normalize;

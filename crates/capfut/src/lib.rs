//! # Capfut
//!
//! A small toolkit for single-threaded promise plumbing on top of tokio's
//! current-thread machinery. Everything here assumes it is driven from inside
//! a `tokio::task::LocalSet`; none of the types are `Send`.
//!
//! ## Architecture
//!
//! The toolkit covers the four primitives an in-process call runtime needs
//! beyond plain `async`/`await`:
//!
//! - [`ForkedPromise`] turns a single-consumer future into an ordered
//!   multi-consumer broadcast: branches observe the shared result in the
//!   order they were added.
//! - [`eval_later`] defers a thunk to a subsequent event-loop turn.
//! - [`spawn_daemon`] detaches a future, running it to completion with its
//!   error funnelled into the log.
//! - [`race`] resolves to whichever of two futures settles first, dropping
//!   the loser.

mod defer;
mod fork;
mod select;
mod task;

pub use defer::eval_later;
pub use fork::Branch;
pub use fork::ForkedPromise;
pub use select::race;
pub use task::spawn_daemon;
pub use task::ScopedTask;

//! converge: declarative state convergence.
//!
//! Compiles desired-state documents into chunks, validates them, binds them
//! to registered actions and runs them in an order that honours `require`.

pub mod cli;
pub mod core;
pub mod matcher;
pub mod states;
pub mod transport;

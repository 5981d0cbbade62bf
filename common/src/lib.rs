//! Corebank Common Types
//!
//! Shared types used across the corebank workspace: account and transaction
//! identifiers, exact-decimal money helpers, the ledger error taxonomy and
//! time utilities.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;

//! SQL construction: literal escaping, filter/order compilation, statement
//! assembly, identifier qualification and dialect translation.
//!
//! ```text
//! FilterSpec ──validate──▶ Filter ──compile──▶ predicate text
//!                                               │
//! relation name ──qualify──▶ CanonicalIdentifier ──▶ canonical statement
//!                                                           │
//!                                         Dialect::translate ▼
//!                                                    warehouse-native SQL
//! ```
mod builder;
mod dialect;
mod escape;
mod filter;
mod identifier;

pub use builder::*;
pub use dialect::*;
pub use escape::*;
pub use filter::*;
pub use identifier::*;

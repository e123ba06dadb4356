mod connection;
mod driver;
mod query;
mod value;
mod warehouse;

pub use connection::*;
pub use driver::*;
pub use query::*;
pub use value::*;
pub use warehouse::*;

#[cfg(test)]
pub(crate) use driver::scripted;

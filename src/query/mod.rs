pub mod executor;
pub mod operators;
pub mod plan;

pub use executor::{QueryDescriptor, QueryLimits, materialize, materialize_at};
pub use plan::{Expr, Order, SortKey, at, lit, prop};

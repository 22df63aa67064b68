//! Generic repository/query layer.
//!
//! Layers, leaf to root: [`introspect`] reflects and caches table
//! constraints, [`filter`] compiles query parameters into predicates,
//! [`query`] assembles executable read statements, and [`repository`] wires
//! them together with constraint enforcement and mutations.

pub mod filter;
pub mod introspect;
pub mod query;
pub mod repository;
pub mod traits;

pub use filter::FilterValue;
pub use introspect::{ConstraintCache, TableConstraints};
pub use query::EntityQuery;
pub use repository::Repository;
pub use traits::{
    ColumnDef, Entity, FieldKind, FieldSet, ManyToMany, Order, QuerySpec, RelationLoader,
    SqlValue, now_iso8601,
};

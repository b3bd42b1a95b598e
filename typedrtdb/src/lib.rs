pub mod backend;
pub mod error;
pub mod listener;
pub mod path;
pub mod query;
pub mod reference;
pub mod schema;
pub mod snapshot;
pub mod validation;

pub use backend::{Backend, EventKind, MemoryBackend};
pub use error::{Result, StoreError, TypedRtdbError};
pub use listener::{Event, Listener};
pub use query::{Constraint, NativeQuery, Primitive, Query, QueryConstraint};
pub use reference::{Database, Reference, TransactionResult};
pub use schema::{parse_schema, parse_schema_str, Shape};
pub use snapshot::{DataSnapshot, ExistingSnapshot};

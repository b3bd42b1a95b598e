mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str, DYNAMIC_KEY, LIST_KEY, UNION_KEY};
pub use types::{Field, LeafKind, Shape};

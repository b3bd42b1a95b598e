//! typedrtdb code generation - generates Rust types from a database schema at compile time.
//!
//! The main entry point is [`generate_from_schema`], which reads a schema file
//! and writes a Rust source file with one struct per fixed object, a partial
//! struct for updates, and the `PATHS` table of path patterns.

mod generator;
mod struct_gen;
pub mod type_utils;

use std::path::Path;

/// Generate Rust types from a schema file.
///
/// Reads the schema at `schema_path`, generates typed Rust code, and writes
/// the output to `output_path`. This is intended to be called from a `build.rs`
/// build script.
///
/// # Example
///
/// ```no_run
/// // In build.rs:
/// typedrtdb_codegen::generate_from_schema("schema.yaml", "src/generated.rs").unwrap();
/// ```
pub fn generate_from_schema(
    schema_path: &str,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = typedrtdb::schema::parse_schema(Path::new(schema_path))?;
    let tokens = generator::generate_all(&schema);
    let formatted = generator::format_token_stream(&tokens);
    std::fs::write(output_path, formatted)?;
    Ok(())
}

/// Generate Rust types from a schema YAML string.
///
/// Like [`generate_from_schema`] but takes the schema content directly
/// instead of reading from a file. Useful for testing.
pub fn generate_from_schema_str(
    schema_yaml: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let schema = typedrtdb::schema::parse_schema_str(schema_yaml)?;
    let tokens = generator::generate_all(&schema);
    let formatted = generator::format_token_stream(&tokens);
    Ok(formatted)
}

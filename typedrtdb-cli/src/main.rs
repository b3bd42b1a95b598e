use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use typedrtdb::path::{parent_path, path_patterns, resolve, valid_child_patterns};
use typedrtdb::{Database, MemoryBackend, Primitive, Query, Reference, Shape};

/// typedrtdb CLI - inspect a database schema, check writes and run queries
#[derive(Parser)]
#[command(name = "typedrtdb", version, about)]
struct Cli {
    /// Path to the schema file
    #[arg(long, default_value = "schema.yaml")]
    schema: PathBuf,

    /// JSON fixture loaded into an in-memory store for `query` and `get`
    #[arg(long)]
    data: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, ValueEnum)]
enum WriteOp {
    Set,
    Update,
    Push,
}

#[derive(Subcommand)]
enum Command {
    /// Show the shape stored at a path
    Resolve {
        /// Slash-delimited path (e.g. users/u1/score)
        path: String,
    },

    /// Show the parent of a path
    Parent {
        path: String,
    },

    /// List the child path patterns accepted below a path
    Children {
        path: String,
    },

    /// List every path pattern in the schema
    Patterns,

    /// Check a write against the schema without touching any data
    Check {
        #[arg(value_enum)]
        op: WriteOp,
        path: String,
        /// The value as JSON (for `update`, an object of relative paths)
        value: String,
    },

    /// Compile a query and, with --data, run it
    Query {
        path: String,
        #[command(flatten)]
        constraints: QueryArgs,
    },

    /// Read a location from the --data fixture
    Get {
        path: String,
    },
}

/// Constraints are applied as: ordering, start-at, start-after, end-at,
/// end-before, equal-to, limit-to-first, limit-to-last.
#[derive(Args, Default)]
struct QueryArgs {
    #[arg(long)]
    order_by_key: bool,
    #[arg(long)]
    order_by_value: bool,
    #[arg(long)]
    order_by_priority: bool,
    /// Relative path inside each child to order by
    #[arg(long, value_name = "PATH")]
    order_by_child: Option<String>,

    /// Range values are JSON (10, "abc", true, null); bare words are strings
    #[arg(long, value_name = "VALUE")]
    start_at: Option<String>,
    #[arg(long, value_name = "VALUE")]
    start_after: Option<String>,
    #[arg(long, value_name = "VALUE")]
    end_at: Option<String>,
    #[arg(long, value_name = "VALUE")]
    end_before: Option<String>,
    #[arg(long, value_name = "VALUE")]
    equal_to: Option<String>,

    #[arg(long)]
    limit_to_first: Option<u32>,
    #[arg(long)]
    limit_to_last: Option<u32>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let schema = typedrtdb::parse_schema(&cli.schema)?;

    match cli.command {
        Command::Resolve { path } => {
            let shape = resolve_or_fail(&schema, &path)?;
            print_output(
                &json!({
                    "path": path,
                    "type": shape.to_string(),
                    "shape": serde_json::to_value(&shape)?,
                }),
                &cli.format,
            )?;
        }

        Command::Parent { path } => {
            print_output(&json!({ "path": path, "parent": parent_path(&path) }), &cli.format)?;
        }

        Command::Children { path } => {
            let shape = resolve_or_fail(&schema, &path)?;
            let children: Vec<String> = valid_child_patterns(&shape).into_iter().collect();
            print_output(&json!({ "path": path, "children": children }), &cli.format)?;
        }

        Command::Patterns => {
            print_output(&json!(path_patterns(&schema)), &cli.format)?;
        }

        Command::Check { op, path, value } => {
            let value: Value = serde_json::from_str(&value)?;
            // Writes go to a scratch store so the checks are exactly those of a real write
            let db = Database::new(schema, Arc::new(MemoryBackend::new()));
            let reference = db.reference(&path)?;
            match op {
                WriteOp::Set => reference.set(&value)?,
                WriteOp::Update => match &value {
                    Value::Object(entries) => reference.update(entries)?,
                    _ => return Err("update needs a JSON object of entries".into()),
                },
                WriteOp::Push => {
                    reference.push(&value)?;
                }
            }
            print_output(&json!({ "ok": true, "path": path }), &cli.format)?;
        }

        Command::Query { path, constraints } => {
            let has_data = cli.data.is_some();
            let db = open_database(schema, cli.data.as_deref())?;
            let query = build_query(&db.reference(&path)?, &constraints)?;
            let mut output = json!({ "query": serde_json::to_value(query.compile())? });

            if has_data {
                let rows: Vec<Value> = query
                    .get()?
                    .children()
                    .into_iter()
                    .map(|child| json!({ "key": child.key(), "value": child.val() }))
                    .collect();
                output["result"] = Value::Array(rows);
            }
            print_output(&output, &cli.format)?;
        }

        Command::Get { path } => {
            if cli.data.is_none() {
                return Err("get needs --data".into());
            }
            let db = open_database(schema, cli.data.as_deref())?;
            let snapshot = db.reference(&path)?.get()?;
            print_output(
                &json!({ "path": path, "exists": snapshot.exists(), "value": snapshot.val() }),
                &cli.format,
            )?;
        }
    }

    Ok(())
}

fn resolve_or_fail(schema: &Shape, path: &str) -> Result<Shape, String> {
    resolve(schema, path).ok_or_else(|| format!("'{path}' is not in the schema"))
}

fn open_database(schema: Shape, data: Option<&Path>) -> Result<Database, Box<dyn std::error::Error>> {
    let backend = match data {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read data file '{}': {e}", path.display()))?;
            MemoryBackend::with_data(serde_json::from_str(&raw)?)
        }
        None => MemoryBackend::new(),
    };
    Ok(Database::new(schema, Arc::new(backend)))
}

fn build_query(reference: &Reference, args: &QueryArgs) -> typedrtdb::Result<Query> {
    let mut query = reference.query();

    if args.order_by_key {
        query = query.order_by_key()?;
    }
    if args.order_by_value {
        query = query.order_by_value()?;
    }
    if args.order_by_priority {
        query = query.order_by_priority()?;
    }
    if let Some(child) = &args.order_by_child {
        query = query.order_by_child(child)?;
    }

    if let Some(raw) = &args.start_at {
        query = query.start_at(parse_primitive(raw)?, None)?;
    }
    if let Some(raw) = &args.start_after {
        query = query.start_after(parse_primitive(raw)?, None)?;
    }
    if let Some(raw) = &args.end_at {
        query = query.end_at(parse_primitive(raw)?, None)?;
    }
    if let Some(raw) = &args.end_before {
        query = query.end_before(parse_primitive(raw)?, None)?;
    }
    if let Some(raw) = &args.equal_to {
        query = query.equal_to(parse_primitive(raw)?, None)?;
    }

    if let Some(limit) = args.limit_to_first {
        query = query.limit_to_first(limit);
    }
    if let Some(limit) = args.limit_to_last {
        query = query.limit_to_last(limit);
    }

    Ok(query)
}

fn parse_primitive(raw: &str) -> typedrtdb::Result<Primitive> {
    // Try to parse as JSON (numbers, booleans, null, quoted strings)
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Primitive::try_from(value)
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use typedrtdb::{parse_schema_str, QueryConstraint, TypedRtdbError};

    fn users() -> Reference {
        let schema = parse_schema_str("users:\n  \"*\":\n    name: string\n    score: number\n").unwrap();
        Database::new(schema, Arc::new(MemoryBackend::new())).reference("users").unwrap()
    }

    #[test]
    fn test_parse_primitive() {
        assert_eq!(parse_primitive("10").unwrap(), Primitive::from(10));
        assert_eq!(parse_primitive("abc").unwrap(), Primitive::from("abc"));
        assert_eq!(parse_primitive("\"10\"").unwrap(), Primitive::from("10"));
        assert_eq!(parse_primitive("null").unwrap(), Primitive::Null);
        assert!(parse_primitive("[1]").is_err());
    }

    #[test]
    fn test_build_query_order() {
        let args = QueryArgs {
            order_by_child: Some("score".into()),
            start_at: Some("5".into()),
            limit_to_last: Some(2),
            ..Default::default()
        };
        let native = build_query(&users(), &args).unwrap().compile();
        assert_eq!(
            native.constraints,
            vec![
                QueryConstraint::OrderByChild { path: "score".into() },
                QueryConstraint::StartAt { value: json!(5), key: None },
                QueryConstraint::LimitToLast { limit: 2 },
            ]
        );
    }

    #[test]
    fn test_build_query_conflicts() {
        let args = QueryArgs {
            order_by_key: true,
            order_by_child: Some("score".into()),
            ..Default::default()
        };
        let err = build_query(&users(), &args).unwrap_err();
        assert!(matches!(err, TypedRtdbError::ConstraintConflict(_)));
    }
}

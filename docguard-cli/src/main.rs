use clap::{Parser, Subcommand, ValueEnum};
use docguard::plan::PLAN_FILE;
use docguard::schema::parse_schema;
use docguard::store::SqliteStore;
use docguard::validation::{apply_defaults, validate_document};
use docguard::{
    check_unique, connect, load_plan, CheckOptions, CollectionSchema, ConnectionDetails,
    Constrained, DocumentStore, RelationConfig, RelationSpec, SchemaDefinition, SchemaValidator,
    StoreSource, UniquenessSpec,
};
use std::path::{Path, PathBuf};
use std::process;

/// Database name used when neither --database nor a plan provides one
const DATABASE_ENV: &str = "DOCGUARD_DATABASE";

/// docguard: check uniqueness and referential integrity of document collections
#[derive(Parser)]
#[command(name = "docguard", version, about)]
struct Cli {
    /// Store URL: dir://<path>, sqlite://<path> or sqlite::memory: (default: $DOCGUARD_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Database name (default: $DOCGUARD_DATABASE, or the plan's database)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "yaml")]
    format: OutputFormat,

    /// Stop each check at its first violation
    #[arg(long, global = true)]
    first: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run every check declared in a plan file
    Check {
        /// Plan file
        #[arg(long, default_value = PLAN_FILE)]
        plan: PathBuf,
    },

    /// Check that fields hold distinct values across a collection
    Unique {
        /// Collection name
        collection: String,
        /// Field that must be unique (repeatable)
        #[arg(long = "field", required = true)]
        fields: Vec<String>,
        /// Schema file declaring the collection
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Check that main-collection fields reference values in a relation collection
    Relation {
        /// Main collection name
        main: String,
        /// Relation collection name
        relation: String,
        /// Field mapping (e.g. --map collection=collectionslug)
        #[arg(long = "map", value_parser = parse_key_value, required = true)]
        mappings: Vec<(String, String)>,
        /// Match each main field only against its own relation field
        #[arg(long)]
        per_field: bool,
        /// Schema file declaring both collections
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Check every document of a collection against its schema
    Validate {
        /// Collection name
        collection: String,
        /// Schema file declaring the collection
        #[arg(long)]
        schema: PathBuf,
    },

    /// List the collections in the database
    Collections,

    /// Load documents from a YAML or JSON list into a SQLite store
    Import {
        /// Collection name
        collection: String,
        /// File holding a list of documents
        file: PathBuf,
        /// Remove the collection's existing documents first
        #[arg(long)]
        replace: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("ERROR:{e}");
            process::exit(1);
        }
    }
}

/// Returns whether every check passed.
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut options = CheckOptions::default();
    if cli.first {
        options = options.first_violation();
    }

    match &cli.command {
        Command::Check { plan } => {
            let mut plan = load_plan(plan)?;
            if let Some(database) = database_override(&cli) {
                plan.database = database;
            }
            if cli.first {
                plan.options = plan.options.first_violation();
            }
            let store = connect(&plan.connection_details(cli.url.as_deref())?)?;
            let report = plan.run(store.as_ref())?;
            print_output(&serde_json::to_value(&report)?, &cli.format)?;
            Ok(report.is_ok())
        }

        Command::Unique {
            collection,
            fields,
            schema,
        } => {
            let database = require_database(&cli)?;
            let store = open_store(&cli)?;
            let schema = collection_schema(schema.as_deref(), collection)?;

            let raw = store.fetch_all(&database, collection)?;
            let records = schema.validate_array(&raw)?;
            let report = check_unique(
                &records,
                &UniquenessSpec::from_fields(fields.iter().cloned()),
                options.mode,
            );
            print_output(&serde_json::to_value(&report)?, &cli.format)?;
            Ok(report.is_ok())
        }

        Command::Relation {
            main,
            relation,
            mappings,
            per_field,
            schema,
        } => {
            if *per_field {
                options = options.per_field();
            }
            let database = require_database(&cli)?;
            let main_schema = collection_schema(schema.as_deref(), main)?;
            let relation_schema = collection_schema(schema.as_deref(), relation)?;

            let config = RelationConfig {
                database,
                main_collection: main.clone(),
                main_schema: &main_schema,
                relation_collection: relation.clone(),
                relation_schema: &relation_schema,
                relations: mappings.iter().cloned().collect::<RelationSpec>(),
                source: StoreSource::Details(connection_details(&cli)?),
                options,
            };
            let report = config.check()?;
            print_output(&serde_json::to_value(&report)?, &cli.format)?;
            Ok(report.is_ok())
        }

        Command::Validate { collection, schema } => {
            let database = require_database(&cli)?;
            let store = open_store(&cli)?;
            let schema = collection_schema(Some(schema.as_path()), collection)?;
            let raw = store.fetch_all(&database, collection)?;

            let check = Constrained::new(schema);
            let mut issues = Vec::new();
            for (index, doc) in raw.iter().enumerate() {
                if !check.check(doc) {
                    let mut data = doc.clone();
                    apply_defaults(check.schema(), &mut data);
                    let result = validate_document(check.schema(), &data);
                    issues.push(serde_json::json!({
                        "index": index,
                        "id": serde_json::to_value(doc.get("_id"))?,
                        "errors": result.errors,
                    }));
                }
            }

            let ok = issues.is_empty();
            print_output(
                &serde_json::json!({
                    "collection": collection,
                    "total": raw.len(),
                    "issues": issues,
                }),
                &cli.format,
            )?;
            Ok(ok)
        }

        Command::Collections => {
            let database = require_database(&cli)?;
            let store = open_store(&cli)?;
            let names = store.collections(&database)?;
            print_output(&serde_json::to_value(&names)?, &cli.format)?;
            Ok(true)
        }

        Command::Import {
            collection,
            file,
            replace,
        } => {
            let database = require_database(&cli)?;
            let details = connection_details(&cli)?;
            let path = details
                .url
                .strip_prefix("sqlite://")
                .ok_or("import requires a sqlite:// store URL")?;
            let store = SqliteStore::open(Path::new(path))?;

            let content = std::fs::read_to_string(file)
                .map_err(|e| format!("Failed to read '{}': {e}", file.display()))?;
            let documents: Vec<serde_yaml::Value> = serde_yaml::from_str(&content)?;

            if *replace {
                store.clear_collection(&database, collection)?;
            }
            let ids = store.insert_many(&database, collection, &documents)?;
            print_output(
                &serde_json::json!({ "ok": true, "imported": ids.len() }),
                &cli.format,
            )?;
            Ok(true)
        }
    }
}

fn database_override(cli: &Cli) -> Option<String> {
    cli.database
        .clone()
        .or_else(|| std::env::var(DATABASE_ENV).ok().filter(|d| !d.is_empty()))
}

fn require_database(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    database_override(cli)
        .ok_or_else(|| format!("No database given (use --database or {DATABASE_ENV})").into())
}

fn connection_details(cli: &Cli) -> docguard::Result<ConnectionDetails> {
    match &cli.url {
        Some(url) => Ok(ConnectionDetails::new(url.clone())),
        None => ConnectionDetails::from_env(),
    }
}

fn open_store(cli: &Cli) -> docguard::Result<Box<dyn DocumentStore>> {
    connect(&connection_details(cli)?)
}

/// The named collection's schema from a schema file, or a permissive one.
fn collection_schema(
    schema_file: Option<&Path>,
    collection: &str,
) -> Result<CollectionSchema, Box<dyn std::error::Error>> {
    let Some(path) = schema_file else {
        return Ok(CollectionSchema::permissive(collection));
    };
    let definition: SchemaDefinition = parse_schema(path)?;
    definition
        .collection(collection)
        .cloned()
        .ok_or_else(|| {
            format!(
                "Collection '{collection}' is not declared in {}",
                path.display()
            )
            .into()
        })
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("collection=collectionslug").unwrap(),
            ("collection".to_string(), "collectionslug".to_string())
        );
        assert!(parse_key_value("collection").is_err());
    }

    #[test]
    fn test_cli_parses_relation() {
        let cli = Cli::try_parse_from([
            "docguard",
            "--database",
            "site",
            "relation",
            "music",
            "music-collection",
            "--map",
            "collection=collectionslug",
            "--per-field",
        ])
        .unwrap();
        match cli.command {
            Command::Relation {
                mappings, per_field, ..
            } => {
                assert_eq!(mappings.len(), 1);
                assert!(per_field);
            }
            _ => panic!("expected relation command"),
        }
    }

    #[test]
    fn test_permissive_schema_without_file() {
        let schema = collection_schema(None, "music").unwrap();
        assert_eq!(schema.name, "music");
        assert!(schema.fields.is_empty());
    }
}

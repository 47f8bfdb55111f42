//! JSON:API document CLI
//!
//! Command-line interface for converting request documents and applying
//! atomic operations against an in-memory store.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use jsonapi_core::{
    Cancellation, DocumentAdapter, Endpoint, GraphError, HookRegistry, IdPresence, IdentityRules,
    MemoryStore, Options, OperationsProcessor, RequestContext, ResourceGraph,
    ResourceObjectAdapter, ResponseBuilder, SingleOrManyData, WriteOperationKind,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsonapi-doc")]
#[command(about = "Convert and apply JSON:API request documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a request document into the request model
    Convert {
        /// Request document file
        document: PathBuf,

        /// Resource graph definition file
        #[arg(long)]
        graph: PathBuf,

        /// Resource type in the endpoint URL (omit for /operations)
        #[arg(long = "type")]
        type_name: Option<String>,

        /// Resource ID in the endpoint URL
        #[arg(long, requires = "type_name")]
        id: Option<String>,

        /// Relationship in the endpoint URL
        #[arg(long, requires = "id")]
        relationship: Option<String>,

        /// HTTP method of the request
        #[arg(long, value_enum, default_value_t = Method::Post)]
        method: Method,

        /// Options file (JSON)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Execute an atomic operations document against an in-memory store
    Apply {
        /// Atomic operations document file
        document: PathBuf,

        /// Resource graph definition file
        #[arg(long)]
        graph: PathBuf,

        /// Document with the initial resources, as `{"data": [...]}`
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Options file (JSON)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a resource graph definition file
    LintGraph {
        /// Graph definition file
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Method {
    Post,
    Patch,
    Delete,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            document,
            graph,
            type_name,
            id,
            relationship,
            method,
            options,
            pretty,
        } => run_convert(ConvertArgs {
            document,
            graph,
            type_name,
            id,
            relationship,
            method,
            options,
            pretty,
        }),

        Commands::Apply {
            document,
            graph,
            seed,
            options,
            pretty,
        } => run_apply(&document, &graph, seed.as_deref(), options.as_deref(), pretty).await,

        Commands::LintGraph { path } => run_lint_graph(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct ConvertArgs {
    document: PathBuf,
    graph: PathBuf,
    type_name: Option<String>,
    id: Option<String>,
    relationship: Option<String>,
    method: Method,
    options: Option<PathBuf>,
    pretty: bool,
}

fn run_convert(args: ConvertArgs) -> Result<(), u8> {
    let graph = load_graph(&args.graph)?;
    let options = load_options(args.options.as_deref())?;
    let ctx = request_context(args.type_name, args.id, args.relationship, args.method)?;
    let body = if ctx.write_operation == Some(WriteOperationKind::DeleteResource)
        && ctx.endpoint == Endpoint::Primary
    {
        String::new()
    } else {
        read_file(&args.document)?
    };

    match DocumentAdapter::new(&graph, &options).convert_body(&body, &ctx) {
        Ok(model) => {
            let value = serde_json::to_value(&model).map_err(|e| {
                eprintln!("Error serializing output: {}", e);
                2u8
            })?;
            print_json(&value, args.pretty)
        }
        Err(err) => {
            print_json(&ResponseBuilder::new(&graph, &options).errors(&err), args.pretty)?;
            Err(1)
        }
    }
}

fn request_context(
    type_name: Option<String>,
    id: Option<String>,
    relationship: Option<String>,
    method: Method,
) -> Result<RequestContext, u8> {
    let Some(type_name) = type_name else {
        return Ok(RequestContext::operations());
    };

    match (relationship, id, method) {
        (Some(relationship), Some(id), method) => {
            let kind = match method {
                Method::Post => WriteOperationKind::AddToRelationship,
                Method::Patch => WriteOperationKind::SetRelationship,
                Method::Delete => WriteOperationKind::RemoveFromRelationship,
            };
            Ok(RequestContext::relationship(type_name, id, relationship, kind))
        }
        (None, _, Method::Post) => Ok(RequestContext::create(type_name)),
        (None, Some(id), Method::Patch) => Ok(RequestContext::update(type_name, id)),
        (None, Some(id), Method::Delete) => Ok(RequestContext {
            write_operation: Some(WriteOperationKind::DeleteResource),
            ..RequestContext::update(type_name, id)
        }),
        _ => {
            eprintln!("Error: --id is required for this request");
            Err(2)
        }
    }
}

async fn run_apply(
    document: &Path,
    graph_path: &Path,
    seed: Option<&Path>,
    options_path: Option<&Path>,
    pretty: bool,
) -> Result<(), u8> {
    let graph = load_graph(graph_path)?;
    let options = load_options(options_path)?;
    let body = read_file(document)?;

    let store = MemoryStore::new(graph.clone());
    if let Some(seed) = seed {
        seed_store(&store, &graph, &options, seed).await?;
    }

    let responses = ResponseBuilder::new(&graph, &options);
    let model = match DocumentAdapter::new(&graph, &options)
        .convert_body(&body, &RequestContext::operations())
    {
        Ok(model) => model,
        Err(err) => {
            print_json(&responses.errors(&err), pretty)?;
            return Err(1);
        }
    };

    let hooks = HookRegistry::new();
    let processor = OperationsProcessor::new(&graph, &hooks);
    match processor
        .process(model.into_intents(), &store, Cancellation::none())
        .await
    {
        Ok(results) => print_json(&responses.atomic_results(&results), pretty),
        Err(err) => {
            print_json(&responses.errors(&err), pretty)?;
            Err(1)
        }
    }
}

async fn seed_store(
    store: &MemoryStore,
    graph: &ResourceGraph,
    options: &Options,
    path: &Path,
) -> Result<(), u8> {
    let text = read_file(path)?;
    let document = DocumentAdapter::new(graph, options)
        .read(&text)
        .map_err(|e| {
            eprintln!("Error reading seed {}: {}", path.display(), e);
            2u8
        })?;

    let objects = match document.data {
        SingleOrManyData::One(object) => vec![Some(object)],
        SingleOrManyData::Many(objects) => objects,
        SingleOrManyData::Null | SingleOrManyData::Unassigned => Vec::new(),
    };

    let adapter = ResourceObjectAdapter::new(graph, options);
    let rules = IdentityRules::new(IdPresence::Required, false).context("seed document");
    let mut resources = Vec::with_capacity(objects.len());
    let mut model_errors = Vec::new();
    for (i, object) in objects.iter().enumerate() {
        let base = format!("/data[{}]", i);
        let Some(object) = object else {
            eprintln!("Error: seed {} has a null entry at {}", path.display(), base);
            return Err(2);
        };
        let resource = adapter
            .to_resource(
                object,
                &base,
                &rules,
                WriteOperationKind::CreateResource,
                &mut model_errors,
            )
            .map_err(|e| {
                eprintln!("Error in seed {}: {}", path.display(), e);
                2u8
            })?;
        resources.push(resource);
    }
    if let Some(err) = model_errors.first() {
        eprintln!("Error in seed {}: {}", path.display(), err);
        return Err(2);
    }

    store.seed(resources).await.map_err(|e| {
        eprintln!("Error seeding store: {}", e);
        2u8
    })
}

fn run_lint_graph(path: &Path) -> Result<(), u8> {
    match ResourceGraph::from_file(path) {
        Ok(graph) => {
            println!(
                "\x1b[32m✓\x1b[0m {}: {} resource types",
                path.display(),
                graph.types().count()
            );
            Ok(())
        }
        Err(GraphError::InvalidDefinition { errors }) => {
            println!("\x1b[31m✗\x1b[0m {}", path.display());
            for error in &errors {
                println!("    {}", error);
            }
            Err(1)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(e.exit_code() as u8)
        }
    }
}

fn load_graph(path: &Path) -> Result<ResourceGraph, u8> {
    ResourceGraph::from_file(path).map_err(|e| {
        eprintln!("Error loading graph: {}", e);
        e.exit_code() as u8
    })
}

fn load_options(path: Option<&Path>) -> Result<Options, u8> {
    let Some(path) = path else {
        return Ok(Options::default());
    };
    let text = read_file(path)?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error parsing options {}: {}", path.display(), e);
        2u8
    })
}

fn read_file(path: &Path) -> Result<String, u8> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        3u8
    })
}

fn print_json(value: &Value, pretty: bool) -> Result<(), u8> {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", output);
    Ok(())
}

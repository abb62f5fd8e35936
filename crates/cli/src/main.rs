use clap::{Args, Parser, Subcommand};
use cohort_core::backend::{Backend, Catalog, MemoryBackend};
use cohort_core::{
    CompilerContextProvider, ConceptRef, DatasetRef, DateBounds, ImportRef, PreflightChecker,
    QueryRef, ResourceRefs, UserContext,
};
use cohort_types::Shape;
use cohort_urn::Urn;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "cohort")]
#[command(about = "Cohort query resolution CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Who the command runs as.
#[derive(Args)]
struct Identity {
    /// YAML catalog to resolve against
    #[arg(long)]
    catalog: PathBuf,
    /// Username of the caller
    #[arg(long)]
    user: String,
    /// Identity provider of the caller
    #[arg(long, default_value = "")]
    issuer: String,
    /// Group memberships (repeatable)
    #[arg(long = "group")]
    groups: Vec<String>,
    /// Run with administrator rights
    #[arg(long)]
    admin: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a URN and print its kind and namespace-specific string
    Urn {
        /// The URN to parse
        raw: String,
    },
    /// Check that a catalog file loads
    CheckCatalog {
        /// Path to the YAML catalog
        path: PathBuf,
    },
    /// Check presence and authorization of resources
    Preflight {
        #[command(flatten)]
        identity: Identity,
        /// Concept URN or id (repeatable)
        #[arg(long = "concept")]
        concepts: Vec<String>,
        /// Saved query URN or id (repeatable)
        #[arg(long = "query")]
        queries: Vec<String>,
        /// Import URN or id (repeatable)
        #[arg(long = "import")]
        imports: Vec<String>,
    },
    /// Resolve a dataset extraction context for a saved query
    Context {
        #[command(flatten)]
        identity: Identity,
        /// Saved query URN or id
        #[arg(long)]
        query: String,
        /// Dataset URN or id
        #[arg(long)]
        dataset: String,
        /// Expected dataset shape
        #[arg(long)]
        shape: String,
    },
}

impl Identity {
    fn load(&self) -> Result<(Arc<dyn Backend>, UserContext), Box<dyn std::error::Error>> {
        let catalog = Catalog::load(&self.catalog)?;
        let user = UserContext::new(&self.user, self.issuer.clone())?
            .with_groups(self.groups.iter().map(String::as_str))
            .with_admin(self.admin);
        Ok((Arc::new(MemoryBackend::new(catalog)), user))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    match cli.command {
        Some(Commands::Urn { raw }) => match Urn::parse(&raw) {
            Ok(urn) => println!("{} (kind: {}, nss: {})", urn, urn.kind(), urn.nss()),
            Err(e) => eprintln!("Error parsing URN: {}", e),
        },
        Some(Commands::CheckCatalog { path }) => match Catalog::load(&path) {
            Ok(catalog) => println!(
                "Catalog OK: {} concepts, {} datasets, {} queries, {} imports",
                catalog.concepts.len(),
                catalog.datasets.len(),
                catalog.queries.len(),
                catalog.imports.len()
            ),
            Err(e) => eprintln!("Error loading catalog: {}", e),
        },
        Some(Commands::Preflight {
            identity,
            concepts,
            queries,
            imports,
        }) => {
            let (backend, user) = identity.load()?;
            let refs = ResourceRefs {
                concepts: concepts
                    .iter()
                    .map(|r| ConceptRef::parse(r))
                    .collect::<Result<_, _>>()?,
                queries: queries
                    .iter()
                    .map(|r| QueryRef::parse(r))
                    .collect::<Result<_, _>>()?,
                imports: imports
                    .iter()
                    .map(|r| ImportRef::parse(r))
                    .collect::<Result<_, _>>()?,
            };

            let resources = PreflightChecker::new(backend)
                .check(&user, &refs, &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&resources)?);
            for failure in resources.errors() {
                eprintln!("{}", failure);
            }
        }
        Some(Commands::Context {
            identity,
            query,
            dataset,
            shape,
        }) => {
            let (backend, user) = identity.load()?;
            let query = QueryRef::parse(&query)?;
            let dataset = DatasetRef::parse(&dataset, Shape::parse(&shape)?)?;

            let resolved = CompilerContextProvider::new(backend)
                .dataset_context(&user, &query, &dataset, DateBounds::default(), &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        None => {
            println!("Use 'cohort --help' for commands");
        }
    }

    Ok(())
}

//! # CMS Graph MCP CLI (`cms-mcp`)
//!
//! Serves the CMS content tools over MCP, and exposes the same discovery
//! and query synthesis from the command line for debugging.
//!
//! ## Usage
//!
//! ```bash
//! cms-mcp --config ./cms-mcp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cms-mcp serve stdio` | MCP over stdin/stdout |
//! | `cms-mcp serve http` | MCP Streamable HTTP at `/mcp` plus the JSON API |
//! | `cms-mcp types` | List discovered content types |
//! | `cms-mcp fields <type>` | List the fields of a content type |
//! | `cms-mcp search "<term>"` | Print (or run) a search query |
//! | `cms-mcp map <type> k=v...` | Map informal property names to fields |
//! | `cms-mcp match <hint>` | Rank content types against a hint |
//! | `cms-mcp fragment <name>` | Print a generated fragment |
//! | `cms-mcp cache clear` | Delete every cached fragment instance |
//!
//! ## Examples
//!
//! ```bash
//! # Which content types exist?
//! cms-mcp types --config ./cms-mcp.toml
//!
//! # The query a search would send, without sending it
//! cms-mcp search "pricing" --type ArticlePage --limit 5
//!
//! # Run it
//! cms-mcp search "pricing" --type ArticlePage --execute
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cms_graph_mcp::config::{self, Config};
use cms_graph_mcp::discovery::DiscoveryTarget;
use cms_graph_mcp::fragment_cache::clear_root;
use cms_graph_mcp::query_builder::SearchParams;
use cms_graph_mcp::server;
use cms_graph_mcp::services::CmsServices;

/// CMS Graph MCP: runtime schema discovery and query synthesis for a
/// headless CMS GraphQL endpoint.
#[derive(Parser)]
#[command(
    name = "cms-mcp",
    about = "MCP server for a headless CMS GraphQL endpoint",
    version,
    long_about = "Discovers the CMS GraphQL schema at runtime and synthesizes content queries \
    from it, exposing search, lookup, faceting and field mapping as MCP tools over stdio or HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./cms-mcp.toml")]
    config: PathBuf,

    /// GraphQL endpoint; overrides the config file, or replaces it when
    /// the file does not exist.
    #[arg(long, global = true, env = "CMS_GRAPH_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server.
    Serve {
        #[command(subcommand)]
        transport: ServeTransport,
    },

    /// List discovered content types.
    Types,

    /// List the fields of a content type.
    Fields {
        /// Content type name, e.g. `ArticlePage`.
        content_type: String,
    },

    /// Build a search query; print it, or run it with `--execute`.
    Search {
        /// Free-text search term.
        term: String,

        /// Restrict to content types (repeatable; fuzzy names allowed).
        #[arg(long = "type")]
        types: Vec<String>,

        #[arg(long)]
        locale: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        /// Send the query and print the response.
        #[arg(long)]
        execute: bool,
    },

    /// Map informal property names onto a content type's fields.
    Map {
        content_type: String,

        /// Properties as `KEY=VALUE` pairs.
        #[arg(value_parser = parse_key_val)]
        properties: Vec<(String, String)>,
    },

    /// Rank content types against a free-text hint.
    Match {
        hint: String,

        #[arg(long)]
        context: Option<String>,
    },

    /// Print a generated fragment (`AllComponents` or `<Type>Fields`).
    Fragment {
        name: String,
    },

    /// Manage the on-disk fragment cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum ServeTransport {
    /// MCP over stdin/stdout.
    Stdio,
    /// MCP Streamable HTTP at `/mcp` on `[server].bind`, plus the JSON API.
    Http,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every fragment cache instance under `[cache].dir`.
    Clear,
}

/// Parse a `key=value` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    match &cli.endpoint {
        Some(endpoint) if !cli.config.exists() => {
            let mut cfg = Config::for_endpoint(endpoint.clone());
            cfg.graph.apply_env();
            cfg.validate()?;
            Ok(cfg)
        }
        Some(endpoint) => {
            let mut cfg = config::load_config(&cli.config)?;
            cfg.graph.endpoint = endpoint.clone();
            cfg.validate()?;
            Ok(cfg)
        }
        None => config::load_config(&cli.config),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cms_graph_mcp=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;

    // Needs no endpoint access.
    if let Commands::Cache {
        action: CacheAction::Clear,
    } = cli.command
    {
        let removed = clear_root(&cfg.cache.dir)?;
        println!(
            "Removed {} fragment cache instance(s) from {}",
            removed,
            cfg.cache.dir.display()
        );
        return Ok(());
    }

    let services = Arc::new(CmsServices::from_config(cfg)?);

    match cli.command {
        Commands::Serve { transport } => match transport {
            ServeTransport::Stdio => server::run_stdio(services).await?,
            ServeTransport::Http => server::run_http(services).await?,
        },
        Commands::Types => {
            let result = services
                .discovery()
                .discover(DiscoveryTarget::Types, None)
                .await?;
            print_json(&result.data)?;
        }
        Commands::Fields { content_type } => {
            let result = services
                .discovery()
                .discover(DiscoveryTarget::Fields, Some(&content_type))
                .await?;
            print_json(&result.data)?;
        }
        Commands::Search {
            term,
            types,
            locale,
            limit,
            execute,
        } => {
            let params = SearchParams {
                search_term: Some(term),
                content_types: types,
                locale,
                limit,
                ..SearchParams::default()
            };
            let built = services.builder().build_search(&params).await?;
            if execute {
                print_json(&services.execute(&built).await?)?;
            } else {
                println!("{}", built.query);
                if !built.variables.is_empty() {
                    print_json(&built.variables)?;
                }
            }
        }
        Commands::Map {
            content_type,
            properties,
        } => {
            let props: Map<String, Value> = properties
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let result = services
                .field_mapper()
                .map_fields_dynamically(&content_type, &props)
                .await?;
            print_json(&result)?;
        }
        Commands::Match { hint, context } => {
            let result = services
                .match_content_type(&hint, context.as_deref())
                .await?;
            print_json(&result)?;
        }
        Commands::Fragment { name } => {
            let fragment = services.fragments().get_fragment(&name).await?;
            println!("{}", fragment.content);
        }
        Commands::Cache { .. } => {}
    }

    Ok(())
}

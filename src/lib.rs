//! # CMS Graph MCP
//!
//! An MCP server for a headless CMS whose GraphQL schema is not known in
//! advance. The schema is introspected at runtime and every query the tools
//! send is synthesized from it: content types, fields, filter shapes and the
//! content root are all discovered, never hard-coded.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ GraphClient  │──▶│ Introspector │──▶│  SchemaSnapshot   │
//! │ (HTTP+retry) │   │  (lazy init) │   │ types/fields/root │
//! └──────────────┘   └──────────────┘   └────────┬─────────┘
//!                                                │
//!        ┌──────────────┬──────────────┬─────────┴────┬──────────────┐
//!        ▼              ▼              ▼              ▼              ▼
//!   ┌──────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐  ┌────────────┐
//!   │Discovery │  │  Query    │  │ Fragments │  │  Field   │  │   Type     │
//!   │ + TTL    │  │  Builder  │  │ + disk    │  │  Mapper  │  │  Matcher   │
//!   └────┬─────┘  └─────┬─────┘  └─────┬─────┘  └────┬─────┘  └─────┬──────┘
//!        └──────────────┴──────┬───────┴─────────────┴──────────────┘
//!                              ▼
//!                       ┌─────────────┐      ┌────────────────────┐
//!                       │ ToolRegistry│─────▶│ MCP (stdio / HTTP) │
//!                       └─────────────┘      └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cms-mcp --endpoint https://cg.example.com/content/v2 types
//! cms-mcp search "pricing" --type ArticlePage
//! cms-mcp serve stdio
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | GraphQL transport with auth, retry and error classification |
//! | [`schema`] | Introspection result model and content-type detection |
//! | [`introspector`] | Lazy, shared schema snapshot |
//! | [`discovery_cache`] | TTL cache for discovery results |
//! | [`discovery`] | Content type / field / schema discovery |
//! | [`query_builder`] | Schema-driven query synthesis |
//! | [`fragment_cache`] | Per-endpoint, per-version fragment cache on disk |
//! | [`fragments`] | Named fragment generation |
//! | [`field_mapper`] | Informal property name → schema field mapping |
//! | [`type_matcher`] | Free-text hint → content type ranking |
//! | [`services`] | Composition root |
//! | [`tools`] | Tool trait, registry and built-in tools |
//! | [`mcp`] | MCP protocol bridge |
//! | [`server`] | stdio and HTTP transports |

pub mod client;
pub mod config;
pub mod discovery;
pub mod discovery_cache;
pub mod field_mapper;
#[doc(hidden)]
pub mod fixtures;
pub mod fragment_cache;
pub mod fragments;
pub mod introspector;
pub mod mcp;
pub mod query_builder;
pub mod schema;
pub mod server;
pub mod services;
pub mod tools;
pub mod type_matcher;

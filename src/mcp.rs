//! MCP protocol bridge.
//!
//! Exposes the [`ToolRegistry`] over the Model Context Protocol. The same
//! bridge is served over stdio (`cms-mcp serve stdio`) and over Streamable
//! HTTP at `/mcp` (`cms-mcp serve http`).

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use tracing::{debug, warn};

use crate::services::CmsServices;
use crate::tools::{validate_params, ToolContext, ToolRegistry};

/// Bridges the tool registry to MCP.
///
/// Each MCP session receives a clone (everything is behind `Arc`), so all
/// sessions share one set of services and caches.
#[derive(Clone)]
pub struct McpBridge {
    services: Arc<CmsServices>,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(services: Arc<CmsServices>, tools: Arc<ToolRegistry>) -> Self {
        Self { services, tools }
    }

    fn to_mcp_tool(tool: &dyn crate::tools::Tool) -> Tool {
        let input_schema = match tool.parameters_schema() {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        // Only cache invalidation has a side effect.
        let read_only = tool.name() != "invalidate_cache";

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(read_only)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cms-graph-mcp".to_string(),
                title: Some("CMS Graph MCP".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Content tools for the CMS at {}. The schema is discovered at runtime: \
                 call discover_schema first to see content types and fields, \
                 match_content_type to resolve a loose type name, then search_content, \
                 get_content, get_content_by_path, faceted_search or related_content. \
                 Pass execute=false to get the generated GraphQL instead of results.",
                self.services.client().endpoint()
            )),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let params = match validate_params(&tool.parameters_schema(), &params) {
            Ok(p) => p,
            Err(e) => {
                return Err(McpError::new(
                    ErrorCode::INVALID_PARAMS,
                    e.to_string(),
                    None,
                ))
            }
        };

        debug!(tool = tool.name(), "MCP tool call");
        let ctx = ToolContext::new(self.services.clone());
        match tool.execute(params, &ctx).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                warn!(tool = tool.name(), error = %e, "MCP tool call failed");
                Ok(CallToolResult::error(vec![Content::text(format!("{:#}", e))]))
            }
        }
    }
}

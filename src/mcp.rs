use std::{sync::Arc, time::Duration};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::{
    catalog::{Catalog, SharedCatalog},
    entry::DocVersion,
    error::{self, Error},
    search::{self, DEFAULT_DEPTH, DEFAULT_K},
    store::Store,
};

struct DocdexState {
    store: Arc<Store>,
    catalog: SharedCatalog,
    timeout: Duration,
}

#[derive(Clone)]
pub struct DocdexMcpServer {
    state: Arc<DocdexState>,
    tool_router: ToolRouter<Self>,
}

impl DocdexMcpServer {
    fn new(state: DocdexState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl DocdexMcpServer {
    /// Rank indexed documentation names for a query.
    #[tool(
        name = "docs_search",
        description = "Find documentation entry names matching a query within one documentation version. Tolerates typos and partial names."
    )]
    pub async fn docs_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let catalog = self.state.catalog.load();
        let ranked = search::search(
            &catalog,
            &params.query,
            params.version,
            params.limit.unwrap_or(DEFAULT_K),
        )
        .map_err(|e| lookup_error("search failed", e))?;

        let names: Vec<String> = ranked.into_iter().map(|r| r.name).collect();
        let summary = format_search_summary(&names, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            version: params.version,
            result_count: names.len(),
            names,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Resolve a query to the single best documentation entry.
    #[tool(
        name = "docs_entry",
        description = "Fetch the best-matching documentation entry for a query, with its description, syntax and enclosing sections."
    )]
    pub async fn docs_entry(
        &self,
        params: Parameters<EntryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let catalog = self.state.catalog.load();
        let store = Arc::clone(&self.state.store);
        let query = params.query.clone();
        let depth = params.depth.unwrap_or(DEFAULT_DEPTH);

        let task = tokio::task::spawn_blocking(move || {
            search::resolve(&catalog, &*store, &query, params.version, depth)
        });
        let resolved =
            match tokio::time::timeout(self.state.timeout, task).await {
                Ok(joined) => {
                    joined.map_err(|e| mcp_error("entry lookup panicked", e))?
                }
                Err(_) => {
                    let timeout = self.state.timeout;
                    warn!(?timeout, "entry lookup timed out");
                    return Err(mcp_error(RETRIEVAL_FAILED, Error::Timeout));
                }
            };
        let view = match resolved {
            Ok(view) => view,
            Err(e @ Error::NotFound { .. }) => {
                return Err(lookup_error("entry lookup failed", e));
            }
            Err(e) => {
                warn!("entry lookup failed: {e}");
                return Err(mcp_error(RETRIEVAL_FAILED, e));
            }
        };

        let Some(view) = view else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "No entry found for \"{}\"",
                params.query
            ))]));
        };

        let summary = view.to_string();
        let structured = serde_json::to_value(&view)
            .map_err(|e| mcp_error("failed to serialize entry", e))?;
        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DocdexMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("docdex", env!("CARGO_PKG_VERSION"))
                    .with_title("docdex MCP"),
            )
            .with_instructions(
                "Use docs_search to list candidate names, then docs_entry to read one. Always pass the documentation version.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Free-text query, e.g. a command or function name.
    pub query: String,
    /// Documentation version to search.
    pub version: DocVersion,
    /// Maximum number of names (default: 5).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryParams {
    /// Free-text query; the best-ranked name is resolved.
    pub query: String,
    /// Documentation version to search.
    pub version: DocVersion,
    /// Levels of enclosing sections to include (default: 1).
    pub depth: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    version: DocVersion,
    result_count: usize,
    names: Vec<String>,
}

fn format_search_summary(names: &[String], query: &str) -> String {
    if names.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let suffix = if names.len() == 1 { "" } else { "s" };
    let mut lines = Vec::with_capacity(names.len() + 1);
    lines.push(format!(
        "Found {} result{} for \"{query}\":",
        names.len(),
        suffix
    ));
    for (i, name) in names.iter().enumerate() {
        lines.push(format!("{}. {name}", i + 1));
    }
    lines.join("\n")
}

const RETRIEVAL_FAILED: &str = "retrieval failed";

fn lookup_error(message: &str, error: Error) -> rmcp::ErrorData {
    match error {
        Error::NotFound { .. } => rmcp::ErrorData::invalid_params(
            error.to_string(),
            Some(json!({ "error": message })),
        ),
        other => mcp_error(message, other),
    }
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Serve the tools over stdio until the client disconnects.
///
/// `timeout` bounds each entry lookup.
pub fn run_mcp(store: Store, timeout: Duration) -> error::Result<()> {
    let catalog = SharedCatalog::new(Catalog::load(&store)?);
    let server = DocdexMcpServer::new(DocdexState {
        store: Arc::new(store),
        catalog,
        timeout,
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            Error::Config(format!("MCP server initialization failed: {e}"))
        })?;
        running
            .waiting()
            .await
            .map_err(|e| Error::Config(format!("MCP server error: {e}")))?;
        Ok(())
    })
}

//! `rmcp` server handler backed by the tool registry.

use crate::tools::ToolRegistry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, CustomRequest, CustomResult, ErrorCode,
    Implementation, InitializeRequestParams, InitializeResult, ListToolsResult,
    PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Methods this server answers. A request naming one of them that still fails to decode
/// had bad params, not an unknown method.
const SERVED_METHODS: &[&str] = &[
    "initialize",
    "ping",
    "tools/list",
    "tools/call",
    "resources/list",
    "prompts/list",
];

#[derive(Clone)]
pub struct RelayServer {
    registry: Arc<ToolRegistry>,
}

impl RelayServer {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

impl ServerHandler for RelayServer {
    fn get_info(&self) -> ServerInfo {
        InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "model-relay".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: None,
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, ErrorData> {
        info!(
            client = %request.client_info.name,
            protocol_version = %request.protocol_version,
            "client initialized"
        );
        let protocol_version = request.protocol_version.clone();
        if context.peer.peer_info().is_none() {
            context.peer.set_peer_info(request);
        }
        Ok(InitializeResult {
            protocol_version,
            ..self.get_info()
        })
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.registry.list_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = Value::Object(request.arguments.unwrap_or_default());
        self.registry
            .call_tool(&request.name, &arguments)
            .await
            .map_err(|e| {
                warn!(tool = %request.name, error = %e, "rejected tool call");
                ErrorData::from(e)
            })
    }

    async fn on_custom_request(
        &self,
        request: CustomRequest,
        _context: RequestContext<RoleServer>,
    ) -> Result<CustomResult, ErrorData> {
        if SERVED_METHODS.contains(&request.method.as_str()) {
            warn!(method = %request.method, "request params did not match the method");
            return Err(ErrorData::invalid_params(
                format!("invalid params for {}", request.method),
                None,
            ));
        }
        debug!(method = %request.method, "unknown method");
        Err(ErrorData::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("method not found: {}", request.method),
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::RelayServer;
    use crate::tools::ToolRegistry;
    use model_relay_forward::{CatalogConfig, Forwarder};
    use rmcp::ServerHandler as _;
    use std::sync::Arc;

    #[test]
    fn server_info_advertises_tools_under_its_own_name() -> anyhow::Result<()> {
        let backends = CatalogConfig::builtin()?.resolve(|_| None);
        let registry = ToolRegistry::new(Forwarder::new()?, backends);
        let info = RelayServer::new(Arc::new(registry)).get_info();

        assert_eq!(info.server_info.name, "model-relay");
        assert_eq!(info.server_info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_none());
        Ok(())
    }
}

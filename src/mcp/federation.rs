//! Federation of local and remote tools into one catalog.
//!
//! All mutable state (local tools, endpoints, routes, catalog) lives behind a single
//! reader/writer lock. Lookups hold the read lock only long enough to clone
//! what they need into a [`ResolvedTool`]; the tool itself runs after the
//! lock is gone. Network fetches happen outside the write lock, and their
//! results are applied in one atomic table update.
//!
//! # Name Resolution
//!
//! 1. The local registry, so a listed local tool is always the one called,
//!    even when its name looks namespaced.
//! 2. The routing table, keyed `ns/tool` (or the bare name for endpoints
//!    registered without a namespace), whatever the endpoint's [`Visibility`].
//! 3. Providers attached to the call scope.
//! 4. Otherwise the tool is not found.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, ToolError};
use crate::mcp::auth::{AuthProvider, NoAuth};
use crate::mcp::registry::{
    Arguments, CallScope, LocalTool, ToolCallResult, ToolDefinition, ToolHandler, ToolRegistry,
};
use crate::mcp::remote::{RemoteClient, RemoteClientOptions};
use crate::mcp::schema::ParamTree;

/// Separator between namespace and tool name.
pub const NAMESPACE_SEPARATOR: char = '/';

/// How a remote endpoint's tools are exposed.
///
/// Visibility never affects whether a tool can be called by its exact name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Listed by `tools/list`.
    #[default]
    Visible,
    /// Callable by name only.
    Hidden,
    /// Not listed; handed to the discovery registry instead.
    OnDemand,
}

/// External tool source attached to a single call.
#[async_trait]
pub trait ToolProviders: Send + Sync {
    /// Tools this provider can execute.
    async fn get_tools(&self, scope: &CallScope) -> Result<Vec<ToolDefinition>, ToolError>;

    /// Executes one of the tools returned by [`ToolProviders::get_tools`].
    async fn execute_tool(
        &self,
        name: &str,
        args: Arguments,
        scope: CallScope,
    ) -> Result<ToolCallResult, ToolError>;
}

/// Receives [`Visibility::OnDemand`] tools so they can be found by search
/// rather than enumeration.
///
/// Tools are offered again after every registration and refresh, so an
/// implementation should treat a repeated name as a replacement. Handlers
/// look their route up at call time: one whose endpoint was re-registered
/// reaches the new client, and one whose tool has since been dropped
/// reports [`ToolError::NotFound`].
pub trait DiscoveryRegistry: Send + Sync {
    /// Offers one tool with search keywords.
    fn register_tool(&self, tool: ToolDefinition, handler: Arc<dyn ToolHandler>, keywords: &[String]);
}

/// Settings for registering a remote endpoint.
#[derive(Clone)]
pub struct RemoteEndpointConfig {
    /// Endpoint URL.
    pub url: Url,
    /// Prefix for the endpoint's tools; empty means no prefix.
    pub namespace: String,
    /// Exposure tier.
    pub visibility: Visibility,
    /// Credentials for outbound calls.
    pub auth: Arc<dyn AuthProvider>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpointConfig")
            .field("url", &self.url.as_str())
            .field("namespace", &self.namespace)
            .field("visibility", &self.visibility)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RemoteEndpointConfig {
    /// A visible, unauthenticated endpoint.
    #[must_use]
    pub fn new(url: Url, namespace: impl Into<String>) -> Self {
        Self {
            url,
            namespace: namespace.into(),
            visibility: Visibility::Visible,
            auth: Arc::new(NoAuth),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the visibility tier.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the credential provider.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Where a resolved name executes.
#[derive(Clone)]
pub enum ResolvedTool {
    /// A handler in the local registry.
    Local(Arc<LocalTool>),
    /// A tool on a remote endpoint, under its original name.
    Remote {
        /// Client for the owning endpoint.
        client: Arc<RemoteClient>,
        /// Name the endpoint knows the tool by.
        origin_name: String,
    },
    /// A tool offered by the call's providers.
    Provider {
        /// The providers attached to the call.
        providers: Arc<dyn ToolProviders>,
        /// Tool name as the providers know it.
        name: String,
    },
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(tool) => f.debug_tuple("Local").field(&tool.definition.name).finish(),
            Self::Remote {
                client,
                origin_name,
            } => f
                .debug_struct("Remote")
                .field("url", &client.url().as_str())
                .field("origin_name", origin_name)
                .finish(),
            Self::Provider { name, .. } => f.debug_struct("Provider").field("name", name).finish(),
        }
    }
}

impl ResolvedTool {
    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Whatever the underlying source reports, in the [`ToolError`]
    /// vocabulary.
    pub async fn execute(self, args: Arguments, scope: CallScope) -> Result<ToolCallResult, ToolError> {
        match self {
            Self::Local(tool) => tool.invoke(args, scope).await,
            Self::Remote {
                client,
                origin_name,
            } => client.call_tool(&origin_name, args.into_value(), &scope).await,
            Self::Provider { providers, name } => {
                scope
                    .run(providers.execute_tool(&name, args, scope.clone()))
                    .await
            }
        }
    }
}

/// Outcome of [`Federation::refresh_tools`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Endpoints whose tools were fetched.
    pub refreshed: Vec<String>,
    /// Endpoints that failed, with the error text. Their tools were dropped.
    pub failed: Vec<(String, String)>,
}

impl RefreshReport {
    /// Whether every endpoint refreshed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Summary of one registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    /// Endpoint URL.
    pub url: String,
    /// Namespace prefix.
    pub namespace: String,
    /// Exposure tier.
    pub visibility: Visibility,
    /// Tools currently routed to it.
    pub tool_count: usize,
}

struct Endpoint {
    namespace: String,
    visibility: Visibility,
    client: Arc<RemoteClient>,
    /// Last successfully fetched tools; empty after a failure.
    tools: Vec<ToolDefinition>,
    /// Bumped on every (re)registration and successful refresh.
    generation: u64,
}

#[derive(Clone)]
struct RemoteRoute {
    client: Arc<RemoteClient>,
    origin_name: String,
    visibility: Visibility,
    definition: ToolDefinition,
    namespace: String,
}

struct FederationState {
    local: ToolRegistry,
    endpoints: IndexMap<String, Endpoint>,
    routes: HashMap<String, RemoteRoute>,
    catalog: Arc<[ToolDefinition]>,
    generation: u64,
}

impl Default for FederationState {
    fn default() -> Self {
        Self {
            local: ToolRegistry::new(),
            endpoints: IndexMap::new(),
            routes: HashMap::new(),
            catalog: Arc::from(Vec::new()),
            generation: 0,
        }
    }
}

impl FederationState {
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Rebuilds the routing table and catalog from the endpoint table.
    fn rebuild(&mut self) {
        let mut ordered: Vec<&Endpoint> = self.endpoints.values().collect();
        ordered.sort_by_key(|endpoint| endpoint.generation);

        let mut routes = HashMap::new();
        for endpoint in ordered {
            for tool in &endpoint.tools {
                let key = qualified_name(&endpoint.namespace, &tool.name);
                let mut definition = tool.clone();
                definition.name.clone_from(&key);
                // Later generations overwrite earlier ones.
                routes.insert(
                    key,
                    RemoteRoute {
                        client: Arc::clone(&endpoint.client),
                        origin_name: tool.name.clone(),
                        visibility: endpoint.visibility,
                        definition,
                        namespace: endpoint.namespace.clone(),
                    },
                );
            }
        }
        self.routes = routes;
        self.rebuild_catalog();
    }

    fn rebuild_catalog(&mut self) {
        let mut catalog: Vec<ToolDefinition> = self.local.definitions().cloned().collect();
        catalog.extend(
            self.routes
                .iter()
                .filter(|(key, route)| {
                    route.visibility == Visibility::Visible && !self.local.contains(key)
                })
                .map(|(_, route)| route.definition.clone()),
        );
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        self.catalog = catalog.into();
    }

    fn on_demand_routes(&self) -> Vec<RemoteRoute> {
        self.routes
            .values()
            .filter(|route| route.visibility == Visibility::OnDemand)
            .cloned()
            .collect()
    }
}

/// Builds the routing key for a remote tool.
#[must_use]
pub fn qualified_name(namespace: &str, tool: &str) -> String {
    if namespace.is_empty() {
        tool.to_string()
    } else {
        format!("{namespace}{NAMESPACE_SEPARATOR}{tool}")
    }
}

/// Forwards an on-demand tool to whichever endpoint currently owns its
/// routing key.
struct RemoteForwarder {
    state: Arc<RwLock<FederationState>>,
    key: String,
}

#[async_trait]
impl ToolHandler for RemoteForwarder {
    async fn call(&self, args: Arguments, scope: CallScope) -> Result<ToolCallResult, ToolError> {
        let (client, origin_name) = {
            let state = self.state.read().await;
            let route = state
                .routes
                .get(&self.key)
                .ok_or_else(|| ToolError::NotFound(self.key.clone()))?;
            (Arc::clone(&route.client), route.origin_name.clone())
        };
        client.call_tool(&origin_name, args.into_value(), &scope).await
    }
}

/// The unified tool catalog.
#[derive(Default)]
pub struct Federation {
    state: Arc<RwLock<FederationState>>,
    discovery: Option<Arc<dyn DiscoveryRegistry>>,
}

impl std::fmt::Debug for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("discovery", &self.discovery.is_some())
            .finish_non_exhaustive()
    }
}

impl Federation {
    /// Creates an empty federation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a discovery registry for [`Visibility::OnDemand`] tools.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryRegistry>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Registers or replaces a local tool.
    ///
    /// Schema, handler and catalog entry are swapped under one write lock.
    /// Calls already resolved to a replaced handler finish on it.
    ///
    /// Returns `true` if an existing tool was replaced.
    pub async fn register_tool(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        params: ParamTree,
        handler: Arc<dyn ToolHandler>,
    ) -> bool {
        let name = name.into();
        let mut state = self.state.write().await;
        let replaced = state.local.register(name.clone(), description, params, handler);
        state.rebuild_catalog();
        drop(state);

        if replaced {
            info!(tool = %name, "Replaced local tool");
        } else {
            debug!(tool = %name, "Registered local tool");
        }
        replaced
    }

    /// Registers a remote endpoint and tries to fetch its tools.
    ///
    /// A failed fetch is logged and otherwise ignored: the endpoint is
    /// registered with no tools until a later [`Federation::refresh_tools`]
    /// succeeds. Re-registering a URL replaces the previous endpoint.
    ///
    /// # Errors
    ///
    /// Only if the HTTP client for the endpoint cannot be built.
    pub async fn register_remote(&self, config: RemoteEndpointConfig) -> Result<(), RemoteError> {
        let key = config.url.to_string();
        let options = RemoteClientOptions::new(config.url.clone()).with_timeout(config.timeout);
        let client = Arc::new(RemoteClient::new(options, config.auth)?);

        let scope = CallScope::new().with_timeout(config.timeout);
        let tools = match client.list_tools(&scope).await {
            Ok(tools) => {
                info!(endpoint = %key, namespace = %config.namespace, tools = tools.len(), "Registered remote endpoint");
                tools
            }
            Err(e) => {
                warn!(endpoint = %key, error = %e, "Remote endpoint unreachable at registration, tools deferred");
                Vec::new()
            }
        };

        let mut state = self.state.write().await;
        let generation = state.next_generation();
        state.endpoints.insert(
            key,
            Endpoint {
                namespace: config.namespace,
                visibility: config.visibility,
                client,
                tools,
                generation,
            },
        );
        state.rebuild();
        let on_demand = state.on_demand_routes();
        drop(state);

        self.publish_on_demand(on_demand);
        Ok(())
    }

    /// Re-fetches every endpoint and rebuilds routes and catalog.
    ///
    /// An endpoint that fails is reported and loses all of its routes.
    pub async fn refresh_tools(&self) -> RefreshReport {
        let snapshot: Vec<(String, Arc<RemoteClient>)> = {
            let state = self.state.read().await;
            state
                .endpoints
                .iter()
                .map(|(key, endpoint)| (key.clone(), Arc::clone(&endpoint.client)))
                .collect()
        };

        let mut fetches = JoinSet::new();
        for (key, client) in snapshot {
            fetches.spawn(async move {
                client.clear_tool_cache().await;
                let outcome = client.list_tools(&CallScope::new()).await;
                (key, client, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((key, client, outcome)) => {
                    outcomes.insert(key, (client, outcome));
                }
                Err(e) => warn!(error = %e, "Refresh task failed"),
            }
        }

        let mut report = RefreshReport::default();
        let mut state = self.state.write().await;
        let keys: Vec<String> = state.endpoints.keys().cloned().collect();
        for key in keys {
            let Some((client, outcome)) = outcomes.remove(&key) else {
                continue;
            };
            let generation = state.next_generation();
            let Some(endpoint) = state.endpoints.get_mut(&key) else {
                continue;
            };
            if !Arc::ptr_eq(&endpoint.client, &client) {
                // Re-registered while the fetch was in flight.
                continue;
            }
            match outcome {
                Ok(tools) => {
                    debug!(endpoint = %key, tools = tools.len(), "Refreshed remote endpoint");
                    endpoint.tools = tools;
                    endpoint.generation = generation;
                    report.refreshed.push(key);
                }
                Err(e) => {
                    warn!(endpoint = %key, error = %e, "Refresh failed, dropping endpoint tools");
                    endpoint.tools.clear();
                    report.failed.push((key, e.to_string()));
                }
            }
        }
        state.rebuild();
        let on_demand = state.on_demand_routes();
        let listed = state.catalog.len();
        drop(state);

        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            listed,
            "Tool refresh complete"
        );
        self.publish_on_demand(on_demand);
        report
    }

    /// The enumerable catalog: local tools and visible remote tools, sorted
    /// by name.
    pub async fn list_tools(&self) -> Arc<[ToolDefinition]> {
        Arc::clone(&self.state.read().await.catalog)
    }

    /// Registered endpoints in registration order.
    pub async fn endpoints(&self) -> Vec<EndpointStatus> {
        let state = self.state.read().await;
        state
            .endpoints
            .iter()
            .map(|(url, endpoint)| EndpointStatus {
                url: url.clone(),
                namespace: endpoint.namespace.clone(),
                visibility: endpoint.visibility,
                tool_count: state
                    .routes
                    .values()
                    .filter(|route| {
                        Arc::ptr_eq(&route.client, &endpoint.client)
                            && route.namespace == endpoint.namespace
                    })
                    .count(),
            })
            .collect()
    }

    /// Resolves a tool name to its source.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] when no source has the tool; provider lookup
    /// errors are passed through.
    pub async fn resolve(&self, name: &str, scope: &CallScope) -> Result<ResolvedTool, ToolError> {
        {
            let state = self.state.read().await;
            if let Some(tool) = state.local.resolve(name) {
                return Ok(ResolvedTool::Local(tool));
            }
            if let Some(route) = state.routes.get(name) {
                return Ok(ResolvedTool::Remote {
                    client: Arc::clone(&route.client),
                    origin_name: route.origin_name.clone(),
                });
            }
        }

        if let Some(providers) = scope.providers() {
            let offered = scope.run(providers.get_tools(scope)).await?;
            if offered.iter().any(|tool| tool.name == name) {
                return Ok(ResolvedTool::Provider {
                    providers: Arc::clone(providers),
                    name: name.to_string(),
                });
            }
        }

        Err(ToolError::NotFound(name.to_string()))
    }

    /// Resolves and runs a tool. Remote tools are invoked under their
    /// original, un-namespaced name.
    ///
    /// # Errors
    ///
    /// Resolution failures and any error the tool reports.
    pub async fn call_tool(
        &self,
        name: &str,
        args: Arguments,
        scope: CallScope,
    ) -> Result<ToolCallResult, ToolError> {
        let resolved = self.resolve(name, &scope).await?;
        debug!(tool = %name, source = ?resolved, "Calling tool");
        let result = resolved.execute(args, scope).await;
        if let Err(e) = &result {
            debug!(tool = %name, error = %e, "Tool call failed");
        }
        result
    }

    fn publish_on_demand(&self, routes: Vec<RemoteRoute>) {
        let Some(discovery) = &self.discovery else {
            return;
        };
        for route in routes {
            let keywords = keywords_for(&route);
            let handler: Arc<dyn ToolHandler> = Arc::new(RemoteForwarder {
                state: Arc::clone(&self.state),
                key: route.definition.name.clone(),
            });
            discovery.register_tool(route.definition, handler, &keywords);
        }
    }
}

fn keywords_for(route: &RemoteRoute) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    if !route.namespace.is_empty() {
        keywords.push(route.namespace.clone());
    }
    keywords.extend(
        route
            .origin_name
            .split(['_', '-', '.'])
            .filter(|part| !part.is_empty())
            .map(str::to_lowercase),
    );
    keywords.dedup();
    keywords
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mcp::schema::Param;

    fn echo(tag: &'static str) -> Arc<dyn ToolHandler> {
        Arc::new(move |_args: Arguments, _scope: CallScope| async move {
            Ok::<_, ToolError>(ToolCallResult::text(tag))
        })
    }

    struct FixedProviders;

    #[async_trait]
    impl ToolProviders for FixedProviders {
        async fn get_tools(&self, _scope: &CallScope) -> Result<Vec<ToolDefinition>, ToolError> {
            Ok(vec![ToolDefinition {
                name: "weather".to_string(),
                description: None,
                input_schema: json!({"type": "object", "properties": {}}),
                output_schema: None,
            }])
        }

        async fn execute_tool(
            &self,
            name: &str,
            _args: Arguments,
            _scope: CallScope,
        ) -> Result<ToolCallResult, ToolError> {
            Ok(ToolCallResult::text(format!("provided {name}")))
        }
    }

    #[test]
    fn qualified_names() {
        assert_eq!(qualified_name("gh", "search"), "gh/search");
        assert_eq!(qualified_name("", "search"), "search");
    }

    #[test]
    fn visibility_serde_names() {
        assert_eq!(
            serde_json::to_value(Visibility::OnDemand).unwrap(),
            json!("on_demand")
        );
        let parsed: Visibility = serde_json::from_value(json!("hidden")).unwrap();
        assert_eq!(parsed, Visibility::Hidden);
    }

    #[tokio::test]
    async fn catalog_is_sorted_and_replacement_keeps_count() {
        let federation = Federation::new();
        federation
            .register_tool("zeta", "", ParamTree::new(), echo("z"))
            .await;
        federation
            .register_tool("alpha", "first", ParamTree::new(), echo("a1"))
            .await;
        assert!(
            federation
                .register_tool(
                    "alpha",
                    "second",
                    ParamTree::new().input(Param::string("s")),
                    echo("a2")
                )
                .await
        );

        let catalog = federation.list_tools().await;
        let names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert_eq!(catalog[0].description.as_deref(), Some("second"));

        let result = federation
            .call_tool("alpha", Arguments::default(), CallScope::new())
            .await
            .unwrap();
        assert_eq!(result, ToolCallResult::text("a2"));
    }

    #[tokio::test]
    async fn local_tool_with_slash_is_listed_and_called() {
        let federation = Federation::new();
        federation
            .register_tool("ns/x", "local", ParamTree::new(), echo("local"))
            .await;

        let catalog = federation.list_tools().await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "ns/x");

        let result = federation
            .call_tool("ns/x", Arguments::default(), CallScope::new())
            .await
            .unwrap();
        assert_eq!(result, ToolCallResult::text("local"));
    }

    #[tokio::test]
    async fn forwarder_without_route_is_not_found() {
        let forwarder = RemoteForwarder {
            state: Arc::new(RwLock::new(FederationState::default())),
            key: "gh/gone".to_string(),
        };
        let err = forwarder
            .call(Arguments::default(), CallScope::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "gh/gone"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let federation = Federation::new();
        let err = federation
            .resolve("nope/missing", &CallScope::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "nope/missing"));
    }

    #[tokio::test]
    async fn providers_are_consulted_last() {
        let federation = Federation::new();
        federation
            .register_tool("weather", "", ParamTree::new(), echo("local"))
            .await;
        let scope = CallScope::new().with_providers(Arc::new(FixedProviders));

        let local = federation
            .call_tool("weather", Arguments::default(), scope.clone())
            .await
            .unwrap();
        assert_eq!(local, ToolCallResult::text("local"));

        let bare = Federation::new();
        let provided = bare
            .call_tool("weather", Arguments::default(), scope.clone())
            .await
            .unwrap();
        assert_eq!(provided, ToolCallResult::text("provided weather"));

        assert!(matches!(
            bare.resolve("other", &scope).await,
            Err(ToolError::NotFound(_))
        ));
        assert!(matches!(
            bare.resolve("weather", &CallScope::new()).await,
            Err(ToolError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_remote_registers_without_tools() {
        let federation = Federation::new();
        federation
            .register_tool("upper", "", ParamTree::new(), echo("u"))
            .await;
        let config = RemoteEndpointConfig::new(Url::parse("http://127.0.0.1:9/mcp").unwrap(), "down")
            .with_timeout(Duration::from_secs(2));
        federation.register_remote(config).await.unwrap();

        let endpoints = federation.endpoints().await;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].tool_count, 0);
        assert_eq!(federation.list_tools().await.len(), 1);

        let report = federation.refresh_tools().await;
        assert!(report.refreshed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn keywords_split_origin_name() {
        let route = RemoteRoute {
            client: Arc::new(
                RemoteClient::new(
                    RemoteClientOptions::new(Url::parse("http://127.0.0.1:9/").unwrap()),
                    Arc::new(NoAuth),
                )
                .unwrap(),
            ),
            origin_name: "search_issues".to_string(),
            visibility: Visibility::OnDemand,
            definition: ToolDefinition {
                name: "gh/search_issues".to_string(),
                description: None,
                input_schema: json!({}),
                output_schema: None,
            },
            namespace: "gh".to_string(),
        };
        assert_eq!(keywords_for(&route), ["gh", "search", "issues"]);
    }
}

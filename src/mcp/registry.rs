//! Local tool registry.
//!
//! Tools registered here are compiled once: the parameter tree becomes a
//! [`ToolDefinition`] (name, description, schemas) stored next to its
//! handler. Re-registering a name replaces the whole entry; there is no way
//! to remove one.
//!
//! The registry itself is a plain map. Concurrency is the federation's
//! business: it owns the registry behind its single reader/writer lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::mcp::federation::ToolProviders;
use crate::mcp::schema::{compile, validate_arguments, ParamTree};

/// A tool definition as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// JSON Schema for the structured result, if the tool declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Base64 image content.
    Image {
        /// Base64-encoded bytes.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource.
    Resource {
        /// The resource object, passed through untouched.
        resource: Value,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    #[serde(default)]
    pub content: Vec<ToolContent>,
    /// Structured payload matching the output schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool call resulted in an error.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    /// Creates a structured result, mirrored as JSON text for older clients.
    #[must_use]
    pub fn structured(value: Value) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: value.to_string(),
            }],
            structured_content: Some(value),
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: true,
        }
    }
}

/// Read-only argument bag handed to a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// Wraps an argument map.
    #[must_use]
    pub const fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Interprets a `tools/call` `arguments` value. Absent or `null` means no
    /// arguments; anything but an object is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] for non-object values.
    pub fn from_value(value: Option<Value>) -> Result<Self, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(map)) => Ok(Self(map)),
            Some(_) => Err(ToolError::invalid_param(
                "arguments",
                "must be an object",
            )),
        }
    }

    /// Returns a raw argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a string argument.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Returns a numeric argument.
    #[must_use]
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    /// Returns an integer argument.
    #[must_use]
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Returns a boolean argument.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Borrows the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts back into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Cancellable, deadline-aware scope of one inbound call.
///
/// Cloning shares the same cancellation token. The scope travels with the
/// call into handlers and outbound remote requests so that cancelling the
/// inbound call aborts everything it started.
#[derive(Clone, Default)]
pub struct CallScope {
    cancel: CancellationToken,
    deadline: Option<tokio::time::Instant>,
    providers: Option<Arc<dyn ToolProviders>>,
}

impl std::fmt::Debug for CallScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallScope")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .field("providers", &self.providers.is_some())
            .finish()
    }
}

impl CallScope {
    /// Creates an unbounded scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the scope by `timeout` from now (keeps an earlier deadline).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = tokio::time::Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(candidate, |d| d.min(candidate)));
        self
    }

    /// Attaches call-scoped external tool providers.
    #[must_use]
    pub fn with_providers(mut self, providers: Arc<dyn ToolProviders>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Providers attached to this call, if any.
    #[must_use]
    pub fn providers(&self) -> Option<&Arc<dyn ToolProviders>> {
        self.providers.as_ref()
    }

    /// The deadline, if one was set.
    #[must_use]
    pub const fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    /// Cancels the call and everything running under it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`CallScope::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `fut` until it finishes, the scope is cancelled, or the deadline
    /// passes. The future is dropped (aborting any in-flight I/O) in the
    /// latter two cases.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or [`ToolError::Cancelled`].
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ToolError>
    where
        F: Future<Output = Result<T, ToolError>>,
    {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ToolError::Cancelled),
            () = expired => Err(ToolError::Cancelled),
            result = fut => result,
        }
    }
}

/// Executes one tool.
///
/// Any `Fn(Arguments, CallScope) -> impl Future<Output = Result<ToolCallResult, ToolError>>`
/// is a handler, so most tools are plain async closures.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool.
    async fn call(&self, args: Arguments, scope: CallScope) -> Result<ToolCallResult, ToolError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Arguments, CallScope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolCallResult, ToolError>> + Send + 'static,
{
    async fn call(&self, args: Arguments, scope: CallScope) -> Result<ToolCallResult, ToolError> {
        (self)(args, scope).await
    }
}

/// A compiled local tool.
pub struct LocalTool {
    /// Catalog entry.
    pub definition: ToolDefinition,
    /// Declared parameters, kept for argument validation.
    pub params: ParamTree,
    /// The handler.
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for LocalTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl LocalTool {
    /// Validates `args` and runs the handler in its own task.
    ///
    /// A panicking handler is reported as [`ToolError::Internal`] instead of
    /// taking the server down; cancelling `scope` aborts the task.
    ///
    /// # Errors
    ///
    /// Validation failures, handler errors, panics and cancellation.
    pub async fn invoke(&self, args: Arguments, scope: CallScope) -> Result<ToolCallResult, ToolError> {
        validate_arguments(&self.params.inputs, args.as_map())?;

        let handler = Arc::clone(&self.handler);
        let task_scope = scope.clone();
        let mut task = tokio::spawn(async move { handler.call(args, task_scope).await });

        let outcome = scope
            .run(async {
                match (&mut task).await {
                    Ok(result) => result,
                    Err(join) if join.is_panic() => {
                        let payload = join.into_panic();
                        let detail = payload
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "handler panicked".to_string());
                        Err(ToolError::Internal(detail))
                    }
                    Err(join) => Err(ToolError::internal(join)),
                }
            })
            .await;

        if matches!(outcome, Err(ToolError::Cancelled)) {
            task.abort();
        }
        outcome
    }
}

/// Name-keyed store of compiled local tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<LocalTool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and stores a tool, replacing any previous entry of that name.
    ///
    /// Returns `true` if an existing tool was replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        params: ParamTree,
        handler: Arc<dyn ToolHandler>,
    ) -> bool {
        let name = name.into();
        let description = description.into();
        let schema = compile(&params);
        let tool = LocalTool {
            definition: ToolDefinition {
                name: name.clone(),
                description: (!description.is_empty()).then_some(description),
                input_schema: schema.input,
                output_schema: schema.output,
            },
            params,
            handler,
        };
        self.tools.insert(name, Arc::new(tool)).is_some()
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<LocalTool>> {
        self.tools.get(name).cloned()
    }

    /// Returns `true` if a tool with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Iterates over every tool definition (unordered).
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(|tool| &tool.definition)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

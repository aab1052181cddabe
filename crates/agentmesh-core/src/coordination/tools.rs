//! Tool registry and the two invocation adapters.
//!
//! Every tool is reached through [`ToolInvoker`]. Natively async tools are
//! wrapped in [`AsyncTool`]; synchronous ones in [`BlockingTool`], which runs
//! them on tokio's blocking pool behind a registry-wide semaphore so they
//! never stall the runtime threads that drive the concurrency limiter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use super::config::DEFAULT_BLOCKING_POOL_SIZE;
use super::error::{CoordinationError, CoordinationResult};

/// Anything that can execute one tool call.
#[async_trait]
pub trait ToolInvoker: Send + Sync + 'static {
    async fn invoke(&self, args: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Adapter for async closures.
pub struct AsyncTool<F> {
    func: F,
}

impl<F> AsyncTool<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> ToolInvoker for AsyncTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn invoke(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        (self.func)(args).await
    }
}

/// Adapter for synchronous closures.
///
/// The worker permit moves into the blocking job, so a job abandoned by a
/// timeout keeps its slot until it actually returns.
pub struct BlockingTool<F> {
    func: Arc<F>,
    pool: Arc<Semaphore>,
}

impl<F> BlockingTool<F> {
    pub fn new(func: F, pool: Arc<Semaphore>) -> Self {
        Self {
            func: Arc::new(func),
            pool,
        }
    }
}

#[async_trait]
impl<F> ToolInvoker for BlockingTool<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    async fn invoke(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let permit = Arc::clone(&self.pool)
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("blocking worker pool closed: {e}"))?;
        let func = Arc::clone(&self.func);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            func(args)
        })
        .await
        .map_err(|e| anyhow!("blocking tool aborted: {e}"))?
    }
}

/// Tool name → invoker.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolInvoker>>,
    blocking_pool: Arc<Semaphore>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKING_POOL_SIZE)
    }
}

impl ToolRegistry {
    /// Empty registry whose blocking tools share `blocking_pool_size` workers.
    pub fn new(blocking_pool_size: usize) -> Self {
        Self {
            tools: HashMap::new(),
            blocking_pool: Arc::new(Semaphore::new(blocking_pool_size.max(1))),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        invoker: Arc<dyn ToolInvoker>,
    ) -> CoordinationResult<()> {
        let name = name.into();
        if self.tools.contains_key(&name) {
            return Err(CoordinationError::DuplicateTool { tool_name: name });
        }
        self.tools.insert(name, invoker);
        Ok(())
    }

    pub fn register_async<F, Fut>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> CoordinationResult<()>
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(name, Arc::new(AsyncTool::new(func)))
    }

    pub fn register_blocking<F>(&mut self, name: impl Into<String>, func: F) -> CoordinationResult<()>
    where
        F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let pool = Arc::clone(&self.blocking_pool);
        self.register(name, Arc::new(BlockingTool::new(func, pool)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolInvoker>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("blocking_slots", &self.blocking_pool.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_async_and_blocking_tools_are_invoked() {
        let mut reg = ToolRegistry::new(2);
        reg.register_async("echo", |args| async move {
            Ok::<_, anyhow::Error>(Value::Object(args))
        })
        .unwrap();
        reg.register_blocking("double", |args| {
            let x = args.get("x").and_then(Value::as_f64).unwrap_or_default();
            Ok(json!({ "result": x * 2.0 }))
        })
        .unwrap();

        let mut args = Map::new();
        args.insert("x".into(), json!(21));

        let echoed = reg.get("echo").unwrap().invoke(args.clone()).await.unwrap();
        assert_eq!(echoed, json!({"x": 21}));

        let doubled = reg.get("double").unwrap().invoke(args).await.unwrap();
        assert_eq!(doubled, json!({"result": 42.0}));
        assert_eq!(reg.names(), vec!["double", "echo"]);
    }

    #[tokio::test]
    async fn test_blocking_errors_propagate() {
        let mut reg = ToolRegistry::default();
        reg.register_blocking("fail", |_| Err(anyhow!("upstream unavailable")))
            .unwrap();
        let err = reg.get("fail").unwrap().invoke(Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "upstream unavailable");
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut reg = ToolRegistry::default();
        reg.register_async("t", |_| async { Ok::<_, anyhow::Error>(Value::Null) }).unwrap();
        let err = reg
            .register_async("t", |_| async { Ok::<_, anyhow::Error>(Value::Null) })
            .unwrap_err();
        assert!(matches!(err, CoordinationError::DuplicateTool { .. }));
        assert!(reg.get("missing").is_none());
    }
}

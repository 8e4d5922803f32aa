//! Discovers every RPC-exposed operation across the service implementations
//! and binds them into a single, immutable `namespace_method -> operation`
//! table.
//!
//! There is no runtime reflection over Rust structs, so "discovery" is
//! expressed the way a statically typed language naturally would: each
//! service module exposes a `operations() -> Vec<OperationSpec>` builder
//! that emits its own entries, already bound to `self` via a captured
//! `Arc`. [`MethodRegistry::build`] only merges what it is handed.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::context::RequestDetails;
use crate::errors::RpcErr;
use crate::validator::ValidationSchema;

pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Value, RpcErr>> + Send>>;
pub type HandlerFn = Arc<dyn Fn(Vec<Value>, RequestDetails) -> HandlerResult + Send + Sync>;

/// Reshapes the wire-order parameter list before the handler is invoked —
/// e.g. coercing a hex string to a number, or collapsing everything down
/// to nothing when the handler only needs the request context. Absent, the
/// default arrangement passes `params` through unchanged.
pub type ArrangeFn = Arc<dyn Fn(&[Value]) -> Vec<Value> + Send + Sync>;

/// One RPC-exposed operation, already bound to its owning service instance.
#[derive(Clone)]
pub struct RpcOperation {
    name: Arc<str>,
    schema: Option<Arc<ValidationSchema>>,
    arrange: Option<ArrangeFn>,
    handler: HandlerFn,
}

impl RpcOperation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&ValidationSchema> {
        self.schema.as_deref()
    }

    pub async fn invoke(&self, params: &[Value], request: RequestDetails) -> Result<Value, RpcErr> {
        let args = match &self.arrange {
            Some(arrange) => arrange(params),
            None => params.to_vec(),
        };
        (self.handler)(args, request).await
    }
}

/// Declarative description of one operation a service wants registered.
/// Built by each service's `operations()` function and merged by
/// [`MethodRegistry::build`]; never kept around afterward.
pub struct OperationSpec {
    pub name: &'static str,
    pub schema: Option<ValidationSchema>,
    pub arrange: Option<ArrangeFn>,
    pub handler: HandlerFn,
}

impl OperationSpec {
    pub fn new(name: &'static str, handler: HandlerFn) -> Self {
        OperationSpec {
            name,
            schema: None,
            arrange: None,
            handler,
        }
    }

    pub fn with_schema(mut self, schema: ValidationSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_arrange(mut self, arrange: ArrangeFn) -> Self {
        self.arrange = Some(arrange);
        self
    }
}

/// Immutable `namespace_method -> operation` table, built once at startup
/// and read-only for the rest of the process's life.
pub struct MethodRegistry {
    operations: HashMap<String, RpcOperation>,
}

impl MethodRegistry {
    /// `namespaces` pairs a namespace name with the specs a service emitted
    /// for it. Panics on a duplicate key: that can only happen if two
    /// services registered the same `namespace_method`, which is a wiring
    /// bug caught at startup rather than at request time.
    pub fn build(namespaces: Vec<(&str, Vec<OperationSpec>)>) -> Self {
        let mut operations = HashMap::new();
        for (namespace, specs) in namespaces {
            for spec in specs {
                let key = format!("{namespace}_{}", spec.name);
                let operation = RpcOperation {
                    name: Arc::from(spec.name),
                    schema: spec.schema.map(Arc::new),
                    arrange: spec.arrange,
                    handler: spec.handler,
                };
                if operations.insert(key.clone(), operation).is_some() {
                    panic!("duplicate RPC method registered: {key}");
                }
            }
        }
        MethodRegistry { operations }
    }

    pub fn get(&self, full_name: &str) -> Option<&RpcOperation> {
        self.operations.get(full_name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> HandlerFn {
        Arc::new(|_args, _req| Box::pin(async { Ok(Value::Null) }))
    }

    #[test]
    fn build_composes_namespace_and_method() {
        let registry = MethodRegistry::build(vec![(
            "eth",
            vec![OperationSpec::new("chainId", noop_handler())],
        )]);
        assert!(registry.get("eth_chainId").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_namespace_list_yields_empty_registry() {
        let registry = MethodRegistry::build(vec![]);
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "duplicate RPC method registered")]
    fn duplicate_keys_panic() {
        MethodRegistry::build(vec![(
            "eth",
            vec![
                OperationSpec::new("chainId", noop_handler()),
                OperationSpec::new("chainId", noop_handler()),
            ],
        )]);
    }

    #[tokio::test]
    async fn operation_preserves_its_bare_name() {
        let registry = MethodRegistry::build(vec![(
            "eth",
            vec![OperationSpec::new("chainId", noop_handler())],
        )]);
        let operation = registry.get("eth_chainId").unwrap();
        assert_eq!(operation.name(), "chainId");
        let result = operation
            .invoke(&[], RequestDetails::internal("test"))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }
}

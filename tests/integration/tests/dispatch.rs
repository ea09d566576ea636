//! Dispatcher scenarios through the public registration API.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiregate_gateway::{
    Arguments, CallContext, CallRequest, Constraint, Dispatcher, ErrorCode, GatewayError, Handler,
    HandlerDescriptor, HandlerRegistry, HttpSessionStore, MethodDescriptor, ParamSpec, ParamType,
    Reply,
};

/// Counts instances and releases so tests can check scoping.
#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    released: AtomicUsize,
}

struct Orders {
    counters: Arc<Counters>,
}

#[async_trait]
impl Handler for Orders {
    async fn invoke(
        &mut self,
        method: &str,
        args: Arguments,
        ctx: &CallContext,
    ) -> wiregate_gateway::Result<Reply> {
        match method {
            "place" => {
                let sku = args.str(0).unwrap_or_default();
                let qty = args.i64(1).unwrap_or(1);
                Ok(json!({"sku": sku, "qty": qty, "session": ctx.session.is_some()}).into())
            }
            "cancel" => Err(GatewayError::handler("Order already shipped")),
            _ => Err(GatewayError::ServiceNotFound),
        }
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn dispatcher(counters: Arc<Counters>) -> Dispatcher {
    let descriptor = HandlerDescriptor::new("shop", "Orders", move || {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Box::new(Orders {
            counters: Arc::clone(&counters),
        })
    })
    .path("/api")
    .requires_session()
    .method(
        MethodDescriptor::new("place")
            .param(
                ParamSpec::new("sku", ParamType::String)
                    .required()
                    .constraint(Constraint::pattern("[A-Z]{3}-[0-9]{4}").unwrap()),
            )
            .param(
                ParamSpec::new("qty", ParamType::Integer).constraint(Constraint::Range {
                    min: Some(1.0),
                    max: Some(100.0),
                }),
            )
            .validated(),
    )
    .method(MethodDescriptor::new("cancel"));

    let registry = HandlerRegistry::builder().register(descriptor).build().unwrap();
    Dispatcher::new(Arc::new(registry))
}

fn place(data: Value) -> CallRequest {
    CallRequest::new("shop", "Orders", "place")
        .with_tid("t-1")
        .with_data(data.as_array().cloned().unwrap_or_default())
}

#[tokio::test]
async fn test_session_required() {
    let counters = Arc::new(Counters::default());
    let dispatcher = dispatcher(Arc::clone(&counters));

    let response = dispatcher
        .dispatch(&place(json!(["ABC-1234", 2])), &CallContext::new("/api"))
        .await;
    assert_eq!(response.tid, json!("t-1"));
    assert_eq!(response.result.code, Some(ErrorCode::ServiceNotFound));
    assert_eq!(counters.created.load(Ordering::SeqCst), 0);

    let sessions = HttpSessionStore::new();
    let ctx = CallContext::new("/api").with_session(Some(sessions.create()));
    let response = dispatcher.dispatch(&place(json!(["ABC-1234", "2"])), &ctx).await;
    assert!(response.is_success());
    assert_eq!(response.result.data, Some(json!({"sku": "ABC-1234", "qty": 2, "session": true})));
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validation_collects_every_violation() {
    let dispatcher = dispatcher(Arc::new(Counters::default()));
    let sessions = HttpSessionStore::new();
    let ctx = CallContext::new("/api").with_session(Some(sessions.create()));

    let response = dispatcher.dispatch(&place(json!(["abc", 500])), &ctx).await;
    assert_eq!(response.result.code, Some(ErrorCode::ValidationFailed));
    let msg = response.result.msg.unwrap();
    assert!(msg.contains("sku"));
    assert!(msg.contains("qty"));
    assert_eq!(msg.lines().count(), 2);
}

#[tokio::test]
async fn test_handler_failure_and_batch_isolation() {
    let counters = Arc::new(Counters::default());
    let dispatcher = dispatcher(Arc::clone(&counters));
    let sessions = HttpSessionStore::new();
    let ctx = CallContext::new("/api/v1").with_session(Some(sessions.create()));

    let batch = vec![
        CallRequest::new("shop", "Orders", "cancel").with_tid(1),
        place(json!(["XYZ-0001"])).with_tid(2),
        place(json!([])).with_tid(3),
        CallRequest::new("shop", "Missing", "place").with_tid(4),
    ];
    let responses = dispatcher.dispatch_batch(&batch, &ctx).await;

    let tids: Vec<_> = responses.iter().map(|r| r.tid.clone()).collect();
    assert_eq!(tids, vec![json!(1), json!(2), json!(3), json!(4)]);

    assert_eq!(responses[0].result.code, Some(ErrorCode::GeneralError));
    assert_eq!(responses[0].result.msg.as_deref(), Some("Order already shipped"));
    assert!(responses[1].is_success());
    assert_eq!(responses[2].result.code, Some(ErrorCode::InvalidParameters));
    assert_eq!(responses[3].result.code, Some(ErrorCode::ServiceNotFound));

    // Only the two calls that reached a handler created instances
    assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    assert_eq!(counters.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_path_restriction() {
    let dispatcher = dispatcher(Arc::new(Counters::default()));
    let sessions = HttpSessionStore::new();
    let ctx = CallContext::new("/socket").with_session(Some(sessions.create()));

    let response = dispatcher.dispatch(&place(json!(["ABC-1234"])), &ctx).await;
    assert_eq!(response.result.code, Some(ErrorCode::ServiceNotFound));
}

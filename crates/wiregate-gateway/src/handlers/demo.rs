//! Sample application handler.
//!
//! Exercises the dispatcher end to end: a required argument, an unencrypted
//! method, validated parameters, shared state across per-call instances and
//! a list-typed parameter.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::GatewayError;
use crate::handler::{Arguments, CallContext, Handler, Reply};
use crate::protocol::CallResult;
use crate::registry::{Constraint, HandlerDescriptor, MethodDescriptor, ParamSpec, ParamType};
use crate::Result;

/// Default namespace for the demo handler.
pub const DEFAULT_NAMESPACE: &str = "app";

/// Action name of the demo handler.
pub const DEMO_ACTION: &str = "Demo";

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

/// Users shared by all demo instances.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<Vec<User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a user and return it with its assigned ID.
    pub fn add(&self, name: String, email: String) -> User {
        let mut users = self.users.write();
        let user = User {
            id: users.len() as u64 + 1,
            name,
            email,
        };
        users.push(user.clone());
        user
    }

    /// All users, oldest first.
    pub fn list(&self) -> Vec<User> {
        self.users.read().clone()
    }
}

/// Per-call demo handler.
pub struct DemoHandler {
    users: Arc<UserStore>,
}

impl DemoHandler {
    pub fn new(users: Arc<UserStore>) -> Self {
        Self { users }
    }

    /// Descriptor registering `Demo` under `namespace` on the given paths.
    pub fn descriptor(
        namespace: impl Into<String>,
        paths: &[&str],
        users: Arc<UserStore>,
    ) -> HandlerDescriptor {
        let mut descriptor = HandlerDescriptor::new(namespace, DEMO_ACTION, move || {
            Box::new(DemoHandler::new(Arc::clone(&users)))
        });
        for path in paths {
            descriptor = descriptor.path(*path);
        }

        descriptor
            .method(
                MethodDescriptor::new("hello")
                    .param(ParamSpec::new("name", ParamType::String).required()),
            )
            .method(
                MethodDescriptor::new("helloUnsafe")
                    .param(ParamSpec::new("name", ParamType::String))
                    .unencrypted(),
            )
            .method(
                MethodDescriptor::new("saveUser")
                    .param(
                        ParamSpec::new("name", ParamType::String)
                            .required()
                            .constraint(Constraint::NotBlank)
                            .constraint(Constraint::Length {
                                min: Some(2),
                                max: Some(64),
                            }),
                    )
                    .param(
                        ParamSpec::new("email", ParamType::String)
                            .required()
                            .constraint(Constraint::Email),
                    )
                    .validated(),
            )
            .method(MethodDescriptor::new("listUsers"))
            .method(
                MethodDescriptor::new("sum")
                    .param(ParamSpec::new("values", ParamType::list(ParamType::Integer))),
            )
    }
}

#[async_trait]
impl Handler for DemoHandler {
    async fn invoke(&mut self, method: &str, args: Arguments, _ctx: &CallContext) -> Result<Reply> {
        match method {
            "hello" | "helloUnsafe" => {
                let name = args.str(0).unwrap_or("stranger");
                Ok(json!(format!("Hello {}", name)).into())
            }
            "saveUser" => {
                let name = args.str(0).unwrap_or_default().trim().to_string();
                let email = args.str(1).unwrap_or_default().to_string();
                let user = self.users.add(name, email);
                info!("Saved user {}", user.id);
                Ok(CallResult::success()
                    .with_msg("User saved")
                    .with_data(serde_json::to_value(user)?)
                    .into())
            }
            "listUsers" => Ok(serde_json::to_value(self.users.list())?.into()),
            "sum" => {
                let values = args.list(0).map(Vec::as_slice).unwrap_or_default();
                let total = values
                    .iter()
                    .filter_map(|v| v.as_i64())
                    .try_fold(0i64, |acc, v| acc.checked_add(v))
                    .ok_or_else(|| GatewayError::handler("Sum overflows"))?;
                Ok(json!(total).into())
            }
            _ => Err(GatewayError::ServiceNotFound),
        }
    }
}

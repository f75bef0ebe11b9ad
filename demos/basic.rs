//! Minimal tsumiki example: a users controller with bound arguments, a
//! named auth middleware resolved from the container, and a custom verb.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users
//!   curl http://localhost:3000/api/users/42?fields=name
//!   curl -X POST http://localhost:3000/api/users -H 'x-api-key: demo' -d 'alice'
//!   curl -X PURGE http://localhost:3000/api/users/cache -H 'x-api-key: demo'

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use tsumiki::{
    AppBuilder, Arg, Beans, BoxError, BoxFuture, Component, Container, ContainerError, Context,
    Injectable, Middleware, MiddlewareRef, Next, Registry, Verb,
};

struct Store {
    names: Mutex<Vec<String>>,
}

struct Users {
    store: Arc<Store>,
}

impl Injectable for Users {
    fn inject(container: &dyn Container) -> Result<Self, ContainerError> {
        Ok(Self { store: container.get::<Store>("store")? })
    }
}

impl Users {
    // GET /api/users
    async fn list(self: Arc<Self>) -> Result<Value, BoxError> {
        let names = self.store.names.lock().map_err(|e| e.to_string())?;
        Ok(json!(*names))
    }

    // GET /api/users/:id
    async fn show(self: Arc<Self>, id: Arg, fields: Arg) -> Result<Value, BoxError> {
        Ok(json!({
            "id": id.into_value()?,
            "fields": fields.into_value()?,
        }))
    }

    // POST /api/users, body is the name
    async fn create(self: Arc<Self>, req: Arg, res: Arg) -> Result<(), BoxError> {
        let name = String::from_utf8(req.into_request()?.body().to_vec())?;
        let mut names = self.store.names.lock().map_err(|e| e.to_string())?;
        names.push(name);
        res.into_response()?.created(Some(&format!("/api/users/{}", names.len() - 1)));
        Ok(())
    }

    // PURGE /api/users/cache
    async fn purge(self: Arc<Self>) -> Result<&'static str, BoxError> {
        self.store.names.lock().map_err(|e| e.to_string())?.clear();
        Ok("purged")
    }
}

struct ApiKey {
    key: String,
}

impl Middleware for ApiKey {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        let authorized = ctx.request().header("x-api-key") == Some(self.key.as_str());
        Box::pin(async move {
            if authorized {
                next.run(ctx).await
            } else {
                ctx.response().unauthorized(json!({ "error": "missing api key" }));
                Ok(())
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), tsumiki::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut registry = Registry::new();
    let mut users = registry.controller::<Users>("/users", Vec::<MiddlewareRef>::new());
    users.get("/", "list", Users::list);
    users.get("/:id", "show", Users::show).path(0, "id").query(1, "fields");
    users
        .post("/", "create", Users::create)
        .middleware("auth")
        .request(0)
        .response(1);
    users
        .route(Verb::custom("PURGE"), "/cache", "purge", Users::purge)
        .middleware("auth");

    let mut beans = Beans::new();
    beans
        .bind_instance("store", Store { names: Mutex::new(vec!["alice".into()]) })
        .bind_component("auth", Component::middleware(ApiKey { key: "demo".into() }));

    AppBuilder::new(registry, beans)
        .configure_router_prefix("/api")
        .run(3000)
        .await
}

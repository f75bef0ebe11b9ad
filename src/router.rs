//! Radix-tree router with nested prefixes.
//!
//! A [`Router`] collects `(verb, path, middleware)` layers. Routers nest:
//! a controller gets its own router scoped to its prefix, which is then
//! [merged](Router::merge) into the root. [`Router::compile`] flattens the
//! whole thing into a single [`matchit`] tree, O(path-length) lookup, with
//! every verb registered for a path stored next to it.
//!
//! The compiled [`RouteTable`] hands out two middleware, mounted in this
//! order:
//!
//! - [`RouteTable::routes`] dispatches to the layers matching the request.
//! - [`RouteTable::allowed_methods`] answers `OPTIONS` and `405` for paths
//!   that exist but were not registered for the request's verb.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use http::header::ALLOW;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tracing::trace;

use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::verb::Verb;

/// A route tree under construction.
#[derive(Clone, Default)]
pub struct Router {
    prefix: String,
    layers: Vec<Layer>,
}

#[derive(Clone)]
struct Layer {
    verb: Verb,
    path: String,
    handler: Arc<dyn Middleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// A router whose routes all live under `prefix`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self { prefix: prefix.to_owned(), layers: Vec::new() }
    }

    pub fn set_prefix(&mut self, prefix: &str) -> &mut Self {
        self.prefix = prefix.to_owned();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registers `handler` for `verb` on `path`.
    ///
    /// Path parameters use `:name` or `{name}`; both are read back with
    /// [`Context::param`]. Under a prefix, the path `/` is the prefix itself.
    pub fn on(&mut self, verb: Verb, path: &str, handler: impl Middleware) -> &mut Self {
        self.layers.push(Layer {
            verb,
            path: path.to_owned(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers `handler` for every verb on `path`.
    pub fn any(&mut self, path: &str, handler: impl Middleware) -> &mut Self {
        self.on(Verb::All, path, handler)
    }

    /// Moves every route of `other` into this router, under `other`'s prefix.
    pub fn merge(&mut self, other: Router) -> &mut Self {
        for layer in other.layers {
            self.layers.push(Layer {
                path: join(&other.prefix, &layer.path),
                ..layer
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Flattens the tree. Fails on malformed or conflicting patterns.
    pub fn compile(self) -> Result<RouteTable, Error> {
        let mut tree = MatchitRouter::new();
        let mut entries: Vec<Entry> = Vec::new();
        let mut by_pattern: HashMap<String, usize> = HashMap::new();

        for layer in self.layers {
            let pattern = normalize(&join(&self.prefix, &layer.path));
            let slot = match by_pattern.get(&pattern) {
                Some(&slot) => slot,
                None => {
                    let slot = entries.len();
                    tree.insert(pattern.clone(), slot)
                        .map_err(|source| Error::InvalidRoute { path: pattern.clone(), source })?;
                    by_pattern.insert(pattern.clone(), slot);
                    entries.push(Entry { layers: Vec::new() });
                    slot
                }
            };
            entries[slot].layers.push((layer.verb, layer.handler));
        }

        Ok(RouteTable { inner: Arc::new(Table { tree, entries }) })
    }
}

/// Joins a prefix and a route path. A `/` route under a non-root prefix is
/// the prefix itself.
fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), path) {
        (true, "") => "/".to_owned(),
        (true, _) if path.starts_with('/') => path.to_owned(),
        (true, _) => format!("/{path}"),
        (false, "" | "/") => prefix.to_owned(),
        (false, _) if path.starts_with('/') => format!("{prefix}{path}"),
        (false, _) => format!("{prefix}/{path}"),
    }
}

/// Rewrites `:name` segments into matchit's `{name}` syntax.
fn normalize(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ── Compiled table ────────────────────────────────────────────────────────────

/// The compiled routes. Cheap to clone.
#[derive(Clone)]
pub struct RouteTable {
    inner: Arc<Table>,
}

struct Table {
    tree: MatchitRouter<usize>,
    entries: Vec<Entry>,
}

struct Entry {
    layers: Vec<(Verb, Arc<dyn Middleware>)>,
}

impl Entry {
    /// Layers taking `method`: exact verbs first, then any-verb layers.
    /// `HEAD` falls back to `GET` layers when none is registered for it.
    fn matching(&self, method: &http::Method) -> Vec<Arc<dyn Middleware>> {
        let exact = |verb: &Verb| *verb != Verb::All && verb.accepts(method);
        let mut selected: Vec<_> = self.layers.iter().filter(|(v, _)| exact(v)).collect();
        if selected.is_empty() && method == http::Method::HEAD {
            selected = self.layers.iter().filter(|(v, _)| *v == Verb::Get).collect();
        }
        selected
            .into_iter()
            .chain(self.layers.iter().filter(|(v, _)| *v == Verb::All))
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    /// Verbs for the `Allow` header, in registration order.
    fn allowed(&self) -> Vec<String> {
        let mut verbs: Vec<String> = Vec::new();
        for (verb, _) in &self.layers {
            let names = match verb {
                Verb::All => vec![],
                Verb::Get => vec!["GET", "HEAD"],
                other => vec![other.as_str()],
            };
            for name in names {
                if !verbs.iter().any(|v| v == name) {
                    verbs.push(name.to_owned());
                }
            }
        }
        verbs
    }
}

impl Table {
    /// Finds the entry for `path`, ignoring one trailing slash.
    fn lookup(&self, path: &str) -> Option<(&Entry, HashMap<String, String>)> {
        let matched = self.tree.at(path).ok().or_else(|| {
            let trimmed = path.strip_suffix('/').filter(|p| !p.is_empty())?;
            self.tree.at(trimmed).ok()
        })?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), decode(v)))
            .collect();
        Some((&self.entries[*matched.value], params))
    }
}

/// Percent-decodes a captured segment. Invalid UTF-8 keeps the raw text.
fn decode(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_| raw.to_owned(), Cow::into_owned)
}

impl RouteTable {
    /// Middleware dispatching requests to the matching routes.
    ///
    /// Unmatched requests continue down the chain untouched. When the path
    /// matches but no layer takes the verb, the registered verbs are left
    /// on the context for [`allowed_methods`](Self::allowed_methods).
    pub fn routes(&self) -> Dispatch {
        Dispatch { table: Arc::clone(&self.inner) }
    }

    pub fn allowed_methods(&self) -> AllowedMethods {
        AllowedMethods
    }

    /// The verbs registered on `path`, if any route matches it.
    pub fn allowed(&self, path: &str) -> Option<Vec<String>> {
        self.inner.lookup(path).map(|(entry, _)| entry.allowed())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.iter().map(|e| e.layers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// See [`RouteTable::routes`].
#[derive(Clone)]
pub struct Dispatch {
    table: Arc<Table>,
}

impl Middleware for Dispatch {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        let Some((entry, params)) = self.table.lookup(ctx.path()) else {
            return next.run(ctx);
        };
        let layers = entry.matching(ctx.method());
        if layers.is_empty() {
            ctx.set_allowed(entry.allowed());
            return next.run(ctx);
        }
        trace!(path = %ctx.path(), layers = layers.len(), "route matched");
        ctx.set_params(params);
        Next::new(Arc::from(layers), Some(next)).run(ctx)
    }
}

/// See [`RouteTable::allowed_methods`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowedMethods;

impl Middleware for AllowedMethods {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        Box::pin(async move {
            next.run(ctx.clone()).await?;

            let response = ctx.response();
            let untouched = response.status().is_none_or(|s| s == StatusCode::NOT_FOUND);
            if !untouched || response.has_body() {
                return Ok(());
            }
            let Some(allowed) = ctx.take_allowed() else {
                return Ok(());
            };
            response.set_header(ALLOW.as_str(), &allowed.join(", "))?;
            if ctx.method() == http::Method::OPTIONS {
                response.set_status(StatusCode::OK);
            } else {
                response.set_status(StatusCode::METHOD_NOT_ALLOWED);
                response.set_body("Method Not Allowed");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::compose;
    use crate::middleware::from_fn;
    use crate::middleware::tests::context;

    fn reply(text: &'static str) -> impl Middleware {
        from_fn(move |ctx: Context, _next| async move {
            ctx.response().set_body(text);
            Ok(())
        })
    }

    async fn call(table: &RouteTable, method: &str, uri: &str) -> Context {
        let ctx = context(method, uri);
        let chain = compose([
            Arc::new(table.routes()) as Arc<dyn Middleware>,
            Arc::new(table.allowed_methods()),
        ]);
        chain.handle(ctx.clone(), Next::end()).await.unwrap();
        ctx
    }

    fn text(ctx: &Context) -> Option<String> {
        match ctx.response().body()? {
            crate::Body::Text(s) => Some(s),
            _ => None,
        }
    }

    #[test]
    fn join_handles_root_and_slashes() {
        assert_eq!(join("", "/"), "/");
        assert_eq!(join("/", "/users"), "/users");
        assert_eq!(join("/users", "/"), "/users");
        assert_eq!(join("/users/", ":id"), "/users/:id");
        assert_eq!(normalize("/users/:id/posts/:post"), "/users/{id}/posts/{post}");
    }

    #[tokio::test]
    async fn nested_prefixes_and_params() {
        let mut users = Router::with_prefix("/users");
        users.on(Verb::Get, "/", reply("list"));
        users.on(Verb::Get, "/:id", from_fn(|ctx: Context, _next| async move {
            let id = ctx.param("id").unwrap_or_default();
            ctx.response().set_body(format!("user {id}"));
            Ok(())
        }));
        let mut root = Router::with_prefix("/api");
        root.merge(users);
        let table = root.compile().unwrap();

        assert_eq!(text(&call(&table, "GET", "/api/users").await).as_deref(), Some("list"));
        assert_eq!(text(&call(&table, "GET", "/api/users/").await).as_deref(), Some("list"));
        assert_eq!(text(&call(&table, "GET", "/api/users/42").await).as_deref(), Some("user 42"));
        assert!(!call(&table, "GET", "/users").await.response().has_body());
    }

    #[tokio::test]
    async fn params_are_percent_decoded() {
        let mut router = Router::new();
        router.on(Verb::Get, "/users/:id", from_fn(|ctx: Context, _next| async move {
            ctx.response().set_body(ctx.param("id").unwrap_or_default());
            Ok(())
        }));
        let table = router.compile().unwrap();

        assert_eq!(text(&call(&table, "GET", "/users/john%20doe").await).as_deref(), Some("john doe"));
        assert_eq!(text(&call(&table, "GET", "/users/a+b").await).as_deref(), Some("a+b"));
        assert_eq!(text(&call(&table, "GET", "/users/%FF").await).as_deref(), Some("%FF"));
    }

    #[tokio::test]
    async fn exact_verbs_run_before_any() {
        let mut router = Router::new();
        router.any("/x", from_fn(|ctx: Context, next: Next| async move {
            ctx.set_state("any", true);
            next.run(ctx).await
        }));
        router.on(Verb::Post, "/x", from_fn(|ctx: Context, next: Next| async move {
            ctx.response().set_body(format!("any ran first: {}", ctx.state("any").is_some()));
            next.run(ctx).await
        }));
        let table = router.compile().unwrap();

        let ctx = call(&table, "POST", "/x").await;
        assert_eq!(text(&ctx).as_deref(), Some("any ran first: false"));
        assert!(ctx.state("any").is_some());
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let mut router = Router::new();
        router.on(Verb::Get, "/doc", reply("doc"));
        let table = router.compile().unwrap();

        assert_eq!(text(&call(&table, "HEAD", "/doc").await).as_deref(), Some("doc"));
    }

    #[tokio::test]
    async fn wrong_verb_is_405_with_allow() {
        let mut router = Router::new();
        router.on(Verb::Get, "/items", reply("items"));
        router.on(Verb::Post, "/items", reply("created"));
        let table = router.compile().unwrap();

        let ctx = call(&table, "DELETE", "/items").await;
        assert_eq!(ctx.response().status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        assert_eq!(ctx.response().header("allow").as_deref(), Some("GET, HEAD, POST"));

        let ctx = call(&table, "OPTIONS", "/items").await;
        assert_eq!(ctx.response().status(), Some(StatusCode::OK));
        assert!(!ctx.response().has_body());

        let ctx = call(&table, "DELETE", "/elsewhere").await;
        assert_eq!(ctx.response().status(), None);
    }

    #[test]
    fn conflicting_patterns_fail_to_compile() {
        let mut router = Router::new();
        router.on(Verb::Get, "/a/:id", reply("a"));
        router.on(Verb::Get, "/a/:name", reply("b"));

        assert!(matches!(router.compile(), Err(Error::InvalidRoute { .. })));
    }
}

//! Parameter binding: from a method and its binding descriptor to a
//! request handler.
//!
//! Coverage is checked when the application is built, so a bound handler
//! never discovers a missing argument at request time.

use std::collections::HashSet;
use std::sync::Arc;

use crate::container::Component;
use crate::context::Context;
use crate::error::{BoxError, Error};
use crate::handler::{Arg, BoxedMethod};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::registry::{Binding, MethodDescriptor, ParamBindingDescriptor};

/// Where one argument comes from at request time.
#[derive(Clone, Debug)]
enum Source {
    Context,
    Request,
    Response,
    Next,
    Path(String),
    Query(String),
    Cookie(String),
}

#[derive(Clone, Debug)]
enum Plan {
    /// No annotations on a method with parameters: it gets the context,
    /// its return value is dropped and the chain always continues.
    Conventional { arity: usize },
    /// One source per argument position.
    Bound { sources: Vec<Source>, owns_next: bool },
}

/// A controller method turned into the innermost middleware of its route.
#[derive(Clone)]
pub struct BoundHandler {
    controller: Component,
    method: BoxedMethod,
    plan: Arc<Plan>,
}

/// Validates `binding` against `method` and returns the handler.
pub fn bind(
    controller: Component,
    controller_name: &str,
    method: &MethodDescriptor,
    binding: Binding<'_>,
) -> Result<BoundHandler, Error> {
    let arity = method.arity();
    let plan = match binding {
        // Nothing to bind on a parameterless method: it is treated as
        // annotated, so its return value is still assigned.
        Binding::Unbound if arity == 0 => Plan::Bound { sources: Vec::new(), owns_next: false },
        Binding::Unbound => Plan::Conventional { arity },
        Binding::Bound(descriptor) => Plan::Bound {
            sources: sources(controller_name, &method.name, arity, descriptor)?,
            owns_next: descriptor.next.is_some(),
        },
    };
    Ok(BoundHandler {
        controller,
        method: Arc::clone(method.method()),
        plan: Arc::new(plan),
    })
}

fn sources(
    controller: &str,
    method: &str,
    arity: usize,
    descriptor: &ParamBindingDescriptor,
) -> Result<Vec<Source>, Error> {
    let covered = descriptor
        .indices()
        .filter(|&i| i < arity)
        .collect::<HashSet<_>>()
        .len();
    if covered < arity {
        return Err(Error::IncompleteParameterBinding {
            controller: controller.to_owned(),
            method: method.to_owned(),
            declared: arity,
            covered,
        });
    }
    if let Some(index) = descriptor.indices().find(|&i| i >= arity) {
        return Err(Error::BindingIndexOutOfRange {
            controller: controller.to_owned(),
            method: method.to_owned(),
            index,
            declared: arity,
        });
    }

    let single = [
        (descriptor.context, Source::Context),
        (descriptor.request, Source::Request),
        (descriptor.response, Source::Response),
        (descriptor.next, Source::Next),
    ];
    let named = |params: &[crate::registry::NamedParam], source: fn(String) -> Source| {
        params
            .iter()
            .map(move |p| (Some(p.index), source(p.name.clone())))
            .collect::<Vec<_>>()
    };

    let mut slots: Vec<Option<Source>> = vec![None; arity];
    let all = single
        .into_iter()
        .chain(named(&descriptor.params, Source::Path))
        .chain(named(&descriptor.queries, Source::Query))
        .chain(named(&descriptor.cookies, Source::Cookie));
    for (index, source) in all {
        let Some(index) = index else { continue };
        if slots[index].replace(source).is_some() {
            return Err(Error::ConflictingParameterBinding {
                controller: controller.to_owned(),
                method: method.to_owned(),
                index,
            });
        }
    }

    // Coverage was checked above, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

impl BoundHandler {
    fn arguments(&self, ctx: &Context, next: &Next) -> Vec<Arg> {
        match &*self.plan {
            Plan::Conventional { arity } => {
                let mut args = Vec::with_capacity(*arity);
                if *arity > 0 {
                    args.push(Arg::Context(ctx.clone()));
                }
                args.resize(*arity, Arg::Value(None));
                args
            }
            Plan::Bound { sources, .. } => sources
                .iter()
                .map(|source| match source {
                    Source::Context      => Arg::Context(ctx.clone()),
                    Source::Request      => Arg::Request(ctx.request().clone()),
                    Source::Response     => Arg::Response(ctx.response().clone()),
                    Source::Next         => Arg::Next(next.clone()),
                    Source::Path(name)   => Arg::Value(ctx.param(name)),
                    Source::Query(name)  => Arg::Value(ctx.query(name)),
                    Source::Cookie(name) => Arg::Value(ctx.cookie(name)),
                })
                .collect(),
        }
    }
}

impl Middleware for BoundHandler {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        let args = self.arguments(&ctx, &next);
        let call = self.method.call(&self.controller, args);
        let plan = Arc::clone(&self.plan);
        Box::pin(async move {
            let returned = call.await?;
            match &*plan {
                Plan::Conventional { .. } => next.run(ctx).await,
                Plan::Bound { owns_next, .. } => {
                    if !ctx.response().has_body() {
                        if let Some(body) = returned {
                            ctx.response().set_body(body);
                        }
                    }
                    if *owns_next { Ok(()) } else { next.run(ctx).await }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::any::type_name;
    use std::sync::Mutex;

    use http::StatusCode;
    use serde_json::{Value, json};

    use super::*;
    use crate::container::{Container, ContainerError, Injectable};
    use crate::middleware::tests::{Journal, context, recorder};
    use crate::middleware::compose;
    use crate::registry::{Registry, Slot};
    use crate::response::Body;
    use crate::verb::Verb;

    #[derive(Default)]
    struct Users {
        seen: Mutex<Vec<String>>,
    }

    impl Injectable for Users {
        fn inject(_: &dyn Container) -> Result<Self, ContainerError> {
            Ok(Users::default())
        }
    }

    impl Users {
        async fn list(self: Arc<Self>) -> Result<Value, BoxError> {
            Ok(json!({ "id": 1 }))
        }

        async fn show(self: Arc<Self>, id: Arg, sort: Arg, ctx: Arg) -> Result<String, BoxError> {
            let ctx = ctx.into_context()?;
            assert_eq!(ctx.path(), "/users/42");
            Ok(format!("{:?}/{:?}", id.into_value()?, sort.into_value()?))
        }

        async fn explicit(self: Arc<Self>, res: Arg) -> Result<&'static str, BoxError> {
            res.into_response()?.set_body("set by method");
            Ok("returned")
        }

        async fn gate(self: Arc<Self>, next: Arg) -> Result<(), BoxError> {
            let _ = next.into_next()?;
            Ok(())
        }

        async fn conventional(self: Arc<Self>, ctx: Arg, rest: Arg) -> Result<&'static str, BoxError> {
            self.seen.lock().unwrap().push(ctx.into_context()?.path().to_owned());
            assert!(matches!(rest, Arg::Value(None)));
            Ok("ignored")
        }
    }

    fn handler(registry: &Registry, method: &str) -> Result<BoundHandler, Error> {
        let name = type_name::<Users>();
        let descriptor = registry
            .list_methods(name)?
            .iter()
            .find(|m| m.name == method)
            .expect("declared method");
        bind(Component::new(Users::default()), name, descriptor, registry.param_binding(name, method))
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        let mut users = registry.controller::<Users>("/users", Vec::<crate::MiddlewareRef>::new());
        users.get("/", "list", Users::list);
        users.get("/:id", "show", Users::show).path(0, "id").query(1, "sort").context(2);
        users.get("/explicit", "explicit", Users::explicit).response(0);
        users.get("/gate", "gate", Users::gate).next(0);
        users.get("/conv", "conventional", Users::conventional);
        registry
    }

    #[tokio::test]
    async fn return_value_becomes_the_body() {
        let bound = handler(&registry(), "list").unwrap();
        let ctx = context("GET", "/users");

        bound.handle(ctx.clone(), Next::end()).await.unwrap();

        assert_eq!(ctx.response().status(), Some(StatusCode::OK));
        assert_eq!(ctx.response().body(), Some(Body::Json(json!({ "id": 1 }))));
    }

    #[test]
    fn binding_past_the_last_parameter_is_rejected() {
        let mut registry = registry();
        registry.register_param_binding(type_name::<Users>(), "explicit", Slot::Query("q".into()), 3);

        assert!(matches!(
            handler(&registry, "explicit"),
            Err(Error::BindingIndexOutOfRange { index: 3, declared: 1, .. })
        ));
    }

    #[tokio::test]
    async fn values_default_to_none_when_absent() {
        let bound = handler(&registry(), "show").unwrap();
        let ctx = context("GET", "/users/42?sort=asc");
        ctx.set_params([("id".to_owned(), "42".to_owned())].into());

        bound.handle(ctx.clone(), Next::end()).await.unwrap();

        assert_eq!(ctx.response().status(), Some(StatusCode::OK));
        assert_eq!(
            ctx.response().body(),
            Some(Body::Text(r#"Some("42")/Some("asc")"#.into()))
        );

        let ctx = context("GET", "/users/42");
        bound.handle(ctx.clone(), Next::end()).await.unwrap();
        assert_eq!(ctx.response().body(), Some(Body::Text("None/None".into())));
    }

    #[tokio::test]
    async fn explicit_body_wins_over_return_value() {
        let bound = handler(&registry(), "explicit").unwrap();
        let ctx = context("GET", "/users/explicit");

        bound.handle(ctx.clone(), Next::end()).await.unwrap();

        assert_eq!(ctx.response().body(), Some(Body::Text("set by method".into())));
    }

    #[tokio::test]
    async fn terminal_by_default_owning_next_otherwise() {
        let journal = Journal::default();
        let after = recorder(&journal, "after");

        let show = Arc::new(handler(&registry(), "show").unwrap()) as Arc<dyn Middleware>;
        compose([show, Arc::clone(&after)])
            .handle(context("GET", "/users/42"), Next::end())
            .await
            .unwrap();
        assert_eq!(journal.lock().unwrap().len(), 2);

        journal.lock().unwrap().clear();
        let gate = Arc::new(handler(&registry(), "gate").unwrap()) as Arc<dyn Middleware>;
        let ctx = context("GET", "/users/gate");
        compose([gate, after]).handle(ctx.clone(), Next::end()).await.unwrap();
        assert!(journal.lock().unwrap().is_empty());
        assert!(!ctx.response().has_body());
    }

    #[tokio::test]
    async fn unbound_method_gets_the_context_and_continues() {
        let journal = Journal::default();
        let conv = Arc::new(handler(&registry(), "conventional").unwrap()) as Arc<dyn Middleware>;
        let ctx = context("GET", "/users/conv");

        compose([conv, recorder(&journal, "after")])
            .handle(ctx.clone(), Next::end())
            .await
            .unwrap();

        assert_eq!(journal.lock().unwrap().len(), 2);
        assert!(!ctx.response().has_body());
    }

    #[test]
    fn incomplete_binding_is_rejected_whatever_is_missing() {
        for bound in [0, 1, 2] {
            let mut registry = Registry::new();
            registry
                .controller::<Users>("/users", Vec::<crate::MiddlewareRef>::new())
                .route(Verb::Get, "/:id", "show", Users::show)
                .bind(bound, Slot::Context);

            let err = handler(&registry, "show").err().unwrap();
            assert!(matches!(
                err,
                Error::IncompleteParameterBinding { declared: 3, covered: 1, .. }
            ));
        }
    }

    #[test]
    fn two_slots_on_one_index_conflict() {
        let mut registry = Registry::new();
        registry
            .controller::<Users>("/users", Vec::<crate::MiddlewareRef>::new())
            .get("/:id", "show", Users::show)
            .path(0, "id")
            .query(1, "sort")
            .context(2)
            .cookie(2, "session");

        let err = handler(&registry, "show").err().unwrap();
        assert!(matches!(err, Error::ConflictingParameterBinding { index: 2, .. }));
    }
}

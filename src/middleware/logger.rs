//! Default request logger.

use std::time::Instant;

use tracing::info;

use super::{BoxFuture, Middleware, Next};
use crate::context::Context;
use crate::error::BoxError;

/// Logs every request on the way in and, with its status and latency, on
/// the way out.
///
/// Installed as the outermost middleware unless replaced through
/// [`AppBuilder::configure_logger`](crate::AppBuilder::configure_logger).
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<(), BoxError>> {
        Box::pin(async move {
            let started = Instant::now();
            let method = ctx.method().clone();
            let path = ctx.path().to_owned();
            let host = ctx.request().host().unwrap_or("-").to_owned();

            info!(%method, %path, %host, "<--");
            let result = next.run(ctx.clone()).await;
            info!(
                %method,
                %path,
                %host,
                status = ctx.response().effective_status().as_u16(),
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "-->"
            );
            result
        })
    }
}

//! Envelope dispatch with panic isolation.
//!
//! Every handler invocation is guarded: a panicking module produces one
//! error log (with the panic payload and trace id) and costs exactly one
//! envelope. The shard worker survives.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::context::ServiceContext;
use crate::registry::Registry;

pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Looks up the handler for `ctx.msg_id` and runs it guarded.
    /// Missing handlers log and drop.
    pub async fn dispatch(&self, ctx: &mut ServiceContext) {
        let Some(module) = self.registry.handler_for(ctx.msg_id) else {
            tracing::warn!(
                msg_id = ctx.msg_id,
                session = ctx.session_id,
                player = ctx.player_id,
                reason = "handler_not_found",
                "no handler for msg id"
            );
            return;
        };

        let msg_id = ctx.msg_id;
        let session = ctx.session_id;
        let player = ctx.player_id;
        let trace_id = ctx.trace_id.clone();

        match AssertUnwindSafe(module.handle(ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    msg_id,
                    session,
                    player,
                    trace_id = %trace_id,
                    module = module.name(),
                    error = %e,
                    "handler failed"
                );
            }
            Err(panic) => {
                let panic_msg = panic_message(&panic);
                tracing::error!(
                    msg_id,
                    session,
                    player,
                    trace_id = %trace_id,
                    module = module.name(),
                    panic = %panic_msg,
                    "handler panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

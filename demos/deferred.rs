//! Responder that finishes requests from background threads.
//!
//! `/backend` starts three fake backend lookups on worker threads. Each
//! lookup completes one slot of a [`CompletionGroup`]; the last one wakes the
//! connection, and the response is written from `on_notify`. `/` answers
//! directly; anything else gets a 404.
//!
//! ```text
//! cargo run --example deferred -- /tmp/fcgi.1.sock
//! ```

use std::thread;
use std::time::Duration;

use fcgi_engine::handler::{Handler, RequestContext};
use fcgi_engine::protocol::{Params, RecordType};
use fcgi_engine::{CompletionGroup, ServerBuilder};

const LOOKUPS: usize = 3;

struct Deferred;

impl Deferred {
    fn respond(ctx: &mut RequestContext<'_>, body: &[u8]) {
        let mut out = ctx.get_write_request(RecordType::Stdout);
        out.append(b"Content-Type: text/plain\r\n\r\n");
        out.append(body);
        ctx.send(out);
    }
}

impl Handler for Deferred {
    fn on_params(&mut self, ctx: &mut RequestContext<'_>, params: Params<'_>) {
        match params.get(b"REQUEST_URI") {
            Some(b"/") => Self::respond(ctx, b"Hello, World!"),
            Some(b"/backend") => {
                let Some(notifier) = ctx.notifier() else {
                    return;
                };
                let group = CompletionGroup::new(notifier, LOOKUPS);
                for i in 0..LOOKUPS {
                    let group = group.clone();
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(10 * (i as u64 + 1)));
                        group.complete_one();
                    });
                }
            }
            _ => {
                ctx.set_app_status(404);
                Self::respond(ctx, b"Not found");
            }
        }
    }

    fn on_notify(&mut self, ctx: &mut RequestContext<'_>) {
        Self::respond(ctx, b"Success");
    }

    fn on_write(&mut self, ctx: &mut RequestContext<'_>) {
        ctx.end_request();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "fcgi.1.sock".to_string());

    ServerBuilder::new().max_connections(256).serve(&path, Deferred)?;
    Ok(())
}

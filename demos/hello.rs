//! Hello World responder.
//!
//! Answers `/` with "Hello, World!" and everything else with 404.
//!
//! # Running behind nginx
//!
//! ```text
//! cargo run --example hello -- /tmp/fcgi.0.sock
//!
//! location / {
//!     include fastcgi_params;
//!     fastcgi_pass unix:/tmp/fcgi.0.sock;
//! }
//! ```

use fcgi_engine::handler::{Handler, RequestContext};
use fcgi_engine::protocol::{Params, RecordType};
use fcgi_engine::ServerBuilder;

struct Hello;

impl Handler for Hello {
    fn on_params(&mut self, ctx: &mut RequestContext<'_>, params: Params<'_>) {
        for param in params.clone().map_while(|p| p.ok()) {
            tracing::debug!(
                name = %String::from_utf8_lossy(param.name),
                value = %String::from_utf8_lossy(param.value),
                "param"
            );
        }

        let mut out = ctx.get_write_request(RecordType::Stdout);
        if params.get(b"REQUEST_URI") == Some(&b"/"[..]) {
            out.append(b"Content-Type: text/plain\r\n\r\nHello, World!");
        } else {
            ctx.set_app_status(404);
            out.append(b"Content-Type: text/plain\r\n\r\nNot found");
        }
        ctx.send(out);
    }

    fn on_write(&mut self, ctx: &mut RequestContext<'_>) {
        ctx.end_request();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = match std::env::var("FCGI_LOG").as_deref() {
        Ok("trace") => tracing::Level::TRACE,
        Ok("debug") => tracing::Level::DEBUG,
        Ok("warn") => tracing::Level::WARN,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "fcgi.0.sock".to_string());
    tracing::info!(path = %path, "serving");

    ServerBuilder::new().serve(&path, Hello)?;
    Ok(())
}

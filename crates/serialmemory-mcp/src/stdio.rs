use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use tokio::runtime::Handle;
use tracing::{error, warn};

use crate::protocol::Outcome;
use crate::server::McpServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioExit {
    Eof,
    ExitRequested,
}

/// Line-delimited JSON-RPC loop. Requests are handled one at a time in
/// arrival order; only replies are written, one JSON document per line.
pub fn serve_stdio<R: BufRead, W: Write>(
    server: &McpServer,
    runtime: &Handle,
    mut reader: R,
    mut writer: W,
) -> io::Result<StdioExit> {
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(StdioExit::Eof);
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(bytes = buf.len(), "dropping stdio line that is not UTF-8");
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(server.handle_message(trimmed))
        }));
        let outcome = match dispatched {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(error = %err, "dropping unparseable stdio message");
                continue;
            }
            Err(_) => {
                error!("stdio dispatch panicked; continuing");
                continue;
            }
        };

        match outcome {
            Outcome::Reply(response) => {
                let serialized = serde_json::to_string(&response)?;
                writeln!(writer, "{serialized}")?;
                writer.flush()?;
            }
            Outcome::Silent => {}
            Outcome::Exit => return Ok(StdioExit::ExitRequested),
        }
    }
}

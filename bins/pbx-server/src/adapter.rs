use std::io::BufRead;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use pbx_proto::Command;
use pbx_switch::{Pbx, Tu};

/// Hands out extensions to freshly accepted connections. The "extension
/// equals the socket's fd" convention in the design is illustrative for
/// worked examples; a real listener's fds aren't dense or bounded by
/// `max_extensions`, so this server assigns them from its own counter
/// instead and lets `Pbx::register` reject the connection if the registry
/// is full.
static NEXT_EXTENSION: AtomicU32 = AtomicU32::new(0);

/// Serves one accepted connection until its client disconnects or a read
/// fails, then unregisters it. Mirrors the teacher's per-connection handler
/// loop: one thread per client, reading lines until EOF.
pub fn handle_client(pbx: &Arc<Pbx>, stream: TcpStream, max_extensions: u32) -> std::io::Result<()> {
    let peer_addr = stream.peer_addr()?;
    let read_half = stream.try_clone()?;
    let tu = Tu::new(stream);

    let ext = NEXT_EXTENSION.fetch_add(1, Ordering::Relaxed) % max_extensions.max(1);
    if let Err(e) = pbx.register(tu.clone(), ext) {
        tracing::warn!(?peer_addr, ext, error = ?e, "registration failed, dropping connection");
        return Ok(());
    }
    tracing::info!(?peer_addr, ext, "client connected");

    for line in BufReader::new(read_half).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(?peer_addr, error = %e, "read error, disconnecting");
                break;
            }
        };
        dispatch(pbx, &tu, line.trim_end_matches('\r'));
    }

    let _ = pbx.unregister(&tu);
    tracing::info!(?peer_addr, ext, "client disconnected");
    Ok(())
}

fn dispatch(pbx: &Arc<Pbx>, tu: &Arc<Tu>, line: &str) {
    match Command::parse(line) {
        Some(Command::Pickup) => tu.pickup(),
        Some(Command::Hangup) => tu.hangup(),
        Some(Command::Dial { digits }) => match digits.parse::<u32>() {
            Ok(target_ext) => {
                if let Err(e) = pbx.dial(tu, target_ext) {
                    tracing::debug!(ext = ?tu.extension(), target_ext, error = ?e, "dial rejected");
                }
            }
            Err(_) => tracing::debug!(ext = ?tu.extension(), %digits, "non-numeric dial target ignored"),
        },
        Some(Command::Chat { text }) => tu.chat(&text),
        None => tracing::debug!(ext = ?tu.extension(), %line, "ignoring unrecognized command"),
    }
}

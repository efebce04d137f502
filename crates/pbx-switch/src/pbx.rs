use std::sync::{Arc, Condvar, Mutex};

use pbx_core::DEFAULT_MAX_EXTENSIONS;

use crate::error::PbxError;
use crate::tu::Tu;

struct PbxInner {
    extensions: Vec<Option<Arc<Tu>>>,
    active_tus: usize,
}

/// The extension registry: a dense `extensions[0..N)` table plus a shutdown
/// condition variable, protected by a single mutex. The PBX lock is never
/// held while acquiring a TU's own lock (§4.3/§4.5) — `dial` and `unregister`
/// both release it before touching any `Tu`.
pub struct Pbx {
    state: Mutex<PbxInner>,
    drained: Condvar,
}

impl Pbx {
    pub fn new(max_extensions: u32) -> Self {
        let capacity = max_extensions.max(1) as usize;
        Pbx {
            state: Mutex::new(PbxInner {
                extensions: vec![None; capacity],
                active_tus: 0,
            }),
            drained: Condvar::new(),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_MAX_EXTENSIONS)
    }

    pub fn active_tus(&self) -> usize {
        self.state.lock().unwrap().active_tus
    }

    /// Registers `tu` under `ext`. Sets `tu.ext`, takes the registry's
    /// reference (an `Arc` clone), and emits `ON HOOK <ext>` to the client.
    pub fn register(&self, tu: Arc<Tu>, ext: u32) -> Result<(), PbxError> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .extensions
            .get(ext as usize)
            .ok_or(PbxError::ExtensionOutOfRange)?;
        if slot.is_some() {
            return Err(PbxError::ExtensionOccupied);
        }

        tu.set_extension(ext)?;
        state.extensions[ext as usize] = Some(tu.clone());
        state.active_tus += 1;
        drop(state);

        tu.emit_current_state();
        tracing::info!(ext, "registered");
        Ok(())
    }

    /// Unregisters `tu`: clears its slot, tears down any in-progress call
    /// (notifying the peer per the teardown rules in `Tu`), and drops the
    /// registry's reference. Wakes a blocked `shutdown()` once the registry
    /// empties.
    pub fn unregister(&self, tu: &Arc<Tu>) -> Result<(), PbxError> {
        let ext = tu.extension().ok_or(PbxError::NotRegistered)?;

        let mut state = self.state.lock().unwrap();
        let held = state
            .extensions
            .get(ext as usize)
            .and_then(|slot| slot.as_ref());
        if !held.is_some_and(|held| Arc::ptr_eq(held, tu)) {
            return Err(PbxError::NotRegistered);
        }
        state.extensions[ext as usize] = None;
        state.active_tus -= 1;
        let drained = state.active_tus == 0;
        drop(state);

        tu.teardown_for_unregister();

        if drained {
            self.drained.notify_all();
        }
        tracing::info!(ext, "unregistered");
        Ok(())
    }

    /// Resolves `ext` to a registered TU (if any), pins it with an `Arc`
    /// clone, releases the PBX lock, then performs the dial on the TU layer.
    /// `ext` out of range is the only failure reported to the caller; "no one
    /// registered there" is a normal outcome that dials into `ERROR`.
    pub fn dial(&self, origin: &Arc<Tu>, ext: u32) -> Result<(), PbxError> {
        let state = self.state.lock().unwrap();
        let target = state
            .extensions
            .get(ext as usize)
            .ok_or(PbxError::ExtensionOutOfRange)?
            .clone();
        drop(state);

        origin.dial(target.as_ref());
        Ok(())
    }

    /// Shuts down every occupied slot's socket (forcing its adapter's read to
    /// return EOF) and blocks until every TU has been unregistered.
    pub fn shutdown(&self) {
        let state = self.state.lock().unwrap();
        let pinned: Vec<Arc<Tu>> = state.extensions.iter().flatten().cloned().collect();
        drop(state);

        tracing::info!(count = pinned.len(), "shutdown: closing all connections");
        for tu in &pinned {
            tu.shutdown_socket();
        }

        let state = self.state.lock().unwrap();
        let _state = self
            .drained
            .wait_while(state, |state| state.active_tus > 0)
            .unwrap();
        tracing::info!("shutdown: drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    fn connect_and_accept(listener: &TcpListener) -> (TcpStream, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        (client, server)
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    #[test]
    fn register_assigns_extension_and_greets_with_on_hook() {
        let pbx = Pbx::new(16);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (client, server) = connect_and_accept(&listener);
        let mut reader = BufReader::new(client);

        let tu = Tu::new(server);
        pbx.register(tu.clone(), 4).unwrap();

        assert_eq!(read_line(&mut reader), "ON HOOK 4");
        assert_eq!(tu.extension(), Some(4));
        assert_eq!(pbx.active_tus(), 1);
    }

    #[test]
    fn register_rejects_out_of_range_and_occupied_extensions() {
        let pbx = Pbx::new(4);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let (_c1, s1) = connect_and_accept(&listener);
        let tu1 = Tu::new(s1);
        assert_eq!(pbx.register(tu1.clone(), 10), Err(PbxError::ExtensionOutOfRange));
        assert_eq!(pbx.register(tu1.clone(), 0), Ok(()));

        let (_c2, s2) = connect_and_accept(&listener);
        let tu2 = Tu::new(s2);
        assert_eq!(pbx.register(tu2, 0), Err(PbxError::ExtensionOccupied));
    }

    #[test]
    fn unregister_rejects_unknown_tu_and_tears_down_active_calls() {
        let pbx = Pbx::new(16);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        let (c_a, s_a) = connect_and_accept(&listener);
        let (c_b, s_b) = connect_and_accept(&listener);
        let mut ra = BufReader::new(c_a);
        let mut rb = BufReader::new(c_b);

        let a = Tu::new(s_a);
        let b = Tu::new(s_b);
        pbx.register(a.clone(), 4).unwrap();
        pbx.register(b.clone(), 5).unwrap();
        read_line(&mut ra);
        read_line(&mut rb);

        a.pickup();
        read_line(&mut ra);
        pbx.dial(&a, 5).unwrap();
        read_line(&mut ra);
        read_line(&mut rb);
        b.pickup();
        read_line(&mut rb);
        read_line(&mut ra);

        pbx.unregister(&a).unwrap();
        assert_eq!(read_line(&mut rb), "DIAL TONE");
        assert_eq!(pbx.active_tus(), 1);

        assert_eq!(pbx.unregister(&a), Err(PbxError::NotRegistered));
    }

    #[test]
    fn dial_unregistered_extension_dials_into_error() {
        let pbx = Pbx::new(16);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (c, s) = connect_and_accept(&listener);
        let mut reader = BufReader::new(c);

        let tu = Tu::new(s);
        pbx.register(tu.clone(), 4).unwrap();
        read_line(&mut reader);

        tu.pickup();
        read_line(&mut reader);
        pbx.dial(&tu, 99).unwrap();
        assert_eq!(read_line(&mut reader), "ERROR");
    }

    #[test]
    fn shutdown_drains_all_registered_tus() {
        let pbx = Arc::new(Pbx::new(16));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        // Each spawned thread plays the adapter's role for one connection:
        // block reading the server-side socket until `shutdown()` forces EOF,
        // then unregister — mirroring the real client-service loop.
        let mut adapters = Vec::new();
        for ext in 0..3u32 {
            let (_client, server) = connect_and_accept(&listener);
            let read_half = server.try_clone().unwrap();
            let tu = Tu::new(server);
            pbx.register(tu.clone(), ext).unwrap();

            let pbx = pbx.clone();
            adapters.push(std::thread::spawn(move || {
                use std::io::Read;
                let mut buf = [0u8; 64];
                let mut read_half = read_half;
                loop {
                    match read_half.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                pbx.unregister(&tu).unwrap();
            }));
        }
        assert_eq!(pbx.active_tus(), 3);

        pbx.shutdown();
        assert_eq!(pbx.active_tus(), 0);
        for a in adapters {
            a.join().unwrap();
        }
    }
}

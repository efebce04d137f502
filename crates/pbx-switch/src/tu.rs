use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use pbx_proto::Notification;

use crate::error::PbxError;

static NEXT_TU_ID: AtomicU64 = AtomicU64::new(1);

/// The seven states a TU can occupy. See the transition table in the design
/// for the full event matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuState {
    OnHook,
    Ringing,
    DialTone,
    RingBack,
    BusySignal,
    Connected,
    Error,
}

struct TuInner {
    ext: Option<u32>,
    state: TuState,
    peer: Option<Arc<Tu>>,
    /// Cached extension of `peer`, kept in lockstep with `peer` so `CONNECTED
    /// <ext>` can be rendered without locking the peer's own mutex.
    peer_ext: Option<u32>,
    socket: TcpStream,
}

/// One telephone unit: the state machine and socket belonging to a single
/// client connection.
///
/// Always held behind an `Arc`; the `Arc`'s strong count *is* the reference
/// count described in the design (registration, peer links, and transient
/// pins are all just clones of the handle). The socket closes itself when the
/// last clone drops, satisfying "closed exactly once" for free.
pub struct Tu {
    /// Stable total order used to decide which of two TUs' mutexes to take
    /// first, so two-party operations never deadlock against each other.
    id: u64,
    fd: RawFd,
    inner: Mutex<TuInner>,
}

/// Locks two distinct TUs in a consistent order (lowest id first) and returns
/// their guards in `(a, b)` order regardless of which was physically locked
/// first. Callers must not pass the same TU twice.
fn lock_two<'a>(a: &'a Tu, b: &'a Tu) -> (MutexGuard<'a, TuInner>, MutexGuard<'a, TuInner>) {
    debug_assert_ne!(a.id, b.id, "lock_two called on the same TU twice");
    if a.id < b.id {
        let ga = a.inner.lock().unwrap();
        let gb = b.inner.lock().unwrap();
        (ga, gb)
    } else {
        let gb = b.inner.lock().unwrap();
        let ga = a.inner.lock().unwrap();
        (ga, gb)
    }
}

impl Tu {
    pub fn new(socket: TcpStream) -> Arc<Tu> {
        let fd = socket.as_raw_fd();
        let id = NEXT_TU_ID.fetch_add(1, Ordering::Relaxed);
        Arc::new(Tu {
            id,
            fd,
            inner: Mutex::new(TuInner {
                ext: None,
                state: TuState::OnHook,
                peer: None,
                peer_ext: None,
                socket,
            }),
        })
    }

    pub fn fileno(&self) -> RawFd {
        self.fd
    }

    pub fn extension(&self) -> Option<u32> {
        self.inner.lock().unwrap().ext
    }

    /// Sets this TU's extension. Succeeds exactly once; a second call fails
    /// with [`PbxError::AlreadySet`] rather than silently overwriting it.
    pub fn set_extension(&self, ext: u32) -> Result<(), PbxError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.ext.is_some() {
            return Err(PbxError::AlreadySet);
        }
        guard.ext = Some(ext);
        Ok(())
    }

    pub fn state(&self) -> TuState {
        self.inner.lock().unwrap().state
    }

    pub fn peer_extension(&self) -> Option<u32> {
        self.inner.lock().unwrap().peer_ext
    }

    /// Shuts down the underlying socket for both reading and writing, causing
    /// the adapter's blocked read to return EOF. Used by `Pbx::shutdown`.
    pub fn shutdown_socket(&self) {
        let guard = self.inner.lock().unwrap();
        if let Err(e) = guard.socket.shutdown(Shutdown::Both) {
            tracing::debug!(tu_id = self.id, error = %e, "socket shutdown (already closed?)");
        }
    }

    fn current_notification(guard: &TuInner) -> Notification {
        match guard.state {
            TuState::OnHook => Notification::OnHook { ext: guard.ext.unwrap_or(0) },
            TuState::Ringing => Notification::Ringing,
            TuState::DialTone => Notification::DialTone,
            TuState::RingBack => Notification::RingBack,
            TuState::BusySignal => Notification::BusySignal,
            TuState::Connected => Notification::Connected { peer_ext: guard.peer_ext.unwrap_or(0) },
            TuState::Error => Notification::Error,
        }
    }

    fn emit(&self, guard: &mut TuInner, notif: Notification) {
        let line = notif.to_line();
        if let Err(e) = guard.socket.write_all(line.as_bytes()) {
            tracing::warn!(tu_id = self.id, ext = ?guard.ext, error = %e, "failed to write notification");
        }
    }

    fn reemit_current(&self, guard: &mut TuInner) {
        let notif = Self::current_notification(guard);
        self.emit(guard, notif);
    }

    /// Emits this TU's current state to its own client. Used by `Pbx::register`
    /// to send the initial `ON HOOK <ext>` greeting once an extension has been
    /// assigned.
    pub(crate) fn emit_current_state(&self) {
        let mut guard = self.inner.lock().unwrap();
        self.reemit_current(&mut guard);
    }

    /// `pickup`: ON_HOOK → DIAL_TONE; RINGING → CONNECTED (and the peer along
    /// with it). Every other state is a no-op that re-emits the current state.
    pub fn pickup(self: &Arc<Tu>) {
        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            TuState::OnHook => {
                guard.state = TuState::DialTone;
                self.reemit_current(&mut guard);
            }
            TuState::Ringing => {
                let peer = guard.peer.clone();
                drop(guard);
                match peer {
                    Some(peer) => {
                        let (mut sg, mut pg) = lock_two(self, &peer);
                        if Self::peer_link_intact(&sg, &pg, self, &peer) && sg.state == TuState::Ringing {
                            sg.state = TuState::Connected;
                            pg.state = TuState::Connected;
                            self.reemit_current(&mut sg);
                            peer.reemit_current(&mut pg);
                        } else {
                            self.reemit_current(&mut sg);
                        }
                    }
                    None => {
                        let mut sg = self.inner.lock().unwrap();
                        self.reemit_current(&mut sg);
                    }
                }
            }
            _ => self.reemit_current(&mut guard),
        }
    }

    /// `hangup`: always ends with self at ON_HOOK. When a peer is linked, the
    /// peer's resulting state depends on what it was: CONNECTED parties land
    /// on DIAL_TONE, ringing/ring-back parties land on ON_HOOK.
    pub fn hangup(self: &Arc<Tu>) {
        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            TuState::OnHook | TuState::DialTone | TuState::BusySignal | TuState::Error => {
                guard.state = TuState::OnHook;
                self.reemit_current(&mut guard);
            }
            TuState::Ringing | TuState::RingBack | TuState::Connected => {
                let peer = guard.peer.clone();
                drop(guard);
                match peer {
                    Some(peer) => {
                        let (mut sg, mut pg) = lock_two(self, &peer);
                        let was_connected = sg.state == TuState::Connected;
                        let linked = Self::peer_link_intact(&sg, &pg, self, &peer);
                        sg.state = TuState::OnHook;
                        sg.peer = None;
                        sg.peer_ext = None;
                        if linked {
                            pg.state = if was_connected { TuState::DialTone } else { TuState::OnHook };
                            pg.peer = None;
                            pg.peer_ext = None;
                            self.reemit_current(&mut sg);
                            peer.reemit_current(&mut pg);
                        } else {
                            self.reemit_current(&mut sg);
                        }
                    }
                    None => {
                        let mut sg = self.inner.lock().unwrap();
                        sg.state = TuState::OnHook;
                        self.reemit_current(&mut sg);
                    }
                }
            }
        }
    }

    /// `dial(target)`: only meaningful from DIAL_TONE. See the dial rules in
    /// the design for the self/unregistered/busy/success branches. `target =
    /// None` stands in for "no TU registered at the requested extension".
    pub fn dial(self: &Arc<Tu>, target: Option<&Arc<Tu>>) {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != TuState::DialTone {
            self.reemit_current(&mut guard);
            return;
        }

        let target = match target {
            None => {
                guard.state = TuState::Error;
                self.reemit_current(&mut guard);
                return;
            }
            Some(target) if Arc::ptr_eq(self, target) => {
                guard.state = TuState::BusySignal;
                self.reemit_current(&mut guard);
                return;
            }
            Some(target) => target.clone(),
        };
        drop(guard);

        let (mut sg, mut tg) = lock_two(self, &target);
        if sg.state != TuState::DialTone {
            self.reemit_current(&mut sg);
            return;
        }
        if tg.state != TuState::OnHook || tg.peer.is_some() {
            sg.state = TuState::BusySignal;
            self.reemit_current(&mut sg);
            return;
        }

        sg.state = TuState::RingBack;
        tg.state = TuState::Ringing;
        sg.peer_ext = tg.ext;
        tg.peer_ext = sg.ext;
        sg.peer = Some(target.clone());
        tg.peer = Some(self.clone());
        self.reemit_current(&mut sg);
        target.reemit_current(&mut tg);
    }

    /// `chat`: delivers `CHAT <text>` to the peer when CONNECTED, and always
    /// re-emits this TU's own current state to the sender.
    pub fn chat(self: &Arc<Tu>, text: &str) {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != TuState::Connected {
            self.reemit_current(&mut guard);
            return;
        }
        let peer = guard.peer.clone();
        drop(guard);

        match peer {
            Some(peer) => {
                let (mut sg, mut pg) = lock_two(self, &peer);
                if Self::peer_link_intact(&sg, &pg, self, &peer) && sg.state == TuState::Connected {
                    peer.emit(&mut pg, Notification::Chat { text: text.to_string() });
                }
                self.reemit_current(&mut sg);
            }
            None => {
                let mut sg = self.inner.lock().unwrap();
                self.reemit_current(&mut sg);
            }
        }
    }

    /// Tears down any in-progress call on behalf of a TU that is being
    /// unregistered (§4.5). Unlike `hangup`, the *surviving* peer does not
    /// necessarily land on ON_HOOK: a ring-back caller whose callee vanished
    /// gets its dial tone back rather than being hung up, since it never
    /// completed a call to hang up from.
    ///
    /// No notification is sent to `self`: once unregistered, a TU's client
    /// never hears from it again.
    pub(crate) fn teardown_for_unregister(self: &Arc<Tu>) {
        let mut guard = self.inner.lock().unwrap();
        let peer = guard.peer.take();
        guard.peer_ext = None;
        drop(guard);

        let Some(peer) = peer else { return };
        let mut pg = peer.inner.lock().unwrap();
        // `peer` may have already dropped this link concurrently (its own
        // hangup/pickup racing with our unregister); only act if it hasn't.
        if pg.peer.as_ref().is_some_and(|p| Arc::ptr_eq(p, self)) {
            let new_state = match pg.state {
                TuState::Ringing => TuState::OnHook,
                TuState::RingBack => TuState::DialTone,
                TuState::Connected => TuState::DialTone,
                other => other,
            };
            pg.state = new_state;
            pg.peer = None;
            pg.peer_ext = None;
            peer.reemit_current(&mut pg);
        }
    }

    /// Re-validates that `a` and `b` are still each other's peer, guarding
    /// against the window between snapshotting `a`'s peer and acquiring both
    /// locks, during which another thread may have torn the link down.
    fn peer_link_intact(a: &TuInner, b: &TuInner, a_tu: &Arc<Tu>, b_tu: &Arc<Tu>) -> bool {
        a.peer.as_ref().is_some_and(|p| Arc::ptr_eq(p, b_tu)) && b.peer.as_ref().is_some_and(|p| Arc::ptr_eq(p, a_tu))
    }
}

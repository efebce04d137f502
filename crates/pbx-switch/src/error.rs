/// Errors surfaced by the PBX registry and TU layer to the adapter.
///
/// Command-in-wrong-state is deliberately not a variant here: it's a no-op that
/// still re-emits the current state, which the TU layer reports via a
/// successful `()` return, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbxError {
    /// `ext` fell outside `[0, max_extensions)`.
    ExtensionOutOfRange,
    /// The requested extension is already held by another TU.
    ExtensionOccupied,
    /// `unregister` was called for a TU whose registry slot doesn't hold it
    /// (already unregistered, or never registered).
    NotRegistered,
    /// `set_extension` was called on a TU that already has one. Extensions are
    /// set exactly once, at registration time.
    AlreadySet,
}

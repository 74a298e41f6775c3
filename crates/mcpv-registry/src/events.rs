//! Change events published on registration/unregistration/heartbeat,
//! consumed by `mcpv-discovery`'s live watch subscriptions.

/// What happened to a client entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// A new client registered.
    Registered,
    /// An existing client's selectors (tags/explicit server) changed.
    Updated,
    /// A client was removed (explicit unregister, or expired heartbeat).
    Unregistered,
}

/// One registry change, broadcast to every live-watch subscriber so it can
/// decide whether to re-filter its own cached snapshot.
#[derive(Debug, Clone)]
pub struct ClientChangeEvent {
    /// Name of the affected client.
    pub client: String,
    /// What happened.
    pub kind: ChangeKind,
}

use async_trait::async_trait;

/// Result of one presence-detection poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// Pluggable subject detector polled by the integrity monitor.
#[async_trait]
pub trait PresenceDetector: Send + Sync {
    async fn detect(&self) -> Presence;
}

/// Control over the exclusive display mode expected during a session.
#[async_trait]
pub trait DisplayControl: Send + Sync {
    /// Ask the platform to re-enter immersive mode. Returns whether it did.
    async fn request_immersive(&self) -> bool;
}

/// Focus and display-mode changes pushed by the host platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformSignal {
    FocusLost,
    FocusRegained,
    ImmersiveExited,
    ImmersiveEntered,
}

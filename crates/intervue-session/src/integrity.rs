use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use intervue_core::model::{Violation, ViolationKind};
use intervue_core::proctor::{DisplayControl, Presence, PresenceDetector, PlatformSignal};

use crate::event::SessionEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityConfig {
    /// Interval between presence detector polls.
    pub poll_interval: Duration,
    /// Wait before asking the platform to re-enter immersive mode.
    pub reentry_delay: Duration,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reentry_delay: Duration::from_millis(500),
        }
    }
}

/// Watches presence, focus and display mode while a session is in progress.
///
/// Every detected violation is sent to the session queue. Recording and
/// ordering are the controller's job; the monitor never drops or merges
/// consecutive violations of the same kind.
pub struct IntegrityMonitor {
    detector: Arc<dyn PresenceDetector>,
    display: Arc<dyn DisplayControl>,
    config: IntegrityConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    signal_tx: mpsc::UnboundedSender<PlatformSignal>,
    signal_rx: Option<mpsc::UnboundedReceiver<PlatformSignal>>,
    cancel: Option<CancellationToken>,
}

impl IntegrityMonitor {
    pub fn new(
        detector: Arc<dyn PresenceDetector>,
        display: Arc<dyn DisplayControl>,
        config: IntegrityConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            detector,
            display,
            config,
            events,
            signal_tx,
            signal_rx: Some(signal_rx),
            cancel: None,
        }
    }

    /// Where the host platform reports focus and display-mode changes.
    pub fn signal_sender(&self) -> mpsc::UnboundedSender<PlatformSignal> {
        self.signal_tx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Start polling and listening. A monitor starts at most once.
    pub fn start(&mut self) {
        if self.cancel.is_some() {
            return;
        }
        let Some(signals) = self.signal_rx.take() else {
            debug!("integrity monitor already used");
            return;
        };
        let cancel = CancellationToken::new();

        tokio::spawn(poll_presence(
            Arc::clone(&self.detector),
            self.config.poll_interval,
            self.events.clone(),
            cancel.clone(),
        ));
        tokio::spawn(watch_signals(
            signals,
            Arc::clone(&self.display),
            self.config.reentry_delay,
            self.events.clone(),
            cancel.clone(),
        ));

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "integrity monitor started"
        );
        self.cancel = Some(cancel);
    }

    /// Stop both watchers and any pending re-entry request.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
            info!("integrity monitor stopped");
        }
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<SessionEvent>, violation: Violation) -> bool {
    info!(kind = violation.kind.as_str(), message = %violation.message, "integrity violation");
    events.send(SessionEvent::Violation(violation)).is_ok()
}

async fn poll_presence(
    detector: Arc<dyn PresenceDetector>,
    interval: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    if interval.is_zero() {
        warn!("presence polling disabled, poll interval is zero");
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let presence = tokio::select! {
            _ = cancel.cancelled() => return,
            p = detector.detect() => p,
        };
        if presence == Presence::Absent && !emit(&events, Violation::new(ViolationKind::PresenceLost)) {
            return;
        }
    }
}

async fn watch_signals(
    mut signals: mpsc::UnboundedReceiver<PlatformSignal>,
    display: Arc<dyn DisplayControl>,
    reentry_delay: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = cancel.cancelled() => return,
            s = signals.recv() => match s {
                Some(s) => s,
                None => return,
            },
        };

        let delivered = match signal {
            PlatformSignal::FocusLost => emit(&events, Violation::new(ViolationKind::FocusLost)),
            PlatformSignal::ImmersiveExited => {
                let delivered = emit(&events, Violation::new(ViolationKind::ImmersiveModeExited));
                let display = Arc::clone(&display);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(reentry_delay) => {
                            if !display.request_immersive().await {
                                warn!("immersive mode re-entry refused");
                            }
                        }
                    }
                });
                delivered
            }
            PlatformSignal::FocusRegained | PlatformSignal::ImmersiveEntered => {
                debug!(?signal, "platform signal");
                true
            }
        };
        if !delivered {
            return;
        }
    }
}

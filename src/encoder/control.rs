//! # Session Control
//!
//! Segnali di controllo per la sessione di encoding in corso, separati
//! dalla loro sorgente (tastiera, segnali Unix, test).
//!
//! ## Segnali:
//! - `Cancel`: uccide ffmpeg, stato SUSPEND, il batch si ferma
//! - `TogglePause`: sospende/riprende il processo senza cambiarne lo stato
//!
//! ## Sorgenti:
//! - `CtrlCSource`: Ctrl-C
//! - `PauseSignalSource`: SIGUSR1 (solo Unix)

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Cancel,
    TogglePause,
}

/// Something that produces control signals in the background
pub trait ControlSource: Send + 'static {
    fn name(&self) -> &'static str;

    fn spawn(self: Box<Self>, tx: mpsc::UnboundedSender<ControlSignal>) -> JoinHandle<()>;
}

/// Ctrl-C requests cancellation
pub struct CtrlCSource;

impl ControlSource for CtrlCSource {
    fn name(&self) -> &'static str {
        "ctrl-c"
    }

    fn spawn(self: Box<Self>, tx: mpsc::UnboundedSender<ControlSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
                warn!("Interrupt received, cancelling current encode");
                if tx.send(ControlSignal::Cancel).is_err() {
                    return;
                }
            }
        })
    }
}

/// SIGUSR1 toggles pause of the running encoder
#[cfg(unix)]
pub struct PauseSignalSource;

#[cfg(unix)]
impl ControlSource for PauseSignalSource {
    fn name(&self) -> &'static str {
        "sigusr1"
    }

    fn spawn(self: Box<Self>, tx: mpsc::UnboundedSender<ControlSignal>) -> JoinHandle<()> {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            let mut stream = match signal(SignalKind::user_defined1()) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Cannot listen for SIGUSR1: {}", e);
                    return;
                }
            };
            while stream.recv().await.is_some() {
                if tx.send(ControlSignal::TogglePause).is_err() {
                    return;
                }
            }
        })
    }
}

/// Merges every source into the one channel a session listens on
pub struct ControlHub {
    tx: mpsc::UnboundedSender<ControlSignal>,
    rx: mpsc::UnboundedReceiver<ControlSignal>,
    tasks: Vec<JoinHandle<()>>,
    cancelled: bool,
}

impl ControlHub {
    /// Hub with no sources attached
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            tasks: Vec::new(),
            cancelled: false,
        }
    }

    /// Ctrl-C, plus SIGUSR1 on Unix
    pub fn with_default_sources() -> Self {
        let hub = Self::new().with_source(Box::new(CtrlCSource));
        #[cfg(unix)]
        let hub = hub.with_source(Box::new(PauseSignalSource));
        hub
    }

    pub fn with_source(mut self, source: Box<dyn ControlSource>) -> Self {
        debug!("Control source attached: {}", source.name());
        self.tasks.push(source.spawn(self.tx.clone()));
        self
    }

    /// Handle for injecting signals programmatically
    pub fn sender(&self) -> mpsc::UnboundedSender<ControlSignal> {
        self.tx.clone()
    }

    /// Next signal; pending forever when none arrives
    pub async fn recv(&mut self) -> ControlSignal {
        match self.rx.recv().await {
            Some(signal) => {
                if signal == ControlSignal::Cancel {
                    self.cancelled = true;
                }
                signal
            }
            // unreachable while the hub holds its own sender
            None => std::future::pending().await,
        }
    }

    /// Drain queued signals; true once a cancel was ever seen
    pub fn is_cancelled(&mut self) -> bool {
        while let Ok(signal) = self.rx.try_recv() {
            if signal == ControlSignal::Cancel {
                self.cancelled = true;
            }
        }
        self.cancelled
    }
}

impl Default for ControlHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ControlHub {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Scripted(Vec<ControlSignal>);

    impl ControlSource for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn spawn(self: Box<Self>, tx: mpsc::UnboundedSender<ControlSignal>) -> JoinHandle<()> {
            tokio::spawn(async move {
                for signal in self.0 {
                    let _ = tx.send(signal);
                }
            })
        }
    }

    #[tokio::test]
    async fn test_source_signals_reach_hub() {
        let mut hub = ControlHub::new().with_source(Box::new(Scripted(vec![
            ControlSignal::TogglePause,
            ControlSignal::Cancel,
        ])));

        let first = tokio::time::timeout(Duration::from_secs(1), hub.recv()).await.unwrap();
        assert_eq!(first, ControlSignal::TogglePause);
        let second = tokio::time::timeout(Duration::from_secs(1), hub.recv()).await.unwrap();
        assert_eq!(second, ControlSignal::Cancel);
        assert!(hub.is_cancelled());
    }

    #[tokio::test]
    async fn test_pending_cancel_detected_without_recv() {
        let mut hub = ControlHub::new();
        assert!(!hub.is_cancelled());
        hub.sender().send(ControlSignal::TogglePause).unwrap();
        assert!(!hub.is_cancelled());
        hub.sender().send(ControlSignal::Cancel).unwrap();
        assert!(hub.is_cancelled());
    }

    #[tokio::test]
    async fn test_recv_waits_without_signals() {
        let mut hub = ControlHub::new();
        let waited = tokio::time::timeout(Duration::from_millis(20), hub.recv()).await;
        assert!(waited.is_err());
    }
}

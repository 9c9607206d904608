//! # Progress Stream Parser
//!
//! Unisce stdout (`-progress pipe:1`, righe `key=value`) e stderr
//! (diagnostica leggibile) di ffmpeg in un unico flusso di eventi.
//!
//! ## Funzionamento:
//! - Un task reader per stream: legge riga per riga, etichetta l'origine e
//!   invia su una coda condivisa; alla chiusura (EOF o errore) invia un sentinel
//! - Un task consumer: legge dalla coda finché non ha visto un sentinel per
//!   ogni reader, poi emette `ProgressEvent::End` una sola volta
//!
//! L'ordine è garantito per singolo stream, non tra i due stream.

use crate::utils::decode_output;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// What a reader task pushes onto the shared queue
#[derive(Debug)]
enum RawLine {
    Line(StreamKind, String),
    Closed(StreamKind),
}

/// Decoded event handed to the session monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// One line of human readable diagnostics (stderr)
    Diagnostic(String),
    /// One `key=value` line of the progress channel (stdout)
    Field { key: String, value: String },
    /// Every stream is closed; nothing follows
    End,
}

impl ProgressEvent {
    fn from_line(kind: StreamKind, line: String) -> Option<Self> {
        match kind {
            StreamKind::Stderr => Some(Self::Diagnostic(line)),
            StreamKind::Stdout => {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                match line.split_once('=') {
                    Some((key, value)) => Some(Self::Field {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    }),
                    None => Some(Self::Diagnostic(line.to_string())),
                }
            }
        }
    }
}

fn spawn_reader<R>(kind: StreamKind, reader: R, tx: mpsc::UnboundedSender<RawLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_output(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(RawLine::Line(kind, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    trace!("{:?} reader stopped: {}", kind, e);
                    break;
                }
            }
        }
        let _ = tx.send(RawLine::Closed(kind));
    })
}

fn spawn_consumer(
    mut rx: mpsc::UnboundedReceiver<RawLine>,
    readers: usize,
    events: mpsc::UnboundedSender<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut closed = 0;
        while closed < readers {
            match rx.recv().await {
                Some(RawLine::Line(kind, line)) => {
                    if let Some(event) = ProgressEvent::from_line(kind, line) {
                        if events.send(event).is_err() {
                            // Monitor gone, keep draining so readers never block
                            continue;
                        }
                    }
                }
                Some(RawLine::Closed(kind)) => {
                    trace!("{:?} closed", kind);
                    closed += 1;
                }
                None => break,
            }
        }
        let _ = events.send(ProgressEvent::End);
    })
}

/// Reader and consumer tasks attached to one encoder process
pub struct ProgressStream {
    tasks: Vec<JoinHandle<()>>,
}

impl ProgressStream {
    /// Start draining the given pipes; missing pipes count as already closed
    pub fn attach<O, E>(
        stdout: Option<O>,
        stderr: Option<E>,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>)
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut tasks = Vec::with_capacity(3);
        if let Some(stdout) = stdout {
            tasks.push(spawn_reader(StreamKind::Stdout, stdout, raw_tx.clone()));
        }
        if let Some(stderr) = stderr {
            tasks.push(spawn_reader(StreamKind::Stderr, stderr, raw_tx.clone()));
        }
        let readers = tasks.len();
        drop(raw_tx);
        tasks.push(spawn_consumer(raw_rx, readers, event_tx));

        (Self { tasks }, event_rx)
    }

    /// Wait for every task to finish
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                trace!("progress task ended abnormally: {}", e);
            }
        }
    }

    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

//! Per-session command queue for async callers.
//!
//! ```text
//!  SessionTask ──► mpsc<SessionCommand> ──► [blocking worker owning Session]
//!       ▲                                              │
//!       └──────────────── oneshot result ◄─────────────┘
//! ```
//!
//! Commands are handled strictly in arrival order, which gives a session the
//! single logical caller it requires even when several tasks hold clones.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{
    engine::{MuxEngine, OutputContext},
    error::{MuxError, Result},
    packet::SampleFlags,
    session::Session,
    track::{AudioParams, CodecParams, MediaKind, VideoParams},
};

pub enum SessionCommand {
    AddTrack {
        params: CodecParams,
        result: oneshot::Sender<Result<usize>>,
    },
    WriteSample {
        kind: MediaKind,
        data: Bytes,
        timestamp_us: i64,
        flags: SampleFlags,
        result: oneshot::Sender<Result<()>>,
    },
    Close {
        result: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct SessionTask {
    id: String,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionTask {
    /// Opens a session on a dedicated blocking worker. Returns once the open
    /// has succeeded or failed.
    pub async fn open<E>(engine: E, destination: &str, format: &str) -> Result<Self>
    where
        E: MuxEngine + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1024);
        let (open_tx, open_rx) = oneshot::channel();
        let id = destination.to_string();
        let destination = destination.to_string();
        let format = format.to_string();

        tokio::task::spawn_blocking(move || {
            let session = match Session::open(&engine, &destination, &format) {
                Ok(session) => {
                    let _ = open_tx.send(Ok(()));
                    session
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };
            Self::inner_loop(session, rx);
            log::debug!("session worker finished: {}", destination);
        });

        open_rx.await.map_err(|_| MuxError::SessionClosed)??;
        Ok(Self { id, tx })
    }

    fn inner_loop<C: OutputContext>(mut session: Session<C>, mut rx: mpsc::Receiver<SessionCommand>) {
        while let Some(cmd) = rx.blocking_recv() {
            match cmd {
                SessionCommand::AddTrack { params, result } => {
                    let ret = match params {
                        CodecParams::Video(video) => session.add_video_track(video),
                        CodecParams::Audio(audio) => session.add_audio_track(audio),
                    };
                    let _ = result.send(ret);
                }
                SessionCommand::WriteSample {
                    kind,
                    data,
                    timestamp_us,
                    flags,
                    result,
                } => {
                    let ret = session.write_sample(kind, &data, timestamp_us, flags);
                    let _ = result.send(ret);
                }
                SessionCommand::Close { result } => {
                    session.close();
                    let _ = result.send(());
                    break;
                }
            }
        }
        // every handle dropped without Close: dropping the session closes it
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn add_video_track(&self, params: VideoParams) -> Result<usize> {
        self.request(|result| SessionCommand::AddTrack {
            params: CodecParams::Video(params),
            result,
        })
        .await
    }

    pub async fn add_audio_track(&self, params: AudioParams) -> Result<usize> {
        self.request(|result| SessionCommand::AddTrack {
            params: CodecParams::Audio(params),
            result,
        })
        .await
    }

    pub async fn write_sample(
        &self,
        kind: MediaKind,
        data: Bytes,
        timestamp_us: i64,
        flags: SampleFlags,
    ) -> Result<()> {
        self.request(|result| SessionCommand::WriteSample {
            kind,
            data,
            timestamp_us,
            flags,
            result,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .await
            .map_err(|_| MuxError::SessionClosed)?;
        rx.await.map_err(|_| MuxError::SessionClosed)?
    }

    /// Closes the session and waits for the trailer to be written. Later
    /// requests from any clone fail with `SessionClosed`.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Close { result: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::{broadcast, mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

use crate::{
    channel::{ChannelError, MessageChannel, SendMode, Terminal},
    codec::{self, Frame},
    dispatcher::{Dispatcher, DispatcherConfig, FrameSink},
    request::{Envelope, Request},
    types::Result,
    WireError,
};

#[derive(Debug, Clone)]
pub struct V8ConnectionConfig {
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
    pub event_channel_size: usize,
}

impl Default for V8ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
            event_channel_size: 64,
        }
    }
}

struct QueueSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl FrameSink for QueueSink {
    fn send_frame(&self, frame: Vec<u8>) -> std::result::Result<(), ChannelError> {
        self.tx
            .send(frame)
            .map_err(|_| ChannelError::ConnectionClosed)
    }
}

/// A live connection to a V8 debugger agent.
///
/// The reader task feeds responses into the [`Dispatcher`] and broadcasts VM
/// events; the writer task drains outgoing frames. Either task ending shuts
/// the whole connection down and fails all pending requests.
pub struct V8Connection {
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<Envelope>,
    shutdown: CancellationToken,
    greeting: Frame,
}

impl V8Connection {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, V8ConnectionConfig::default()).await
    }

    pub async fn connect_with_config(addr: SocketAddr, config: V8ConnectionConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| WireError::Timeout)??;
        let _ = stream.set_nodelay(true);

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let greeting = tokio::time::timeout(config.connect_timeout, codec::read_frame(&mut reader))
            .await
            .map_err(|_| WireError::Timeout)??
            .ok_or(WireError::ConnectionClosed)?;
        if !greeting.is_greeting() {
            return Err(WireError::Protocol(
                "expected a header-only connect greeting from the VM".to_string(),
            ));
        }
        tracing::info!(
            target: "jsmirror.wire",
            %addr,
            v8_version = greeting.header("V8-Version").unwrap_or("unknown"),
            host = greeting.header("Embedding-Host").unwrap_or("unknown"),
            "connected to V8 debugger"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let dispatcher = Arc::new(Dispatcher::new(
            Box::new(QueueSink { tx }),
            DispatcherConfig {
                reply_timeout: config.reply_timeout,
            },
        ));
        let (events, _) = broadcast::channel(config.event_channel_size);
        let shutdown = CancellationToken::new();

        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        frame = rx.recv() => frame,
                    };
                    let Some(frame) = frame else { break };
                    let written = async {
                        writer.write_all(&frame).await?;
                        writer.flush().await
                    }
                    .await;
                    if let Err(err) = written {
                        tracing::warn!(target: "jsmirror.wire", error = %err, "write failed");
                        break;
                    }
                }
                shutdown.cancel();
            });
        }

        tokio::spawn(read_loop(
            reader,
            dispatcher.clone(),
            events.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            dispatcher,
            events,
            shutdown,
            greeting,
        })
    }

    /// The request correlator, usable as a [`MessageChannel`].
    ///
    /// [`SendMode::Sync`] blocks the calling thread; never use it from a tokio
    /// worker thread.
    pub fn channel(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    pub fn greeting_header(&self, name: &str) -> Option<&str> {
        self.greeting.header(name)
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.dispatcher.close();
    }

    /// A token cancelled when the connection closes, either explicitly via
    /// [`V8Connection::shutdown`] or because the VM went away.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sends `request` and awaits its response without blocking a thread.
    pub async fn request(&self, request: Request) -> Result<Envelope> {
        let (tx, rx) = oneshot::channel();
        let terminal = Terminal::new(move |result| {
            let _ = tx.send(result);
        });
        // A synchronous dispatch error has already completed the terminal.
        let _ = self.dispatcher.send(request, SendMode::Async, terminal);

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(WireError::Cancelled),
            result = rx => result.map_err(|_| WireError::ConnectionClosed)?,
        };
        result.map_err(|err| match err {
            ChannelError::Timeout => WireError::Timeout,
            ChannelError::ConnectionClosed | ChannelError::Dropped => WireError::ConnectionClosed,
            ChannelError::Dispatch(message) => WireError::Protocol(message),
        })
    }
}

impl Drop for V8Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn read_loop(
    mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<Envelope>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = codec::read_frame(&mut reader) => frame,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(target: "jsmirror.wire", "VM closed the connection");
                break;
            }
            Err(err) => {
                tracing::warn!(target: "jsmirror.wire", error = %err, "failed to read frame");
                break;
            }
        };
        if frame.is_greeting() {
            continue;
        }

        let envelope = match codec::decode_envelope(&frame.body) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(target: "jsmirror.wire", error = %err, "dropping undecodable message");
                continue;
            }
        };
        if let Some(event) = dispatcher.handle_message(envelope) {
            // No subscribers is fine: nobody is listening for VM events yet.
            let _ = events.send(event);
        }
    }

    shutdown.cancel();
    dispatcher.close();
}

//! SockJS session link.
//!
//! Opens a SockJS session over WebSocket, or over XHR polling when the
//! server disables WebSockets or the upgrade fails. Both carry the same
//! frames, so the broker session only sees [`LinkEvent`]s and a
//! [`LinkSender`].
//!
//! # Transport Selection
//!
//! 1. If enabled, `GET {base}/info`; an unreachable probe is not fatal.
//! 2. WebSocket at `{base}/{server}/{session}/websocket`.
//! 3. XHR polling at `{base}/{server}/{session}/xhr` with a new session.

// ============================================================================
// Imports
// ============================================================================

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::CONTENT_TYPE;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::BrokerOptions;
use crate::error::{Error, Result};
use crate::protocol::SockJsFrame;
use crate::protocol::sockjs::{SessionPath, SockJsInfo, encode_messages, info_url};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which SockJS transport the session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkMode {
    WebSocket,
    XhrPolling,
}

/// Inbound side of the link.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// A well-formed SockJS frame.
    Frame(SockJsFrame),
    /// A frame that did not parse; the session continues.
    Malformed(Error),
    /// The underlying transport failed.
    Failed(Error),
    /// The underlying transport ended without a SockJS close frame.
    Ended(String),
}

// ============================================================================
// SockJsLink
// ============================================================================

/// An open SockJS session.
pub(crate) struct SockJsLink {
    pub(crate) mode: LinkMode,
    pub(crate) inbound: mpsc::UnboundedReceiver<LinkEvent>,
    pub(crate) outbound: LinkSender,
    pub(crate) reader: ReaderGuard,
}

impl SockJsLink {
    /// Opens a session against the SockJS base URL.
    ///
    /// # Errors
    ///
    /// - [`Error::WebSocket`] if the upgrade fails and XHR fallback is off
    /// - [`Error::Connection`] if neither transport is allowed
    pub(crate) async fn open(
        base: &Url,
        options: &BrokerOptions,
        client: &reqwest::Client,
    ) -> Result<Self> {
        let info = if options.probe_info {
            probe_info(base, client).await
        } else {
            None
        };
        let server_websocket = info.as_ref().is_none_or(|info| info.websocket);

        if options.websocket && server_websocket {
            let path = SessionPath::generate();
            let url = path.websocket_url(base)?;
            debug!(url = %url, "Opening SockJS WebSocket session");

            match connect_async(url.as_str()).await {
                Ok((stream, _)) => return Ok(Self::websocket(stream)),
                Err(e) if options.xhr_fallback => {
                    warn!(error = %e, "WebSocket upgrade failed, falling back to XHR polling");
                }
                Err(e) => return Err(e.into()),
            }
        } else if options.websocket {
            debug!("Server disabled WebSocket sessions");
        }

        if !options.xhr_fallback {
            return Err(Error::connection("no usable SockJS transport"));
        }

        let path = SessionPath::generate();
        debug!(session = path.session(), "Opening SockJS XHR session");
        Ok(Self::xhr(
            client.clone(),
            path.xhr_url(base)?,
            path.xhr_send_url(base)?,
        ))
    }

    fn websocket(stream: WsStream) -> Self {
        let (ws_write, mut ws_read) = stream.split();
        let (tx, inbound) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            loop {
                let event = match ws_read.next().await {
                    Some(Ok(Message::Text(text))) => match SockJsFrame::decode(text.as_str()) {
                        Ok(frame) => LinkEvent::Frame(frame),
                        Err(e) => LinkEvent::Malformed(e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "WebSocket closed by remote".to_string());
                        let _ = tx.send(LinkEvent::Ended(reason));
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(LinkEvent::Failed(e.into()));
                        break;
                    }
                    None => {
                        let _ = tx.send(LinkEvent::Ended("WebSocket stream ended".into()));
                        break;
                    }
                    // Ignore Binary, Ping, Pong
                    Some(Ok(_)) => continue,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            trace!("SockJS WebSocket reader terminated");
        });

        Self {
            mode: LinkMode::WebSocket,
            inbound,
            outbound: LinkSender::WebSocket(ws_write),
            reader: ReaderGuard(reader),
        }
    }

    fn xhr(client: reqwest::Client, receive_url: Url, send_url: Url) -> Self {
        let (tx, inbound) = mpsc::unbounded_channel();
        let poll_client = client.clone();

        let reader = tokio::spawn(async move {
            loop {
                let body = match poll(&poll_client, &receive_url).await {
                    Ok(body) => body,
                    Err(e) => {
                        let _ = tx.send(LinkEvent::Failed(e));
                        break;
                    }
                };

                let mut closed = false;
                for result in SockJsFrame::decode_lines(&body) {
                    let event = match result {
                        Ok(frame) => {
                            closed |= matches!(frame, SockJsFrame::Close { .. });
                            LinkEvent::Frame(frame)
                        }
                        Err(e) => LinkEvent::Malformed(e),
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                if closed {
                    break;
                }
            }
            trace!("SockJS XHR poller terminated");
        });

        Self {
            mode: LinkMode::XhrPolling,
            inbound,
            outbound: LinkSender::Xhr { client, send_url },
            reader: ReaderGuard(reader),
        }
    }
}

// ============================================================================
// LinkSender
// ============================================================================

/// Outbound side of the link.
pub(crate) enum LinkSender {
    WebSocket(SplitSink<WsStream, Message>),
    Xhr {
        client: reqwest::Client,
        send_url: Url,
    },
}

impl LinkSender {
    /// Sends messages as one SockJS frame.
    pub(crate) async fn send(&mut self, messages: &[String]) -> Result<()> {
        let payload = encode_messages(messages)?;
        match self {
            Self::WebSocket(sink) => {
                sink.send(Message::Text(payload.into())).await?;
            }
            Self::Xhr { client, send_url } => {
                let response = client
                    .post(send_url.clone())
                    .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
                    .body(payload)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::http(status.as_u16(), "SockJS send rejected"));
                }
            }
        }
        Ok(())
    }

    /// Closes the outbound side. Errors are ignored.
    pub(crate) async fn close(&mut self) {
        if let Self::WebSocket(sink) = self {
            let _ = sink.close().await;
        }
    }
}

// ============================================================================
// ReaderGuard
// ============================================================================

/// Aborts the reader task when dropped.
pub(crate) struct ReaderGuard(JoinHandle<()>);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ============================================================================
// HTTP helpers
// ============================================================================

async fn probe_info(base: &Url, client: &reqwest::Client) -> Option<SockJsInfo> {
    let url = info_url(base).ok()?;
    let result = async {
        let response = client.get(url).send().await?.error_for_status()?;
        response.json::<SockJsInfo>().await
    }
    .await;

    match result {
        Ok(info) => {
            debug!(websocket = info.websocket, "SockJS info received");
            Some(info)
        }
        Err(e) => {
            debug!(error = %e, "SockJS info probe failed, assuming defaults");
            None
        }
    }
}

async fn poll(client: &reqwest::Client, url: &Url) -> Result<String> {
    let response = client.post(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::http(status.as_u16(), "SockJS poll rejected"));
    }
    Ok(response.text().await?)
}

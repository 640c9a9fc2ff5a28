use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, error, info, warn};
use tokio::{net::TcpStream, time::Instant};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::HeaderValue,
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;

use super::{
    stomp::{Heartbeat, Inbound, StompCommand, StompDecoder, StompFrame},
    ConnectOptions, Transport, TransportEvent,
};
use crate::domain::{
    error::TransportError,
    events::{ConnectionId, SubscriptionId},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum LinkCommand {
    Subscribe { id: String, destination: String },
    Send { destination: String, body: String },
    Disconnect,
}

struct Link {
    connection: ConnectionId,
    commands: UnboundedSender<LinkCommand>,
}

/// STOMP over WebSocket. Each connection attempt runs in its own tokio task.
pub struct WsTransport {
    events: UnboundedSender<TransportEvent>,
    link: Option<Link>,
    attempts: u64,
}

impl WsTransport {
    pub fn new(events: UnboundedSender<TransportEvent>) -> Self {
        WsTransport {
            events,
            link: None,
            attempts: 0,
        }
    }

    fn send(&self, command: LinkCommand) -> Result<(), TransportError> {
        let Some(link) = &self.link else {
            return Err(TransportError::NotConnected);
        };
        link.commands
            .unbounded_send(command)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, url: &str, options: &ConnectOptions) -> ConnectionId {
        // dropping the old sender stops the old task
        self.link = None;
        self.attempts += 1;
        let connection = ConnectionId(self.attempts);
        let (commands, command_source) = unbounded();

        tokio::spawn(run_link(
            connection,
            url.to_string(),
            options.clone(),
            command_source,
            self.events.clone(),
        ));

        self.link = Some(Link {
            connection,
            commands,
        });
        connection
    }

    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, TransportError> {
        let id = format!("sub-{}", Uuid::new_v4());
        self.send(LinkCommand::Subscribe {
            id: id.clone(),
            destination: destination.into(),
        })?;
        Ok(SubscriptionId(id))
    }

    fn publish(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        self.send(LinkCommand::Send {
            destination: destination.into(),
            body: body.into(),
        })
    }

    fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            debug!("Releasing link {}", link.connection);
            let _ = link.commands.unbounded_send(LinkCommand::Disconnect);
        }
    }
}

fn emit(events: &UnboundedSender<TransportEvent>, event: TransportEvent) {
    if let Err(e) = events.unbounded_send(event) {
        debug!("Engine went away before transport event was delivered: {e}");
    }
}

async fn run_link(
    connection: ConnectionId,
    url: String,
    options: ConnectOptions,
    commands: UnboundedReceiver<LinkCommand>,
    events: UnboundedSender<TransportEvent>,
) {
    let (socket, heartbeat, decoder) =
        match tokio::time::timeout(options.connect_timeout, handshake(&url, &options)).await {
            Ok(Ok(established)) => established,
            Ok(Err(e)) => {
                error!("Connection attempt {connection} to {url} failed: {e}");
                emit(
                    &events,
                    TransportEvent::ConnectFailed {
                        connection,
                        reason: e.to_string(),
                    },
                );
                return;
            }
            Err(_) => {
                error!("Connection attempt {connection} to {url} timed out");
                emit(
                    &events,
                    TransportEvent::ConnectFailed {
                        connection,
                        reason: "handshake timed out".into(),
                    },
                );
                return;
            }
        };

    info!("Connected to {url} as {connection} ({heartbeat:?})");
    emit(&events, TransportEvent::Connected { connection });

    let (sink, source) = socket.split();
    let pump = Pump {
        connection,
        sink,
        source,
        decoder,
        heartbeat,
        commands,
        events: events.clone(),
    };

    if let Some(reason) = pump.run().await {
        warn!("Lost {connection}: {reason}");
        emit(&events, TransportEvent::ConnectionLost { connection, reason });
    }
}

async fn handshake(
    url: &str,
    options: &ConnectOptions,
) -> Result<(Socket, Heartbeat, StompDecoder), TransportError> {
    let handshake_err = |reason: String| TransportError::Handshake { reason };

    let mut request = url
        .into_client_request()
        .map_err(|e| handshake_err(e.to_string()))?;
    let host = request
        .uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| "localhost".into());
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("v12.stomp"));

    let (mut socket, _) = connect_async(request)
        .await
        .map_err(|e| handshake_err(e.to_string()))?;

    let hb = options.heartbeat();
    socket
        .send(Message::Text(StompFrame::connect(&host, &hb).encode()))
        .await
        .map_err(|e| handshake_err(e.to_string()))?;

    let mut decoder = StompDecoder::new();
    while let Some(msg) = socket.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(handshake_err(e.to_string())),
        };
        for inbound in decoder.push(&text)? {
            let Inbound::Frame(frame) = inbound else {
                continue;
            };
            match frame.command {
                StompCommand::Connected => {
                    let heartbeat = hb.negotiate(frame.get("heart-beat"))?;
                    return Ok((socket, heartbeat, decoder));
                }
                StompCommand::Error => {
                    return Err(handshake_err(broker_error(&frame)));
                }
                other => debug!("Ignoring {other} before CONNECTED"),
            }
        }
    }

    Err(handshake_err("socket closed during handshake".into()))
}

fn broker_error(frame: &StompFrame) -> String {
    match frame.get("message") {
        Some(message) => message.to_string(),
        None => frame.body.clone(),
    }
}

struct Pump {
    connection: ConnectionId,
    sink: SplitSink<Socket, Message>,
    source: SplitStream<Socket>,
    decoder: StompDecoder,
    heartbeat: Heartbeat,
    commands: UnboundedReceiver<LinkCommand>,
    events: UnboundedSender<TransportEvent>,
}

impl Pump {
    /// Runs until the link ends. Returns the reason if it ended unexpectedly.
    async fn run(mut self) -> Option<String> {
        let idle = Duration::from_secs(3600);
        let mut send_tick = tokio::time::interval(self.heartbeat.send_every.unwrap_or(idle));
        let mut watchdog = tokio::time::interval(self.heartbeat.expect_every.unwrap_or(idle));
        let silence_limit = self.heartbeat.silence_limit();
        let mut last_seen = Instant::now();

        'main_loop: loop {
            tokio::select! {
                msg = self.source.next() => {
                    last_seen = Instant::now();
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            break 'main_loop Some("socket closed by broker".into());
                        }
                        Some(Ok(_)) => continue 'main_loop,
                        Some(Err(e)) => {
                            break 'main_loop Some(e.to_string());
                        }
                    };
                    if let Err(reason) = self.on_text(&text) {
                        break 'main_loop Some(reason);
                    }
                }

                command = self.commands.next() => {
                    let frame = match command {
                        Some(LinkCommand::Subscribe { id, destination }) => {
                            StompFrame::subscribe(&id, &destination)
                        }
                        Some(LinkCommand::Send { destination, body }) => {
                            StompFrame::send_json(&destination, &body)
                        }
                        Some(LinkCommand::Disconnect) | None => {
                            self.close().await;
                            break 'main_loop None;
                        }
                    };
                    if let Err(e) = self.sink.send(Message::Text(frame.encode())).await {
                        break 'main_loop Some(e.to_string());
                    }
                }

                _ = send_tick.tick(), if self.heartbeat.send_every.is_some() => {
                    if let Err(e) = self.sink.send(Message::Text("\n".into())).await {
                        break 'main_loop Some(e.to_string());
                    }
                }

                _ = watchdog.tick(), if silence_limit.is_some() => {
                    if let Some(limit) = silence_limit {
                        if last_seen.elapsed() > limit {
                            break 'main_loop Some(format!("no heart-beat for {limit:?}"));
                        }
                    }
                }
            }
        }
    }

    fn on_text(&mut self, text: &str) -> Result<(), String> {
        let inbound = self.decoder.push(text).map_err(|e| e.to_string())?;
        for item in inbound {
            let Inbound::Frame(frame) = item else {
                continue;
            };
            match frame.command {
                StompCommand::Message => {
                    let subscription = frame.get("subscription").unwrap_or_default();
                    let destination = frame.get("destination").unwrap_or_default();
                    emit(
                        &self.events,
                        TransportEvent::Frame {
                            connection: self.connection,
                            subscription: SubscriptionId(subscription.to_string()),
                            destination: destination.to_string(),
                            body: frame.body.clone(),
                        },
                    );
                }
                StompCommand::Error => return Err(format!("broker error: {}", broker_error(&frame))),
                other => debug!("Ignoring {other} frame on {}", self.connection),
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        let receipt = format!("bye-{}", Uuid::new_v4());
        let disconnect = StompFrame::disconnect(&receipt).encode();
        if let Err(e) = self.sink.send(Message::Text(disconnect)).await {
            debug!("DISCONNECT not delivered on {}: {e}", self.connection);
        }
        if let Err(e) = self.sink.close().await {
            debug!("Socket close failed on {}: {e}", self.connection);
        }
        info!("Closed {}", self.connection);
    }
}

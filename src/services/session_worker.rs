use anyhow::{anyhow, Result};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use tokio::{
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};

use super::{
    config::ClientConfig,
    engine::{ChatEngine, EngineAction, EngineState},
};
use crate::{
    domain::{commands::Command, error::TransportError, events::TransportEvent},
    transport::{websocket::WsTransport, Transport},
};

/// What the worker reports back to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    State(EngineState),
    Notice(String),
    Ended,
}

/// Drives a [`ChatEngine`] from commands, transport events and the
/// reconnect timer.
pub struct SessionWorker<T: Transport> {
    engine: ChatEngine<T>,
    commands: UnboundedReceiver<Command>,
    transport_events: UnboundedReceiver<TransportEvent>,
    updates: UnboundedSender<Update>,
    reconnect_at: Option<Instant>,
}

impl<T: Transport> SessionWorker<T> {
    pub fn new(
        engine: ChatEngine<T>,
        commands: UnboundedReceiver<Command>,
        transport_events: UnboundedReceiver<TransportEvent>,
        updates: UnboundedSender<Update>,
    ) -> Self {
        SessionWorker {
            engine,
            commands,
            transport_events,
            updates,
            reconnect_at: None,
        }
    }

    fn publish(&self, update: Update) -> Result<()> {
        self.updates
            .unbounded_send(update)
            .map_err(|_| anyhow!("Presentation layer stopped listening for updates"))
    }

    fn publish_state(&self) -> Result<()> {
        self.publish(Update::State(self.engine.state()))
    }

    fn apply(&mut self, action: Option<EngineAction>) -> Result<()> {
        match action {
            Some(EngineAction::ScheduleReconnect { after }) => {
                log::info!("Reconnecting in {after:?}");
                self.reconnect_at = Some(Instant::now() + after);
                Ok(())
            }
            Some(EngineAction::Failed(e)) => {
                self.reconnect_at = None;
                self.publish(Update::Notice(e.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Returns false once the session is over.
    fn handle_command(&mut self, command: Command) -> Result<bool> {
        let ends = command == Command::Logout;
        if let Err(e) = self.engine.handle_command(command) {
            log::debug!("Command rejected: {e}");
            self.publish(Update::Notice(e.to_string()))?;
        }
        Ok(!ends)
    }

    async fn drive(&mut self) -> Result<()> {
        // Far enough out that the disabled branch never matters.
        let idle = Duration::from_secs(24 * 60 * 60);

        'main_loop: loop {
            let deadline = self.reconnect_at.unwrap_or_else(|| Instant::now() + idle);
            tokio::select! {
                command = self.commands.next() => {
                    let Some(command) = command else {
                        log::info!("Command channel closed, ending session");
                        break 'main_loop;
                    };
                    if !self.handle_command(command)? {
                        break 'main_loop;
                    }
                }

                Some(event) = self.transport_events.next() => {
                    let action = self.engine.handle_transport_event(event);
                    self.apply(action)?;
                }

                () = sleep_until(deadline), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.engine.reconnect_due();
                }
            }
            self.publish_state()?;
        }
        Ok(())
    }

    /// Runs until logout. The engine is always torn down on the way out.
    pub async fn run(mut self) -> Result<()> {
        let outcome = self.drive().await;
        self.engine.logout();
        if self.publish_state().and_then(|_| self.publish(Update::Ended)).is_err() {
            log::debug!("Final updates dropped, nobody is listening");
        }
        outcome
    }
}

/// Front-end side of a running session.
pub struct SessionHandle {
    commands: UnboundedSender<Command>,
    updates: UnboundedReceiver<Update>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn send(&self, command: Command) -> std::result::Result<(), TransportError> {
        self.commands
            .unbounded_send(command)
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub async fn next_update(&mut self) -> Option<Update> {
        self.updates.next().await
    }

    /// Logs out and waits for the worker to finish.
    pub async fn shutdown(self) {
        if let Err(e) = self.send(Command::Logout) {
            log::debug!("Logout not delivered, worker already stopped: {e}");
        }
        drop(self.commands);
        if let Err(e) = self.task.await {
            log::error!("Session worker panicked: {e}");
        }
    }
}

/// Spawns a worker over the WebSocket transport. Must be called inside a
/// tokio runtime.
pub fn spawn_session(config: ClientConfig) -> SessionHandle {
    let (event_sink, event_source) = unbounded();
    let engine = ChatEngine::new(config, WsTransport::new(event_sink));
    spawn_with(engine, event_source)
}

pub fn spawn_with<T: Transport + Send + 'static>(
    engine: ChatEngine<T>,
    transport_events: UnboundedReceiver<TransportEvent>,
) -> SessionHandle {
    let (command_sink, command_source) = unbounded();
    let (update_sink, update_source) = unbounded();
    let worker = SessionWorker::new(engine, command_source, transport_events, update_sink);
    SessionHandle {
        commands: command_sink,
        updates: update_source,
        task: tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                log::warn!("Session worker stopped: {e}");
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::events::{ConnectionId, SubscriptionId},
        services::connection::ConnectionState,
        test_helpers::RecordingTransport,
    };

    async fn next_state(handle: &mut SessionHandle) -> EngineState {
        loop {
            match handle.next_update().await {
                Some(Update::State(state)) => return state,
                Some(_) => continue,
                None => panic!("worker ended early"),
            }
        }
    }

    #[tokio::test]
    async fn drives_engine_from_both_channels() {
        let (events, event_source) = unbounded();
        let engine = ChatEngine::new(ClientConfig::default(), RecordingTransport::default());
        let mut handle = spawn_with(engine, event_source);

        handle.send(Command::Join("alice".into())).unwrap();
        let state = next_state(&mut handle).await;
        assert_eq!(state.connection_state, ConnectionState::Connecting);

        events
            .unbounded_send(TransportEvent::Connected {
                connection: ConnectionId(1),
            })
            .unwrap();
        let state = next_state(&mut handle).await;
        assert!(state.is_connected());

        events
            .unbounded_send(TransportEvent::Frame {
                connection: ConnectionId(1),
                subscription: SubscriptionId("sub-1".into()),
                destination: "/topic/messages".into(),
                body: r#"{"sender":"bob","content":"hi","type":"CHAT"}"#.into(),
            })
            .unwrap();
        let state = next_state(&mut handle).await;
        assert_eq!(state.visible_messages.len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_commands_become_notices() {
        let (_events, event_source) = unbounded();
        let engine = ChatEngine::new(ClientConfig::default(), RecordingTransport::default());
        let mut handle = spawn_with(engine, event_source);

        handle.send(Command::SendRoom("hi".into())).unwrap();
        match handle.next_update().await {
            Some(Update::Notice(text)) => assert!(text.contains("not joined")),
            other => panic!("unexpected update: {other:?}"),
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_after_worker_ended_returns() {
        let (_events, event_source) = unbounded();
        let engine = ChatEngine::new(ClientConfig::default(), RecordingTransport::default());
        let mut handle = spawn_with(engine, event_source);

        handle.send(Command::Logout).unwrap();
        while let Some(update) = handle.next_update().await {
            if update == Update::Ended {
                break;
            }
        }
        assert!(handle.next_update().await.is_none());
        assert!(handle.send(Command::Logout).is_err());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_delay() {
        let (events, event_source) = unbounded();
        let engine = ChatEngine::new(ClientConfig::default(), RecordingTransport::default());
        let mut handle = spawn_with(engine, event_source);

        handle.send(Command::Join("alice".into())).unwrap();
        next_state(&mut handle).await;
        events
            .unbounded_send(TransportEvent::ConnectFailed {
                connection: ConnectionId(1),
                reason: "refused".into(),
            })
            .unwrap();
        let state = next_state(&mut handle).await;
        assert_eq!(state.connection_state, ConnectionState::Reconnecting);

        let state = next_state(&mut handle).await;
        assert_eq!(state.connection_state, ConnectionState::Connecting);

        events
            .unbounded_send(TransportEvent::Connected {
                connection: ConnectionId(2),
            })
            .unwrap();
        assert!(next_state(&mut handle).await.is_connected());
        handle.shutdown().await;
    }
}

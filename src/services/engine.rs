//! Session and message-routing engine.
//!
//! Every input is a discrete reaction on one logical thread: user intents
//! come in through the intent methods, transport callbacks through
//! [`ChatEngine::handle_transport_event`]. The engine never awaits.

use std::{collections::HashMap, time::Duration};

use log::{debug, error, info, warn};

use super::{
    config::ClientConfig,
    connection::{ConnectionManager, ConnectionState, Retry},
    dispatcher::OutboundDispatcher,
};
use crate::{
    domain::{
        chat_log::{ChatEvent, MessageLog},
        commands::Command,
        conversation::{self, ActiveView},
        error::EngineError,
        events::{ConnectionId, SubscriptionId, TransportEvent},
        presence::PresenceTracker,
        session::Session,
        user::User,
        wire::{decode_message, Channel},
    },
    transport::Transport,
};

/// Work the engine needs from whoever drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Call [`ChatEngine::reconnect_due`] once this delay has passed.
    ScheduleReconnect { after: Duration },
    /// The session cannot reach the broker any more.
    Failed(EngineError),
}

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    pub local_user: Option<String>,
    pub connection_state: ConnectionState,
    pub online_users: Vec<String>,
    pub active_view: ActiveView,
    pub visible_messages: Vec<ChatEvent>,
}

impl EngineState {
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Online users minus the local user.
    pub fn peers(&self) -> impl Iterator<Item = &String> {
        self.online_users
            .iter()
            .filter(move |name| Some(name.as_str()) != self.local_user.as_deref())
    }
}

pub struct ChatEngine<T: Transport> {
    config: ClientConfig,
    transport: Option<T>,
    session: Option<Session>,
    connection: ConnectionManager,
    dispatcher: OutboundDispatcher,
    log: MessageLog,
    presence: PresenceTracker,
    subscriptions: HashMap<SubscriptionId, Channel>,
    joins_published: u64,
}

impl<T: Transport> ChatEngine<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let connection =
            ConnectionManager::new(config.max_connect_attempts, config.options.reconnect_delay);
        let dispatcher = OutboundDispatcher::new(config.destinations.clone());
        ChatEngine {
            config,
            transport: Some(transport),
            session: None,
            connection,
            dispatcher,
            log: MessageLog::new(),
            presence: PresenceTracker::new(),
            subscriptions: HashMap::new(),
            joins_published: 0,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn local_user(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user.name.as_str())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn active_view(&self) -> ActiveView {
        self.session
            .as_ref()
            .map(|s| s.active_view.clone())
            .unwrap_or_default()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// How many JOIN messages this engine has published.
    pub fn joins_published(&self) -> u64 {
        self.joins_published
    }

    /// Whether the transport handle has been released.
    pub fn is_released(&self) -> bool {
        self.transport.is_none()
    }

    /// Events of the active view in log order. Empty without a session.
    pub fn visible_messages(&self) -> Vec<&ChatEvent> {
        match &self.session {
            Some(session) => {
                conversation::route(&self.log, &session.active_view, &session.user.name).collect()
            }
            None => vec![],
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            local_user: self.local_user().map(str::to_string),
            connection_state: self.connection.state(),
            online_users: self.presence.current_users().iter().cloned().collect(),
            active_view: self.active_view(),
            visible_messages: self.visible_messages().into_iter().cloned().collect(),
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Join(name) => self.join(&name),
            Command::SelectPeer(peer) => self.select_peer(&peer),
            Command::SelectRoom => self.select_room(),
            Command::SendRoom(text) => self.send_room(&text),
            Command::SendPrivate(text) => self.send_private(&text),
            Command::Logout => {
                self.logout();
                Ok(())
            }
        }
    }

    pub fn join(&mut self, name: &str) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::invalid_intent("already joined"));
        }
        if self.connection.is_closed() {
            return Err(EngineError::invalid_intent("session has ended"));
        }
        let user = User::new(name)?;
        info!("Joining as {user}");
        self.session = Some(Session::new(user));
        self.start_attempt();
        Ok(())
    }

    pub fn select_peer(&mut self, peer: &str) -> Result<(), EngineError> {
        self.session_mut()?.select_peer(peer)
    }

    pub fn select_room(&mut self) -> Result<(), EngineError> {
        self.session_mut()?.select_room();
        Ok(())
    }

    pub fn send_room(&mut self, text: &str) -> Result<(), EngineError> {
        let state = self.connection.state();
        let (Some(session), Some(transport)) = (&self.session, self.transport.as_mut()) else {
            return Err(EngineError::invalid_intent("not joined"));
        };
        self.dispatcher
            .send_room(transport, state, &session.user, text)
            .inspect_err(|e| debug!("Room send rejected: {e}"))
    }

    pub fn send_private(&mut self, text: &str) -> Result<(), EngineError> {
        let state = self.connection.state();
        let (Some(session), Some(transport)) = (&self.session, self.transport.as_mut()) else {
            return Err(EngineError::invalid_intent("not joined"));
        };
        self.dispatcher
            .send_private(transport, state, session, text, &mut self.log)
            .inspect_err(|e| debug!("Private send rejected: {e}"))
    }

    /// Leaves the room and releases the transport. Safe to call repeatedly.
    pub fn logout(&mut self) {
        let Some(previous) = self.connection.begin_teardown() else {
            debug!("Logout after teardown ignored");
            return;
        };

        if previous == ConnectionState::Connected {
            if let (Some(session), Some(transport)) = (&self.session, self.transport.as_mut()) {
                if let Err(e) = self.dispatcher.leave(transport, &session.user) {
                    warn!("Leave not delivered, tearing down anyway: {e}");
                }
            }
        }

        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
        }
        self.subscriptions.clear();
        self.presence.clear();
        self.connection.finish_teardown();
        if let Some(session) = self.session.take() {
            info!("{} logged out", session.user);
        }
    }

    /// Called by the driver once a scheduled reconnect delay has elapsed.
    pub fn reconnect_due(&mut self) {
        if self.connection.state() != ConnectionState::Reconnecting {
            debug!("Reconnect timer fired while {}", self.connection.state());
            return;
        }
        self.start_attempt();
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Option<EngineAction> {
        if self.connection.is_closed() {
            debug!("Dropping transport event after teardown: {event:?}");
            return None;
        }
        if !self.connection.is_current(event.connection()) {
            debug!("Dropping stale event from {}", event.connection());
            return None;
        }

        match event {
            TransportEvent::Connected { connection } => {
                self.on_connected(connection);
                None
            }
            TransportEvent::ConnectFailed { connection, reason } => {
                warn!("Connection attempt {connection} failed: {reason}");
                let retry = self.connection.on_connect_failed(connection)?;
                Some(self.retry_action(retry, reason))
            }
            TransportEvent::ConnectionLost { connection, reason } => {
                warn!("Connection {connection} lost: {reason}");
                let retry = self.connection.on_lost(connection)?;
                self.subscriptions.clear();
                self.presence.clear();
                Some(self.retry_action(retry, reason))
            }
            TransportEvent::Frame {
                subscription,
                destination,
                body,
                ..
            } => {
                if let Err(e) = self.on_frame(&subscription, &destination, &body) {
                    warn!("Dropped frame: {e}");
                }
                None
            }
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session, EngineError> {
        self.session
            .as_mut()
            .ok_or_else(|| EngineError::invalid_intent("not joined"))
    }

    fn start_attempt(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if !self.connection.begin() {
            return;
        }
        let connection = transport.connect(&self.config.broker_url, &self.config.options);
        debug!("Started {connection} to {}", self.config.broker_url);
        self.connection.attach(connection);
    }

    fn retry_action(&mut self, retry: Retry, reason: String) -> EngineAction {
        match retry {
            Retry::After(after) => EngineAction::ScheduleReconnect { after },
            Retry::GiveUp { attempts } => {
                let err = EngineError::Connection {
                    reason: format!("gave up after {attempts} attempts: {reason}"),
                };
                error!("{err}");
                EngineAction::Failed(err)
            }
        }
    }

    fn on_connected(&mut self, connection: ConnectionId) {
        if !self.connection.on_connected(connection) {
            return;
        }
        let (Some(session), Some(transport)) = (&self.session, self.transport.as_mut()) else {
            return;
        };

        self.subscriptions.clear();
        let destinations = self.dispatcher.destinations();
        let wanted = [
            (&destinations.room_topic, Channel::Room),
            (&destinations.presence_topic, Channel::Presence),
            (&destinations.private_queue, Channel::Private),
        ];
        for (destination, channel) in wanted {
            match transport.subscribe(destination) {
                Ok(id) => {
                    debug!("Subscribed to {destination} as {id}");
                    self.subscriptions.insert(id, channel);
                }
                Err(e) => error!("Could not subscribe to {destination}: {e}"),
            }
        }

        match self.dispatcher.join(transport, &session.user) {
            Ok(()) => self.joins_published += 1,
            Err(e) => error!("Join not delivered on {connection}: {e}"),
        }
    }

    fn channel_for(&self, subscription: &SubscriptionId, destination: &str) -> Option<Channel> {
        if let Some(channel) = self.subscriptions.get(subscription) {
            return Some(*channel);
        }
        let destinations = self.dispatcher.destinations();
        if destination == destinations.room_topic {
            Some(Channel::Room)
        } else if destination == destinations.presence_topic {
            Some(Channel::Presence)
        } else if destination == destinations.private_queue {
            Some(Channel::Private)
        } else {
            None
        }
    }

    fn on_frame(
        &mut self,
        subscription: &SubscriptionId,
        destination: &str,
        body: &str,
    ) -> Result<(), EngineError> {
        let Some(channel) = self.channel_for(subscription, destination) else {
            return Err(EngineError::malformed(destination, "unknown subscription"));
        };

        match channel {
            Channel::Presence => self.presence.apply_snapshot(body, destination),
            Channel::Room | Channel::Private => {
                let event = decode_message(body, destination)?.into_event(channel, destination)?;
                self.log.append(event);
                Ok(())
            }
        }
    }
}

impl<T: Transport> Drop for ChatEngine<T> {
    fn drop(&mut self) {
        self.logout();
    }
}

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    domain::{
        error::TransportError,
        events::{ConnectionId, SubscriptionId},
    },
    transport::{ConnectOptions, Transport},
};

#[derive(Debug, Default)]
pub struct Calls {
    pub connects: u64,
    pub disconnects: u64,
    pub subscribed: Vec<String>,
    pub published: Vec<(String, String)>,
}

/// Transport that records calls and never talks to a broker.
///
/// Clones share one record, so a test can keep a clone and still inspect
/// calls after the engine has released its copy.
#[derive(Debug, Default, Clone)]
pub struct RecordingTransport {
    calls: Arc<Mutex<Calls>>,
    pub refuse_publish: bool,
}

impl RecordingTransport {
    /// Fails every publish as if the link were down.
    pub fn refusing() -> Self {
        RecordingTransport {
            refuse_publish: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }

    pub fn published_to(&self, destination: &str) -> Vec<String> {
        self.calls()
            .published
            .iter()
            .filter(|(dest, _)| dest == destination)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, _url: &str, _options: &ConnectOptions) -> ConnectionId {
        let mut calls = self.calls();
        calls.connects += 1;
        ConnectionId(calls.connects)
    }

    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, TransportError> {
        let mut calls = self.calls();
        calls.subscribed.push(destination.to_string());
        Ok(SubscriptionId(format!("sub-{}", calls.subscribed.len())))
    }

    fn publish(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        if self.refuse_publish {
            return Err(TransportError::NotConnected);
        }
        self.calls()
            .published
            .push((destination.to_string(), body.to_string()));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.calls().disconnects += 1;
    }
}

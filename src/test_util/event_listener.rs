use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use crate::connection::Connection;
use crate::connection_request::ConnectionRequest;
use crate::event_listener::EventListener;
use crate::system_packets::DisconnectReason;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CollectedEvent {
    ConnectionRequest(SocketAddr),
    /// connection id
    Connected(u16),
    Disconnected(u16, DisconnectReason),
    /// connection id, data, channel id
    Received(u16, Vec<u8>, u8),
}

/// What the listener does with connection requests
pub enum RequestPolicy {
    Accept,
    Reject(DisconnectReason),
    /// keep the request for the test to decide
    Keep,
}

pub struct CollectingEventListener {
    policy: RequestPolicy,
    events: Mutex<Vec<CollectedEvent>>,
    kept_requests: Mutex<Vec<ConnectionRequest>>,
}

impl Default for CollectingEventListener {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectingEventListener {
    pub fn new() -> CollectingEventListener {
        Self::with_policy(RequestPolicy::Accept)
    }

    pub fn with_policy(policy: RequestPolicy) -> CollectingEventListener {
        CollectingEventListener {
            policy,
            events: Default::default(),
            kept_requests: Default::default(),
        }
    }

    pub fn events(&self) -> Vec<CollectedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn num_events(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn take_kept_requests(&self) -> Vec<ConnectionRequest> {
        std::mem::take(&mut *self.kept_requests.lock().unwrap())
    }

    pub fn num_kept_requests(&self) -> usize {
        self.kept_requests.lock().unwrap().len()
    }

    fn push(&self, event: CollectedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl EventListener for CollectingEventListener {
    async fn on_connection_request(&self, request: ConnectionRequest) {
        self.push(CollectedEvent::ConnectionRequest(request.remote_addr()));
        match self.policy {
            RequestPolicy::Accept => {
                request.accept().await;
            }
            RequestPolicy::Reject(reason) => request.reject(reason).await,
            RequestPolicy::Keep => self.kept_requests.lock().unwrap().push(request),
        }
    }

    async fn on_client_connected(&self, connection: Arc<Connection>) {
        self.push(CollectedEvent::Connected(connection.connection_id()));
    }

    async fn on_client_disconnected(&self, connection: Arc<Connection>, reason: DisconnectReason) {
        self.push(CollectedEvent::Disconnected(connection.connection_id(), reason));
    }

    async fn on_network_receive(&self, connection: Arc<Connection>, data: &[u8], channel_id: u8) {
        self.push(CollectedEvent::Received(connection.connection_id(), data.to_vec(), channel_id));
    }
}

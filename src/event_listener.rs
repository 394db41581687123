use std::sync::Arc;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use crate::connection::Connection;
use crate::connection_request::ConnectionRequest;
use crate::system_packets::DisconnectReason;

/// The application's view of the transport. All callbacks for a given connection are invoked
///  sequentially, in the order the corresponding datagrams were received.
///
/// Callbacks may call back into the connection or listener (e.g. sending a reply), but a
///  callback that takes long delays further processing for its connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventListener: Send + Sync + 'static {
    /// A peer asked to connect. The application must eventually call either `accept()` or
    ///  `reject()` on the request - it is fine to do this after returning from the callback.
    async fn on_connection_request(&self, request: ConnectionRequest);

    /// Fired exactly once per connection, when the handshake is complete
    async fn on_client_connected(&self, connection: Arc<Connection>);

    async fn on_client_disconnected(&self, connection: Arc<Connection>, reason: DisconnectReason);

    async fn on_network_receive(&self, connection: Arc<Connection>, data: &[u8], channel_id: u8);
}

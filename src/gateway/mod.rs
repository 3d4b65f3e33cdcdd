pub mod codec;
pub mod transport;

pub use codec::GatewayEvent;
pub use transport::{Connection, Connector, WsConnector};

/// Default public endpoint of the Deriv WebSocket API.
pub const DEFAULT_GATEWAY_URL: &str = "wss://ws.derivws.com/websockets/v3";

/// Full endpoint URL including the application id query parameter.
pub fn endpoint_url(gateway_url: &str, app_id: &str) -> String {
    format!("{gateway_url}?app_id={app_id}")
}

//! TLS WebSocket dialing for the gateway
//!
//! The gateways present self-signed certificates, so validation is off. SNI
//! comes from the request URI host, which never includes the port.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, ACCEPT_LANGUAGE, ORIGIN, USER_AGENT};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use crate::constants::HANDSHAKE_TIMEOUT_SECS;
use crate::error::ConnectionError;
use crate::protocol::{host_without_port, live_url};

/// Socket type for a dialed gateway session
pub type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Browser identity the gateway expects
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

pub const ACCEPT_LANGUAGE_VALUE: &str = "zh-CN,zh;q=0.9";

/// Build the upgrade request with the headers the gateway checks
pub fn build_request(host: &str) -> Result<Request, ConnectionError> {
    let mut request = live_url(host)
        .into_client_request()
        .map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?;

    let origin = format!("https://{}", host_without_port(host));
    let headers = request.headers_mut();
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(&origin).map_err(|e| ConnectionError::InvalidRequest(e.to_string()))?,
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

    Ok(request)
}

/// TLS 1.2+ connector that accepts any certificate
pub fn insecure_connector() -> Result<Connector, ConnectionError> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| ConnectionError::Tls(e.to_string()))?;
    Ok(Connector::NativeTls(tls))
}

/// Dial `wss://{host}/h5player/live` within the handshake timeout
pub async fn dial(host: &str) -> Result<GatewayStream, ConnectionError> {
    let request = build_request(host)?;
    let connector = insecure_connector()?;

    let connect = tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector));

    let (stream, response) = timeout(Duration::from_secs(HANDSHAKE_TIMEOUT_SECS), connect)
        .await
        .map_err(|_| ConnectionError::Timeout(HANDSHAKE_TIMEOUT_SECS))?
        .map_err(|e| match e {
            WsError::Http(resp) => ConnectionError::Rejected(resp.status().as_u16()),
            other => ConnectionError::Handshake(other.to_string()),
        })?;

    tracing::debug!("Gateway {} upgraded with HTTP {}", host, response.status());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_headers() {
        let request = build_request("gw.example.com:50443").unwrap();
        assert_eq!(request.uri().to_string(), "wss://gw.example.com:50443/h5player/live");
        assert_eq!(request.uri().host(), Some("gw.example.com"));

        let headers = request.headers();
        assert_eq!(headers[ORIGIN], "https://gw.example.com");
        assert_eq!(headers[ACCEPT_LANGUAGE], "zh-CN,zh;q=0.9");
        assert!(headers[USER_AGENT].to_str().unwrap().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_connector_builds() {
        assert!(insecure_connector().is_ok());
    }

    #[tokio::test]
    async fn test_dial_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = dial(&format!("127.0.0.1:{}", port)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Handshake(_)), "{:?}", err);
    }
}

//! Integration tests for the WebSocket client transport.
//!
//! These tests spin up a real WebSocket server with `tokio-tungstenite`
//! and dial it with [`WebSocketTransport`] to verify that frames actually
//! flow over the network and that the WAMP subprotocol is negotiated.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::Message;
    use wampkit_transport::{
        Connection, Transport, WebSocketTransport, WAMP_JSON_SUBPROTOCOL,
    };

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its URL.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    /// Accepts one connection, echoing the requested subprotocol back.
    /// Returns the server side stream and the subprotocol the client asked for.
    async fn accept(listener: TcpListener) -> (ServerWs, Option<String>) {
        let (stream, _) = listener.accept().await.expect("should accept");
        let mut requested = None;
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                requested = req
                    .headers()
                    .get("Sec-WebSocket-Protocol")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                resp.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    HeaderValue::from_static(WAMP_JSON_SUBPROTOCOL),
                );
                Ok(resp)
            },
        )
        .await
        .expect("handshake should succeed");
        (ws, requested)
    }

    #[tokio::test]
    async fn test_websocket_connect_and_send_receive() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));

        let transport = WebSocketTransport::new(&url);
        let conn = transport.connect().await.expect("should connect");
        let (mut server_ws, requested) = server.await.expect("task should complete");

        assert!(conn.id().into_inner() > 0);
        assert_eq!(requested.as_deref(), Some(WAMP_JSON_SUBPROTOCOL));

        // --- Client sends, server receives a text frame ---
        conn.send(br#"[1,"realm1",{}]"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_data().as_ref(), br#"[1,"realm1",{}]"#);

        // --- Server sends, client receives ---
        server_ws
            .send(Message::Text(r#"[2,9,{}]"#.into()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"[2,9,{}]"#);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_server_close() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));

        let conn = WebSocketTransport::new(&url)
            .connect()
            .await
            .expect("should connect");
        let (mut server_ws, _) = server.await.unwrap();

        server_ws.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_websocket_connect_refused() {
        // Bind then drop so the port is almost certainly closed.
        let (listener, url) = listen().await;
        drop(listener);

        let result = WebSocketTransport::new(url).connect().await;
        assert!(result.is_err());
    }
}

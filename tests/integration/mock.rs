//! In-process stand-in for the gateway: just enough of the wire protocol
//! (handshake, version negotiation, framed request/response) to drive a
//! real `Connection` end to end without spawning another process.

use marketlink_core::wire;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct MockGateway {
    listener: TcpListener,
    pub addr: std::net::SocketAddr,
}

impl MockGateway {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock gateway");
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    pub async fn accept(&self) -> MockSession {
        let (stream, _) = self.listener.accept().await.expect("accept client connection");
        stream.set_nodelay(true).ok();
        MockSession { stream }
    }
}

/// One accepted connection, driven by the test body.
pub struct MockSession {
    stream: TcpStream,
}

impl MockSession {
    /// Consume the client's `API\0v<min>..<max>` handshake and reply with
    /// the chosen version and a server timestamp, completing negotiation.
    pub async fn negotiate(&mut self, chosen_version: i32) {
        let mut prefix = [0u8; 4];
        self.stream.read_exact(&mut prefix).await.expect("read handshake prefix");
        assert_eq!(&prefix, b"API\0", "client did not send the expected handshake prefix");

        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await.expect("read handshake length");
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut versions = vec![0u8; len];
        self.stream.read_exact(&mut versions).await.expect("read handshake body");

        self.send_frame(&[&chosen_version.to_string(), "1690000000"]).await;
    }

    /// Read and discard the `START_API` frame sent right after
    /// negotiation; most scenarios don't care about its contents.
    pub async fn recv_start_api(&mut self) -> Vec<String> {
        self.recv_frame().await
    }

    pub async fn recv_frame(&mut self) -> Vec<String> {
        wire::read_frame(&mut self.stream).await.expect("read frame from client")
    }

    pub async fn send_frame(&mut self, fields: &[&str]) {
        let encoded: Vec<Vec<u8>> = fields.iter().map(|f| f.as_bytes().to_vec()).collect();
        wire::write_frame(&mut self.stream, &encoded).await.expect("write frame to client");
    }
}

use marketlink_client::{Connection, ConnectOptions};

use crate::mock::MockGateway;

#[tokio::test]
async fn current_time_resolves_from_a_versionless_reply() {
    let gateway = MockGateway::bind().await;
    let addr = gateway.addr;

    let server = tokio::spawn(async move {
        let mut session = gateway.accept().await;
        session.negotiate(150).await;
        session.recv_start_api().await;
        // kind, message version, timestamp -- no request id field.
        session.send_frame(&["49", "1", "1524957956"]).await;
    });

    let conn = Connection::connect(ConnectOptions::new("127.0.0.1", addr.port(), 0))
        .await
        .expect("connect to mock gateway");

    let now = conn.request_current_time().await.expect("current time reply");
    assert_eq!(now, 1524957956);

    server.await.unwrap();
}

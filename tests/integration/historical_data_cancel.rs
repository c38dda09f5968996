use std::sync::Arc;

use marketlink_client::{ClientError, Connection, ConnectOptions};
use tokio::sync::oneshot;

use crate::mock::MockGateway;

#[tokio::test]
async fn cancel_fails_the_completion_and_a_late_reply_is_dropped() {
    let gateway = MockGateway::bind().await;
    let addr = gateway.addr;
    let (request_id_tx, request_id_rx) = oneshot::channel::<String>();

    let server = tokio::spawn(async move {
        let mut session = gateway.accept().await;
        session.negotiate(150).await;
        session.recv_start_api().await;

        let request = session.recv_frame().await;
        assert_eq!(request[0], "20"); // REQ_HISTORICAL_DATA
        let request_id = request[1].clone();
        request_id_tx.send(request_id.clone()).unwrap();

        let cancel = session.recv_frame().await;
        assert_eq!(cancel[0], "25"); // CANCEL_HISTORICAL_DATA
        assert_eq!(cancel[2], request_id);

        // A reply that crosses the cancel on the wire: must not resolve
        // anything on the client side.
        session.send_frame(&["17", "1", &request_id, "", "", "0"]).await;
    });

    let conn = Arc::new(
        Connection::connect(ConnectOptions::new("127.0.0.1", addr.port(), 0))
            .await
            .expect("connect to mock gateway"),
    );
    let instrument = conn.instruments().get_or_create(265598);

    let fetch = {
        let conn = conn.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            conn.request_historical_data(&instrument, "", "1 D", "1 day", "TRADES", true, false)
                .await
        })
    };

    let request_id: i32 = request_id_rx.await.unwrap().parse().unwrap();
    conn.cancel_historical_data(request_id).await.expect("cancel request sent");

    let result = fetch.await.unwrap();
    assert!(matches!(result, Err(ClientError::Canceled)));

    server.await.unwrap();
}

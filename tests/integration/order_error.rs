use marketlink_client::handlers::orders::{Action, Order};
use marketlink_client::{ClientError, Connection, ConnectOptions};

use crate::mock::MockGateway;

#[tokio::test]
async fn error_keyed_by_order_id_fails_the_place_order_completion() {
    let gateway = MockGateway::bind().await;
    let addr = gateway.addr;

    let server = tokio::spawn(async move {
        let mut session = gateway.accept().await;
        session.negotiate(150).await;
        session.recv_start_api().await;

        let placed = session.recv_frame().await;
        assert_eq!(placed[0], "3"); // PLACE_ORDER
        let order_id = &placed[2];

        // An ERROR naming an unrelated id is ignored, then the matching one
        // fails the place-order completion.
        session.send_frame(&["4", "2", "44", "-5", "unrelated"]).await;
        session.send_frame(&["4", "2", order_id, "-10", "Something went wrong"]).await;
    });

    let conn = Connection::connect(ConnectOptions::new("127.0.0.1", addr.port(), 0))
        .await
        .expect("connect to mock gateway");

    let instrument = conn.instruments().get_or_create(1234);
    let order_fields = Order::market(instrument, Action::Buy, 100.0);

    let result = conn.place_order(order_fields).await;
    match result {
        Err(ClientError::Api { code, message }) => {
            assert_eq!(code, -10);
            assert_eq!(message, "Something went wrong");
        }
        other => panic!("expected a failed place-order completion, got {other:?}"),
    }

    server.await.unwrap();
}

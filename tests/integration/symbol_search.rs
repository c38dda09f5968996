use marketlink_client::{Connection, ConnectOptions};
use marketlink_core::version::features;

use crate::mock::MockGateway;

#[tokio::test]
async fn symbol_search_resolves_one_matching_instrument() {
    let gateway = MockGateway::bind().await;
    let addr = gateway.addr;

    let server = tokio::spawn(async move {
        let mut session = gateway.accept().await;
        session.negotiate(features::REQ_MATCHING_SYMBOLS.value()).await;
        session.recv_start_api().await;

        let request = session.recv_frame().await;
        assert_eq!(request[0], "81"); // REQ_MATCHING_SYMBOLS
        let request_id = &request[1];
        assert_eq!(request[2], "AAPL");

        // One hit, no message version on SYMBOL_SAMPLES, and a trailing
        // empty field for the (unused) derivative security types list.
        session
            .send_frame(&["79", request_id, "1", "42", "AAPL", "STK", "NASDAQ", "USD", ""])
            .await;
    });

    let conn = Connection::connect(ConnectOptions::new("127.0.0.1", addr.port(), 0))
        .await
        .expect("connect to mock gateway");

    let hits = conn.request_matching_symbols("AAPL").await.expect("symbol search reply");
    assert_eq!(hits.len(), 1);
    let fields = hits[0].fields();
    assert_eq!(hits[0].contract_id(), 42);
    assert_eq!(fields.symbol, "AAPL");
    assert_eq!(fields.primary_exchange, "NASDAQ");
    assert_eq!(fields.currency, "USD");

    server.await.unwrap();
}

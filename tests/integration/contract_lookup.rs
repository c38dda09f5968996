use marketlink_client::handlers::contract::ContractQuery;
use marketlink_client::{Connection, ConnectOptions};
use marketlink_core::version::MIN_CLIENT_VERSION;

use crate::mock::MockGateway;

#[tokio::test]
async fn contract_lookup_by_isin_resolves_one_row() {
    let gateway = MockGateway::bind().await;
    let addr = gateway.addr;

    let server = tokio::spawn(async move {
        let mut session = gateway.accept().await;
        session.negotiate(MIN_CLIENT_VERSION).await;
        session.recv_start_api().await;

        let request = session.recv_frame().await;
        assert_eq!(request[0], "9"); // REQ_CONTRACT_DATA
        let request_id = &request[2];
        assert_eq!(request.last().unwrap(), "US0378331005"); // security_id

        // One CONTRACT_DATA row, at the min protocol version so none of the
        // feature-gated trailing fields are present, followed by the
        // terminating CONTRACT_DATA_END.
        session
            .send_frame(&[
                "10",
                "8",
                request_id,
                "AAPL",
                "STK",
                "",
                "",
                "",
                "NYSE",
                "USD",
                "AAPL",
                "AAPL",
                "AAPL",
                "265598",
                "0.01",
                "",
                "ACTIVETIM,AD,ADJUST",
                "SMART,NYSE",
                "1",
                "",
                "Apple Inc",
                "NYSE",
                "",
                "",
                "",
                "",
                "EST",
                "",
                "",
                "",
                "",
                "0",
            ])
            .await;
        session.send_frame(&["52", request_id]).await;
    });

    let conn = Connection::connect(ConnectOptions::new("127.0.0.1", addr.port(), 0))
        .await
        .expect("connect to mock gateway");

    let query = ContractQuery {
        security_id_type: Some(marketlink_client::instrument::SecurityIdentifierType::Isin),
        security_id: Some("US0378331005".to_string()),
        include_expired: false,
        ..Default::default()
    };
    let rows = conn.request_contract_data(query).await.expect("contract data reply");

    assert_eq!(rows.len(), 1);
    let fields = rows[0].fields();
    assert_eq!(fields.symbol, "AAPL");
    assert_eq!(fields.primary_exchange, "NYSE");

    server.await.unwrap();
}

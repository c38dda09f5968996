use std::sync::Arc;

use marketlink_client::handlers::depth::{self, DepthUpdate};
use marketlink_client::subscription::Handler;
use marketlink_client::{Connection, ConnectOptions};
use tokio::sync::mpsc;

use crate::mock::MockGateway;

#[tokio::test]
async fn market_depth_applies_insert_update_delete_across_both_books() {
    let gateway = MockGateway::bind().await;
    let addr = gateway.addr;

    let server = tokio::spawn(async move {
        let mut session = gateway.accept().await;
        session.negotiate(150).await;
        session.recv_start_api().await;

        let subscribe = session.recv_frame().await;
        assert_eq!(subscribe[0], "10"); // REQ_MKT_DEPTH
        let request_id = &subscribe[1];

        // insert ask, L2 insert bid, update ask, delete ask.
        session.send_frame(&["12", "1", request_id, "0", "0", "0", "20", "21"]).await;
        session.send_frame(&["13", "1", request_id, "0", "ne", "0", "1", "21", "21"]).await;
        session.send_frame(&["12", "1", request_id, "0", "1", "0", "22", "21"]).await;
        session.send_frame(&["12", "1", request_id, "0", "2", "0", "22", "21"]).await;
    });

    let conn = Connection::connect(ConnectOptions::new("127.0.0.1", addr.port(), 0))
        .await
        .expect("connect to mock gateway");

    let instrument = conn.instruments().get_or_create(265598);

    let (tx, mut rx) = mpsc::unbounded_channel::<DepthUpdate>();
    let handler: Arc<Handler<DepthUpdate>> = Arc::new(move |update: &DepthUpdate| {
        let _ = tx.send(update.clone());
    });
    depth::subscribe_market_depth(&instrument, 100, handler);

    // `apply_depth_update` runs inside dispatch before each event is
    // emitted, so by the time all 4 sink deliveries have been observed
    // here the instrument's own maintained book already reflects them.
    for _ in 0..4 {
        rx.recv().await.expect("depth update channel stays open for all 4 events");
    }

    let asks = instrument.market_depth_asks();
    assert_eq!(asks.len(), 0);

    let bids = instrument.market_depth_bids();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].price, 21.0);
    assert_eq!(bids[0].size, 21.0);
    assert_eq!(bids[0].market_maker, "ne");

    server.await.unwrap();
}

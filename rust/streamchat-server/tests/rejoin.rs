mod common;

use parking_lot::Mutex;
use std::sync::Arc;
use streamchat_client::{protocol::RoomId, ConnectionState};
use streamchat_server as server;

#[tokio::test(flavor = "current_thread")]
async fn reconnect_joins_the_active_room_once() {
    let joins: Arc<Mutex<Vec<(u64, RoomId)>>> = Arc::new(Mutex::new(Vec::new()));
    let record = joins.clone();
    let cfg = server::ServerConfig {
        on_join: Some(Arc::new(move |args: server::JoinArgs| record.lock().push((args.conn_id, args.room)))),
        ..common::config()
    };
    let (url, server_task) = common::start(cfg).await;
    let mut session = common::session(common::FakeApi::default(), &url);

    session.login("ada@example.com", "pw").await.unwrap();
    session.refresh_rooms().await.unwrap();
    common::until(&mut session, |s| s.connection_state() == ConnectionState::Connected).await;
    common::eventually(|| {
        let n = joins.lock().len();
        async move { n == 1 }
    })
    .await;

    session.reconnect().unwrap();
    common::until(&mut session, |s| s.connection_state() == ConnectionState::Connected).await;
    common::eventually(|| {
        let n = joins.lock().len();
        async move { n == 2 }
    })
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let joins = joins.lock().clone();
    assert_eq!(joins.len(), 2, "exactly one join per connection");
    assert_ne!(joins[0].0, joins[1].0, "second join comes from a fresh connection");
    assert!(joins.iter().all(|(_, room)| *room == RoomId::from(common::ROOM)));

    server_task.abort();
}

#[tokio::test(flavor = "current_thread")]
async fn close_hook_reports_joined_rooms() {
    let closed: Arc<Mutex<Vec<server::CloseConnectionArgs>>> = Arc::new(Mutex::new(Vec::new()));
    let record = closed.clone();
    let cfg = server::ServerConfig {
        on_close_connection: Some(Arc::new(move |args: server::CloseConnectionArgs| record.lock().push(args))),
        ..common::config()
    };
    let (url, server_task) = common::start(cfg).await;
    let mut session = common::session(common::FakeApi::default(), &url);
    session.login("ada@example.com", "pw").await.unwrap();
    session.refresh_rooms().await.unwrap();
    common::until(&mut session, |s| s.connection_state() == ConnectionState::Connected).await;
    session.select_room(RoomId::from("8")).await.unwrap();

    session.disconnect();
    common::eventually(|| {
        let n = closed.lock().len();
        async move { n == 1 }
    })
    .await;
    let closed = closed.lock();
    assert_eq!(closed[0].rooms, vec![RoomId::from(common::ROOM), RoomId::from("8")]);

    server_task.abort();
}

//! A viewer that drops off while the ladder moves on catches up after
//! reconnecting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::sync::{mpsc, watch};

use koth::network::auth::{authorize_admin, TokenClaims};
use koth::network::{AuthConfig, ClientMessage, ServerConfig, ServerMessage, SyncServer};
use koth::{
    AdminIdentity, InMemoryLogStore, InMemoryRoster, Race, RefreshKind, ServiceConfig,
    SyncClient, SyncClientConfig, TournamentService,
};

const SECRET: &str = "integration-secret";
const WAIT: Duration = Duration::from_secs(5);

fn admin(config: &AuthConfig) -> AdminIdentity {
    let now = Utc::now().timestamp() as u64;
    let claims = TokenClaims {
        sub: "referee".into(),
        exp: now + 3600,
        iat: now,
        iss: None,
        aud: None,
        role: Some("ADMIN".into()),
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    authorize_admin(&token, config).unwrap()
}

async fn wait_connected(watcher: &mut watch::Receiver<bool>, want: bool) {
    tokio::time::timeout(WAIT, async {
        while *watcher.borrow_and_update() != want {
            watcher.changed().await.unwrap();
        }
    })
    .await
    .expect("connection state did not change");
}

/// Round-trip a ping so every frame queued before it has been handled.
async fn settle(client: &SyncClient, responses: &mut mpsc::UnboundedReceiver<ServerMessage>) {
    client.send(ClientMessage::Ping { timestamp: 1 }).unwrap();
    loop {
        let msg = tokio::time::timeout(WAIT, responses.recv()).await.unwrap().unwrap();
        if matches!(msg, ServerMessage::Pong { .. }) {
            return;
        }
    }
}

#[tokio::test]
async fn test_reconnect_triggers_refresh_and_snapshot_catches_up() {
    let roster = Arc::new(InMemoryRoster::new());
    for nick in ["boxer", "nada", "july"] {
        roster.register_player(nick, None, Race::Terran).unwrap();
    }
    roster.add_map("Luna").unwrap();

    let service = Arc::new(TournamentService::new(
        ServiceConfig { map_seed: Some(3), ..Default::default() },
        roster,
        Arc::new(InMemoryLogStore::new()),
    ));

    let auth = AuthConfig::with_secret(SECRET);
    let admin = admin(&auth);
    let server = Arc::new(
        SyncServer::bind(
            ServerConfig { bind_addr: "127.0.0.1:0".parse().unwrap(), ..Default::default() },
            auth,
            service.clone(),
        )
        .await
        .unwrap(),
    );
    let url = format!("ws://{}", server.local_addr().unwrap());
    let runner = server.clone();
    tokio::spawn(async move { runner.run().await });

    let client = SyncClient::new(SyncClientConfig {
        reconnect_delay: Duration::from_millis(200),
        ..SyncClientConfig::new(url)
    });

    let (refresh_tx, mut refreshes) = mpsc::unbounded_channel();
    client.register_refresh_callback(RefreshKind::Tournament, move || {
        let _ = refresh_tx.send(());
    });
    let (response_tx, mut responses) = mpsc::unbounded_channel();
    client.on_response(move |msg| {
        let _ = response_tx.send(msg.clone());
    });

    let mut watcher = client.connection_watcher();
    client.connect().unwrap();
    wait_connected(&mut watcher, true).await;
    settle(&client, &mut responses).await;

    // A live transition refreshes exactly once.
    let tournament = service.start_tournament(&admin).await.unwrap();
    tokio::time::timeout(WAIT, refreshes.recv()).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(refreshes.try_recv().is_err());

    // Drop the viewer and move the ladder on while it is away.
    assert_eq!(server.disconnect_all(), 1);
    wait_connected(&mut watcher, false).await;

    let winner = tournament.current_game.as_ref().unwrap().player1.id;
    service.record_result(&admin, winner, Some(1)).await.unwrap();

    // The reconnect itself triggers the refresh.
    wait_connected(&mut watcher, true).await;
    tokio::time::timeout(WAIT, refreshes.recv()).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(refreshes.try_recv().is_err());

    settle(&client, &mut responses).await;
    client.send(ClientMessage::GetCurrentTournament { token: None }).unwrap();
    let snapshot = loop {
        let msg = tokio::time::timeout(WAIT, responses.recv()).await.unwrap().unwrap();
        if let ServerMessage::Snapshot { snapshot } = msg {
            break snapshot;
        }
    };
    let view = snapshot.view().expect("tournament snapshot");
    assert_eq!(view.games_played, 1);
    assert_eq!(view.current_game.as_ref().unwrap().round, 2);

    client.shutdown().await;
    assert!(!client.is_connected());
    server.shutdown();
}

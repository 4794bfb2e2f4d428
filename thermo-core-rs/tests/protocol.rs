//! End-to-end runs over loopback TCP

use thermo_core::coordinator::serve_on;
use thermo_core::peripheral::connect_and_run;
use thermo_core::transport::bind;
use thermo_core::{
    Connection, CoordinatorConfig, Error, ErrorKind, Message, PeripheralConfig, PeerId,
    RegistrationError, RunSummary,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

async fn start_coordinator(
    peer_count: usize,
    central: f64,
) -> (u16, JoinHandle<thermo_core::Result<RunSummary>>) {
    let listener = bind("127.0.0.1", 0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = CoordinatorConfig::new(port)
        .with_bind_addr("127.0.0.1")
        .with_peer_count(peer_count);
    (port, tokio::spawn(serve_on(listener, config, central)))
}

fn start_peripheral(
    port: u16,
    id: PeerId,
    value: f64,
) -> JoinHandle<thermo_core::Result<thermo_core::PeripheralOutcome>> {
    let config = PeripheralConfig::new(id).with_port(port);
    tokio::spawn(async move { connect_and_run(&config, value).await })
}

/// A peer that registers and then follows a script instead of the update rule
async fn scripted_peer(port: u16, id: PeerId) -> Connection<TcpStream> {
    let mut conn = Connection::connect("127.0.0.1", port).await.unwrap();
    conn.send(&Message::Hello { id, value: 10.0 }).await.unwrap();
    conn
}

#[tokio::test]
async fn test_seed_scenario_converges() {
    let (port, coordinator) = start_coordinator(4, 0.0).await;
    let nodes: Vec<_> = (1..=4).map(|id| start_peripheral(port, id, 10.0)).collect();

    let summary = coordinator.await.unwrap().unwrap();
    assert_eq!(summary.rounds, 7);
    assert!((summary.central_value - 5.0).abs() < 1e-3);
    assert_eq!(summary.peripherals.len(), 4);

    for (i, record) in summary.peripherals.iter().enumerate() {
        assert_eq!(record.id, i as PeerId + 1);
        assert!((record.current_value - 5.0).abs() < 1e-3);
        assert!(record.delta().unwrap() <= 1e-3);
    }

    for node in nodes {
        let outcome = node.await.unwrap().unwrap();
        assert_eq!(outcome.rounds, 7);
        assert!((outcome.final_central - summary.central_value).abs() < 1e-9);
        assert!((outcome.external_value - 5.0).abs() < 1e-3);
    }

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["rounds"], 7);
    assert_eq!(json["peripherals"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_asymmetric_start_reaches_common_value() {
    let (port, coordinator) = start_coordinator(4, 100.0).await;
    let nodes: Vec<_> = [(1, -20.0), (2, 0.0), (3, 35.5), (4, 80.0)]
        .into_iter()
        .map(|(id, value)| start_peripheral(port, id, value))
        .collect();

    let summary = coordinator.await.unwrap().unwrap();
    assert!(summary.rounds >= 2);
    for record in &summary.peripherals {
        assert!((record.current_value - summary.central_value).abs() < 0.05);
    }
    for node in nodes {
        assert!(node.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn test_equilibrium_converges_on_round_two() {
    let (port, coordinator) = start_coordinator(4, 7.5).await;
    let nodes: Vec<_> = (1..=4).map(|id| start_peripheral(port, id, 7.5)).collect();

    let summary = coordinator.await.unwrap().unwrap();
    assert_eq!(summary.rounds, 2);
    assert!((summary.central_value - 7.5).abs() < 1e-9);
    for node in nodes {
        let outcome = node.await.unwrap().unwrap();
        assert!((outcome.external_value - 7.5).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_late_registration_within_round_deadline() {
    let deadline = Some(Duration::from_millis(200));
    let listener = bind("127.0.0.1", 0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = CoordinatorConfig::new(port)
        .with_bind_addr("127.0.0.1")
        .with_peer_count(2)
        .with_round_timeout(deadline);
    let coordinator = tokio::spawn(serve_on(listener, config, 0.0));

    let peripheral = |id: PeerId| {
        let config = PeripheralConfig::new(id)
            .with_port(port)
            .with_round_timeout(deadline);
        tokio::spawn(async move { connect_and_run(&config, 10.0).await })
    };
    let first = peripheral(1);
    tokio::time::sleep(Duration::from_millis(400)).await;
    let second = peripheral(2);

    let summary = coordinator.await.unwrap().unwrap();
    assert_eq!(summary.peripherals.len(), 2);
    for record in &summary.peripherals {
        assert!((record.current_value - summary.central_value).abs() < 1e-2);
    }
    assert_eq!(first.await.unwrap().unwrap().rounds, summary.rounds);
    assert_eq!(second.await.unwrap().unwrap().rounds, summary.rounds);
}

#[tokio::test]
async fn test_large_values_cross_the_wire() {
    let (port, coordinator) = start_coordinator(1, 1e250).await;
    let node = start_peripheral(port, 1, -1e250);

    let summary = coordinator.await.unwrap().unwrap();
    assert!(summary.central_value.is_finite());
    assert!(node.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_unknown_temp_id_aborts_everyone() {
    let (port, coordinator) = start_coordinator(2, 0.0).await;
    let honest = start_peripheral(port, 1, 10.0);
    let mut rogue = scripted_peer(port, 2).await;

    assert!(matches!(rogue.recv().await.unwrap(), Message::Central { .. }));
    rogue.send(&Message::Temp { id: 9, value: 1.0 }).await.unwrap();

    let err = coordinator.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::UnknownPeer(9)));
    assert_eq!(err.kind(), ErrorKind::UnknownPeer);

    let err = honest.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_malformed_temp_aborts_coordinator() {
    let (port, coordinator) = start_coordinator(1, 0.0).await;
    let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    raw.write_all(b"HELLO 1 10.0\n").await.unwrap();
    raw.write_all(b"TEMP 1 lukewarm\n").await.unwrap();

    let err = coordinator.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Malformed { .. }));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn test_duplicate_registration_aborts() {
    let (port, coordinator) = start_coordinator(2, 0.0).await;
    let _first = scripted_peer(port, 3).await;
    let _second = scripted_peer(port, 3).await;

    let err = coordinator.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Registration(RegistrationError::DuplicateId(3))
    ));
}

#[tokio::test]
async fn test_out_of_range_id_aborts() {
    let (port, coordinator) = start_coordinator(4, 0.0).await;
    let _peer = scripted_peer(port, 5).await;

    let err = coordinator.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Registration(RegistrationError::IdOutOfRange { id: 5, max: 4 })
    ));
}

#[tokio::test]
async fn test_peer_leaving_mid_run_aborts() {
    let (port, coordinator) = start_coordinator(1, 0.0).await;
    let mut peer = scripted_peer(port, 1).await;
    assert!(matches!(peer.recv().await.unwrap(), Message::Central { .. }));
    drop(peer);

    let err = coordinator.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    let listener = bind("127.0.0.1", 0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = PeripheralConfig::new(1).with_port(port);
    let err = connect_and_run(&config, 1.0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

use movement_hardware::sim::{SimEdgePin, SimOutputPin};
use movement_traits::{Edge, EdgePin, OutputPin};

#[test]
fn output_pin_tracks_the_last_level() {
    let (mut pin, level) = SimOutputPin::new();
    assert_eq!(level.load(std::sync::atomic::Ordering::Relaxed), 0);
    pin.set(true).expect("set high");
    assert_eq!(level.load(std::sync::atomic::Ordering::Relaxed), 1);
    pin.set(false).expect("set low");
    assert_eq!(level.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn edge_pin_delivers_levels_in_order() {
    let (mut pin, tx) = SimEdgePin::new();
    pin.configure_edge(Edge::Both).expect("configure");
    tx.send(1).expect("send");
    tx.send(0).expect("send");
    assert_eq!(pin.wait_and_read().expect("edge"), 1);
    assert_eq!(pin.wait_and_read().expect("edge"), 0);
}

#[test]
fn edge_pin_errors_when_the_source_disconnects() {
    let (mut pin, tx) = SimEdgePin::new();
    drop(tx);
    let err = pin.wait_and_read().expect_err("disconnected");
    assert!(format!("{err}").contains("disconnected"));
}

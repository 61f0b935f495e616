//! Handing a prepared connection to a new owner through its seed

use capbus::error::ERROR_MISSING_ROOT_INTERFACE;
use capbus::{Error, Message, Peer, Value};
use tests_resilience::{call_echo, connect, drain, echo_interface, test_bus, Answer, Answers};

#[test]
fn test_seeded_roots_are_claimed_by_the_new_owner() {
    let bus = test_bus();
    let daemon = connect(&bus);
    let service = daemon.create_node(()).unwrap();
    let (launcher, service_handle) = daemon.clone_peer(&service.handle()).unwrap();

    let root = launcher.create_node(()).unwrap();
    let (client, to_root) = launcher.clone_peer(&root.handle()).unwrap();
    Message::new_seed(
        &launcher,
        &[("test.Echo", &root.handle()), ("service", &service_handle)],
        "",
    )
    .unwrap()
    .send(&[])
    .unwrap();
    let descriptor = launcher.detach().unwrap();
    drop(launcher);
    assert!(bus.is_connected(client.id()));

    let owner = Peer::new_from_fd(bus.clone(), descriptor).unwrap();
    owner.recv_seed().unwrap().unwrap().dispatch().unwrap();
    assert_eq!(owner.unclaimed_roots(), ["test.Echo"]);
    let service_root = owner.root_handle("service").unwrap();
    assert!(!service_root.is_local());
    assert!(owner.recv_seed().unwrap().is_none());

    // reachable but not implemented yet
    let answers = Answers::new();
    call_echo(&client, &to_root, "early", &answers);
    drain(&[&owner, &client]);
    assert_eq!(
        answers.all(),
        [Answer::Error(ERROR_MISSING_ROOT_INTERFACE.to_string())]
    );

    let claimed = owner.implement(&echo_interface(-5), ()).unwrap();
    assert_eq!(claimed.id(), root.id());
    assert!(owner.unclaimed_roots().is_empty());

    let answers = Answers::new();
    call_echo(&client, &to_root, "late", &answers);
    drain(&[&owner, &client]);
    assert_eq!(
        answers.all(),
        [Answer::Reply(vec![Value::String("late".into())])]
    );
}

#[test]
fn test_claiming_an_unseeded_root_fails() {
    let bus = test_bus();
    let peer = connect(&bus);
    let err = peer.implement(&echo_interface(-5), ()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.errno(), capbus::error::ENOENT);
}

#[test]
fn test_newer_seed_replaces_roots() {
    let bus = test_bus();
    let peer = connect(&bus);
    let first = peer.create_node(()).unwrap();
    let second = peer.create_node(()).unwrap();

    for (name, node) in [("test.First", &first), ("test.Second", &second)] {
        Message::new_seed(&peer, &[(name, &node.handle())], "")
            .unwrap()
            .send(&[])
            .unwrap();
    }
    peer.recv_seed().unwrap().unwrap().dispatch().unwrap();
    assert_eq!(peer.unclaimed_roots(), ["test.Second"]);
}

#[test]
fn test_seed_names_must_be_unique() {
    let bus = test_bus();
    let peer = connect(&bus);
    let node = peer.create_node(()).unwrap();
    let handle = node.handle();
    let err = Message::new_seed(&peer, &[("test.Root", &handle), ("test.Root", &handle)], "")
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { kind: "root", .. }));
}

//! Component wiring through the activator interface

use capbus::error::{ENOENT, ENOTUNIQ, ERROR_ERRNO, ERROR_INVALID_SIGNATURE};
use capbus::{Error, Handle, Message, Peer, Value};
use services_activator::{Manager, COMPONENT_INTERFACE};
use std::sync::{Arc, Mutex};
use tests_resilience::{echo_interface, test_bus, Answer, Answers};

fn set_root_nodes(peer: &Peer, target: &Handle, roots: &[(&str, &Handle)], answers: &Answers) {
    let (call, _slot) = Message::new_call_with_reply(
        peer,
        COMPONENT_INTERFACE,
        "setRootNodes",
        "a(su)",
        "()",
        answers.callback(),
    )
    .unwrap();
    call.begin("a").unwrap();
    for (name, handle) in roots {
        let index = call.append_handle(handle).unwrap();
        call.write("(su)", &[Value::Struct(vec![(*name).into(), index.into()])])
            .unwrap();
    }
    call.end("a").unwrap();
    call.send(&[target]).unwrap();
}

type Dependencies = Arc<Mutex<Option<Vec<(String, Handle)>>>>;

fn get_dependencies(peer: &Peer, target: &Handle) -> Dependencies {
    let result: Dependencies = Arc::new(Mutex::new(None));
    let out = Arc::clone(&result);
    let (call, _slot) = Message::new_call_with_reply(
        peer,
        COMPONENT_INTERFACE,
        "getDependencies",
        "()",
        "a(su)",
        move |reply| {
            if reply.error_name().is_some() {
                return Err(Error::Rejected("unexpected error"));
            }
            let mut entries = Vec::new();
            reply.enter("a")?;
            for _ in 0..reply.peek_count()? {
                let entry = reply.read_one("(su)")?;
                let fields = entry.as_struct().unwrap_or_default();
                let name = fields[0].as_str().unwrap_or_default().to_string();
                let index = fields[1].as_u32().unwrap_or(u32::MAX);
                entries.push((name, reply.get_handle(index)?));
            }
            reply.exit("a")?;
            *out.lock().unwrap() = Some(entries);
            Ok(())
        },
    )
    .unwrap();
    call.send(&[target]).unwrap();
    result
}

#[test]
fn test_dependencies_follow_declaration_order() {
    let manager = Manager::new(test_bus()).unwrap();
    let a = manager.add_component("A", &["B", "C"]).unwrap();
    let b = manager.add_component("B", &[]).unwrap();
    let c = manager.peer().create_node(()).unwrap();

    // registered in the opposite order of A's declaration
    let answers = Answers::new();
    set_root_nodes(
        manager.peer(),
        &a.node.handle(),
        &[("C", &c.handle()), ("B", &b.node.handle())],
        &answers,
    );
    manager.dispatch_pending().unwrap();
    assert!(matches!(answers.all().as_slice(), [Answer::Reply(_)]));
    assert_eq!(manager.dependency_names(), ["B", "C"]);

    let dependencies = get_dependencies(manager.peer(), &a.node.handle());
    manager.dispatch_pending().unwrap();

    let dependencies = dependencies.lock().unwrap().take().unwrap();
    let names: Vec<&str> = dependencies.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["B", "C"]);
    assert_eq!(dependencies[0].1, b.node.handle());
    assert_eq!(dependencies[1].1, c.handle());
}

#[test]
fn test_component_child_receives_remote_handles() {
    let bus = test_bus();
    let manager = Manager::new(bus.clone()).unwrap();
    let a = manager.add_component("A", &["B"]).unwrap();
    let b = manager.add_component("B", &[]).unwrap();

    let answers = Answers::new();
    set_root_nodes(
        manager.peer(),
        &a.node.handle(),
        &[("B", &b.node.handle())],
        &answers,
    );
    manager.dispatch_pending().unwrap();

    // the component asks through its own connection
    let dependencies = get_dependencies(&a.peer, &a.handle);
    manager.dispatch_pending().unwrap();
    a.peer.dispatch_pending().unwrap();

    let dependencies = dependencies.lock().unwrap().take().unwrap();
    let (name, handle) = &dependencies[0];
    assert_eq!(name, "B");
    assert!(!handle.is_local());
    assert_eq!(handle.peer_id(), a.peer.id());
    assert!(bus.audit_log().has_event(|event| matches!(
        event,
        core_types::CapabilityEvent::HandleGranted { node, holder, .. }
            if *node == b.node.id() && *holder == a.peer.id()
    )));
}

#[test]
fn test_duplicate_root_name_leaves_registry_unchanged() {
    let manager = Manager::new(test_bus()).unwrap();
    let a = manager.add_component("A", &["B"]).unwrap();
    let b = manager.add_component("B", &[]).unwrap();
    let other = manager.peer().create_node(()).unwrap();

    let answers = Answers::new();
    set_root_nodes(
        manager.peer(),
        &a.node.handle(),
        &[("B", &b.node.handle())],
        &answers,
    );
    set_root_nodes(
        manager.peer(),
        &a.node.handle(),
        &[("B", &other.handle())],
        &answers,
    );
    manager.dispatch_pending().unwrap();

    assert_eq!(answers.len(), 2);
    assert!(matches!(answers.all()[0], Answer::Reply(_)));
    assert_eq!(
        answers.all()[1],
        Answer::Error(ERROR_ERRNO.to_string()),
        "second registration must fail"
    );
    assert_eq!(manager.dependency("B").unwrap(), b.node.handle());
}

#[test]
fn test_conflicting_batch_registers_nothing() {
    let manager = Manager::new(test_bus()).unwrap();
    let a = manager.add_component("A", &["B"]).unwrap();
    let b = manager.add_component("B", &[]).unwrap();
    let d = manager.peer().create_node(()).unwrap();

    let answers = Answers::new();
    set_root_nodes(
        manager.peer(),
        &a.node.handle(),
        &[("B", &b.node.handle())],
        &answers,
    );
    // "D" is new but "B" is taken, so the whole batch is refused
    set_root_nodes(
        manager.peer(),
        &a.node.handle(),
        &[("D", &d.handle()), ("B", &d.handle())],
        &answers,
    );
    manager.dispatch_pending().unwrap();

    assert_eq!(answers.len(), 2);
    assert_eq!(answers.all()[1], Answer::Error(ERROR_ERRNO.to_string()));
    assert_eq!(manager.dependency_names(), ["B"]);
    assert_eq!(manager.dependency("B").unwrap(), b.node.handle());
}

#[test]
fn test_errno_reply_carries_code() {
    let manager = Manager::new(test_bus()).unwrap();
    let a = manager.add_component("A", &["missing"]).unwrap();
    let code = Arc::new(Mutex::new(None));
    let out = Arc::clone(&code);

    let (call, _slot) = Message::new_call_with_reply(
        manager.peer(),
        COMPONENT_INTERFACE,
        "getDependencies",
        "()",
        "a(su)",
        move |reply| {
            *out.lock().unwrap() = reply.errno();
            Ok(())
        },
    )
    .unwrap();
    call.send(&[&a.node.handle()]).unwrap();
    manager.dispatch_pending().unwrap();

    assert_eq!(*code.lock().unwrap(), Some(ENOENT.unsigned_abs()));
}

#[test]
fn test_duplicate_member_keeps_first_registration() {
    let interface = echo_interface(-5);
    let err = interface
        .add_member("echo", "u", "u", |_, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
    assert_eq!(err.errno(), ENOTUNIQ);
    assert_eq!(interface.input_signature("echo").unwrap().as_str(), "s");

    // the surviving member still answers
    let peer = capbus::Peer::new(test_bus()).unwrap();
    let node = peer.create_node(()).unwrap();
    node.implement(&interface).unwrap();
    let answers = Answers::new();
    tests_resilience::call_echo(&peer, &node.handle(), "still here", &answers);
    peer.dispatch_pending().unwrap();
    assert_eq!(
        answers.all(),
        [Answer::Reply(vec![Value::String("still here".into())])]
    );
}

#[test]
fn test_mismatched_input_signature_gets_error_reply() {
    let manager = Manager::new(test_bus()).unwrap();
    let a = manager.add_component("A", &[]).unwrap();
    let answers = Answers::new();

    let (call, _slot) = Message::new_call_with_reply(
        manager.peer(),
        COMPONENT_INTERFACE,
        "getDependencies",
        "(su)",
        "a(su)",
        answers.callback(),
    )
    .unwrap();
    call.write("(su)", &[Value::Struct(vec!["x".into(), 0u32.into()])])
        .unwrap();
    call.send(&[&a.node.handle()]).unwrap();
    manager.dispatch_pending().unwrap();

    assert_eq!(
        answers.all(),
        [Answer::Error(ERROR_INVALID_SIGNATURE.to_string())]
    );
}

#[test]
fn test_mismatched_signature_without_reply_fails_locally() {
    let manager = Manager::new(test_bus()).unwrap();
    let a = manager.add_component("A", &[]).unwrap();

    let call = Message::new_call(manager.peer(), COMPONENT_INTERFACE, "getDependencies", "(su)")
        .unwrap();
    call.write("(su)", &[Value::Struct(vec!["x".into(), 0u32.into()])])
        .unwrap();
    call.send(&[&a.node.handle()]).unwrap();

    let received = manager.peer().try_recv().unwrap().unwrap();
    assert!(matches!(
        received.dispatch(),
        Err(Error::Rejected(ERROR_INVALID_SIGNATURE))
    ));
    assert!(manager.peer().try_recv().unwrap().is_none());
}

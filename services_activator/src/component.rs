//! The component interface
//!
//! - `setRootNodes(a(su)) -> ()` registers named handles as dependencies
//! - `getDependencies() -> a(su)` returns the component's declared
//!   dependencies, in declaration order, with their handles attached

use crate::manager::ManagerInner;
use capbus::{Error, Interface, Message, Node, Result, Value};
use ipc::CodecError;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Interface implemented by every component node
pub const COMPONENT_INTERFACE: &str = "capbus.Activator.Component";

/// User data of a component node
#[derive(Debug)]
pub struct ComponentInfo {
    pub name: String,
    /// Dependency names, in the order they were declared
    pub dependencies: Vec<String>,
    pub(crate) manager: Weak<ManagerInner>,
}

impl ComponentInfo {
    fn manager(&self) -> Result<Arc<ManagerInner>> {
        self.manager.upgrade().ok_or(Error::Disconnected)
    }
}

pub(crate) fn interface() -> Result<Interface> {
    let interface = Interface::new(COMPONENT_INTERFACE);
    interface.add_member("setRootNodes", "a(su)", "()", set_root_nodes)?;
    interface.add_member("getDependencies", "()", "a(su)", get_dependencies)?;
    Ok(interface)
}

fn component(node: &Node) -> Result<Arc<ComponentInfo>> {
    node.userdata::<ComponentInfo>()
        .ok_or(Error::InvalidState("node is not a component"))
}

/// Splits one `(su)` entry into name and attachment index.
fn named_index(value: &Value) -> Result<(String, u32)> {
    match value.as_struct() {
        Some([Value::String(name), Value::Uint32(index)]) => Ok((name.clone(), *index)),
        _ => Err(CodecError::TypeMismatch {
            expected: "(su)".to_string(),
            found: value.value_type().to_string(),
        }
        .into()),
    }
}

fn set_root_nodes(node: &Node, call: &Message) -> Result<()> {
    let component = component(node)?;
    let manager = component.manager()?;

    call.enter("a")?;
    let count = call.peek_count()?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let entry = call.read_one("(su)")?;
        let (name, index) = named_index(&entry)?;
        entries.push((name, call.get_handle(index)?));
    }
    call.exit("a")?;
    manager.add_dependencies(entries)?;
    debug!(component = %component.name, count, "root nodes set");

    let reply = Message::new_reply(&manager.peer, "()")?;
    call.reply(&reply)
}

fn get_dependencies(node: &Node, call: &Message) -> Result<()> {
    let component = component(node)?;
    let manager = component.manager()?;

    let reply = Message::new_reply(&manager.peer, "a(su)")?;
    reply.begin("a")?;
    for name in &component.dependencies {
        let handle = manager
            .dependency(name)
            .ok_or_else(|| Error::NotFound(format!("dependency {name}")))?;
        let index = reply.append_handle(&handle)?;
        reply.write("(su)", &[Value::Struct(vec![name.as_str().into(), index.into()])])?;
    }
    reply.end("a")?;
    call.reply(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_members() {
        let interface = interface().unwrap();
        assert_eq!(interface.name(), COMPONENT_INTERFACE);
        assert_eq!(interface.member_names(), ["getDependencies", "setRootNodes"]);
        assert_eq!(
            interface.input_signature("setRootNodes").unwrap().as_str(),
            "a(su)"
        );
        assert_eq!(
            interface.output_signature("getDependencies").unwrap().as_str(),
            "a(su)"
        );
    }

    #[test]
    fn test_named_index() {
        let entry = Value::Struct(vec!["B".into(), 3u32.into()]);
        assert_eq!(named_index(&entry).unwrap(), ("B".to_string(), 3));
        assert!(named_index(&Value::Uint32(3)).is_err());
    }
}

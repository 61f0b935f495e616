//! Component manager

use crate::component::{self, ComponentInfo};
use capbus::{Handle, Interface, Node, Peer};
use kernel_api::Transport;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ActivatorError {
    #[error("Component already registered: {0}")]
    DuplicateComponent(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error(transparent)]
    Bus(#[from] capbus::Error),
}

impl ActivatorError {
    /// Negative error code, as a remote caller would see it.
    pub fn errno(&self) -> i32 {
        match self {
            ActivatorError::DuplicateComponent(_) => capbus::error::ENOTUNIQ,
            ActivatorError::ComponentNotFound(_) => capbus::error::ENOENT,
            ActivatorError::Bus(err) => err.errno(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A registered component
///
/// The node lives on the manager's peer; `peer` is the component's own
/// connection, whose only capability is `handle`.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub node: Node,
    pub peer: Peer,
    pub handle: Handle,
}

pub(crate) struct ManagerInner {
    pub(crate) peer: Peer,
    interface: Interface,
    components: Mutex<BTreeMap<String, Component>>,
    dependencies: Mutex<BTreeMap<String, Handle>>,
}

impl ManagerInner {
    /// Registers `handle` under `name`. The registry is left unchanged if
    /// the name is taken.
    pub(crate) fn add_dependency(&self, name: &str, handle: Handle) -> capbus::Result<()> {
        self.add_dependencies(vec![(name.to_string(), handle)])
    }

    /// Registers a batch of named handles. Either every entry is added or,
    /// if any name is taken or repeated within the batch, none is.
    pub(crate) fn add_dependencies(&self, entries: Vec<(String, Handle)>) -> capbus::Result<()> {
        let mut dependencies = lock(&self.dependencies);
        let mut names = BTreeSet::new();
        for (name, _) in &entries {
            if dependencies.contains_key(name) || !names.insert(name.as_str()) {
                return Err(capbus::Error::Duplicate {
                    kind: "dependency",
                    name: name.clone(),
                });
            }
        }
        for (name, handle) in entries {
            debug!(dependency = %name, handle = %handle.id(), "dependency registered");
            dependencies.insert(name, handle);
        }
        Ok(())
    }

    pub(crate) fn dependency(&self, name: &str) -> Option<Handle> {
        lock(&self.dependencies).get(name).cloned()
    }
}

/// Owner of the component and dependency registries
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    pub fn new(transport: Arc<dyn Transport>) -> Result<Manager, ActivatorError> {
        let peer = Peer::new(transport)?;
        Ok(Manager {
            inner: Arc::new(ManagerInner {
                peer,
                interface: component::interface()?,
                components: Mutex::new(BTreeMap::new()),
                dependencies: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    /// The manager's own connection
    pub fn peer(&self) -> &Peer {
        &self.inner.peer
    }

    pub fn interface(&self) -> &Interface {
        &self.inner.interface
    }

    /// Creates a component node implementing the component interface and a
    /// child peer holding a handle to it.
    pub fn add_component(
        &self,
        name: &str,
        dependencies: &[&str],
    ) -> Result<Component, ActivatorError> {
        if lock(&self.inner.components).contains_key(name) {
            return Err(ActivatorError::DuplicateComponent(name.to_string()));
        }

        let info = ComponentInfo {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|dep| dep.to_string()).collect(),
            manager: Arc::downgrade(&self.inner),
        };
        let node = self.inner.peer.create_node(info)?;
        let cloned = node
            .implement(&self.inner.interface)
            .and_then(|()| self.inner.peer.clone_peer(&node.handle()));
        let (peer, handle) = match cloned {
            Ok(cloned) => cloned,
            Err(err) => {
                node.destroy()?;
                return Err(err.into());
            }
        };
        let component = Component {
            name: name.to_string(),
            node: node.clone(),
            peer,
            handle,
        };

        let mut components = lock(&self.inner.components);
        if components.contains_key(name) {
            drop(components);
            component.peer.disconnect();
            node.destroy()?;
            return Err(ActivatorError::DuplicateComponent(name.to_string()));
        }
        components.insert(name.to_string(), component.clone());
        debug!(component = name, node = %node.id(), "component added");
        Ok(component)
    }

    /// Destroys the component's node and closes its connection.
    pub fn remove_component(&self, name: &str) -> Result<(), ActivatorError> {
        let component = lock(&self.inner.components)
            .remove(name)
            .ok_or_else(|| ActivatorError::ComponentNotFound(name.to_string()))?;
        component.peer.disconnect();
        component.node.destroy()?;
        debug!(component = name, "component removed");
        Ok(())
    }

    pub fn component(&self, name: &str) -> Option<Component> {
        lock(&self.inner.components).get(name).cloned()
    }

    /// Component names in lexical order
    pub fn component_names(&self) -> Vec<String> {
        lock(&self.inner.components).keys().cloned().collect()
    }

    pub fn dependency(&self, name: &str) -> Option<Handle> {
        self.inner.dependency(name)
    }

    /// Dependency names in lexical order
    pub fn dependency_names(&self) -> Vec<String> {
        lock(&self.inner.dependencies).keys().cloned().collect()
    }

    /// Dispatches everything queued on the manager's peer.
    pub fn dispatch_pending(&self) -> Result<usize, ActivatorError> {
        Ok(self.inner.peer.dispatch_pending()?)
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("peer", &self.inner.peer.id())
            .field("components", &self.component_names())
            .field("dependencies", &self.dependency_names())
            .finish()
    }
}

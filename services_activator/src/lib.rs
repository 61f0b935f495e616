//! # Activator Service
//!
//! This crate wires components together through capabilities.
//!
//! ## Philosophy
//!
//! A component never looks its dependencies up by name in some global
//! namespace. Instead:
//! - Each component is a node on the manager's peer, with a child peer
//!   holding exactly one handle to it
//! - Dependencies are handed in as handles (`setRootNodes`)
//! - A component asks for what it declared and nothing else
//!   (`getDependencies`)

pub mod component;
pub mod manager;

pub use component::{ComponentInfo, COMPONENT_INTERFACE};
pub use manager::{ActivatorError, Component, Manager};

//! Query trees and operator capabilities.

pub mod capability;
pub mod node;

pub use capability::{Capability, CapabilityDescriptor, CapabilitySet, CursorVariant, Resolver, Rule};
pub use node::{NodeId, NodeSpec, QueryTree};

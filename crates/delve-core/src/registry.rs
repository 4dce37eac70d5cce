//! Assembles the tool set for one agent turn from a capability profile.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::capability::{CapabilityProfile, ToolGroup};
use crate::external::{ExternalTool, ExternalToolRegistry};
use crate::tool_definitions::{create_group_tools, BuiltinTool, ToolDefinition};
use crate::ThreadId;

/// How a descriptor is executed
#[derive(Clone)]
pub enum ToolInvoker {
    Builtin(BuiltinTool),
    External(Arc<dyn ExternalTool>),
}

impl fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolInvoker::Builtin(tool) => f.debug_tuple("Builtin").field(tool).finish(),
            ToolInvoker::External(_) => f.write_str("External(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    pub group: ToolGroup,
    pub invoker: ToolInvoker,
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// Ordered tool list for one turn, unique by name
#[derive(Debug, Clone)]
pub struct ToolSet {
    thread_id: ThreadId,
    tools: Vec<ToolDescriptor>,
}

impl ToolSet {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            tools: Vec::new(),
        }
    }

    /// Add a descriptor. A descriptor with an existing name replaces the
    /// earlier one in place.
    pub fn insert(&mut self, descriptor: ToolDescriptor) {
        match self
            .tools
            .iter_mut()
            .find(|existing| existing.name() == descriptor.name())
        {
            Some(existing) => {
                debug!("Tool '{}' replaced by a later registration", descriptor.name());
                *existing = descriptor;
            }
            None => self.tools.push(descriptor),
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Builds [`ToolSet`]s. Building has no side effects: browser sessions are
/// looked up or created only when a browser tool is invoked.
pub struct ToolRegistryBuilder<'a> {
    external: &'a dyn ExternalToolRegistry,
}

impl<'a> ToolRegistryBuilder<'a> {
    pub fn new(external: &'a dyn ExternalToolRegistry) -> Self {
        Self { external }
    }

    pub fn build(&self, profile: &CapabilityProfile, thread_id: &ThreadId) -> ToolSet {
        let mut set = ToolSet::new(thread_id.clone());

        for group in profile.effective_groups() {
            if group == ToolGroup::ExternalTools {
                for tool in self.external.tools() {
                    set.insert(ToolDescriptor {
                        definition: tool.definition(),
                        group,
                        invoker: ToolInvoker::External(tool),
                    });
                }
                continue;
            }
            for (kind, definition) in create_group_tools(group) {
                set.insert(ToolDescriptor {
                    definition,
                    group,
                    invoker: ToolInvoker::Builtin(kind),
                });
            }
        }

        debug!(
            thread_id = %thread_id,
            tools = set.len(),
            "Built tool set"
        );
        set
    }
}

//! Task registry and composition.
//!
//! A [`Registry`] holds named units of work: *leaf* tasks wrapping a runner
//! closure, and *composite* tasks combining children in [`Compose::Series`]
//! or [`Compose::Parallel`] mode. Composition is declarative; running a name
//! first *lowers* it into a [`Blueprint`], a DAG over the leaf tasks, which
//! the executor then schedules. Cross-cutting producer/consumer constraints
//! (a generated stylesheet fragment consumed by a later compile step) are
//! extra edges applied on top of the lowered graph.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use camino::Utf8PathBuf;
use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::config::{Config, Target};
use crate::error::RegistryError;
use crate::locale::LocaleSet;
use crate::workspace::Workspace;

/// Result from a single executed task.
pub type TaskResult = anyhow::Result<TaskReport>;

/// What a completed task produced.
#[derive(Debug, Default, Clone)]
pub struct TaskReport {
    /// Paths written by the task, relative to the workspace.
    pub written: Vec<Utf8PathBuf>,
}

/// The context passed to every task invocation. Immutable during execution.
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub target: Target,
    /// Resolved output root for this invocation. Usually the target root,
    /// but archive staging substitutes its own directory.
    pub root: Utf8PathBuf,
    pub locales: &'a LocaleSet,
    /// When set, locale fan-out is restricted to this single locale and its
    /// output lands at the root rather than a locale subdirectory.
    pub locale_filter: Option<&'a str>,
    /// Port of the live-reload websocket, if a watch session is active.
    pub port: Option<u16>,
    pub workspace: &'a dyn Workspace,
}

/// The explicit completion contract of a leaf task: a closure returning a
/// [`TaskResult`]. Composition is ordinary control flow over these results,
/// never ad hoc event wiring.
pub type Runner = Arc<dyn Fn(&RunContext) -> TaskResult + Send + Sync>;

/// Composition mode of a composite task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compose {
    /// Children execute strictly in listed order.
    Series,
    /// Children start concurrently; the composite completes after all of
    /// them settle.
    Parallel,
}

enum Entry {
    Leaf(Runner),
    Composite { mode: Compose, children: Vec<String> },
}

impl Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Leaf(_) => write!(f, "Leaf(*)"),
            Entry::Composite { mode, children } => f
                .debug_struct("Composite")
                .field("mode", mode)
                .field("children", children)
                .finish(),
        }
    }
}

/// Named, composable units of work. Names are unique; the composition graph
/// is acyclic by construction since a composite may only reference names
/// registered before it.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
    orderings: Vec<(String, String)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf task.
    pub fn register<F>(&mut self, name: impl Into<String>, runner: F) -> Result<(), RegistryError>
    where
        F: Fn(&RunContext) -> TaskResult + Send + Sync + 'static,
    {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        self.entries.insert(name, Entry::Leaf(Arc::new(runner)));
        Ok(())
    }

    /// Register a composite task. Children must already be registered.
    pub fn compose(
        &mut self,
        name: impl Into<String>,
        mode: Compose,
        children: &[&str],
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        for child in children {
            if !self.entries.contains_key(*child) {
                return Err(RegistryError::Unknown(child.to_string()));
            }
        }

        self.entries.insert(
            name,
            Entry::Composite {
                mode,
                children: children.iter().map(|c| c.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Declare that `producer` must complete before `consumer` starts
    /// whenever both appear in the same lowered graph, regardless of the
    /// composition mode around them.
    pub fn order(&mut self, producer: &str, consumer: &str) -> Result<(), RegistryError> {
        for name in [producer, consumer] {
            if !self.entries.contains_key(name) {
                return Err(RegistryError::Unknown(name.to_string()));
            }
        }

        self.orderings
            .push((producer.to_string(), consumer.to_string()));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Lower a named entry into its execution DAG.
    pub fn lower(&self, name: &str) -> Result<Blueprint, RegistryError> {
        let mut graph = Graph::new();
        let mut nodes = HashMap::new();

        self.lower_into(name, &mut graph, &mut nodes)?;

        for (producer, consumer) in &self.orderings {
            if let (Some(&p), Some(&c)) = (nodes.get(producer), nodes.get(consumer)) {
                graph.update_edge(p, c, ());
            }
        }

        if petgraph::algo::toposort(&graph, None).is_err() {
            return Err(RegistryError::Cycle(name.to_string()));
        }

        Ok(Blueprint { graph })
    }

    /// Returns the boundary nodes of the lowered subgraph: the entry points
    /// with no incoming edge inside it, and the exit points with no outgoing
    /// edge inside it.
    fn lower_into(
        &self,
        name: &str,
        graph: &mut Graph<Step, ()>,
        nodes: &mut HashMap<String, NodeIndex>,
    ) -> Result<(Vec<NodeIndex>, Vec<NodeIndex>), RegistryError> {
        match self.entries.get(name) {
            None => Err(RegistryError::Unknown(name.to_string())),
            Some(Entry::Leaf(runner)) => {
                let index = match nodes.get(name) {
                    Some(&index) => index,
                    None => {
                        let index = graph.add_node(Step {
                            name: name.to_string(),
                            runner: runner.clone(),
                        });
                        nodes.insert(name.to_string(), index);
                        index
                    }
                };

                Ok((vec![index], vec![index]))
            }
            Some(Entry::Composite { mode, children }) => {
                let mut sources = Vec::new();
                let mut sinks = Vec::new();
                let mut prev_sinks: Option<Vec<NodeIndex>> = None;

                for child in children {
                    let (child_sources, child_sinks) = self.lower_into(child, graph, nodes)?;

                    match mode {
                        Compose::Parallel => {
                            sources.extend(&child_sources);
                            sinks.extend(&child_sinks);
                        }
                        Compose::Series => {
                            if let Some(prev) = &prev_sinks {
                                for &a in prev {
                                    for &b in &child_sources {
                                        graph.update_edge(a, b, ());
                                    }
                                }
                            } else {
                                sources = child_sources.clone();
                            }

                            prev_sinks = Some(child_sinks.clone());
                            sinks = child_sinks;
                        }
                    }
                }

                Ok((sources, sinks))
            }
        }
    }
}

/// A lowered execution DAG over leaf tasks.
pub struct Blueprint {
    pub(crate) graph: Graph<Step, ()>,
}

#[derive(Clone)]
pub(crate) struct Step {
    pub name: String,
    pub runner: Runner,
}

impl Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({})", self.name)
    }
}

impl fmt::Display for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let step = &self.graph[index];
            writeln!(f, "    {:?}[\"{}\"]", index.index(), step.name)?;
        }

        for edge in self.graph.edge_indices() {
            let (source, target) = self.graph.edge_endpoints(edge).unwrap();
            writeln!(f, "    {:?} --> {:?}", source.index(), target.index())?;
        }

        Ok(())
    }
}

impl Blueprint {
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|i| self.graph[i].name.as_str())
            .collect()
    }
}

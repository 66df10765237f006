//! Parallel execution of a lowered task graph.
//!
//! Tasks are scheduled as soon as their dependencies complete: a pool of
//! rayon workers executes runners, a channel feeds completions back to the
//! scheduler thread, which decrements dependency counts and spawns newly
//! unblocked nodes immediately.
//!
//! Failure policy is best-effort-continue: a failed task never aborts its
//! parallel siblings, but every transitive dependent reachable through an
//! edge (series order or producer/consumer constraint) is skipped. The host
//! process keeps running either way; only the run summary records the
//! damage.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use camino::Utf8PathBuf;
use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};
use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::task::{Blueprint, RunContext, TaskReport, TaskResult};
use crate::utils::as_overhead;

/// How a single task settled.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The task completed and produced a report.
    Ok(TaskReport),
    /// The task ran and failed; the rendered error is kept for display.
    Failed(String),
    /// A dependency failed, so the task never started.
    Skipped,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

/// Settlement record of every task in one run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub outcomes: BTreeMap<String, Outcome>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.outcomes.values().all(Outcome::is_ok)
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.get(name)
    }

    /// All paths written across successful tasks.
    pub fn written(&self) -> Vec<Utf8PathBuf> {
        self.outcomes
            .values()
            .filter_map(|outcome| match outcome {
                Outcome::Ok(report) => Some(report.written.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

pub(crate) fn run(blueprint: &Blueprint, cx: &RunContext) -> RunSummary {
    let graph = &blueprint.graph;
    let total = graph.node_count();
    let mut summary = RunSummary::default();

    if total == 0 {
        return summary;
    }

    let s = Instant::now();

    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    let mut counts: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|i| (i, graph.neighbors_directed(i, Direction::Incoming).count()))
        .collect();

    let bar = ProgressBar::new(total as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("Error setting progress bar template")
            .progress_chars("#>-"),
    );

    let active = Arc::new(Mutex::new(HashSet::new()));
    let (result_sender, result_receiver) = unbounded::<(NodeIndex, TaskResult)>();

    rayon::scope(|scope| {
        let spawn_task = |index: NodeIndex| {
            let step = graph[index].clone();
            let sender = result_sender.clone();
            let bar = bar.clone();
            let active = active.clone();

            scope.spawn(move |_| {
                {
                    let mut active = active.lock().unwrap();
                    active.insert(step.name.clone());
                    bar.set_message(format_active(&active));
                }

                tracing::info!("Task '{}' started", step.name);
                let result = (step.runner)(cx);

                {
                    let mut active = active.lock().unwrap();
                    active.remove(&step.name);
                    bar.set_message(format_active(&active));
                    bar.inc(1);
                }

                sender.send((index, result)).unwrap();
            });
        };

        for index in graph.node_indices() {
            if counts[&index] == 0 {
                spawn_task(index);
            }
        }

        let mut poisoned: HashSet<NodeIndex> = HashSet::new();
        let mut pending_skips: VecDeque<NodeIndex> = VecDeque::new();
        let mut settled = 0;

        while settled < total {
            let (index, outcome) = if let Some(index) = pending_skips.pop_front() {
                bar.inc(1);
                (index, Outcome::Skipped)
            } else {
                let (index, result) = result_receiver.recv().unwrap();
                let outcome = match result {
                    Ok(report) => Outcome::Ok(report),
                    Err(e) => {
                        tracing::error!("Task '{}':\n{e:?}", graph[index].name);
                        Outcome::Failed(format!("{e:#}"))
                    }
                };
                (index, outcome)
            };

            settled += 1;
            let ok = outcome.is_ok();

            match &outcome {
                Outcome::Skipped => tracing::warn!("Task '{}' skipped", graph[index].name),
                Outcome::Ok(_) => tracing::info!("Task '{}' finished", graph[index].name),
                Outcome::Failed(_) => {}
            }

            summary.outcomes.insert(graph[index].name.clone(), outcome);

            if let Some(next) = dependents.get(&index) {
                for &dependent in next {
                    if !ok {
                        poisoned.insert(dependent);
                    }

                    let count = counts.get_mut(&dependent).unwrap();
                    *count -= 1;

                    if *count == 0 {
                        if poisoned.contains(&dependent) {
                            pending_skips.push_back(dependent);
                        } else {
                            spawn_task(dependent);
                        }
                    }
                }
            }
        }
    });

    bar.finish_with_message(format!("Finished tasks {}", as_overhead(s)));

    summary
}

fn format_active(active: &HashSet<String>) -> String {
    const MAX: usize = 5;
    let mut names: Vec<_> = active.iter().cloned().collect();
    names.sort();

    if names.len() <= MAX {
        names.join(", ")
    } else {
        format!("{}… ({} total)", names[..MAX].join(", "), names.len())
    }
}

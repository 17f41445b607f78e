// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Dependency Graph
//!
//! Builds and analyzes the directed acyclic graph of pipeline stages. One
//! node per stage, one edge from each declared dependency to its
//! dependent. Construction rejects self-loops, unknown dependencies, and
//! cycles; a cyclic configuration is reported with **every** simple cycle
//! it contains, so the author can see all offending paths at once rather
//! than fixing them one rebuild at a time.
//!
//! ## Layers
//!
//! The executor consumes [`StageDag::parallel_groups`]: layer 0 holds the
//! stages with no dependencies, and layer *k+1* holds every stage whose
//! predecessors all sit in layers 0..*k*. Stages within one layer are
//! eligible to run concurrently.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use docflow_domain::{PipelineError, StageConfig};

/// Immutable dependency graph over a pipeline's stages
#[derive(Debug, Clone)]
pub struct StageDag {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    stage_types: HashMap<String, String>,
}

/// One node of the visualization output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    pub stage_type: String,
    pub dependencies: Vec<String>,
}

/// One edge of the visualization output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
}

/// Serializable rendering of the graph for status endpoints and tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagVisualization {
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    pub execution_order: Vec<String>,
}

/// Builds the stage DAG, rejecting malformed and cyclic configurations
pub fn build_dag(stages: &[StageConfig]) -> Result<StageDag, PipelineError> {
    let mut graph = DiGraph::new();
    let mut indices = HashMap::new();
    let mut stage_types = HashMap::new();

    for stage in stages {
        if indices.contains_key(&stage.name) {
            return Err(PipelineError::invalid_config(format!(
                "duplicate stage name '{}'",
                stage.name
            )));
        }
        let idx = graph.add_node(stage.name.clone());
        indices.insert(stage.name.clone(), idx);
        stage_types.insert(stage.name.clone(), stage.stage_type.as_str().to_string());
    }

    for stage in stages {
        let to = indices[&stage.name];
        for dep in &stage.dependencies {
            if dep == &stage.name {
                return Err(PipelineError::invalid_config(format!(
                    "stage '{}' depends on itself",
                    stage.name
                )));
            }
            let from = *indices.get(dep).ok_or_else(|| {
                PipelineError::invalid_config(format!(
                    "stage '{}' has unknown dependency '{}'",
                    stage.name, dep
                ))
            })?;
            graph.add_edge(from, to, ());
        }
    }

    let dag = StageDag {
        graph,
        indices,
        stage_types,
    };

    let cycles = dag.simple_cycles();
    if !cycles.is_empty() {
        let rendered: Vec<String> = cycles
            .iter()
            .map(|cycle| {
                let mut path = cycle.clone();
                path.push(cycle[0].clone());
                path.join(" -> ")
            })
            .collect();
        return Err(PipelineError::CyclicDependency(format!(
            "pipeline contains {} cycle(s): {}",
            cycles.len(),
            rendered.join("; ")
        )));
    }

    debug!(stages = stages.len(), "built stage dag");
    Ok(dag)
}

impl StageDag {
    /// Number of stages in the graph
    pub fn stage_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Topological execution order of all stages
    pub fn execution_order(&self) -> Vec<String> {
        // Construction guarantees acyclicity, so toposort cannot fail here
        petgraph::algo::toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|i| self.graph[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Layered topological order: stages in one layer share a depth and
    /// may run concurrently
    pub fn parallel_groups(&self) -> Vec<Vec<String>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|i| (i, self.graph.neighbors_directed(i, Direction::Incoming).count()))
            .collect();

        let mut groups = Vec::new();
        let mut frontier: Vec<NodeIndex> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| *i)
            .collect();

        while !frontier.is_empty() {
            let mut layer: Vec<String> = frontier.iter().map(|i| self.graph[*i].clone()).collect();
            layer.sort();
            groups.push(layer);

            let mut next = Vec::new();
            for node in frontier {
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    if let Some(degree) = in_degree.get_mut(&succ) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(succ);
                        }
                    }
                }
            }
            frontier = next;
        }

        groups
    }

    /// Names of the stages the given stage depends on
    pub fn predecessors(&self, stage_name: &str) -> Vec<String> {
        self.indices
            .get(stage_name)
            .map(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .map(|i| self.graph[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the stages that depend on the given stage
    pub fn successors(&self, stage_name: &str) -> Vec<String> {
        self.indices
            .get(stage_name)
            .map(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Outgoing)
                    .map(|i| self.graph[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serializable rendering for status endpoints
    pub fn visualize(&self) -> DagVisualization {
        let mut nodes: Vec<DagNode> = self
            .graph
            .node_indices()
            .map(|idx| {
                let id = self.graph[idx].clone();
                let mut dependencies = self.predecessors(&id);
                dependencies.sort();
                DagNode {
                    stage_type: self.stage_types.get(&id).cloned().unwrap_or_default(),
                    id,
                    dependencies,
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<DagEdge> = self
            .graph
            .edge_references()
            .map(|e| DagEdge {
                from: self.graph[e.source()].clone(),
                to: self.graph[e.target()].clone(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        DagVisualization {
            nodes,
            edges,
            execution_order: self.execution_order(),
        }
    }

    /// Enumerates every simple cycle in the graph.
    ///
    /// Each cycle is discovered exactly once from its lexicographically
    /// smallest node, by a depth-first search restricted to nodes at or
    /// after the start node. Configuration graphs are small, so the
    /// exponential worst case is not a concern here.
    fn simple_cycles(&self) -> Vec<Vec<String>> {
        let mut names: Vec<&String> = self.indices.keys().collect();
        names.sort();
        let order: HashMap<&String, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        let mut cycles = Vec::new();
        for start_name in &names {
            let start = self.indices[*start_name];
            let start_rank = order[*start_name];
            let mut path = vec![start];
            let mut on_path = vec![false; self.graph.node_count()];
            on_path[start.index()] = true;
            self.cycle_dfs(start, start, start_rank, &order, &mut path, &mut on_path, &mut cycles);
        }
        cycles
    }

    #[allow(clippy::too_many_arguments)]
    fn cycle_dfs(
        &self,
        start: NodeIndex,
        current: NodeIndex,
        start_rank: usize,
        order: &HashMap<&String, usize>,
        path: &mut Vec<NodeIndex>,
        on_path: &mut Vec<bool>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        for succ in self.graph.neighbors_directed(current, Direction::Outgoing) {
            if succ == start {
                cycles.push(path.iter().map(|i| self.graph[*i].clone()).collect());
                continue;
            }
            let succ_rank = order[&self.graph[succ]];
            if succ_rank <= start_rank || on_path[succ.index()] {
                continue;
            }
            path.push(succ);
            on_path[succ.index()] = true;
            self.cycle_dfs(start, succ, start_rank, order, path, on_path, cycles);
            on_path[succ.index()] = false;
            path.pop();
        }
    }
}

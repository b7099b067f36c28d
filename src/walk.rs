//! Random-walk search model.
//!
//! Every node carries a non-negative value; each expansion produces
//! `branching` children whose value moves up or down by a random step in
//! `1..=10`. Children at `solution_depth` are solutions, and a node's cost is
//! its value, so the best solutions are the walks that end lowest.
//!
//! Randomness is derived from each node's position in the tree rather than
//! from a shared generator, so the tree is the same however the expansion
//! work is split across workers.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::error::Result;
use crate::process::{Arena, NodeId, ProcessConfig, ProcessManager, WorkItem};

const MAX_STEP: u64 = 10;

/// Expansion parameters shared by every worker for one job.
#[derive(Debug, Clone)]
pub struct WalkParameters {
    pub branching: u32,
    pub solution_depth: u32,
    pub seed: u64,
    /// Artificial cost of one expansion.
    pub step_delay: Duration,
}

impl Default for WalkParameters {
    fn default() -> Self {
        Self {
            branching: 10,
            solution_depth: 5,
            seed: 0,
            step_delay: Duration::ZERO,
        }
    }
}

impl WalkParameters {
    pub fn with_branching(mut self, branching: u32) -> Self {
        self.branching = branching;
        self
    }

    pub fn with_solution_depth(mut self, depth: u32) -> Self {
        self.solution_depth = depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

/// Work item of the random walk. The value history lives in the model's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkNode {
    pub id: NodeId,
    pub key: u64,
    pub depth: u32,
    pub value: u64,
    pub is_solution: bool,
}

impl WorkItem for WalkNode {
    fn cost(&self) -> u64 {
        self.value
    }

    fn is_solution(&self) -> bool {
        self.is_solution
    }
}

/// A finished walk: its final cost and the values visited from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkSolution {
    pub cost: u64,
    /// `None` when the arena was reset before the solution was mapped.
    pub path: Option<Vec<u64>>,
}

/// Owns the node arena shared by all expansions.
#[derive(Debug, Default)]
pub struct WalkModel {
    arena: Arena<u64>,
}

impl WalkModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free every node of the previous job and create `count` roots with value 0.
    pub fn roots(&self, count: usize) -> Result<Vec<WalkNode>> {
        self.arena.reset();
        (0..count)
            .map(|i| -> Result<WalkNode> {
                let id = self.arena.insert(0, None)?;
                Ok(WalkNode {
                    id,
                    key: mix(i as u64),
                    depth: 0,
                    value: 0,
                    is_solution: false,
                })
            })
            .collect()
    }

    /// Children of `node`. Nodes freed by a reset expand to nothing.
    pub fn expand(&self, node: &WalkNode, parameters: Option<&WalkParameters>) -> Vec<WalkNode> {
        let default_parameters;
        let parameters = match parameters {
            Some(parameters) => parameters,
            None => {
                default_parameters = WalkParameters::default();
                &default_parameters
            }
        };
        if node.depth >= parameters.solution_depth {
            return Vec::new();
        }
        if !parameters.step_delay.is_zero() {
            std::thread::sleep(parameters.step_delay);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(parameters.seed ^ node.key);
        let depth = node.depth + 1;
        let mut children = Vec::with_capacity(parameters.branching as usize);
        for i in 0..parameters.branching {
            let step = rng.random_range(1..=MAX_STEP);
            let value = if rng.random_bool(0.5) {
                node.value + step
            } else {
                node.value.saturating_sub(step)
            };
            let Ok(id) = self.arena.insert(value, Some(node.id)) else {
                return Vec::new();
            };
            children.push(WalkNode {
                id,
                key: mix(node.key ^ u64::from(i + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                depth,
                value,
                is_solution: depth == parameters.solution_depth,
            });
        }
        children
    }

    pub fn map_solution(&self, node: &WalkNode) -> WalkSolution {
        let path = match self.arena.lineage(node.id) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(%err, cost = node.value, "solution path lost to an arena reset");
                None
            }
        };
        WalkSolution {
            cost: node.value,
            path,
        }
    }

    /// Number of nodes created since the last reset.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Build a process manager expanding this model.
    pub fn manager(
        self: &Arc<Self>,
        config: ProcessConfig,
    ) -> Result<ProcessManager<WalkNode, WalkParameters, WalkSolution>> {
        let expand_model = Arc::clone(self);
        let map_model = Arc::clone(self);
        ProcessManager::new(
            config,
            move |node: &WalkNode, parameters: Option<&WalkParameters>| {
                expand_model.expand(node, parameters)
            },
            move |node: WalkNode| map_model.map_solution(&node),
        )
    }
}

/// SplitMix64 finalizer.
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

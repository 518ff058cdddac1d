//! Canvas layout for workflow graphs
//!
//! Three placement strategies over the same node/edge model: layered
//! breadth-first placement, a Fruchterman–Reingold force simulation and
//! plain grid packing. All of them return positioned clones and leave
//! the input untouched.

use crate::error::ImportError;
use crate::model::{Position, WorkflowEdge, WorkflowNode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use tracing::debug;

/// Tunable layout geometry. Override individual fields with struct
/// update syntax:
///
/// ```
/// use flowcanvas::LayoutConfig;
///
/// let config = LayoutConfig {
///     canvas_width: 1920.0,
///     seed: Some(7),
///     ..LayoutConfig::default()
/// };
/// assert_eq!(config.canvas_height, 800.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub node_width: f64,
    pub node_height: f64,
    pub spacing_x: f64,
    pub spacing_y: f64,
    pub margin: f64,
    /// Iteration budget for the force simulation.
    pub iterations: u32,
    /// Explicit PRNG seed for the force simulation. `None` seeds from
    /// entropy, which makes runs non-reproducible.
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1200.0,
            canvas_height: 800.0,
            node_width: 150.0,
            node_height: 50.0,
            spacing_x: 200.0,
            spacing_y: 150.0,
            margin: 50.0,
            iterations: 50,
            seed: None,
        }
    }
}

/// Placement strategy. Parsing an unknown identifier is a hard error,
/// never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutAlgorithm {
    Hierarchical,
    ForceDirected,
    Grid,
}

impl LayoutAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutAlgorithm::Hierarchical => "hierarchical",
            LayoutAlgorithm::ForceDirected => "force",
            LayoutAlgorithm::Grid => "grid",
        }
    }
}

impl FromStr for LayoutAlgorithm {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hierarchical" => Ok(LayoutAlgorithm::Hierarchical),
            "force" | "force_directed" => Ok(LayoutAlgorithm::ForceDirected),
            "grid" => Ok(LayoutAlgorithm::Grid),
            other => Err(ImportError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Computes a canvas position for every node.
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Place every node and return the positioned clones. The edge list
    /// is read-only input.
    pub fn layout(
        &self,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
        algorithm: LayoutAlgorithm,
        entry_point: &str,
    ) -> Vec<WorkflowNode> {
        debug!(
            algorithm = algorithm.as_str(),
            nodes = nodes.len(),
            edges = edges.len(),
            "computing layout"
        );
        let positions = match algorithm {
            LayoutAlgorithm::Hierarchical => self.hierarchical(nodes, edges, entry_point),
            LayoutAlgorithm::ForceDirected => self.force_directed(nodes, edges),
            LayoutAlgorithm::Grid => self.grid(nodes),
        };
        nodes
            .iter()
            .zip(positions)
            .map(|(node, position)| {
                let mut node = node.clone();
                node.position = Some(position);
                node
            })
            .collect()
    }

    /// Layered placement: BFS depth from the entry point decides the row,
    /// extraction order decides the column. Nodes the entry point cannot
    /// reach share one trailing row.
    fn hierarchical(
        &self,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
        entry_point: &str,
    ) -> Vec<Position> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for edge in edges {
            if let (Some(&from), Some(&to)) =
                (index.get(edge.from.as_str()), index.get(edge.to.as_str()))
            {
                adjacency[from].push(to);
            }
        }

        let mut depth: Vec<Option<usize>> = vec![None; nodes.len()];
        if let Some(&start) = index.get(entry_point) {
            depth[start] = Some(0);
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                let next = depth[current].unwrap_or(0) + 1;
                for &neighbor in &adjacency[current] {
                    if depth[neighbor].is_none() {
                        depth[neighbor] = Some(next);
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        let orphan_depth = depth.iter().flatten().max().map_or(0, |max| max + 1);
        let depths: Vec<usize> = depth
            .into_iter()
            .map(|d| d.unwrap_or(orphan_depth))
            .collect();

        // Layer sizes first, then per-layer running indices.
        let mut layer_sizes: HashMap<usize, usize> = HashMap::new();
        for &d in &depths {
            *layer_sizes.entry(d).or_insert(0) += 1;
        }
        let mut layer_cursor: HashMap<usize, usize> = HashMap::new();
        let y0 = self.config.margin + self.config.node_height / 2.0;
        depths
            .iter()
            .map(|&d| {
                let i = *layer_cursor
                    .entry(d)
                    .and_modify(|c| *c += 1)
                    .or_insert(0);
                let n = layer_sizes[&d] as f64;
                Position {
                    x: (self.config.canvas_width - n * self.config.spacing_x) / 2.0
                        + i as f64 * self.config.spacing_x,
                    y: y0 + d as f64 * self.config.spacing_y,
                }
            })
            .collect()
    }

    /// Fruchterman–Reingold: pairwise repulsion, per-edge attraction,
    /// displacement capped by a linearly cooling temperature.
    fn force_directed(&self, nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Vec<Position> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let config = &self.config;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let lo_x = config.margin;
        let hi_x = config.canvas_width - config.margin;
        let lo_y = config.margin;
        let hi_y = config.canvas_height - config.margin;
        let mut pos: Vec<(f64, f64)> = (0..nodes.len())
            .map(|_| (rng.gen_range(lo_x..=hi_x), rng.gen_range(lo_y..=hi_y)))
            .collect();

        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();
        let links: Vec<(usize, usize)> = edges
            .iter()
            .filter_map(|edge| {
                Some((
                    *index.get(edge.from.as_str())?,
                    *index.get(edge.to.as_str())?,
                ))
            })
            .collect();

        let area = config.canvas_width * config.canvas_height;
        let k = (area / nodes.len() as f64).sqrt();
        let t0 = config.canvas_width / 10.0;

        for iteration in 0..config.iterations {
            let t = t0 * (1.0 - iteration as f64 / config.iterations as f64);
            let mut disp = vec![(0.0_f64, 0.0_f64); nodes.len()];

            for i in 0..nodes.len() {
                for j in (i + 1)..nodes.len() {
                    let dx = pos[i].0 - pos[j].0;
                    let dy = pos[i].1 - pos[j].1;
                    let dist = (dx * dx + dy * dy).sqrt().max(1.0);
                    let force = k * k / dist;
                    let (fx, fy) = (dx / dist * force, dy / dist * force);
                    disp[i].0 += fx;
                    disp[i].1 += fy;
                    disp[j].0 -= fx;
                    disp[j].1 -= fy;
                }
            }

            for &(from, to) in &links {
                if from == to {
                    continue;
                }
                let dx = pos[from].0 - pos[to].0;
                let dy = pos[from].1 - pos[to].1;
                let dist = (dx * dx + dy * dy).sqrt().max(1.0);
                let force = dist * dist / k;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                disp[from].0 -= fx;
                disp[from].1 -= fy;
                disp[to].0 += fx;
                disp[to].1 += fy;
            }

            for i in 0..nodes.len() {
                let (dx, dy) = disp[i];
                let magnitude = (dx * dx + dy * dy).sqrt();
                if magnitude > 0.0 {
                    let step = magnitude.min(t);
                    pos[i].0 += dx / magnitude * step;
                    pos[i].1 += dy / magnitude * step;
                }
                pos[i].0 = pos[i].0.clamp(lo_x, hi_x);
                pos[i].1 = pos[i].1.clamp(lo_y, hi_y);
            }
        }

        pos.into_iter().map(|(x, y)| Position { x, y }).collect()
    }

    /// Row-major packing into `ceil(sqrt(n))` columns. Edges play no part.
    fn grid(&self, nodes: &[WorkflowNode]) -> Vec<Position> {
        let cols = (nodes.len() as f64).sqrt().ceil().max(1.0) as usize;
        let x0 = self.config.margin + self.config.node_width / 2.0;
        let y0 = self.config.margin + self.config.node_height / 2.0;
        (0..nodes.len())
            .map(|i| Position {
                x: x0 + (i % cols) as f64 * self.config.spacing_x,
                y: y0 + (i / cols) as f64 * self.config.spacing_y,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;

    fn chain(ids: &[&str]) -> (Vec<WorkflowNode>, Vec<WorkflowEdge>) {
        let nodes = ids
            .iter()
            .map(|id| WorkflowNode::new(id, NodeType::Custom))
            .collect();
        let edges = ids
            .windows(2)
            .map(|pair| WorkflowEdge::new(pair[0], pair[1]))
            .collect();
        (nodes, edges)
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!(
            "hierarchical".parse::<LayoutAlgorithm>().unwrap(),
            LayoutAlgorithm::Hierarchical
        );
        assert_eq!(
            "force".parse::<LayoutAlgorithm>().unwrap(),
            LayoutAlgorithm::ForceDirected
        );
        assert!(matches!(
            "spiral".parse::<LayoutAlgorithm>(),
            Err(ImportError::UnknownAlgorithm(name)) if name == "spiral"
        ));
    }

    #[test]
    fn test_hierarchical_depths_and_centering() {
        let (nodes, edges) = chain(&["search", "summarize", "respond"]);
        let engine = LayoutEngine::new();
        let placed = engine.layout(&nodes, &edges, LayoutAlgorithm::Hierarchical, "search");

        let config = LayoutConfig::default();
        let center_x = (config.canvas_width - config.spacing_x) / 2.0;
        let y0 = config.margin + config.node_height / 2.0;
        for (depth, node) in placed.iter().enumerate() {
            let position = node.position.as_ref().unwrap();
            assert_eq!(position.x, center_x);
            assert_eq!(position.y, y0 + depth as f64 * config.spacing_y);
        }
    }

    #[test]
    fn test_hierarchical_is_deterministic() {
        let (nodes, edges) = chain(&["a", "b", "c", "d"]);
        let engine = LayoutEngine::new();
        let first = engine.layout(&nodes, &edges, LayoutAlgorithm::Hierarchical, "a");
        let second = engine.layout(&nodes, &edges, LayoutAlgorithm::Hierarchical, "a");
        assert_eq!(first, second);
    }

    #[test]
    fn test_hierarchical_orphans_share_trailing_layer() {
        let (mut nodes, edges) = chain(&["a", "b"]);
        nodes.push(WorkflowNode::new("island", NodeType::Custom));
        nodes.push(WorkflowNode::new("atoll", NodeType::Custom));
        let engine = LayoutEngine::new();
        let placed = engine.layout(&nodes, &edges, LayoutAlgorithm::Hierarchical, "a");

        let config = LayoutConfig::default();
        let orphan_y =
            config.margin + config.node_height / 2.0 + 2.0 * config.spacing_y;
        assert_eq!(placed[2].position.as_ref().unwrap().y, orphan_y);
        assert_eq!(placed[3].position.as_ref().unwrap().y, orphan_y);
        assert_ne!(
            placed[2].position.as_ref().unwrap().x,
            placed[3].position.as_ref().unwrap().x
        );
    }

    #[test]
    fn test_hierarchical_unknown_entry_point_places_everything() {
        let (nodes, edges) = chain(&["a", "b", "c"]);
        let engine = LayoutEngine::new();
        let placed = engine.layout(&nodes, &edges, LayoutAlgorithm::Hierarchical, "nope");
        assert!(placed.iter().all(|node| node.position.is_some()));
    }

    #[test]
    fn test_force_stays_inside_margins() {
        let (nodes, edges) = chain(&["a", "b", "c", "d", "e"]);
        let config = LayoutConfig {
            seed: Some(42),
            ..LayoutConfig::default()
        };
        let engine = LayoutEngine::with_config(config.clone());
        for node in engine.layout(&nodes, &edges, LayoutAlgorithm::ForceDirected, "a") {
            let position = node.position.unwrap();
            assert!(position.x >= config.margin);
            assert!(position.x <= config.canvas_width - config.margin);
            assert!(position.y >= config.margin);
            assert!(position.y <= config.canvas_height - config.margin);
        }
    }

    #[test]
    fn test_force_seeded_runs_are_reproducible() {
        let (nodes, edges) = chain(&["a", "b", "c"]);
        let config = LayoutConfig {
            seed: Some(7),
            ..LayoutConfig::default()
        };
        let engine = LayoutEngine::with_config(config);
        let first = engine.layout(&nodes, &edges, LayoutAlgorithm::ForceDirected, "a");
        let second = engine.layout(&nodes, &edges, LayoutAlgorithm::ForceDirected, "a");
        assert_eq!(first, second);
    }

    #[test]
    fn test_force_single_node_does_not_divide_by_zero() {
        let nodes = vec![WorkflowNode::new("solo", NodeType::Custom)];
        let engine = LayoutEngine::with_config(LayoutConfig {
            seed: Some(1),
            ..LayoutConfig::default()
        });
        let placed = engine.layout(&nodes, &[], LayoutAlgorithm::ForceDirected, "solo");
        let position = placed[0].position.as_ref().unwrap();
        assert!(position.x.is_finite() && position.y.is_finite());
    }

    #[test]
    fn test_grid_columns_and_unique_cells() {
        let ids: Vec<String> = (0..7).map(|i| format!("n{i}")).collect();
        let nodes: Vec<WorkflowNode> = ids
            .iter()
            .map(|id| WorkflowNode::new(id, NodeType::Custom))
            .collect();
        let engine = LayoutEngine::new();
        let placed = engine.layout(&nodes, &[], LayoutAlgorithm::Grid, "");

        // ceil(sqrt(7)) = 3 columns
        let xs: Vec<f64> = placed
            .iter()
            .map(|node| node.position.as_ref().unwrap().x)
            .collect();
        let distinct_x: std::collections::HashSet<u64> =
            xs.iter().map(|x| x.to_bits()).collect();
        assert_eq!(distinct_x.len(), 3);

        let cells: std::collections::HashSet<(u64, u64)> = placed
            .iter()
            .map(|node| {
                let p = node.position.as_ref().unwrap();
                (p.x.to_bits(), p.y.to_bits())
            })
            .collect();
        assert_eq!(cells.len(), nodes.len());
    }

    #[test]
    fn test_empty_graph_layouts_are_empty() {
        let engine = LayoutEngine::new();
        for algorithm in [
            LayoutAlgorithm::Hierarchical,
            LayoutAlgorithm::ForceDirected,
            LayoutAlgorithm::Grid,
        ] {
            assert!(engine.layout(&[], &[], algorithm, "start").is_empty());
        }
    }
}

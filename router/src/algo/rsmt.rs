use eda_common::db::indices::CompId;
use eda_common::geom::dbu::DbU;
use eda_common::geom::point::Point;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Above this many terminals only the spanning tree is computed.
const MAX_I1S_TERMINALS: usize = 40;

#[derive(Clone, Copy, Debug)]
pub struct SteinerTerminal {
    pub x: DbU,
    pub y: DbU,
    pub component: Option<CompId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SteinerNodeKind {
    Terminal,
    Steiner,
}

#[derive(Clone, Debug)]
pub struct SteinerNode {
    pub x: DbU,
    pub y: DbU,
    pub kind: SteinerNodeKind,
    /// Physical anchor; set for terminals, filled for Steiner points at layout time.
    pub component: Option<CompId>,
    /// Indices into `SteinerTree::edges`.
    pub edges: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SteinerEdge {
    pub source: usize,
    pub target: usize,
}

#[derive(Clone, Debug)]
pub struct SteinerTree {
    pub net_name: String,
    pub nodes: Vec<SteinerNode>,
    pub edges: Vec<SteinerEdge>,
}

impl SteinerTree {
    pub fn is_horizontal(&self, edge: &SteinerEdge) -> bool {
        self.nodes[edge.source].y == self.nodes[edge.target].y
    }

    pub fn is_vertical(&self, edge: &SteinerEdge) -> bool {
        !self.is_horizontal(edge) && self.nodes[edge.source].x == self.nodes[edge.target].x
    }

    pub fn length(&self) -> DbU {
        self.edges
            .iter()
            .map(|e| {
                let s = &self.nodes[e.source];
                let t = &self.nodes[e.target];
                (s.x - t.x).abs() + (s.y - t.y).abs()
            })
            .sum()
    }

    pub fn steiner_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind == SteinerNodeKind::Steiner)
            .count()
    }
}

pub trait SteinerSolver {
    fn solve(&self, net_name: &str, terminals: &[SteinerTerminal]) -> SteinerTree;
}

/// Rectilinear spanning tree improved by iterated 1-Steiner insertion over
/// the Hanan grid of the terminals.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rsmt;

/// Prim over the complete rectilinear graph, rooted at point 0. Returns the
/// total length and the `(parent, child)` edges.
fn prim(points: &[Point<DbU>]) -> (DbU, Vec<(usize, usize)>) {
    let n = points.len();
    let mut edges = Vec::with_capacity(n.saturating_sub(1));
    if n < 2 {
        return (0, edges);
    }

    let mut in_tree = vec![false; n];
    let mut queue = PriorityQueue::new();
    queue.push(0usize, Reverse((0 as DbU, 0usize)));
    let mut total = 0;

    while let Some((u, Reverse((dist, parent)))) = queue.pop() {
        in_tree[u] = true;
        if u != 0 {
            total += dist;
            edges.push((parent, u));
        }
        for v in 0..n {
            if !in_tree[v] {
                let d = points[u].manhattan(&points[v]);
                queue.push_increase(v, Reverse((d, u)));
            }
        }
    }
    (total, edges)
}

fn degrees(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut deg = vec![0; n];
    for &(a, b) in edges {
        deg[a] += 1;
        deg[b] += 1;
    }
    deg
}

impl Rsmt {
    /// Steiner points kept after iterated 1-Steiner; `fixed` points come first.
    fn steiner_points(fixed: &[Point<DbU>]) -> Vec<Point<DbU>> {
        let mut xs: Vec<DbU> = fixed.iter().map(|p| p.x).collect();
        let mut ys: Vec<DbU> = fixed.iter().map(|p| p.y).collect();
        xs.sort_unstable();
        xs.dedup();
        ys.sort_unstable();
        ys.dedup();

        let mut points = fixed.to_vec();
        let mut cost = prim(&points).0;

        loop {
            let present: HashSet<Point<DbU>> = points.iter().copied().collect();
            let mut best: Option<(DbU, Point<DbU>)> = None;
            for &x in &xs {
                for &y in &ys {
                    let candidate = Point::new(x, y);
                    if present.contains(&candidate) {
                        continue;
                    }
                    points.push(candidate);
                    let c = prim(&points).0;
                    points.pop();
                    if c < best.map_or(cost, |b| b.0) {
                        best = Some((c, candidate));
                    }
                }
            }
            let Some((c, candidate)) = best else {
                break;
            };
            points.push(candidate);
            cost = c;

            // Steiner points of degree 2 or less never shorten the tree.
            loop {
                let (_, edges) = prim(&points);
                let deg = degrees(points.len(), &edges);
                let useless: Vec<usize> = (fixed.len()..points.len())
                    .filter(|&i| deg[i] <= 2)
                    .collect();
                if useless.is_empty() {
                    break;
                }
                for &i in useless.iter().rev() {
                    points.remove(i);
                }
                cost = prim(&points).0;
            }
        }
        points.split_off(fixed.len())
    }
}

impl SteinerSolver for Rsmt {
    fn solve(&self, net_name: &str, terminals: &[SteinerTerminal]) -> SteinerTree {
        let fixed: Vec<Point<DbU>> = terminals.iter().map(|t| Point::new(t.x, t.y)).collect();
        let steiner = if terminals.len() > 2 && terminals.len() <= MAX_I1S_TERMINALS {
            Self::steiner_points(&fixed)
        } else {
            Vec::new()
        };

        let mut all = fixed;
        all.extend(steiner.iter().copied());
        let (length, mst) = prim(&all);

        let mut nodes: Vec<SteinerNode> = terminals
            .iter()
            .map(|t| SteinerNode {
                x: t.x,
                y: t.y,
                kind: SteinerNodeKind::Terminal,
                component: t.component,
                edges: Vec::new(),
            })
            .collect();
        nodes.extend(steiner.iter().map(|p| SteinerNode {
            x: p.x,
            y: p.y,
            kind: SteinerNodeKind::Steiner,
            component: None,
            edges: Vec::new(),
        }));

        let mut edges = Vec::with_capacity(mst.len());
        for (source, target) in mst {
            let id = edges.len();
            edges.push(SteinerEdge { source, target });
            nodes[source].edges.push(id);
            nodes[target].edges.push(id);
        }

        log::debug!(
            "RSMT \"{}\": {} terminals, {} Steiner points, length {}",
            net_name,
            terminals.len(),
            steiner.len(),
            length
        );
        SteinerTree {
            net_name: net_name.to_string(),
            nodes,
            edges,
        }
    }
}

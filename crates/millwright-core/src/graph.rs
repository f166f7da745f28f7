//! Material-flow connectivity and region partitioning.
//!
//! Every live source entity becomes a node; every reference one entity holds
//! to another (belt outputs, inserter pick and insert targets, machine belt
//! attachments) becomes an undirected link. Connected components are found
//! with a visited-set BFS, so conveyor loops are fine. Components are then
//! balanced: oversized ones are cut along belt-to-belt links only, undersized
//! ones are merged into bins.

use crate::id::{EntityKind, EntityRef, RegionId, SourceId};
use crate::source::SourceWorld;
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

new_key_type! {
    /// Node handle in a [`ConnectivityGraph`].
    pub struct NodeId;
}

/// What a link joins. Only [`LinkKind::BeltChain`] links may cross regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// A belt feeding the next belt.
    BeltChain,
    /// Anything else: a machine attached to a belt or to another machine.
    Machine,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    to: NodeId,
    kind: LinkKind,
}

// ---------------------------------------------------------------------------
// Partition output
// ---------------------------------------------------------------------------

/// The entities of one region, sorted by `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    pub id: RegionId,
    pub members: Vec<EntityRef>,
}

/// A belt whose output lies in another region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BeltHandoff {
    pub from: SourceId,
    pub to: SourceId,
}

/// Disjoint regions covering every node.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub regions: Vec<RegionPlan>,
    pub handoffs: Vec<BeltHandoff>,
    membership: HashMap<EntityRef, RegionId>,
}

impl Partition {
    pub fn region_of(&self, entity: EntityRef) -> Option<RegionId> {
        self.membership.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Size of the largest region.
    pub fn largest(&self) -> usize {
        self.regions.iter().map(|r| r.members.len()).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// ConnectivityGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ConnectivityGraph {
    nodes: SlotMap<NodeId, EntityRef>,
    adjacency: SecondaryMap<NodeId, Vec<Link>>,
    lookup: HashMap<EntityRef, NodeId>,
    /// Directed upstream → downstream belt pairs.
    belt_links: Vec<(EntityRef, EntityRef)>,
    link_count: usize,
}

impl ConnectivityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of every live entity in `world`. References to
    /// missing entities are dropped with a warning.
    pub fn from_world(world: &SourceWorld) -> Self {
        let mut graph = Self::new();
        for kind in EntityKind::ALL {
            for id in world.ids_of(kind) {
                graph.add_node(EntityRef::new(kind, id));
            }
        }

        let entities: Vec<EntityRef> = graph.nodes.values().copied().collect();
        let mut dangling = 0usize;
        for entity in entities {
            for target in world.references(entity) {
                if target == entity {
                    continue;
                }
                if !world.contains(target) {
                    dangling += 1;
                    warn!(from = ?entity, to = ?target, "ignoring reference to missing entity");
                    continue;
                }
                let kind = if entity.kind == EntityKind::Belt && target.kind == EntityKind::Belt {
                    graph.belt_links.push((entity, target));
                    LinkKind::BeltChain
                } else {
                    LinkKind::Machine
                };
                graph.connect(entity, target, kind);
            }
        }
        debug!(
            nodes = graph.node_count(),
            links = graph.link_count,
            dangling,
            "connectivity graph built"
        );
        graph
    }

    /// Add a node for `entity`, returning the existing node if present.
    pub fn add_node(&mut self, entity: EntityRef) -> NodeId {
        if let Some(&node) = self.lookup.get(&entity) {
            return node;
        }
        let node = self.nodes.insert(entity);
        self.adjacency.insert(node, Vec::new());
        self.lookup.insert(entity, node);
        node
    }

    /// Link two entities in both directions. Unknown entities are added.
    pub fn connect(&mut self, a: EntityRef, b: EntityRef, kind: LinkKind) {
        let na = self.add_node(a);
        let nb = self.add_node(b);
        if let Some(links) = self.adjacency.get_mut(na) {
            links.push(Link { to: nb, kind });
        }
        if let Some(links) = self.adjacency.get_mut(nb) {
            links.push(Link { to: na, kind });
        }
        self.link_count += 1;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.link_count
    }

    /// Every link as `(a, b, kind)`, each undirected link listed twice.
    pub fn links(&self) -> impl Iterator<Item = (EntityRef, EntityRef, LinkKind)> + '_ {
        self.adjacency.iter().flat_map(move |(from, links)| {
            links
                .iter()
                .map(move |l| (self.nodes[from], self.nodes[l.to], l.kind))
        })
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Connected components in BFS order, each starting at its lowest node.
    pub fn components(&self) -> Vec<Vec<NodeId>> {
        let mut visited: SecondaryMap<NodeId, bool> = SecondaryMap::with_capacity(self.nodes.len());
        let mut components = Vec::new();
        let mut queue = VecDeque::new();

        for start in self.nodes.keys() {
            if visited.contains_key(start) {
                continue;
            }
            visited.insert(start, true);
            queue.push_back(start);
            let mut component = Vec::new();
            while let Some(node) = queue.pop_front() {
                component.push(node);
                for link in &self.adjacency[node] {
                    if !visited.contains_key(link.to) {
                        visited.insert(link.to, true);
                        queue.push_back(link.to);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    // -----------------------------------------------------------------------
    // Balancing
    // -----------------------------------------------------------------------

    /// Partition into regions holding at most `max_size` entities where the
    /// link structure allows it, merging parts below `min_size`.
    pub fn partition(&self, max_size: usize, min_size: usize) -> Partition {
        let max_size = max_size.max(1);
        let mut parts: Vec<Vec<EntityRef>> = Vec::new();
        let components = self.components();
        let component_count = components.len();

        for component in components {
            if component.len() > max_size {
                parts.extend(self.split(&component, max_size));
            } else {
                parts.push(component.iter().map(|&n| self.nodes[n]).collect());
            }
        }
        for part in &mut parts {
            part.sort_unstable();
        }

        let mut regions = merge_small(parts, min_size, max_size);
        regions.sort_unstable_by_key(|members| members[0]);

        let mut membership = HashMap::with_capacity(self.nodes.len());
        let regions: Vec<RegionPlan> = regions
            .into_iter()
            .enumerate()
            .map(|(i, members)| {
                let id = RegionId(i as u32);
                for &m in &members {
                    membership.insert(m, id);
                }
                RegionPlan { id, members }
            })
            .collect();

        let mut handoffs: Vec<BeltHandoff> = self
            .belt_links
            .iter()
            .filter(|(from, to)| membership.get(from) != membership.get(to))
            .map(|(from, to)| BeltHandoff {
                from: from.id,
                to: to.id,
            })
            .collect();
        handoffs.sort_unstable();

        debug!(
            components = component_count,
            regions = regions.len(),
            handoffs = handoffs.len(),
            "partitioned connectivity graph"
        );
        Partition {
            regions,
            handoffs,
            membership,
        }
    }

    /// Cut one oversized component along belt-chain links.
    ///
    /// Machine links are unioned into clusters that never split. Clusters are
    /// then walked in BFS order over belt-chain links and packed into parts of
    /// at most `max_size`, except where one cluster alone is larger.
    fn split(&self, component: &[NodeId], max_size: usize) -> Vec<Vec<EntityRef>> {
        let position: HashMap<NodeId, usize> =
            component.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let mut sets = DisjointSets::new(component.len());
        for (i, &node) in component.iter().enumerate() {
            for link in &self.adjacency[node] {
                if link.kind == LinkKind::Machine {
                    sets.union(i, position[&link.to]);
                }
            }
        }

        // Clusters numbered by first appearance in BFS order.
        let mut cluster_of = vec![0usize; component.len()];
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        let mut by_root: HashMap<usize, usize> = HashMap::new();
        for (i, slot) in cluster_of.iter_mut().enumerate() {
            let root = sets.find(i);
            let c = *by_root.entry(root).or_insert_with(|| {
                clusters.push(Vec::new());
                clusters.len() - 1
            });
            clusters[c].push(i);
            *slot = c;
        }

        let mut cluster_links: Vec<Vec<usize>> = vec![Vec::new(); clusters.len()];
        for (i, &node) in component.iter().enumerate() {
            for link in &self.adjacency[node] {
                if link.kind == LinkKind::BeltChain {
                    let (a, b) = (cluster_of[i], cluster_of[position[&link.to]]);
                    if a != b {
                        cluster_links[a].push(b);
                    }
                }
            }
        }

        let mut parts = Vec::new();
        let mut current: Vec<EntityRef> = Vec::new();
        let mut seen = vec![false; clusters.len()];
        let mut queue = VecDeque::new();
        for root in 0..clusters.len() {
            if seen[root] {
                continue;
            }
            seen[root] = true;
            queue.push_back(root);
            while let Some(c) = queue.pop_front() {
                let cluster = &clusters[c];
                if cluster.len() > max_size {
                    warn!(
                        size = cluster.len(),
                        max_size, "machine cluster exceeds region size and cannot be cut"
                    );
                }
                if !current.is_empty() && current.len() + cluster.len() > max_size {
                    parts.push(std::mem::take(&mut current));
                }
                current.extend(cluster.iter().map(|&i| self.nodes[component[i]]));
                for &next in &cluster_links[c] {
                    if !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        parts
    }
}

/// Merge parts below `min_size` into bins, in order of their lowest member.
fn merge_small(parts: Vec<Vec<EntityRef>>, min_size: usize, max_size: usize) -> Vec<Vec<EntityRef>> {
    let (mut small, mut out): (Vec<_>, Vec<_>) = parts.into_iter().partition(|p| p.len() < min_size);
    small.sort_unstable_by_key(|p| p[0]);

    let mut bin: Vec<EntityRef> = Vec::new();
    for part in small {
        if !bin.is_empty() && bin.len() + part.len() > max_size {
            out.push(std::mem::take(&mut bin));
        }
        bin.extend(part);
        if bin.len() >= min_size {
            out.push(std::mem::take(&mut bin));
        }
    }
    if !bin.is_empty() {
        out.push(bin);
    }
    for region in &mut out {
        region.sort_unstable();
    }
    out
}

/// Union-find with path halving.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

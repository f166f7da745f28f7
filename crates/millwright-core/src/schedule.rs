//! Phase tree and the bounded worker pool that drains it.
//!
//! A tick is a [`WorkNode::Sequence`] of one [`WorkLeaf`] per phase. The
//! units of a leaf run in any order on up to `workers` threads; the sequence
//! moves to the next leaf only once every unit of the current one has
//! finished. That completion point is the phase barrier.

use crate::id::{EntityKind, RegionId};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

// ---------------------------------------------------------------------------
// Phases and units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    PowerDemand,
    PowerBalance,
    Production,
    Transport,
    Handoff,
    Bookkeeping,
}

impl Phase {
    /// Every phase in tick order.
    pub const ALL: [Phase; 6] = [
        Phase::PowerDemand,
        Phase::PowerBalance,
        Phase::Production,
        Phase::Transport,
        Phase::Handoff,
        Phase::Bookkeeping,
    ];

    /// Phases that run once for the whole universe.
    pub fn is_universe(self) -> bool {
        matches!(
            self,
            Phase::PowerBalance | Phase::Handoff | Phase::Bookkeeping
        )
    }
}

/// Kinds with a production step, in the order their units are emitted.
pub const PRODUCTION_KINDS: [EntityKind; 5] = [
    EntityKind::Assembler,
    EntityKind::Lab,
    EntityKind::Generator,
    EntityKind::Turret,
    EntityKind::Miner,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitTarget {
    /// A whole region, or one kind's pool in it.
    Region {
        region: RegionId,
        kind: Option<EntityKind>,
    },
    Universe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub phase: Phase,
    pub target: UnitTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLeaf {
    pub phase: Phase,
    pub units: Vec<WorkUnit>,
    /// Run the units inline, in order, on the calling thread.
    pub ordered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkNode {
    Leaf(WorkLeaf),
    Sequence(Vec<WorkNode>),
}

impl WorkNode {
    /// Leaves in execution order.
    pub fn leaves(&self) -> Vec<&WorkLeaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a WorkLeaf>) {
        match self {
            WorkNode::Leaf(leaf) => out.push(leaf),
            WorkNode::Sequence(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// The first leaf of `phase`.
    pub fn leaf(&self, phase: Phase) -> Option<&WorkLeaf> {
        self.leaves().into_iter().find(|l| l.phase == phase)
    }

    pub fn unit_count(&self) -> usize {
        self.leaves().iter().map(|l| l.units.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tree assembly
// ---------------------------------------------------------------------------

/// Entity counts per kind of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionShape {
    pub region: RegionId,
    pub counts: [usize; EntityKind::COUNT],
}

impl RegionShape {
    pub fn has(&self, kind: EntityKind) -> bool {
        self.counts[kind.index()] > 0
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// One leaf per phase, in the order given, under a single sequence.
pub fn build_tree(regions: &[RegionShape], phases: &[Phase]) -> WorkNode {
    let leaves: Vec<WorkNode> = phases
        .iter()
        .map(|&phase| {
            let units = if phase.is_universe() {
                vec![WorkUnit {
                    phase,
                    target: UnitTarget::Universe,
                }]
            } else {
                region_units(regions, phase)
            };
            WorkNode::Leaf(WorkLeaf {
                phase,
                units,
                ordered: phase.is_universe(),
            })
        })
        .collect();
    let tree = WorkNode::Sequence(leaves);
    debug!(
        regions = regions.len(),
        units = tree.unit_count(),
        "work tree assembled"
    );
    tree
}

fn region_units(regions: &[RegionShape], phase: Phase) -> Vec<WorkUnit> {
    let unit = |region: RegionId, kind: Option<EntityKind>| WorkUnit {
        phase,
        target: UnitTarget::Region { region, kind },
    };
    match phase {
        Phase::Production => regions
            .iter()
            .flat_map(|shape| {
                PRODUCTION_KINDS
                    .iter()
                    .filter(|&&kind| shape.has(kind))
                    .map(move |&kind| unit(shape.region, Some(kind)))
            })
            .collect(),
        _ => regions
            .iter()
            .filter(|shape| shape.total() > 0)
            .map(|shape| unit(shape.region, None))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Runs one unit of work. Called concurrently from pool workers.
pub trait UnitExecutor: Sync {
    fn execute(&self, unit: &WorkUnit);
}

/// A fixed-size rayon pool that drains work trees leaf by leaf.
pub struct WorkScheduler {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkScheduler")
            .field("workers", &self.workers)
            .finish()
    }
}

impl WorkScheduler {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("millwright-worker-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, tree: &WorkNode, executor: &impl UnitExecutor) {
        match tree {
            WorkNode::Leaf(leaf) => self.run_leaf(leaf, executor),
            WorkNode::Sequence(children) => {
                for child in children {
                    self.run(child, executor);
                }
            }
        }
    }

    /// Drain one leaf. Returns only once every unit has completed.
    pub fn run_leaf(&self, leaf: &WorkLeaf, executor: &impl UnitExecutor) {
        if leaf.ordered || leaf.units.len() <= 1 || self.workers == 1 {
            for unit in &leaf.units {
                executor.execute(unit);
            }
            return;
        }

        let cursor = AtomicUsize::new(0);
        let remaining = AtomicUsize::new(leaf.units.len());
        let threads = self.workers.min(leaf.units.len());
        self.pool.scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|_| {
                    loop {
                        let i = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(unit) = leaf.units.get(i) else {
                            break;
                        };
                        executor.execute(unit);
                        remaining.fetch_sub(1, Ordering::AcqRel);
                    }
                });
            }
        });
        debug_assert_eq!(remaining.load(Ordering::Acquire), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn shape(region: u32, counts: &[(EntityKind, usize)]) -> RegionShape {
        let mut out = RegionShape {
            region: RegionId(region),
            counts: [0; EntityKind::COUNT],
        };
        for &(kind, n) in counts {
            out.counts[kind.index()] = n;
        }
        out
    }

    #[test]
    fn production_gets_one_unit_per_present_kind() {
        let regions = [
            shape(0, &[(EntityKind::Assembler, 3), (EntityKind::Belt, 4)]),
            shape(1, &[(EntityKind::Miner, 1), (EntityKind::Lab, 2)]),
        ];
        let tree = build_tree(&regions, &Phase::ALL);
        let production = tree.leaf(Phase::Production).unwrap();
        let kinds: Vec<_> = production
            .units
            .iter()
            .map(|u| match u.target {
                UnitTarget::Region { region, kind } => (region.0, kind.unwrap()),
                UnitTarget::Universe => panic!("universe unit in production"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, EntityKind::Assembler),
                (1, EntityKind::Lab),
                (1, EntityKind::Miner)
            ]
        );
        assert_eq!(tree.leaf(Phase::Transport).unwrap().units.len(), 2);
        assert!(tree.leaf(Phase::Handoff).unwrap().ordered);
    }

    #[test]
    fn leaves_follow_declared_phase_order() {
        let tree = build_tree(&[], &[Phase::Transport, Phase::Bookkeeping]);
        let phases: Vec<_> = tree.leaves().iter().map(|l| l.phase).collect();
        assert_eq!(phases, vec![Phase::Transport, Phase::Bookkeeping]);
        assert!(tree.leaf(Phase::Production).is_none());
    }

    struct Recorder(Mutex<Vec<WorkUnit>>);

    impl UnitExecutor for Recorder {
        fn execute(&self, unit: &WorkUnit) {
            self.0.lock().unwrap().push(*unit);
        }
    }

    #[test]
    fn every_unit_runs_exactly_once() {
        let regions: Vec<_> = (0..16)
            .map(|r| shape(r, &[(EntityKind::Assembler, 1), (EntityKind::Miner, 1)]))
            .collect();
        let tree = build_tree(&regions, &Phase::ALL);
        let scheduler = WorkScheduler::new(4).unwrap();
        let recorder = Recorder(Mutex::new(Vec::new()));
        scheduler.run(&tree, &recorder);

        let ran = recorder.0.into_inner().unwrap();
        assert_eq!(ran.len(), tree.unit_count());
        let mut seen = std::collections::HashSet::new();
        assert!(ran.iter().all(|u| seen.insert(*u)));
    }
}

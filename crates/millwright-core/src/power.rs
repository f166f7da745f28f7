//! Power network totals.
//!
//! Consumers post demand and generators post offered supply during the
//! demand phase; a single balance unit then turns the totals into two
//! `Fixed64` ratios per network. Consumers scale their progress by the
//! satisfaction ratio, generators scale their fuel burn by the load ratio.

use crate::fixed::{Fixed64, unit_ratio};
use crate::id::PowerNetworkId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Network index of machines not attached to any network; always satisfied.
pub const NO_NETWORK: u32 = u32::MAX;

/// Maps host network ids to dense indices while pools are built.
#[derive(Debug, Clone, Default)]
pub struct PowerIndex {
    ids: Vec<PowerNetworkId>,
    lookup: HashMap<PowerNetworkId, u32>,
}

impl PowerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, network: Option<PowerNetworkId>) -> u32 {
        let Some(id) = network else {
            return NO_NETWORK;
        };
        *self.lookup.entry(id).or_insert_with(|| {
            self.ids.push(id);
            (self.ids.len() - 1) as u32
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn into_grid(self) -> PowerGrid {
        PowerGrid {
            networks: self.ids.iter().map(|_| NetworkTotals::default()).collect(),
        }
    }
}

#[derive(Debug)]
struct NetworkTotals {
    demand: AtomicI64,
    supply: AtomicI64,
    satisfaction: AtomicI64,
    load: AtomicI64,
}

impl Default for NetworkTotals {
    fn default() -> Self {
        Self {
            demand: AtomicI64::new(0),
            supply: AtomicI64::new(0),
            satisfaction: AtomicI64::new(Fixed64::ONE.to_bits()),
            load: AtomicI64::new(0),
        }
    }
}

/// Per-tick totals and ratios of every network seen at build.
#[derive(Debug, Default)]
pub struct PowerGrid {
    networks: Vec<NetworkTotals>,
}

impl PowerGrid {
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    #[inline]
    pub fn post_demand(&self, network: u32, energy: i64) {
        if network != NO_NETWORK && energy != 0 {
            self.networks[network as usize]
                .demand
                .fetch_add(energy, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn post_supply(&self, network: u32, energy: i64) {
        if network != NO_NETWORK && energy != 0 {
            self.networks[network as usize]
                .supply
                .fetch_add(energy, Ordering::Relaxed);
        }
    }

    /// Compute both ratios for every network. Returns the energy actually
    /// delivered to consumers across all networks.
    pub fn balance(&self) -> i64 {
        let mut delivered = 0;
        for net in &self.networks {
            let demand = net.demand.load(Ordering::Relaxed);
            let supply = net.supply.load(Ordering::Relaxed);
            let satisfaction = unit_ratio(supply, demand, Fixed64::ONE);
            let load = unit_ratio(demand, supply, Fixed64::ZERO);
            net.satisfaction.store(satisfaction.to_bits(), Ordering::Relaxed);
            net.load.store(load.to_bits(), Ordering::Relaxed);
            delivered += demand.min(supply);
        }
        delivered
    }

    /// Fraction of demand met on `network`.
    #[inline]
    pub fn satisfaction(&self, network: u32) -> Fixed64 {
        if network == NO_NETWORK {
            return Fixed64::ONE;
        }
        Fixed64::from_bits(self.networks[network as usize].satisfaction.load(Ordering::Relaxed))
    }

    /// Fraction of offered supply drawn on `network`.
    #[inline]
    pub fn load(&self, network: u32) -> Fixed64 {
        if network == NO_NETWORK {
            return Fixed64::ZERO;
        }
        Fixed64::from_bits(self.networks[network as usize].load.load(Ordering::Relaxed))
    }

    pub fn demand(&self, network: u32) -> i64 {
        self.networks
            .get(network as usize)
            .map_or(0, |n| n.demand.load(Ordering::Relaxed))
    }

    pub fn supply(&self, network: u32) -> i64 {
        self.networks
            .get(network as usize)
            .map_or(0, |n| n.supply.load(Ordering::Relaxed))
    }

    /// Zero the demand and supply totals for the next tick. Ratios persist.
    pub fn reset(&self) {
        for net in &self.networks {
            net.demand.store(0, Ordering::Relaxed);
            net.supply.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;

    fn grid_with_one_network() -> (PowerGrid, u32) {
        let mut index = PowerIndex::new();
        let net = index.intern(Some(PowerNetworkId(3)));
        assert_eq!(index.intern(Some(PowerNetworkId(3))), net);
        assert_eq!(index.intern(None), NO_NETWORK);
        (index.into_grid(), net)
    }

    #[test]
    fn undersupplied_network_is_partially_satisfied() {
        let (grid, net) = grid_with_one_network();
        grid.post_demand(net, 200);
        grid.post_supply(net, 50);
        assert_eq!(grid.balance(), 50);
        assert_eq!(grid.satisfaction(net), f64_to_fixed64(0.25));
        assert_eq!(grid.load(net), Fixed64::ONE);
    }

    #[test]
    fn oversupplied_network_reports_load() {
        let (grid, net) = grid_with_one_network();
        grid.post_demand(net, 100);
        grid.post_supply(net, 400);
        grid.balance();
        assert_eq!(grid.satisfaction(net), Fixed64::ONE);
        assert_eq!(grid.load(net), f64_to_fixed64(0.25));
    }

    #[test]
    fn reset_clears_totals_but_keeps_ratios() {
        let (grid, net) = grid_with_one_network();
        grid.post_demand(net, 10);
        grid.balance();
        assert_eq!(grid.satisfaction(net), Fixed64::ZERO);
        grid.reset();
        assert_eq!(grid.demand(net), 0);
        assert_eq!(grid.satisfaction(net), Fixed64::ZERO);
    }

    #[test]
    fn detached_machines_are_always_powered() {
        let (grid, _) = grid_with_one_network();
        grid.post_demand(NO_NETWORK, 1_000);
        assert_eq!(grid.satisfaction(NO_NETWORK), Fixed64::ONE);
    }
}

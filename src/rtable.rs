//! The pheromone routing table: a dense-in-spirit matrix of
//! (destination, neighbor) cells, with neighbor/destination lifecycle and
//! stochastic route selection.
//!
//! Storage follows the "dense pheromone matrix vs sparse map" design
//! note: destination rows and neighbor columns are allocated from two
//! `slab::Slab` free lists (their occupancy *is* the usemap bitset from
//! the original fixed-array design), and cells are a sparse map keyed by
//! `(dest_slot, neighbor_slot)` rather than a fully materialized
//! `MAX_DESTINATIONS x MAX_NEIGHBORS` array.

use std::collections::HashMap;

use itertools::Itertools;
use rand::Rng;
use slab::Slab;

use crate::clock::Time;
use crate::error::Error;
use crate::packet::Address;

pub type Iface = u8;

/// Upper bound on live destination rows, matching the original's
/// `MAX_DESTINATIONS`. Enforced so `add_destination` can fail cleanly
/// instead of growing without bound.
pub const MAX_DESTINATIONS: usize = 1000;
/// Upper bound on live neighbor columns (`MAX_NEIGHBORS` in the original).
pub const MAX_NEIGHBORS: usize = 300;

/// A pheromone or hop-count value that may not have been observed yet.
/// Replaces the original's NaN sentinel so "undefined" cannot silently
/// leak into arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cost
{
	Undefined,
	Defined(f64),
}

impl Cost
{
	pub fn value(self) -> Option<f64>
	{
		match self
		{
			Cost::Undefined => None,
			Cost::Defined(v) => Some(v),
		}
	}
	/// `new = decay*old + (1-decay)*sample`; the first write is the raw
	/// sample, matching the original's "first write is raw" rule.
	fn running_average(self, decay: f64, sample: f64) -> Cost
	{
		match self
		{
			Cost::Undefined => Cost::Defined(sample),
			Cost::Defined(old) => Cost::Defined(decay * old + (1.0 - decay) * sample),
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct RoutingCell
{
	pub pheromone: Cost,
	pub avg_hops: Cost,
	/// Reserved for proactive dissemination; never written by any
	/// operation defined here.
	pub virtual_pheromone: Cost,
	/// Reserved for load-aware routing; never written.
	pub send_pheromone: Cost,
	/// Reserved for load-aware routing; never written.
	pub recv_pheromone: Cost,
}

impl Default for RoutingCell
{
	fn default() -> Self
	{
		RoutingCell
		{
			pheromone: Cost::Undefined,
			avg_hops: Cost::Undefined,
			virtual_pheromone: Cost::Undefined,
			send_pheromone: Cost::Undefined,
			recv_pheromone: Cost::Undefined,
		}
	}
}

struct NeighborRecord
{
	iface: Iface,
	address: Address,
	expires_in: Time,
}

struct DestinationRecord
{
	address: Address,
	expires_in: Time,
	no_broadcast_until: Time,
	/// Non-empty iff this destination is also a 1-hop neighbor.
	neighbors: HashMap<Iface, usize>,
}

pub struct RoutingTable
{
	destinations: Slab<DestinationRecord>,
	neighbors: Slab<NeighborRecord>,
	dest_index: HashMap<Address, usize>,
	neighbor_index: HashMap<(Iface, Address), usize>,
	cells: HashMap<(usize, usize), RoutingCell>,
	nb_expire: Time,
	dst_expire: Time,
}

impl RoutingTable
{
	pub fn new(nb_expire: Time, dst_expire: Time) -> Self
	{
		RoutingTable
		{
			destinations: Slab::new(),
			neighbors: Slab::new(),
			dest_index: HashMap::new(),
			neighbor_index: HashMap::new(),
			cells: HashMap::new(),
			nb_expire,
			dst_expire,
		}
	}

	pub fn destination_count(&self) -> usize
	{
		self.destinations.len()
	}
	pub fn neighbor_count(&self) -> usize
	{
		self.neighbors.len()
	}

	/// Allocates a destination row if absent. Returns `false` only when
	/// the table is at `MAX_DESTINATIONS` capacity; idempotent otherwise.
	pub fn add_destination(&mut self, address: Address) -> bool
	{
		if self.dest_index.contains_key(&address)
		{
			return true;
		}
		if self.destinations.len() >= MAX_DESTINATIONS
		{
			tracing::error!(?address, "destination slot pool exhausted");
			return false;
		}
		let slot = self.destinations.insert(DestinationRecord
		{
			address,
			expires_in: self.dst_expire,
			no_broadcast_until: 0,
			neighbors: HashMap::new(),
		});
		self.dest_index.insert(address, slot);
		tracing::trace!(?address, slot, "destination added");
		true
	}

	/// Removes a destination row, cascading to every neighbor entry still
	/// hanging off it. Idempotent for an absent address.
	pub fn remove_destination(&mut self, address: Address)
	{
		let Some(slot) = self.dest_index.remove(&address) else { return; };
		let ifaces: Vec<Iface> = self.destinations[slot].neighbors.keys().copied().collect();
		for iface in ifaces
		{
			self.remove_neighbor(iface, address);
		}
		self.destinations.remove(slot);
		self.cells.retain(|&(d, _), _| d != slot);
		tracing::trace!(?address, "destination removed");
	}

	/// Allocates a neighbor column if absent (and ensures a destination
	/// row exists for the neighbor's own address). Returns `false` only
	/// when the table is at `MAX_NEIGHBORS` capacity.
	pub fn add_neighbor(&mut self, iface: Iface, address: Address) -> bool
	{
		if self.neighbor_index.contains_key(&(iface, address))
		{
			return true;
		}
		if self.neighbors.len() >= MAX_NEIGHBORS
		{
			tracing::error!(?address, iface, "neighbor slot pool exhausted");
			return false;
		}
		if !self.add_destination(address)
		{
			return false;
		}
		let slot = self.neighbors.insert(NeighborRecord{ iface, address, expires_in: self.nb_expire });
		self.neighbor_index.insert((iface, address), slot);
		let dest_slot = self.dest_index[&address];
		self.destinations[dest_slot].neighbors.insert(iface, slot);
		tracing::trace!(?address, iface, slot, "neighbor added");
		true
	}

	/// Frees a neighbor column and zeros it out of every cell. Idempotent
	/// for an absent (iface, address) pair.
	pub fn remove_neighbor(&mut self, iface: Iface, address: Address)
	{
		let Some(slot) = self.neighbor_index.remove(&(iface, address)) else { return; };
		self.neighbors.remove(slot);
		self.cells.retain(|&(_, n), _| n != slot);
		if let Some(&dest_slot) = self.dest_index.get(&address)
		{
			self.destinations[dest_slot].neighbors.remove(&iface);
		}
		tracing::trace!(?address, iface, "neighbor removed");
	}

	/// Called on every hello: creates the neighbor if unknown, otherwise
	/// refreshes its TTL, and raises the destination TTL to at least the
	/// neighbor TTL.
	pub fn update_neighbor(&mut self, iface: Iface, address: Address) -> bool
	{
		if !self.add_neighbor(iface, address)
		{
			return false;
		}
		let nb_slot = self.neighbor_index[&(iface, address)];
		self.neighbors[nb_slot].expires_in = self.nb_expire;
		let dest_slot = self.dest_index[&address];
		let dest = &mut self.destinations[dest_slot];
		if dest.expires_in < self.nb_expire
		{
			dest.expires_in = self.nb_expire;
		}
		true
	}

	/// Removes every neighbor entry reachable through `iface`, as when an
	/// interface goes down.
	pub fn purge_interface(&mut self, iface: Iface)
	{
		let addresses: Vec<Address> = self.neighbors.iter()
			.filter(|(_, nb)| nb.iface == iface)
			.map(|(_, nb)| nb.address)
			.collect();
		for address in addresses
		{
			self.remove_neighbor(iface, address);
		}
	}

	/// Periodic sweep: ages every destination and its neighbors by
	/// `delta`, removing whatever has expired.
	pub fn update(&mut self, delta: Time)
	{
		let dest_slots: Vec<usize> = self.destinations.iter().map(|(s, _)| s).collect();
		for slot in dest_slots
		{
			if !self.destinations.contains(slot)
			{
				continue;
			}
			let address = self.destinations[slot].address;
			{
				let dest = &mut self.destinations[slot];
				dest.no_broadcast_until = dest.no_broadcast_until.saturating_sub(delta);
				dest.expires_in = dest.expires_in.saturating_sub(delta);
			}
			if self.destinations[slot].expires_in == 0
			{
				self.remove_destination(address);
				continue;
			}
			let nb_slots: Vec<usize> = self.destinations[slot].neighbors.values().copied().collect();
			for nb_slot in &nb_slots
			{
				self.neighbors[*nb_slot].expires_in = self.neighbors[*nb_slot].expires_in.saturating_sub(delta);
			}
			let expired: Vec<(Iface, Address)> = nb_slots.iter()
				.filter(|s| self.neighbors[**s].expires_in == 0)
				.map(|s| (self.neighbors[*s].iface, self.neighbors[*s].address))
				.collect();
			for (iface, nb_address) in expired
			{
				self.remove_neighbor(iface, nb_address);
			}
			if let Some(dest) = self.destinations.get(slot)
			{
				if let Some(max_ttl) = dest.neighbors.values().map(|s| self.neighbors[*s].expires_in).max()
				{
					self.destinations[slot].expires_in = max_ttl;
				}
			}
		}
	}

	/// Folds a returning backward ant's measurement into the (dst, nb)
	/// cell, via the running averages of spec §4.2.
	#[allow(clippy::too_many_arguments)]
	pub fn process_backward_ant(
		&mut self,
		dst: Address,
		iface: Iface,
		nb_addr: Address,
		t_sd: f64,
		hops: u8,
		t_hop: f64,
		alpha: f64,
		gamma: f64,
	) -> Result<(), Error>
	{
		self.add_destination(dst);
		let Some(&nb_slot) = self.neighbor_index.get(&(iface, nb_addr)) else {
			return Err(Error::NeighborDead);
		};
		let dest_slot = self.dest_index[&dst];

		self.destinations[dest_slot].expires_in = self.dst_expire;
		self.neighbors[nb_slot].expires_in = self.nb_expire;

		let t_id = 1.0 / ((t_sd + hops as f64 * t_hop) / 2.0);
		let cell = self.cells.entry((dest_slot, nb_slot)).or_default();
		cell.avg_hops = cell.avg_hops.running_average(alpha, hops as f64);
		cell.pheromone = cell.pheromone.running_average(gamma, t_id);
		tracing::debug!(?dst, iface, ?nb_addr, t_id, hops, "backward ant processed");
		Ok(())
	}

	/// Fast path: is `dst` itself directly reachable? Returns the lowest
	/// interface index it is reachable on, for determinism.
	fn direct_neighbor(&self, dst: Address) -> Option<(Iface, Address)>
	{
		let dest_slot = *self.dest_index.get(&dst)?;
		self.destinations[dest_slot].neighbors.keys().min().map(|&iface| (iface, dst))
	}

	/// Weighted stochastic route selection: `SelectRoute(dst, beta)`.
	/// Iterates neighbors for `dst`'s row in a deterministic order
	/// (ascending neighbor address, then interface) so the same `u` and
	/// pheromone values always pick the same link.
	pub fn select_route<R: Rng + ?Sized>(&self, dst: Address, beta: f64, rng: &mut R) -> Result<(Iface, Address), Error>
	{
		if let Some(direct) = self.direct_neighbor(dst)
		{
			return Ok(direct);
		}
		let Some(&dest_slot) = self.dest_index.get(&dst) else {
			return Err(Error::NoRoute);
		};

		let mut weighted: Vec<((Iface, Address), f64)> = Vec::new();
		let entries = self.neighbors.iter().sorted_by_key(|(_, nb)| (nb.address, nb.iface));
		for (nb_slot, nb) in entries
		{
			if let Some(cell) = self.cells.get(&(dest_slot, nb_slot))
			{
				if let Cost::Defined(pheromone) = cell.pheromone
				{
					if pheromone > 0.0
					{
						weighted.push(((nb.iface, nb.address), pheromone.powf(beta)));
					}
				}
			}
		}
		let total: f64 = weighted.iter().map(|(_, w)| w).sum();
		if weighted.is_empty() || total <= 0.0
		{
			return Err(Error::NoRoute);
		}
		let u: f64 = rng.gen_range(0.0..1.0);
		let mut acc = 0.0;
		for (link, w) in &weighted
		{
			acc += w / total;
			if acc > u
			{
				return Ok(*link);
			}
		}
		// Floating-point accumulation can fall just short of `u`; the last
		// candidate is the correct pick.
		Ok(weighted.last().unwrap().0)
	}

	/// Uniform pick over every known neighbor link, used by repair ants.
	pub fn select_random_route<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(Iface, Address), Error>
	{
		if self.neighbors.is_empty()
		{
			return Err(Error::NoRoute);
		}
		let links: Vec<(Iface, Address)> = self.neighbors.iter().map(|(_, nb)| (nb.iface, nb.address)).sorted().collect();
		let i = rng.gen_range(0..links.len());
		Ok(links[i])
	}

	/// Invalidates the (dst, nb) cell, e.g. on receipt of an error ant.
	pub fn invalidate_cell(&mut self, dst: Address, iface: Iface, nb_addr: Address)
	{
		if let (Some(&dest_slot), Some(&nb_slot)) = (self.dest_index.get(&dst), self.neighbor_index.get(&(iface, nb_addr)))
		{
			self.cells.remove(&(dest_slot, nb_slot));
			tracing::warn!(?dst, iface, ?nb_addr, "cell invalidated");
		}
	}

	pub fn is_broadcast_allowed(&self, dst: Address) -> bool
	{
		match self.dest_index.get(&dst)
		{
			Some(&slot) => self.destinations[slot].no_broadcast_until == 0,
			None => true,
		}
	}

	/// Gate for flooding `dst`: `false` while still inside a previously
	/// opened cooldown window. When broadcast is allowed, (re)starts the
	/// cooldown for `duration` and returns `true`, creating the
	/// destination row if it did not already exist.
	pub fn no_broadcast(&mut self, dst: Address, duration: Time) -> bool
	{
		if !self.is_broadcast_allowed(dst)
		{
			return false;
		}
		if !self.add_destination(dst)
		{
			return false;
		}
		let slot = self.dest_index[&dst];
		self.destinations[slot].no_broadcast_until = duration;
		true
	}
}

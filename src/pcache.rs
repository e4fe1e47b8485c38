//! Pending-packet cache: per-destination FIFO of datagrams awaiting a
//! route, with expiry and exactly-once delivery of either the forward or
//! the error continuation.

use std::collections::HashMap;

use crate::clock::Time;
use crate::packet::Address;
use crate::rtable::Iface;

/// Continuations a cache entry carries so it can be resolved without the
/// cache itself knowing anything about the host IP layer.
pub trait PacketContinuation
{
	/// Called exactly once, when a route to this entry's destination
	/// materializes.
	fn on_forward(self: Box<Self>, iface: Iface, next_hop: Address);
	/// Called exactly once, when the entry expires or is explicitly
	/// invalidated, instead of `on_forward`.
	fn on_error(self: Box<Self>);
}

pub struct CacheEntry
{
	pub iface: Iface,
	pub seq: u64,
	pub payload: Vec<u8>,
	pub received_in: Time,
	pub expire_budget: Time,
	continuation: Box<dyn PacketContinuation>,
}

impl CacheEntry
{
	fn is_live(&self, now: Time) -> bool
	{
		now.saturating_sub(self.received_in) < self.expire_budget
	}
}

/// Maps destination address to an ordered queue of entries awaiting a
/// route to it.
pub struct PacketCache
{
	initial_expire: Time,
	entries: HashMap<Address, Vec<CacheEntry>>,
}

impl PacketCache
{
	pub fn new(initial_expire: Time) -> Self
	{
		PacketCache{ initial_expire, entries: HashMap::new() }
	}

	/// Caches a packet bound for `dst`, with the cache's default expiry
	/// budget. `seq` is the caller's lifecycle-tracking sequence number
	/// for this packet, reported back through `drain_for_route`/
	/// `fail_destination`/`sweep_expired`/`fail_iface`.
	pub fn cache_packet(
		&mut self,
		dst: Address,
		iface: Iface,
		seq: u64,
		payload: Vec<u8>,
		now: Time,
		continuation: Box<dyn PacketContinuation>,
	)
	{
		self.cache_packet_with_expire(dst, iface, seq, payload, now, self.initial_expire, continuation);
	}

	/// As `cache_packet`, but with an explicit expiry budget overriding
	/// the cache's default.
	pub fn cache_packet_with_expire(
		&mut self,
		dst: Address,
		iface: Iface,
		seq: u64,
		payload: Vec<u8>,
		now: Time,
		expire_budget: Time,
		continuation: Box<dyn PacketContinuation>,
	)
	{
		let entry = CacheEntry{ iface, seq, payload, received_in: now, expire_budget, continuation };
		self.entries.entry(dst).or_default().push(entry);
		tracing::trace!(?dst, "packet cached");
	}

	/// Drains every live entry for `dst`, firing `on_forward` via `nb` on
	/// each (expired entries fire `on_error` instead), then clears the
	/// list. Used by the engine once a backward ant completes a route.
	/// Returns each drained entry's `seq` paired with whether it was
	/// forwarded (`true`) or errored for having already expired (`false`).
	pub fn drain_for_route(&mut self, dst: Address, now: Time, iface: Iface, next_hop: Address) -> Vec<(u64, bool)>
	{
		let Some(entries) = self.entries.remove(&dst) else { return Vec::new(); };
		let mut outcomes = Vec::with_capacity(entries.len());
		for entry in entries
		{
			if entry.is_live(now)
			{
				outcomes.push((entry.seq, true));
				entry.continuation.on_forward(iface, next_hop);
			}
			else
			{
				outcomes.push((entry.seq, false));
				entry.continuation.on_error();
			}
		}
		outcomes
	}

	/// Fires `on_error` for every entry cached for `dst` and drops them,
	/// e.g. after a neighbor or route is invalidated. Returns their `seq`s.
	pub fn fail_destination(&mut self, dst: Address) -> Vec<u64>
	{
		match self.entries.remove(&dst)
		{
			Some(entries) => entries.into_iter().map(|entry|
			{
				entry.continuation.on_error();
				entry.seq
			}).collect(),
			None => Vec::new(),
		}
	}

	/// Fires `on_error` for every entry cached behind the now-down
	/// interface `iface` and drops them, leaving entries reachable via
	/// other interfaces untouched. Returns their `seq`s.
	pub fn fail_iface(&mut self, iface: Iface) -> Vec<u64>
	{
		let mut dropped = Vec::new();
		let dsts: Vec<Address> = self.entries.keys().copied().collect();
		for dst in dsts
		{
			let Some(list) = self.entries.remove(&dst) else { continue; };
			let mut survivors = Vec::new();
			for entry in list
			{
				if entry.iface == iface
				{
					dropped.push(entry.seq);
					entry.continuation.on_error();
				}
				else
				{
					survivors.push(entry);
				}
			}
			if !survivors.is_empty()
			{
				self.entries.insert(dst, survivors);
			}
		}
		dropped
	}

	/// The set of destinations with at least one cached entry.
	pub fn destinations(&self) -> Vec<Address>
	{
		self.entries.keys().copied().collect()
	}

	/// Expires stale entries across the whole cache without delivering
	/// them via a route, firing `on_error` for each. Returns their `seq`s.
	pub fn sweep_expired(&mut self, now: Time) -> Vec<u64>
	{
		let mut dropped = Vec::new();
		let dsts: Vec<Address> = self.entries.keys().copied().collect();
		for dst in dsts
		{
			let Some(list) = self.entries.remove(&dst) else { continue; };
			let mut survivors = Vec::new();
			for entry in list
			{
				if entry.is_live(now)
				{
					survivors.push(entry);
				}
				else
				{
					dropped.push(entry.seq);
					entry.continuation.on_error();
				}
			}
			if !survivors.is_empty()
			{
				self.entries.insert(dst, survivors);
			}
		}
		dropped
	}
}

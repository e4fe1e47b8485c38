//! The routing protocol engine: ties the codec, routing table, caches
//! and statistics together behind timers and ant handlers.
//!
//! The engine is single-threaded cooperative (see the concurrency design
//! note): `tick` and `handle_incoming`/`route_output`/`route_input` each
//! run to completion before the next is invoked. Nothing here spawns a
//! thread or awaits; a host embedding this on a real OS wraps one engine
//! instance in a single mutex or dedicates one worker to it.

use std::collections::HashMap;

use rand::Rng;

use crate::clock::{Clock, Time};
use crate::config::Config;
use crate::error::Error;
use crate::fis::FuzzyInference;
use crate::link_cost::LinkCost;
use crate::pcache::{PacketCache, PacketContinuation};
use crate::packet::{Address, AntHeader, MessageType, TypeHeader, BROADCAST};
use crate::rqueue::IncomeQueue;
use crate::rtable::{Iface, RoutingTable};
use crate::stats::{LifecycleTracker, TrafficStats};

pub const MAX_INTERFACES: usize = 10;
pub const ANTHOCNET_PORT: u16 = 5555;

/// The outbound side of the protocol: broadcasting/unicasting encoded
/// frames on an interface, and handing fully-local data up to the host.
/// Kept as a trait so the engine never depends on a concrete socket type.
pub trait Transport
{
	fn send_unicast(&mut self, iface: Iface, to: Address, bytes: &[u8]);
	fn send_broadcast(&mut self, iface: Iface, bytes: &[u8]);
	fn local_deliver(&mut self, payload: &[u8]);
}

/// Outcome of a locally-originated send, mirroring `RouteOutput`'s
/// synchronous "no route / queued / ok" contract. On `Unicast` the
/// payload is handed back for the host to actually transmit on `iface`
/// towards `next_hop`; the engine itself never owns a socket.
pub enum RouteOutputResult
{
	Unicast{ iface: Iface, next_hop: Address, payload: Vec<u8> },
	Queued,
}

pub struct RoutingEngine<C: Clock>
{
	self_addr: Address,
	config: Config,
	rtable: RoutingTable,
	pcache: PacketCache,
	income: IncomeQueue,
	stats: TrafficStats,
	lifecycle: LifecycleTracker,
	clock: C,
	rng: rand::rngs::StdRng,
	link_cost: Box<dyn LinkCost>,
	fis: Option<Box<dyn FuzzyInference>>,
	/// All down until the host reports otherwise via `set_interface_up`,
	/// mirroring the per-interface up/down notifications the IP layer
	/// delivers; a freshly constructed engine owns no live interfaces yet.
	ifaces_up: [bool; MAX_INTERFACES],
	/// Destinations with recent outbound traffic; drives the proactive
	/// ant timer.
	sessions: HashMap<Address, Time>,
	next_hello_due: Time,
	next_sweep_due: Time,
	next_proactive_due: Time,
}

impl<C: Clock> RoutingEngine<C>
{
	pub fn new(self_addr: Address, config: Config, clock: C, rng: rand::rngs::StdRng, link_cost: Box<dyn LinkCost>) -> Self
	{
		let now = clock.now();
		RoutingEngine
		{
			rtable: RoutingTable::new(config.nb_expire, config.session_expire),
			pcache: PacketCache::new(config.dcache_expire),
			income: IncomeQueue::new(64, config.dcache_expire),
			stats: TrafficStats::new(40_000, 5_000),
			lifecycle: LifecycleTracker::new(),
			ifaces_up: [false; MAX_INTERFACES],
			sessions: HashMap::new(),
			next_hello_due: now + config.hello_interval,
			next_sweep_due: now + config.rtable_update_interval,
			next_proactive_due: now + config.pr_ant_interval,
			self_addr,
			config,
			clock,
			rng,
			link_cost,
			fis: None,
		}
	}

	pub fn set_fis(&mut self, fis: Box<dyn FuzzyInference>)
	{
		self.fis = Some(fis);
	}

	pub fn set_interface_up(&mut self, iface: Iface, up: bool)
	{
		self.ifaces_up[iface as usize] = up;
		if !up
		{
			self.rtable.purge_interface(iface);
			for seq in self.pcache.fail_iface(iface)
			{
				self.lifecycle.register_dropped(seq);
			}
		}
	}

	fn cons_beta(&self) -> f64
	{
		match &self.fis
		{
			Some(fis) => fis.eval(self.stats.traffic_symmetry(self.clock.now()), 0.5),
			None => self.config.cons_beta,
		}
	}
	fn prog_beta(&self) -> f64
	{
		self.config.prog_beta
	}

	fn up_ifaces(&self) -> Vec<Iface>
	{
		(0..MAX_INTERFACES as Iface).filter(|&i| self.ifaces_up[i as usize]).collect()
	}

	fn encode(&self, kind: MessageType, header: &AntHeader) -> Vec<u8>
	{
		let mut out = Vec::with_capacity(1 + header.serialized_size());
		TypeHeader(kind).encode(&mut out);
		header.encode(&mut out);
		out
	}

	/// Must be called periodically (more often than any configured
	/// interval) by the host; drains anything buffered by
	/// `enqueue_incoming` before firing whichever timers have come due, so
	/// a hello or ant enqueued this tick is visible to the sweep below.
	pub fn tick(&mut self, transport: &mut impl Transport)
	{
		let now = self.clock.now();
		while let Some(entry) = self.income.dequeue(now)
		{
			if let Err(e) = self.handle_incoming(entry.iface, entry.from, &entry.payload, transport)
			{
				tracing::warn!(?e, "dropping malformed buffered frame");
			}
		}
		if now >= self.next_hello_due
		{
			self.send_hellos(transport);
			self.next_hello_due = now + self.config.hello_interval;
		}
		if now >= self.next_sweep_due
		{
			self.rtable.update(self.config.rtable_update_interval);
			for seq in self.pcache.sweep_expired(now)
			{
				self.lifecycle.register_dropped(seq);
			}
			self.stats.remove_outdated(now);
			self.next_sweep_due = now + self.config.rtable_update_interval;
		}
		if now >= self.next_proactive_due
		{
			self.send_proactive_ants(transport);
			self.next_proactive_due = now + self.config.pr_ant_interval;
		}
	}

	fn send_hellos(&mut self, transport: &mut impl Transport)
	{
		let header = AntHeader
		{
			ttl_or_max_hops: 1,
			hops: 0,
			src: self.self_addr,
			dst: BROADCAST,
			t: 0,
			ant_stack: Vec::new(),
		};
		let bytes = self.encode(MessageType::Hello, &header);
		for iface in self.up_ifaces()
		{
			transport.send_broadcast(iface, &bytes);
		}
	}

	fn send_proactive_ants(&mut self, transport: &mut impl Transport)
	{
		let now = self.clock.now();
		let session_expire = self.config.session_expire;
		let active: Vec<Address> = self.sessions.iter()
			.filter(|(_, &last)| now.saturating_sub(last) < session_expire)
			.map(|(&dst, _)| dst)
			.collect();
		self.sessions.retain(|_, &mut last| now.saturating_sub(last) < session_expire);
		for dst in active
		{
			self.emit_forward_ant(dst, true, transport);
		}
	}

	fn emit_forward_ant(&mut self, dst: Address, proactive: bool, transport: &mut impl Transport)
	{
		let header = AntHeader
		{
			ttl_or_max_hops: self.config.initial_ttl,
			hops: 0,
			src: self.self_addr,
			dst,
			t: 0,
			ant_stack: vec![self.self_addr],
		};
		let kind = if proactive { MessageType::ProactiveForwardAnt } else { MessageType::ForwardAnt };
		let bytes = self.encode(kind, &header);
		if self.rtable.no_broadcast(dst, self.config.no_broadcast)
		{
			for iface in self.up_ifaces()
			{
				transport.send_broadcast(iface, &bytes);
			}
		}
	}

	/// Buffers one inbound frame instead of handling it immediately: for a
	/// host whose socket produces datagrams faster than this single-
	/// threaded engine can process a burst of ants during route discovery.
	/// Drained by `tick`. Returns `false` if the queue is full and its head
	/// entry is still live.
	pub fn enqueue_incoming(&mut self, iface: Iface, from: Address, bytes: Vec<u8>) -> bool
	{
		let now = self.clock.now();
		self.income.enqueue(iface, from, bytes, now)
	}

	/// Handles one inbound frame received on `iface` from `from`,
	/// synchronously and immediately.
	pub fn handle_incoming(&mut self, iface: Iface, from: Address, bytes: &[u8], transport: &mut impl Transport) -> Result<(), Error>
	{
		let (type_header, rest) = TypeHeader::decode(bytes).ok_or(Error::DecodeInvalid("unknown message type"))?;
		let header = AntHeader::decode(rest)?;
		match type_header.0
		{
			MessageType::Hello =>
			{
				header.validate_hello()?;
				self.rtable.update_neighbor(iface, header.src);
				Ok(())
			}
			MessageType::ForwardAnt | MessageType::ProactiveForwardAnt | MessageType::RepairAnt =>
			{
				header.validate_forward()?;
				self.handle_forward(iface, header, type_header.0, transport)
			}
			MessageType::BackwardAnt =>
			{
				header.validate_backward()?;
				self.handle_backward(iface, from, header, transport)
			}
			MessageType::Error => self.handle_error(iface, from, header),
			MessageType::Data =>
			{
				let payload = rest.get(header.serialized_size()..).unwrap_or(&[]).to_vec();
				self.route_input(iface, header.dst, payload, from, transport, None)
			}
		}
	}

	fn handle_forward(&mut self, iface: Iface, mut header: AntHeader, kind: MessageType, transport: &mut impl Transport) -> Result<(), Error>
	{
		if header.dst == self.self_addr
		{
			let next_hop = header.ant_stack.last().copied();
			let bwd = header.into_backward();
			if let Some(next_hop) = next_hop
			{
				let bytes = self.encode(MessageType::BackwardAnt, &bwd);
				transport.send_unicast(iface, next_hop, &bytes);
			}
			return Ok(());
		}

		if !header.forward_update(self.self_addr)
		{
			tracing::trace!("forward ant ttl exhausted, dropping");
			return Ok(());
		}

		let beta = if kind == MessageType::ProactiveForwardAnt { self.prog_beta() } else { self.cons_beta() };
		match self.rtable.select_route(header.dst, beta, &mut self.rng)
		{
			Ok((next_iface, nb)) =>
			{
				let bytes = self.encode(kind, &header);
				transport.send_unicast(next_iface, nb, &bytes);
				Ok(())
			}
			Err(Error::NoRoute) =>
			{
				if self.rtable.no_broadcast(header.dst, self.config.no_broadcast)
				{
					let bytes = self.encode(kind, &header);
					for out_iface in self.up_ifaces()
					{
						transport.send_broadcast(out_iface, &bytes);
					}
				}
				Ok(())
			}
			Err(e) => Err(e),
		}
	}

	fn handle_backward(&mut self, iface: Iface, from: Address, mut header: AntHeader, transport: &mut impl Transport) -> Result<(), Error>
	{
		if header.ant_stack.first().copied() != Some(self.self_addr)
		{
			let err_header = AntHeader
			{
				ttl_or_max_hops: 1,
				hops: 0,
				src: self.self_addr,
				dst: header.dst,
				t: 0,
				ant_stack: Vec::new(),
			};
			let bytes = self.encode(MessageType::Error, &err_header);
			transport.send_unicast(iface, from, &bytes);
			return Err(Error::StaleAnt{ kind: MessageType::BackwardAnt, reason: "stack top is not self" });
		}

		// `from` is the previous hop: one hop closer to `header.src` (the
		// real destination this backward ant is depositing pheromone
		// for, after the src/dst swap in `into_backward`).
		self.rtable.process_backward_ant(
			header.src,
			iface,
			from,
			header.t as f64,
			header.hops,
			self.config.t_hop,
			self.config.alpha,
			self.config.gamma,
		)?;

		// Where to forward the ant next, towards the originator: the
		// entry just after self in the (already-reversed) stack.
		let next_hop = header.peek_dst();

		let t_ind = self.link_cost.cost(0.0);
		header.backward_update(t_ind);

		match next_hop
		{
			None =>
			{
				let now = self.clock.now();
				for (seq, forwarded) in self.pcache.drain_for_route(header.src, now, iface, from)
				{
					if forwarded
					{
						self.lifecycle.register_in_transmission(seq, iface, now);
					}
					else
					{
						self.lifecycle.register_dropped(seq);
					}
				}
			}
			Some(next_hop) =>
			{
				let bytes = self.encode(MessageType::BackwardAnt, &header);
				transport.send_unicast(iface, next_hop, &bytes);
			}
		}
		Ok(())
	}

	fn handle_error(&mut self, iface: Iface, from: Address, header: AntHeader) -> Result<(), Error>
	{
		self.rtable.invalidate_cell(header.dst, iface, from);
		for seq in self.pcache.fail_destination(header.dst)
		{
			self.lifecycle.register_dropped(seq);
		}
		Ok(())
	}

	/// Dispatches a repair ant on an unroutable transit packet: a
	/// constrained forward ant over a uniformly random neighbor link.
	pub fn emit_repair_ant(&mut self, dst: Address, transport: &mut impl Transport) -> Result<(), Error>
	{
		let (iface, nb) = self.rtable.select_random_route(&mut self.rng)?;
		let header = AntHeader
		{
			ttl_or_max_hops: self.config.initial_ttl.min(4),
			hops: 0,
			src: self.self_addr,
			dst,
			t: 0,
			ant_stack: vec![self.self_addr],
		};
		let bytes = self.encode(MessageType::RepairAnt, &header);
		transport.send_unicast(iface, nb, &bytes);
		Ok(())
	}

	/// Called by the host IP layer for locally-originated data.
	pub fn route_output(&mut self, dst: Address, payload: Vec<u8>, continuation: Box<dyn PacketContinuation>, transport: &mut impl Transport) -> RouteOutputResult
	{
		let now = self.clock.now();
		self.sessions.insert(dst, now);
		self.stats.register_tx(self.self_addr, dst, now);
		let seq = self.lifecycle.create_packet(now);
		let beta = self.cons_beta();
		match self.rtable.select_route(dst, beta, &mut self.rng)
		{
			Ok((iface, nb)) =>
			{
				self.lifecycle.register_in_transmission(seq, iface, now);
				RouteOutputResult::Unicast{ iface, next_hop: nb, payload }
			}
			Err(_) =>
			{
				self.pcache.cache_packet(dst, 0, seq, payload, now, continuation);
				self.emit_forward_ant(dst, false, transport);
				RouteOutputResult::Queued
			}
		}
	}

	/// Called for transit data arriving on `iface`; `local_cb` is used
	/// when the packet is self-destined instead of being forwarded.
	pub fn route_input(&mut self, iface: Iface, dst: Address, payload: Vec<u8>, from: Address, transport: &mut impl Transport, continuation: Option<Box<dyn PacketContinuation>>) -> Result<(), Error>
	{
		let now = self.clock.now();
		if dst == self.self_addr
		{
			let seq = self.lifecycle.create_packet(now);
			self.lifecycle.register_received(seq, now);
			transport.local_deliver(&payload);
			return Ok(());
		}
		if self.config.is_blackhole(now) && self.rng.gen_bool(self.config.blackhole_amount.clamp(0.0, 1.0))
		{
			tracing::warn!(?dst, "blackhole mode: dropping transit data");
			let seq = self.lifecycle.create_packet(now);
			self.lifecycle.register_dropped(seq);
			return Ok(());
		}
		let beta = self.cons_beta();
		match self.rtable.select_route(dst, beta, &mut self.rng)
		{
			Ok((out_iface, nb)) =>
			{
				let seq = self.lifecycle.create_packet(now);
				self.lifecycle.register_in_transmission(seq, out_iface, now);
				transport.send_unicast(out_iface, nb, &payload);
				Ok(())
			}
			Err(_) =>
			{
				let seq = self.lifecycle.create_packet(now);
				match continuation
				{
					Some(cb) => self.pcache.cache_packet(dst, iface, seq, payload, now, cb),
					None => self.lifecycle.register_dropped(seq),
				}
				if self.emit_repair_ant(dst, transport).is_err()
				{
					self.emit_forward_ant(dst, false, transport);
				}
				Ok(())
			}
		}
	}

	pub fn rtable(&self) -> &RoutingTable
	{
		&self.rtable
	}
	/// Exposes the injected clock, so hosts driving a `SimClock` (or any
	/// other concrete clock with its own advance method) can move time
	/// forward between calls to `tick`.
	pub fn clock_mut(&mut self) -> &mut C
	{
		&mut self.clock
	}
	pub fn stats(&self) -> &TrafficStats
	{
		&self.stats
	}
	pub fn lifecycle(&mut self) -> &mut LifecycleTracker
	{
		&mut self.lifecycle
	}
}

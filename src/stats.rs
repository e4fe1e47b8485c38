//! Statistics collector: sliding-window traffic bookkeeping for
//! evaluating protocol runs, plus a packet-lifecycle tracker.

use std::collections::HashMap;

use itertools::Itertools;

use crate::clock::Time;
use crate::packet::Address;
use crate::rtable::Iface;

struct TrafficRecord
{
	src: Address,
	dst: Address,
	at: Time,
}

struct NeighborRecord
{
	neighbor: Address,
	at: Time,
}

/// Rolling destination- and neighbor-traffic windows, and the derived
/// symmetry metrics the original module reports for comparing runs.
pub struct TrafficStats
{
	dst_window: Time,
	nb_window: Time,
	dst_traffic: Vec<TrafficRecord>,
	nb_sent: Vec<NeighborRecord>,
	nb_recv: Vec<NeighborRecord>,
}

impl TrafficStats
{
	pub fn new(dst_window: Time, nb_window: Time) -> Self
	{
		TrafficStats{ dst_window, nb_window, dst_traffic: Vec::new(), nb_sent: Vec::new(), nb_recv: Vec::new() }
	}

	pub fn register_tx(&mut self, src: Address, dst: Address, at: Time)
	{
		self.dst_traffic.push(TrafficRecord{ src, dst, at });
	}

	pub fn register_nb_sent(&mut self, neighbor: Address, at: Time)
	{
		self.nb_sent.push(NeighborRecord{ neighbor, at });
	}

	pub fn register_nb_recv(&mut self, neighbor: Address, at: Time)
	{
		self.nb_recv.push(NeighborRecord{ neighbor, at });
	}

	/// Drops entries older than their respective window, as of `now`.
	pub fn remove_outdated(&mut self, now: Time)
	{
		let dst_window = self.dst_window;
		self.dst_traffic.retain(|r| now.saturating_sub(r.at) < dst_window);
		let nb_window = self.nb_window;
		self.nb_sent.retain(|r| now.saturating_sub(r.at) < nb_window);
		self.nb_recv.retain(|r| now.saturating_sub(r.at) < nb_window);
	}

	/// Groups destination traffic by unordered (A, B) pair, computes
	/// `min(nAB, nBA) / (nAB + nBA)` per pair, averages and doubles.
	/// Returns `1.0` when there is no data (perfectly symmetric default).
	pub fn traffic_symmetry(&self, now: Time) -> f64
	{
		let window = self.dst_window;
		let groups: HashMap<(Address, Address), Vec<bool>> = self.dst_traffic.iter()
			.filter(|r| now.saturating_sub(r.at) < window)
			.map(|r| if r.src <= r.dst { ((r.src, r.dst), true) } else { ((r.dst, r.src), false) })
			.into_group_map();
		if groups.is_empty()
		{
			return 1.0;
		}
		let sum: f64 = groups.values().map(|flags|
		{
			let ab = flags.iter().filter(|&&forward| forward).count();
			let ba = flags.len() - ab;
			let total = ab + ba;
			if total == 0 { 1.0 } else { ab.min(ba) as f64 / total as f64 }
		}).sum();
		(2.0 * sum / groups.len() as f64).min(1.0)
	}

	/// `received / (received + sent)` over `neighbor`'s window; `0.5`
	/// when there is no traffic for it yet.
	pub fn nb_traffic_symmetry(&self, neighbor: Address, now: Time) -> f64
	{
		let window = self.nb_window;
		let sent = self.nb_sent.iter().filter(|r| r.neighbor == neighbor && now.saturating_sub(r.at) < window).count();
		let recv = self.nb_recv.iter().filter(|r| r.neighbor == neighbor && now.saturating_sub(r.at) < window).count();
		if sent + recv == 0
		{
			return 0.5;
		}
		recv as f64 / (sent + recv) as f64
	}

	pub fn entry_count(&self) -> usize
	{
		self.dst_traffic.len() + self.nb_sent.len() + self.nb_recv.len()
	}
}

/// Final disposition of a tracked packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus
{
	InTransmission,
	Received,
	Dropped,
}

struct PacketTrack
{
	created_at: Time,
	received_at: Option<Time>,
	status: PacketStatus,
}

struct TransmissionTrack
{
	iface: Iface,
	sent_at: Time,
	/// `true` once a corresponding rx was registered for this hop.
	acknowledged: bool,
}

/// Per-packet lifecycle tracker (created -> in-transmission -> received |
/// dropped) feeding bucketed droprate/delay evaluation, mirroring the
/// original module's packet-and-transmission database.
#[derive(Default)]
pub struct LifecycleTracker
{
	next_seq: u64,
	packets: HashMap<u64, PacketTrack>,
	transmissions: HashMap<u64, Vec<TransmissionTrack>>,
}

impl LifecycleTracker
{
	pub fn new() -> Self
	{
		Self::default()
	}

	pub fn create_packet(&mut self, at: Time) -> u64
	{
		let seq = self.next_seq;
		self.next_seq += 1;
		self.packets.insert(seq, PacketTrack{ created_at: at, received_at: None, status: PacketStatus::InTransmission });
		seq
	}

	pub fn register_in_transmission(&mut self, seq: u64, iface: Iface, at: Time)
	{
		self.transmissions.entry(seq).or_default().push(TransmissionTrack{ iface, sent_at: at, acknowledged: false });
	}

	pub fn register_received(&mut self, seq: u64, at: Time)
	{
		if let Some(p) = self.packets.get_mut(&seq)
		{
			p.status = PacketStatus::Received;
			p.received_at = Some(at);
		}
		if let Some(tx) = self.transmissions.get_mut(&seq).and_then(|v| v.last_mut())
		{
			tx.acknowledged = true;
		}
	}

	pub fn register_dropped(&mut self, seq: u64)
	{
		if let Some(p) = self.packets.get_mut(&seq)
		{
			p.status = PacketStatus::Dropped;
		}
	}

	/// Bucketed droprate and mean end-to-end delay, plus the overall
	/// means across every tracked packet. `UNKNOWN` packets never arise
	/// here (every packet starts `InTransmission`), which is this
	/// implementation's form of treating unknown status as "not
	/// received" for droprate accounting.
	pub fn evaluate(&self, granularity: Time) -> EvaluationReport
	{
		let mut buckets: HashMap<Time, (u32, u32, f64, u32)> = HashMap::new(); // (total, dropped, delay_sum, received)
		for p in self.packets.values()
		{
			let bucket = if granularity == 0 { 0 } else { p.created_at / granularity };
			let entry = buckets.entry(bucket).or_insert((0, 0, 0.0, 0));
			entry.0 += 1;
			match p.status
			{
				PacketStatus::Dropped | PacketStatus::InTransmission => entry.1 += 1,
				PacketStatus::Received =>
				{
					entry.2 += (p.received_at.unwrap() - p.created_at) as f64;
					entry.3 += 1;
				}
			}
		}
		let mut buckets_out: Vec<BucketReport> = buckets.into_iter().map(|(bucket, (total, dropped, delay_sum, received))|
		{
			BucketReport
			{
				bucket,
				droprate: dropped as f64 / total as f64,
				mean_delay: if received == 0 { 0.0 } else { delay_sum / received as f64 },
			}
		}).collect();
		buckets_out.sort_by_key(|b| b.bucket);

		let total = self.packets.len() as f64;
		let dropped_total = self.packets.values().filter(|p| p.status != PacketStatus::Received).count() as f64;
		let (delay_sum, received_total) = self.packets.values().fold((0.0, 0u32), |(sum, n), p|
		{
			match (p.status, p.received_at)
			{
				(PacketStatus::Received, Some(r)) => (sum + (r - p.created_at) as f64, n + 1),
				_ => (sum, n),
			}
		});

		EvaluationReport
		{
			buckets: buckets_out,
			droprate_total_avr: if total == 0.0 { 0.0 } else { dropped_total / total },
			end_to_end_delay_total_avr: if received_total == 0 { 0.0 } else { delay_sum / received_total as f64 },
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct BucketReport
{
	pub bucket: Time,
	pub droprate: f64,
	pub mean_delay: f64,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport
{
	pub buckets: Vec<BucketReport>,
	pub droprate_total_avr: f64,
	pub end_to_end_delay_total_avr: f64,
}

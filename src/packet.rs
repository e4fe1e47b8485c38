//! Wire codec for the ant-packet protocol: the 1-byte type header and the
//! 19-byte (+ stack) `AntHeader` body shared by every ant kind.
//!
//! ```text
//!   0               1               2               3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |    Reserved   | TTL/MaxHops   |   HopCount    |               |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               +
//!  |                   Source IPv4 Address (continued)             |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                     Destination IPv4 Address                  |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                                                               |
//!  |                 Aggregated Time T (8 bytes, BE)               |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |            Ant Stack: (HopCount+1) x IPv4 address             |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::error::Error;

/// A 4-byte network identifier. Not necessarily a real IPv4 address; the
/// engine treats it as an opaque, orderable, equality-comparable key.
pub type Address = [u8; 4];

pub const BROADCAST: Address = [255, 255, 255, 255];

/// The one-byte kind discriminant that precedes every `AntHeader` on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType
{
	ForwardAnt,
	ProactiveForwardAnt,
	BackwardAnt,
	Hello,
	Data,
	RepairAnt,
	Error,
}

impl MessageType
{
	fn to_byte(self) -> u8
	{
		match self
		{
			MessageType::ForwardAnt => 1,
			MessageType::ProactiveForwardAnt => 2,
			MessageType::BackwardAnt => 3,
			MessageType::Hello => 4,
			MessageType::Data => 5,
			MessageType::RepairAnt => 6,
			MessageType::Error => 7,
		}
	}
	fn from_byte(b: u8) -> Option<MessageType>
	{
		Some(match b
		{
			1 => MessageType::ForwardAnt,
			2 => MessageType::ProactiveForwardAnt,
			3 => MessageType::BackwardAnt,
			4 => MessageType::Hello,
			5 => MessageType::Data,
			6 => MessageType::RepairAnt,
			7 => MessageType::Error,
			_ => return None,
		})
	}
}

/// The one-byte type header. Decoding an unknown kind yields `None` from
/// `TypeHeader::decode` rather than an error: an unrecognized byte marks
/// the frame invalid without the codec itself raising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeHeader(pub MessageType);

impl TypeHeader
{
	pub const SIZE: usize = 1;

	pub fn encode(&self, out: &mut Vec<u8>)
	{
		out.push(self.0.to_byte());
	}
	pub fn decode(bytes: &[u8]) -> Option<(TypeHeader, &[u8])>
	{
		let (&b, rest) = bytes.split_first()?;
		MessageType::from_byte(b).map(|kind| (TypeHeader(kind), rest))
	}
}

/// Common body shared by every ant kind: 19 fixed bytes plus `hops+1`
/// stack addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntHeader
{
	pub ttl_or_max_hops: u8,
	pub hops: u8,
	pub src: Address,
	pub dst: Address,
	/// Aggregated cost metric, accumulated hop by hop on the way back.
	pub t: u64,
	/// `hops + 1` addresses recording the path taken so far.
	pub ant_stack: Vec<Address>,
}

impl AntHeader
{
	/// `1` reserved + `1` ttl + `1` hops + `4` src + `4` dst + `8` T.
	pub const FIXED_SIZE: usize = 19;

	pub fn serialized_size(&self) -> usize
	{
		Self::FIXED_SIZE + 4 * self.ant_stack.len()
	}

	pub fn encode(&self, out: &mut Vec<u8>)
	{
		out.push(0); // reserved
		out.push(self.ttl_or_max_hops);
		out.push(self.hops);
		out.extend_from_slice(&self.src);
		out.extend_from_slice(&self.dst);
		out.extend_from_slice(&self.t.to_be_bytes());
		for addr in &self.ant_stack
		{
			out.extend_from_slice(addr);
		}
	}

	pub fn decode(bytes: &[u8]) -> Result<AntHeader, Error>
	{
		if bytes.len() < Self::FIXED_SIZE
		{
			return Err(Error::DecodeInvalid("header shorter than fixed size"));
		}
		let ttl_or_max_hops = bytes[1];
		let hops = bytes[2];
		let mut src = [0u8; 4];
		src.copy_from_slice(&bytes[3..7]);
		let mut dst = [0u8; 4];
		dst.copy_from_slice(&bytes[7..11]);
		let mut t_bytes = [0u8; 8];
		t_bytes.copy_from_slice(&bytes[11..19]);
		let t = u64::from_be_bytes(t_bytes);

		let stack_len = hops as usize + 1;
		let stack_bytes = stack_len * 4;
		if bytes.len() < Self::FIXED_SIZE + stack_bytes
		{
			return Err(Error::DecodeInvalid("ant stack truncated"));
		}
		let mut ant_stack = Vec::with_capacity(stack_len);
		for i in 0..stack_len
		{
			let off = Self::FIXED_SIZE + 4 * i;
			let mut addr = [0u8; 4];
			addr.copy_from_slice(&bytes[off..off + 4]);
			ant_stack.push(addr);
		}
		Ok(AntHeader{ ttl_or_max_hops, hops, src, dst, t, ant_stack })
	}

	/// Hello: ttl == 1, hops == 0, empty stack, destination is broadcast.
	pub fn validate_hello(&self) -> Result<(), Error>
	{
		if self.ttl_or_max_hops != 1 || self.hops != 0 || !self.ant_stack.is_empty() || self.dst != BROADCAST
		{
			return Err(Error::DecodeInvalid("malformed hello"));
		}
		Ok(())
	}

	/// Forward (reactive or proactive): src != dst, non-empty stack
	/// beginning with src.
	pub fn validate_forward(&self) -> Result<(), Error>
	{
		if self.src == self.dst
		{
			return Err(Error::DecodeInvalid("forward ant src equals dst"));
		}
		match self.ant_stack.first()
		{
			Some(first) if *first == self.src => Ok(()),
			_ => Err(Error::DecodeInvalid("forward ant stack does not start with src")),
		}
	}

	/// Backward: ttl_or_max_hops >= hops, stack length == hops + 1.
	pub fn validate_backward(&self) -> Result<(), Error>
	{
		if self.ttl_or_max_hops < self.hops
		{
			return Err(Error::DecodeInvalid("backward ant ttl less than hops"));
		}
		if self.ant_stack.len() != self.hops as usize + 1
		{
			return Err(Error::DecodeInvalid("backward ant stack length mismatch"));
		}
		Ok(())
	}

	/// Appends `self_addr` to the stack, decrements the TTL, and applies
	/// loop elision: if `self_addr` already occurred earlier in the
	/// stack, truncate to that first occurrence instead of growing it.
	/// Returns `false` if the TTL has been exhausted (caller must drop).
	pub fn forward_update(&mut self, self_addr: Address) -> bool
	{
		if let Some(i) = self.ant_stack.iter().position(|a| *a == self_addr)
		{
			self.ant_stack.truncate(i + 1);
			self.hops = i as u8;
		}
		else
		{
			self.ant_stack.push(self_addr);
			self.hops += 1;
		}
		if self.ttl_or_max_hops == 0
		{
			return false;
		}
		self.ttl_or_max_hops -= 1;
		true
	}

	/// Reverses a completed forward ant's stack into a backward ant
	/// ready to be unicast to the previous hop. `src`/`dst` swap so that
	/// `src` names the node this backward ant is depositing pheromone
	/// for (the original forward ant's destination). `t` is reset to
	/// zero and `hops` to the full recorded path length.
	pub fn into_backward(mut self) -> AntHeader
	{
		self.ant_stack.reverse();
		self.hops = self.ant_stack.len() as u8 - 1;
		self.t = 0;
		std::mem::swap(&mut self.src, &mut self.dst);
		self
	}

	/// The address a backward ant, held by the node at the front of its
	/// (already-reversed) stack, must forward to next. `None` once the
	/// stack holds only the originator — the ant has arrived home.
	pub fn peek_dst(&self) -> Option<Address>
	{
		self.ant_stack.get(1).copied()
	}

	/// Pops self (the front of the reversed stack) off, decrements hops,
	/// and folds in this link's estimated cost `t_ind` into the running
	/// `T` total.
	pub fn backward_update(&mut self, t_ind: f64)
	{
		self.t = self.t.saturating_add(t_ind.round().max(0.0) as u64);
		if !self.ant_stack.is_empty()
		{
			self.ant_stack.remove(0);
		}
		self.hops = self.hops.saturating_sub(1);
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn addr(b: u8) -> Address
	{
		[b, b, b, b]
	}

	#[test]
	fn round_trip_forward()
	{
		let header = AntHeader
		{
			ttl_or_max_hops: 15,
			hops: 1,
			src: addr(1),
			dst: addr(9),
			t: 0,
			ant_stack: vec![addr(1), addr(2)],
		};
		let mut bytes = Vec::new();
		TypeHeader(MessageType::ForwardAnt).encode(&mut bytes);
		header.encode(&mut bytes);
		assert_eq!(bytes.len(), TypeHeader::SIZE + header.serialized_size());

		let (kind, rest) = TypeHeader::decode(&bytes).unwrap();
		assert_eq!(kind.0, MessageType::ForwardAnt);
		let decoded = AntHeader::decode(rest).unwrap();
		assert_eq!(decoded, header);
		assert!(decoded.validate_forward().is_ok());
	}

	#[test]
	fn unknown_type_byte_is_invalid()
	{
		assert!(TypeHeader::decode(&[200]).is_none());
	}

	#[test]
	fn loop_elision_truncates_to_first_occurrence()
	{
		// stack [A,B,C,B] then Update(self=B's spec example uses "self"
		// distinct from any prior hop); here we reproduce spec scenario 5:
		// inbound stack [A,B,C,B,self], Update(self) -> [A,B,self], hops=2.
		let a = addr(1);
		let b = addr(2);
		let c = addr(3);
		let me = addr(9);
		let mut header = AntHeader
		{
			ttl_or_max_hops: 16,
			hops: 4,
			src: a,
			dst: addr(0),
			t: 0,
			ant_stack: vec![a, b, c, b, me],
		};
		// self (`me`) is not yet in the stack in this framing: the peer
		// that relays last pushes itself via forward_update. Simulate a
		// node literally named `b` re-processing this ant.
		let ok = header.forward_update(b);
		assert!(ok);
		assert_eq!(header.ant_stack, vec![a, b]);
		assert_eq!(header.hops, 1);
	}

	#[test]
	fn backward_from_forward_reverses_stack()
	{
		let a = addr(1);
		let b = addr(2);
		let c = addr(3);
		let fwd = AntHeader
		{
			ttl_or_max_hops: 10,
			hops: 2,
			src: a,
			dst: c,
			t: 0,
			ant_stack: vec![a, b, c],
		};
		let bwd = fwd.into_backward();
		assert_eq!(bwd.ant_stack, vec![c, b, a]);
		assert_eq!(bwd.hops, 2);
		assert_eq!(bwd.peek_dst(), Some(b));
		assert_eq!(bwd.src, c);
		assert_eq!(bwd.dst, a);
	}

	use proptest::prelude::*;

	fn arb_address() -> impl Strategy<Value = Address>
	{
		any::<[u8; 4]>()
	}

	proptest!
	{
		/// Serialize then deserialize any header ⇒ structurally equal, and
		/// the encoded length matches `serialized_size`.
		#[test]
		fn round_trip_any_header(
			ttl_or_max_hops in any::<u8>(),
			src in arb_address(),
			dst in arb_address(),
			t in any::<u64>(),
			stack in prop::collection::vec(arb_address(), 1..20),
		)
		{
			let header = AntHeader
			{
				ttl_or_max_hops,
				hops: (stack.len() - 1) as u8,
				src,
				dst,
				t,
				ant_stack: stack,
			};
			let mut bytes = Vec::new();
			header.encode(&mut bytes);
			prop_assert_eq!(bytes.len(), header.serialized_size());
			let decoded = AntHeader::decode(&bytes).unwrap();
			prop_assert_eq!(decoded, header);
		}

		/// `TypeHeader` round-trips for every known message kind.
		#[test]
		fn round_trip_type_header(kind_byte in 1u8..8)
		{
			let kind = MessageType::from_byte(kind_byte).expect("1..8 covers every variant");
			let mut bytes = Vec::new();
			TypeHeader(kind).encode(&mut bytes);
			let (decoded, rest) = TypeHeader::decode(&bytes).unwrap();
			prop_assert_eq!(decoded.0, kind);
			prop_assert!(rest.is_empty());
		}
	}
}

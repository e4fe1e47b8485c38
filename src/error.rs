//! Crate-wide error taxonomy.
//!
//! The failure kinds mirror the "Error handling design" section of the
//! routing-core spec: most of them are not exceptional in the ants'
//! lifecycle (a stale ant, a full cache) and callers are expected to match
//! on the variant rather than just log-and-bail.

use crate::packet::MessageType;

#[derive(Debug, thiserror::Error)]
pub enum Error
{
	/// A decoded header failed its per-kind validity rule.
	#[error("decode invalid: {0}")]
	DecodeInvalid(&'static str),

	/// An ant whose stack top is not self, or that claims an impossible
	/// link (e.g. a backward ant returning via an unknown neighbor).
	#[error("stale ant of kind {kind:?}: {reason}")]
	StaleAnt
	{
		kind: MessageType,
		reason: &'static str,
	},

	/// No defined pheromone cell for this destination right now.
	#[error("no route to destination")]
	NoRoute,

	/// The pending-packet cache rejected an insert; its tail is full and
	/// the head entry has not yet expired.
	#[error("pending-packet cache full")]
	CacheFull,

	/// The routing table cell for this (destination, neighbor) pair was
	/// invalidated, typically by an error ant or a TTL sweep.
	#[error("neighbor is dead")]
	NeighborDead,

	/// The interface this operation targeted is administratively down.
	#[error("interface down")]
	InterfaceDown,

	/// The destination or neighbor slot pool is exhausted.
	#[error("slot pool exhausted: {0}")]
	SlotsExhausted(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

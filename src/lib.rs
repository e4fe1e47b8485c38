/*!
anthocnet-core
==============

Core protocol engine for AntHocNet, a bio-inspired reactive routing
protocol for mobile ad-hoc networks built on ant-colony pheromone
tables rather than a link-state or distance-vector database.

# Usage

This crate is `anthocnet-core`. It provides the wire codec, pheromone
routing table, pending-packet cache, and the [`engine::RoutingEngine`]
that ties them together behind a host-supplied [`clock::Clock`] and
[`engine::Transport`]. It does not open sockets or spawn threads: a
host embeds one `RoutingEngine` per node and drives it by calling
`tick` periodically and `handle_incoming`/`route_output`/`route_input`
as frames and local traffic arrive.

# Modules

* [`packet`] — the type header and `AntHeader` wire format shared by
  every ant kind, plus loop elision and the forward/backward stack
  transforms.
* [`rtable`] — the pheromone routing table: neighbors, destinations,
  and the sparse (destination, neighbor) pheromone/hop-count cells.
* [`pcache`] — the pending-packet cache consulted while a route is
  being discovered.
* [`rqueue`] — the bounded inbound queue a host can buffer into instead
  of dispatching a frame immediately; drained by `engine::RoutingEngine::tick`.
* [`stats`] — traffic symmetry and packet lifecycle accounting.
* [`config`] — tunable protocol parameters and their defaults.
* [`clock`] — the injectable time source.
* [`link_cost`] — the injectable per-link cost estimator.
* [`fis`] — the fuzzy-inference seam for tuning route-selection
  exponents.
* [`error`] — the crate's error taxonomy.
* [`engine`] — the `RoutingEngine` and `Transport` trait.
*/

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fis;
pub mod link_cost;
pub mod packet;
pub mod pcache;
pub mod rqueue;
pub mod rtable;
pub mod stats;

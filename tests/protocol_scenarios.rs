//! End-to-end scenarios driving one or more `RoutingEngine`s through
//! their public interface, no internal field access.

use std::cell::RefCell;
use std::rc::Rc;

use anthocnet_core::clock::SimClock;
use anthocnet_core::config::Config;
use anthocnet_core::engine::{RouteOutputResult, RoutingEngine, Transport};
use anthocnet_core::link_cost::TurnaroundCost;
use anthocnet_core::packet::{Address, AntHeader, MessageType, TypeHeader, BROADCAST};
use anthocnet_core::pcache::PacketContinuation;
use anthocnet_core::rtable::Iface;
use rand::SeedableRng;

fn addr(b: u8) -> Address
{
	[b, b, b, b]
}

/// Installs a test-scoped subscriber so the `tracing` calls the engine
/// makes while these scenarios run are actually observable (`RUST_LOG=
/// anthocnet_core=trace cargo test -- --nocapture`), instead of being
/// dropped for lack of any subscriber.
fn init_tracing()
{
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

#[derive(Default)]
struct RecordingTransport
{
	sent: Vec<(bool, Iface, Option<Address>, Vec<u8>)>,
	delivered: Vec<Vec<u8>>,
}

impl Transport for RecordingTransport
{
	fn send_unicast(&mut self, iface: Iface, to: Address, bytes: &[u8])
	{
		self.sent.push((false, iface, Some(to), bytes.to_vec()));
	}
	fn send_broadcast(&mut self, iface: Iface, bytes: &[u8])
	{
		self.sent.push((true, iface, None, bytes.to_vec()));
	}
	fn local_deliver(&mut self, payload: &[u8])
	{
		self.delivered.push(payload.to_vec());
	}
}

fn make_engine(self_addr: Address, seed: u64) -> RoutingEngine<SimClock>
{
	init_tracing();
	let cfg = Config::default();
	let clock = SimClock::new();
	let rng = rand::rngs::StdRng::seed_from_u64(seed);
	let mut engine = RoutingEngine::new(self_addr, cfg, clock, rng, Box::new(TurnaroundCost::new(0.7)));
	engine.set_interface_up(0, true);
	engine
}

fn hello_bytes(from: Address) -> Vec<u8>
{
	let header = AntHeader{ ttl_or_max_hops: 1, hops: 0, src: from, dst: BROADCAST, t: 0, ant_stack: vec![] };
	let mut bytes = Vec::new();
	TypeHeader(MessageType::Hello).encode(&mut bytes);
	header.encode(&mut bytes);
	bytes
}

/// Hands a hello from `from` to `engine` on `iface`, as if received over
/// the air, establishing the neighbor relationship.
fn exchange_hello(engine: &mut RoutingEngine<SimClock>, iface: Iface, from: Address)
{
	let bytes = hello_bytes(from);
	let mut sink = RecordingTransport::default();
	engine.handle_incoming(iface, from, &bytes, &mut sink).unwrap();
}

struct NoopContinuation;
impl PacketContinuation for NoopContinuation
{
	fn on_forward(self: Box<Self>, _iface: Iface, _next_hop: Address) {}
	fn on_error(self: Box<Self>) {}
}

#[test]
fn three_node_line_converges_to_unicast_routing()
{
	let (a, b, c) = (addr(1), addr(2), addr(3));
	let mut node_a = make_engine(a, 1);
	let mut node_b = make_engine(b, 2);
	let mut node_c = make_engine(c, 3);

	exchange_hello(&mut node_a, 0, b);
	exchange_hello(&mut node_b, 0, a);
	exchange_hello(&mut node_b, 0, c);
	exchange_hello(&mut node_c, 0, b);

	let mut transport_a = RecordingTransport::default();
	let result = node_a.route_output(c, vec![42], Box::new(NoopContinuation), &mut transport_a);
	assert!(matches!(result, RouteOutputResult::Queued));
	assert!(transport_a.sent.iter().any(|(bcast, ..)| *bcast), "A must broadcast the forward ant");
	let (_, _, _, fwd_bytes) = transport_a.sent.last().unwrap().clone();

	let mut transport_b = RecordingTransport::default();
	node_b.handle_incoming(0, a, &fwd_bytes, &mut transport_b).unwrap();
	let (_, _, _, relayed_bytes) = transport_b.sent.last().unwrap().clone();

	let mut transport_c = RecordingTransport::default();
	node_c.handle_incoming(0, b, &relayed_bytes, &mut transport_c).unwrap();
	let (is_broadcast, _, to, bwd_bytes) = transport_c.sent.last().unwrap().clone();
	assert!(!is_broadcast, "the backward ant must be unicast to the previous hop");
	assert_eq!(to, Some(b));

	let mut transport_b2 = RecordingTransport::default();
	node_b.handle_incoming(0, c, &bwd_bytes, &mut transport_b2).unwrap();
	let (_, _, to2, bwd_bytes2) = transport_b2.sent.last().unwrap().clone();
	assert_eq!(to2, Some(a));

	let mut transport_a2 = RecordingTransport::default();
	node_a.handle_incoming(0, b, &bwd_bytes2, &mut transport_a2).unwrap();

	let mut rng = rand::rngs::StdRng::seed_from_u64(1);
	let route = node_a.rtable().select_route(c, 20.0, &mut rng).unwrap();
	assert_eq!(route, (0, b));

	// Subsequent data resolves synchronously to a unicast route, never a
	// broadcast, with the payload handed straight back for the host to send.
	let mut transport_a3 = RecordingTransport::default();
	let result = node_a.route_output(c, vec![7], Box::new(NoopContinuation), &mut transport_a3);
	match result
	{
		RouteOutputResult::Unicast{ iface, next_hop, payload } =>
		{
			assert_eq!((iface, next_hop), (0, b));
			assert_eq!(payload, vec![7]);
		}
		RouteOutputResult::Queued => panic!("expected an immediate unicast route, not a queue"),
	}
	assert!(transport_a3.sent.is_empty(), "route_output never touches the transport on a cache hit");
}

#[test]
fn hello_expires_without_refresh()
{
	let mut node_a = make_engine(addr(1), 4);
	exchange_hello(&mut node_a, 0, addr(9));
	assert_eq!(node_a.rtable().neighbor_count(), 1);

	let mut sink = RecordingTransport::default();
	for _ in 0..3
	{
		node_a.clock_mut().advance(1000);
		node_a.tick(&mut sink);
	}
	assert_eq!(node_a.rtable().neighbor_count(), 0);

	let mut rng = rand::rngs::StdRng::seed_from_u64(1);
	assert!(node_a.rtable().select_route(addr(9), 20.0, &mut rng).is_err());
}

#[test]
fn broadcast_gate_suppresses_second_flood()
{
	let mut node_a = make_engine(addr(1), 5);
	let unknown = addr(99);

	let mut transport1 = RecordingTransport::default();
	node_a.route_output(unknown, vec![1], Box::new(NoopContinuation), &mut transport1);
	let broadcasts1 = transport1.sent.iter().filter(|(bcast, ..)| *bcast).count();
	assert_eq!(broadcasts1, 1);

	let mut transport2 = RecordingTransport::default();
	node_a.route_output(unknown, vec![2], Box::new(NoopContinuation), &mut transport2);
	let broadcasts2 = transport2.sent.iter().filter(|(bcast, ..)| *bcast).count();
	assert_eq!(broadcasts2, 0, "second RouteOutput within no_broadcast window must not re-flood");
}

#[test]
fn cache_expiry_fires_error_callback_once()
{
	let mut node_a = make_engine(addr(1), 6);
	let unreachable = addr(250);

	let fired_ok = Rc::new(RefCell::new(0u32));
	let fired_err = Rc::new(RefCell::new(0u32));
	struct Counting
	{
		ok: Rc<RefCell<u32>>,
		err: Rc<RefCell<u32>>,
	}
	impl PacketContinuation for Counting
	{
		fn on_forward(self: Box<Self>, _iface: Iface, _next_hop: Address) { *self.ok.borrow_mut() += 1; }
		fn on_error(self: Box<Self>) { *self.err.borrow_mut() += 1; }
	}

	let mut transport = RecordingTransport::default();
	node_a.route_output(
		unreachable,
		vec![1, 2, 3],
		Box::new(Counting{ ok: fired_ok.clone(), err: fired_err.clone() }),
		&mut transport,
	);

	// dcache_expire default is 5000 ticks; the sweep runs every
	// rtable_update_interval (1000 ticks), so run well past it.
	for _ in 0..8
	{
		node_a.clock_mut().advance(1000);
		node_a.tick(&mut transport);
	}

	assert_eq!(*fired_ok.borrow(), 0);
	assert_eq!(*fired_err.borrow(), 1);
}

#[test]
fn buffered_hello_is_drained_on_tick()
{
	let mut node_a = make_engine(addr(1), 7);
	let bytes = hello_bytes(addr(9));
	assert!(node_a.enqueue_incoming(0, addr(9), bytes));
	assert_eq!(node_a.rtable().neighbor_count(), 0, "buffered frame must not be processed before a tick");

	let mut sink = RecordingTransport::default();
	node_a.tick(&mut sink);
	assert_eq!(node_a.rtable().neighbor_count(), 1, "tick must drain the income queue before its timer checks");
}

#[test]
fn blackhole_drops_data_but_keeps_routing_ants_flowing()
{
	init_tracing();
	let mut cfg = Config::default();
	cfg.blackhole_mode = true;
	cfg.blackhole_activation = 0;
	cfg.blackhole_amount = 1.0;
	let clock = SimClock::new();
	let rng = rand::rngs::StdRng::seed_from_u64(8);
	let mut node = RoutingEngine::new(addr(1), cfg, clock, rng, Box::new(TurnaroundCost::new(0.7)));

	// Transit data for someone else is dropped outright.
	let mut transport = RecordingTransport::default();
	node.route_input(0, addr(50), vec![1, 2, 3], addr(2), &mut transport, None).unwrap();
	assert!(transport.sent.is_empty());
	assert!(transport.delivered.is_empty());

	// Hellos and ants still flow: a hello still installs a neighbor.
	exchange_hello(&mut node, 0, addr(2));
	assert_eq!(node.rtable().neighbor_count(), 1);
}

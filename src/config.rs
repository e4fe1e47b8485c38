//! Tunable protocol parameters, with the defaults from the original
//! module (see `anthocnet-config.h`). Not file- or grammar-backed: the
//! host constructs a `Config` programmatically, there being no
//! persistence across restarts to design for.

use crate::clock::Time;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config
{
	pub snr_cost_metric: bool,
	pub ant_port: u16,

	pub hello_interval: Time,
	pub rtable_update_interval: Time,
	pub pr_ant_interval: Time,

	pub nb_expire: Time,
	pub session_expire: Time,
	pub dcache_expire: Time,
	pub no_broadcast: Time,

	pub alpha_t_mac: f64,
	pub t_hop: f64,
	pub alpha: f64,
	pub gamma: f64,
	pub min_pheromone: f64,
	pub eta_value: f64,

	pub prog_beta: f64,
	pub cons_beta: f64,

	pub snr_threshold: f64,
	pub snr_malus: f64,

	pub initial_ttl: u8,
	pub reactive_bcast_count: u32,
	pub proactive_bcast_count: u32,

	pub blackhole_mode: bool,
	pub blackhole_activation: Time,
	pub blackhole_amount: f64,
}

impl Default for Config
{
	fn default() -> Self
	{
		Config
		{
			snr_cost_metric: true,
			ant_port: 5555,

			hello_interval: 1000,
			rtable_update_interval: 1000,
			pr_ant_interval: 1000,

			nb_expire: 2500,
			session_expire: 10_000,
			dcache_expire: 5000,
			no_broadcast: 100,

			alpha_t_mac: 0.7,
			t_hop: 0.2,
			alpha: 0.7,
			gamma: 0.7,
			min_pheromone: 1e-4,
			eta_value: 0.7,

			prog_beta: 2.0,
			cons_beta: 20.0,

			snr_threshold: 17.0,
			snr_malus: 3.0,

			initial_ttl: 16,
			reactive_bcast_count: 10,
			proactive_bcast_count: 1,

			blackhole_mode: false,
			blackhole_activation: 0,
			blackhole_amount: 0.0,
		}
	}
}

impl Config
{
	/// Whether blackhole drops should be applied to transit data at
	/// `now`, per `AntHocNetConfig::IsBlackhole`.
	pub fn is_blackhole(&self, now: Time) -> bool
	{
		self.blackhole_mode && now >= self.blackhole_activation
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn defaults_match_spec()
	{
		let cfg = Config::default();
		assert_eq!(cfg.ant_port, 5555);
		assert_eq!(cfg.nb_expire, 2500);
		assert_eq!(cfg.cons_beta, 20.0);
	}

	#[test]
	fn blackhole_inactive_before_activation()
	{
		let cfg = Config{ blackhole_mode: true, blackhole_activation: 1000, ..Config::default() };
		assert!(!cfg.is_blackhole(500));
		assert!(cfg.is_blackhole(1000));
	}
}

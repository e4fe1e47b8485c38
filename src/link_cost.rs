//! Per-link cost abstraction (`T_ind`), decoupling the engine from
//! whether the number comes from MAC-layer turnaround time or an
//! SNR-derived proxy.

/// Gives the estimated per-link cost contribution for a neighbor. The
/// engine folds this into a backward ant's running `T` total without
/// caring which implementation produced it.
pub trait LinkCost
{
	fn cost(&self, neighbor_snr_db: f64) -> f64;
}

/// Uses the MAC layer's running-average turnaround time directly.
pub struct TurnaroundCost
{
	pub alpha_t_mac: f64,
	t_mac: std::cell::Cell<Option<f64>>,
}

impl TurnaroundCost
{
	pub fn new(alpha_t_mac: f64) -> Self
	{
		TurnaroundCost{ alpha_t_mac, t_mac: std::cell::Cell::new(None) }
	}

	/// Folds a fresh MAC-layer sample into the running average.
	pub fn observe(&self, sample: f64)
	{
		let updated = match self.t_mac.get()
		{
			None => sample,
			Some(old) => self.alpha_t_mac * old + (1.0 - self.alpha_t_mac) * sample,
		};
		self.t_mac.set(Some(updated));
	}
}

impl LinkCost for TurnaroundCost
{
	fn cost(&self, _neighbor_snr_db: f64) -> f64
	{
		self.t_mac.get().unwrap_or(0.0)
	}
}

/// Penalizes a link whose SNR falls below a threshold by a fixed malus,
/// per `anthocnet-config`'s `snr_threshold`/`snr_malus` knobs.
pub struct SnrCost
{
	pub snr_threshold: f64,
	pub snr_malus: f64,
}

impl LinkCost for SnrCost
{
	fn cost(&self, neighbor_snr_db: f64) -> f64
	{
		if neighbor_snr_db < self.snr_threshold
		{
			self.snr_malus
		}
		else
		{
			0.0
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn turnaround_cost_averages_samples()
	{
		let tc = TurnaroundCost::new(0.5);
		tc.observe(10.0);
		assert_eq!(tc.cost(0.0), 10.0);
		tc.observe(20.0);
		assert_eq!(tc.cost(0.0), 15.0);
	}

	#[test]
	fn snr_cost_applies_malus_below_threshold()
	{
		let sc = SnrCost{ snr_threshold: 17.0, snr_malus: 3.0 };
		assert_eq!(sc.cost(10.0), 3.0);
		assert_eq!(sc.cost(20.0), 0.0);
	}
}

//! Synthetic tick source
//!
//! Drives the pipeline without multicast connectivity: each configured
//! instrument follows a seeded random walk and emits touchline updates.
//! Used by the demo binary and by end-to-end tests that want realistic
//! tick streams.

use arka_core::{Segment, TouchlineUpdate, UnifiedUpdate, UpdateBody};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Instrument {
    segment: Segment,
    token: u32,
    price: f64,
    open: f64,
    high: f64,
    low: f64,
    volume: u64,
}

pub struct SyntheticFeed {
    rng: StdRng,
    instruments: Vec<Instrument>,
    /// Per-step price move as a fraction of the current price.
    step_fraction: f64,
}

impl SyntheticFeed {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), instruments: Vec::new(), step_fraction: 0.001 }
    }

    pub fn add_instrument(&mut self, segment: Segment, token: u32, base_price: f64) {
        self.instruments.push(Instrument {
            segment,
            token,
            price: base_price,
            open: base_price,
            high: base_price,
            low: base_price,
            volume: 0,
        });
    }

    /// One update per instrument, advancing every walk a step.
    pub fn next_updates(&mut self) -> Vec<UnifiedUpdate> {
        let mut out = Vec::with_capacity(self.instruments.len());
        for inst in &mut self.instruments {
            let step = inst.price * self.step_fraction;
            inst.price += self.rng.gen_range(-step..=step);
            inst.price = inst.price.max(0.05);
            inst.high = inst.high.max(inst.price);
            inst.low = inst.low.min(inst.price);
            inst.volume += u64::from(self.rng.gen_range(1u32..100));

            out.push(UnifiedUpdate::new(
                inst.segment,
                inst.token,
                UpdateBody::Touchline(TouchlineUpdate {
                    ltp: inst.price,
                    open: inst.open,
                    high: inst.high,
                    low: inst.low,
                    volume: inst.volume,
                    ..Default::default()
                }),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_is_deterministic_per_seed() {
        let mut a = SyntheticFeed::new(7);
        a.add_instrument(Segment::NseFo, 49508, 22000.0);
        let mut b = SyntheticFeed::new(7);
        b.add_instrument(Segment::NseFo, 49508, 22000.0);

        for _ in 0..10 {
            assert_eq!(a.next_updates(), b.next_updates());
        }
    }

    #[test]
    fn test_walk_stays_positive_and_counts_volume() {
        let mut feed = SyntheticFeed::new(1);
        feed.add_instrument(Segment::NseCm, 2885, 0.10);
        let mut last_volume = 0;
        for _ in 0..500 {
            let updates = feed.next_updates();
            assert_eq!(updates.len(), 1);
            match &updates[0].body {
                UpdateBody::Touchline(t) => {
                    assert!(t.ltp >= 0.05);
                    assert!(t.volume > last_volume);
                    last_volume = t.volume;
                }
                other => panic!("unexpected body {other:?}"),
            }
        }
    }
}

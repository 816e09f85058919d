// Random-walk simulator for offline operation
use crate::domain::channel::{Channel, ChannelTable};
use rand::Rng;

/// Bounded random walk per channel: each step moves a value by a uniform
/// delta within the channel's step size and clamps it to the channel range.
#[derive(Debug, Clone)]
pub struct RandomWalkSimulator {
    values: ChannelTable<f64>,
}

impl Default for RandomWalkSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomWalkSimulator {
    pub fn new() -> Self {
        Self {
            values: ChannelTable::from_fn(|c| c.info().simulation.initial),
        }
    }

    pub fn values(&self) -> &ChannelTable<f64> {
        &self.values
    }

    /// Continue the walk from externally observed values
    pub fn resume_from(&mut self, values: &ChannelTable<f64>) {
        for (channel, value) in values.iter() {
            if value.is_finite() {
                self.values[channel] = *value;
            }
        }
    }

    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &ChannelTable<f64> {
        for (channel, value) in self.values.iter_mut() {
            *value = next_value(channel, *value, rng);
        }
        &self.values
    }
}

fn next_value<R: Rng + ?Sized>(channel: Channel, current: f64, rng: &mut R) -> f64 {
    let profile = channel.info().simulation;
    let delta = rng.gen_range(-profile.max_step..=profile.max_step);
    profile.range.clamp(current + delta)
}

/// Uniform value inside `[base, base + spread)`, used for demo history
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, base: f64, spread: f64) -> f64 {
    base + rng.gen_range(0.0..1.0) * spread
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_starts_from_initial_values() {
        let sim = RandomWalkSimulator::new();
        assert_eq!(sim.values()[Channel::Temperature], 25.6);
        assert_eq!(sim.values()[Channel::DutyCycle], 85.0);
    }

    #[test]
    fn test_walk_stays_in_range_and_steps_are_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sim = RandomWalkSimulator::new();

        for _ in 0..2_000 {
            let before = sim.values().clone();
            let after = sim.step(&mut rng).clone();
            for channel in Channel::ALL {
                let profile = channel.info().simulation;
                let value = after[channel];
                assert!(value >= profile.range.min && value <= profile.range.max);
                assert!((value - before[channel]).abs() <= profile.max_step + 1e-9);
            }
        }
    }

    #[test]
    fn test_resume_ignores_non_finite() {
        let mut sim = RandomWalkSimulator::new();
        let mut observed = sim.values().clone();
        observed[Channel::Light] = 420.0;
        observed[Channel::Humidity] = f64::NAN;

        sim.resume_from(&observed);
        assert_eq!(sim.values()[Channel::Light], 420.0);
        assert_eq!(sim.values()[Channel::Humidity], 65.2);
    }
}

//! Health signal sources
//!
//! The controller only consumes [`HealthSignal`]s. [`CoherenceSimulator`]
//! produces them from a decaying coherence model so the agility path can be
//! exercised without real telemetry.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agility::{AgilityController, HealthSignal, SuiteChange};
use crate::error::TunnelError;

pub trait HealthSource {
    fn sample(&mut self) -> HealthSignal;

    /// The source has failed for good; nothing more should be sampled.
    fn collapsed(&self) -> bool {
        false
    }
}

/// Exponential coherence decay with Gaussian perturbation.
///
/// Each tick: `c ← clamp(c·(1 − decay_rate) + N(0, noise_std), 0, 1)`.
/// Samples report `c × 100`.
#[derive(Debug)]
pub struct CoherenceSimulator {
    coherence: f64,
    decay_rate: f64,
    noise_std: f64,
    rng: StdRng,
    ticks: u64,
    history: Vec<f64>,
}

impl CoherenceSimulator {
    pub const DEFAULT_DECAY_RATE: f64 = 0.06;
    pub const DEFAULT_NOISE_STD: f64 = 0.025;
    /// At or above this the system still operates coherently
    pub const COHERENCE_THRESHOLD: f64 = 0.25;
    /// Below this the field has collapsed
    pub const COLLAPSE_THRESHOLD: f64 = 0.05;

    pub fn new(initial_coherence: f64, decay_rate: f64, noise_std: f64) -> Self {
        Self::with_rng(initial_coherence, decay_rate, noise_std, StdRng::from_entropy())
    }

    /// Reproducible run
    pub fn seeded(initial_coherence: f64, decay_rate: f64, noise_std: f64, seed: u64) -> Self {
        Self::with_rng(
            initial_coherence,
            decay_rate,
            noise_std,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(initial_coherence: f64, decay_rate: f64, noise_std: f64, rng: StdRng) -> Self {
        let coherence = if initial_coherence.is_nan() {
            0.0
        } else {
            initial_coherence.clamp(0.0, 1.0)
        };
        Self {
            coherence,
            decay_rate: decay_rate.clamp(0.0, 1.0),
            noise_std: noise_std.abs(),
            rng,
            ticks: 0,
            history: vec![coherence],
        }
    }

    /// Advance one tick and return the new coherence in 0..=1.
    pub fn step(&mut self) -> f64 {
        self.coherence *= 1.0 - self.decay_rate;
        let noise = self.gaussian() * self.noise_std;
        self.coherence = (self.coherence + noise).clamp(0.0, 1.0);
        self.ticks += 1;
        self.history.push(self.coherence);
        self.coherence
    }

    pub fn coherence(&self) -> f64 {
        self.coherence
    }

    pub fn is_coherent(&self) -> bool {
        self.coherence >= Self::COHERENCE_THRESHOLD
    }

    pub fn is_collapsed(&self) -> bool {
        self.coherence < Self::COLLAPSE_THRESHOLD
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Coherence after every tick, starting with the initial value
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    // Box-Muller
    fn gaussian(&mut self) -> f64 {
        if self.noise_std == 0.0 {
            return 0.0;
        }
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

impl Default for CoherenceSimulator {
    fn default() -> Self {
        Self::new(1.0, Self::DEFAULT_DECAY_RATE, Self::DEFAULT_NOISE_STD)
    }
}

impl HealthSource for CoherenceSimulator {
    fn sample(&mut self) -> HealthSignal {
        HealthSignal::saturating(self.step() * 100.0)
    }

    fn collapsed(&self) -> bool {
        self.is_collapsed()
    }
}

/// What a [`drive`] run did
#[derive(Debug, Default)]
pub struct DriveReport {
    /// Changes announced, in order; each was also broadcast
    pub changes: Vec<SuiteChange>,
    /// Samples fed to the controller
    pub ticks: usize,
    /// Set when the controller rejected a sample and the run stopped there
    pub refused: Option<TunnelError>,
    /// The source collapsed and the run stopped early
    pub collapsed: bool,
}

/// Feed up to `ticks` samples from `source` into `controller`.
///
/// Stops at the first sample the controller refuses or once the source
/// collapses. Changes announced before that are kept in the report.
pub fn drive<S: HealthSource + ?Sized>(
    controller: &AgilityController,
    source: &mut S,
    ticks: usize,
) -> DriveReport {
    let mut report = DriveReport::default();
    while report.ticks < ticks {
        let health = source.sample();
        report.ticks += 1;
        match controller.on_health_change(health) {
            Ok(Some(change)) => report.changes.push(change),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%health, error = %e, "health run stopped");
                report.refused = Some(e);
                break;
            }
        }
        if source.collapsed() {
            tracing::warn!(%health, tick = report.ticks, "health source collapsed");
            report.collapsed = true;
            break;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackPolicy, TunnelConfigBuilder};
    use crate::suite::SuiteId;

    struct Scripted(std::vec::IntoIter<f64>);

    impl HealthSource for Scripted {
        fn sample(&mut self) -> HealthSignal {
            HealthSignal::saturating(self.0.next().unwrap_or(0.0))
        }
    }

    #[test]
    fn test_noiseless_decay_is_exponential() {
        let mut sim = CoherenceSimulator::seeded(1.0, 0.1, 0.0, 7);
        sim.step();
        sim.step();
        assert!((sim.coherence() - 0.81).abs() < 1e-12);
        assert_eq!(sim.ticks(), 2);
        assert_eq!(sim.history().len(), 3);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let mut a = CoherenceSimulator::seeded(1.0, 0.06, 0.025, 42);
        let mut b = CoherenceSimulator::seeded(1.0, 0.06, 0.025, 42);
        for _ in 0..25 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn test_coherence_stays_in_range() {
        let mut sim = CoherenceSimulator::seeded(1.0, 0.0, 5.0, 3);
        for _ in 0..200 {
            let c = sim.step();
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_coherence_and_collapse_thresholds() {
        let sim = CoherenceSimulator::seeded(0.25, 0.0, 0.0, 1);
        assert!(sim.is_coherent());
        assert!(!sim.is_collapsed());

        let mut sim = CoherenceSimulator::seeded(0.06, 0.5, 0.0, 1);
        assert!(!sim.is_coherent());
        assert!(!sim.collapsed());
        sim.step();
        assert!(sim.is_collapsed());
        assert!(sim.collapsed());
    }

    #[test]
    fn test_samples_are_percentages() {
        let mut sim = CoherenceSimulator::seeded(0.5, 0.0, 0.0, 1);
        assert_eq!(sim.sample().value(), 50.0);
    }

    #[test]
    fn test_drive_announces_each_downgrade() {
        let config = TunnelConfigBuilder::new()
            .fallback_policy(FallbackPolicy::Accept)
            .build()
            .unwrap();
        let controller = AgilityController::from_config(&config).unwrap();
        controller
            .select_suite(HealthSignal::new(95.0).unwrap())
            .unwrap();

        let mut source = Scripted(vec![90.0, 60.0, 55.0, 30.0, 10.0, 5.0].into_iter());
        let report = drive(&controller, &mut source, 6);
        assert_eq!(report.ticks, 6);
        assert!(report.refused.is_none());
        let targets: Vec<SuiteId> = report.changes.iter().map(|c| c.next).collect();
        assert_eq!(
            targets,
            vec![
                SuiteId::MlKem1024Hardened,
                SuiteId::MlKem768MlDsa65,
                SuiteId::X25519Emergency,
            ]
        );
    }

    #[test]
    fn test_simulated_decay_reaches_fallback() {
        let controller = AgilityController::from_config(
            &TunnelConfigBuilder::new()
                .fallback_policy(FallbackPolicy::Accept)
                .build()
                .unwrap(),
        )
        .unwrap();
        controller
            .select_suite(HealthSignal::new(100.0).unwrap())
            .unwrap();
        let mut sim = CoherenceSimulator::seeded(1.0, 0.06, 0.0, 9);
        let report = drive(&controller, &mut sim, 60);
        assert_eq!(
            report.changes.last().map(|c| c.next),
            Some(SuiteId::X25519Emergency)
        );
        // 0.94^49 is the first value under the collapse threshold.
        assert!(report.collapsed);
        assert_eq!(report.ticks, 49);
    }

    #[test]
    fn test_drive_keeps_changes_before_refusal() {
        let config = TunnelConfigBuilder::new()
            .fallback_policy(FallbackPolicy::Refuse)
            .build()
            .unwrap();
        let controller = AgilityController::from_config(&config).unwrap();
        let mut events = controller.subscribe();
        controller
            .select_suite(HealthSignal::new(95.0).unwrap())
            .unwrap();

        let mut source = Scripted(vec![50.0, 25.0, 5.0, 90.0].into_iter());
        let report = drive(&controller, &mut source, 4);
        assert_eq!(report.ticks, 3);
        assert!(matches!(
            report.refused,
            Some(TunnelError::PolicyRefused(SuiteId::X25519Emergency))
        ));

        let mut broadcast = Vec::new();
        while let Ok(change) = events.try_recv() {
            broadcast.push(change);
        }
        assert_eq!(report.changes, broadcast);
        assert_eq!(report.changes.len(), 2);
        assert_eq!(controller.pending_suite(), Some(SuiteId::MlKem768MlDsa65));
    }
}

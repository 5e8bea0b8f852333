//! Stub notification policy.
//!
//! Delay is uniform in `[delay_min, delay_max]`. With probability
//! `product_probability` the next message is a product flag chosen
//! uniformly among single, comparison and similar; otherwise it is an
//! audio cue.
//!
//! - single: one product
//! - comparison: two distinct products (sampled without replacement)
//! - similar: a main product plus one similar group, with the main id
//!   filtered out of the candidates
//!
//! All randomness comes from a `StdRng`; a seeded policy yields the same
//! sequence every time.

use super::catalog::StubCatalog;
use super::cue::default_cue;
use super::{NotificationSource, NotificationSourceFactory};
use crate::config::Config;
use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voice_protocol::{OutboundMessage, ProductRecord};

/// Reason attached to comparison flags.
pub const COMPARISON_REASON: &str = "Price difference detected";

/// Reason attached to similar flags.
pub const SIMILARITY_REASON: &str = "Same category products";

/// Used when a policy carries a non-finite probability.
pub const DEFAULT_PRODUCT_PROBABILITY: f64 = 0.7;

/// Timing and variant-selection parameters.
#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub product_probability: f64,
    pub seed: Option<u64>,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            delay_min: Duration::from_secs(2),
            delay_max: Duration::from_secs(8),
            product_probability: DEFAULT_PRODUCT_PROBABILITY,
            seed: None,
        }
    }
}

impl NotificationPolicy {
    /// Fixed delay, useful in tests.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay_min: delay,
            delay_max: delay,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_product_probability(mut self, probability: f64) -> Self {
        self.product_probability = probability;
        self
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            delay_min: config.notify_delay_min,
            delay_max: config.notify_delay_max,
            product_probability: config.notify_product_probability,
            seed: config.notify_seed,
        }
    }
}

/// Which product flag to produce.
#[derive(Debug, Clone, Copy)]
enum ProductFlag {
    Single,
    Comparison,
    Similar,
}

/// Random notification generator over a stub catalog.
pub struct DummyNotificationSource {
    policy: NotificationPolicy,
    catalog: Arc<StubCatalog>,
    rng: StdRng,
    cue: Bytes,
}

impl DummyNotificationSource {
    #[must_use]
    pub fn new(policy: NotificationPolicy, catalog: Arc<StubCatalog>) -> Self {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (lo, hi) = if policy.delay_min <= policy.delay_max {
            (policy.delay_min, policy.delay_max)
        } else {
            (policy.delay_max, policy.delay_min)
        };
        let policy = NotificationPolicy {
            delay_min: lo,
            delay_max: hi,
            product_probability: if policy.product_probability.is_finite() {
                policy.product_probability.clamp(0.0, 1.0)
            } else {
                DEFAULT_PRODUCT_PROBABILITY
            },
            seed: policy.seed,
        };
        Self {
            policy,
            catalog,
            rng,
            cue: default_cue(),
        }
    }

    /// Produce one message synchronously.
    pub fn generate(&mut self) -> OutboundMessage {
        if self.rng.gen_bool(self.policy.product_probability) {
            let flag = match self.rng.gen_range(0..3) {
                0 => ProductFlag::Single,
                1 => ProductFlag::Comparison,
                _ => ProductFlag::Similar,
            };
            if let Some(message) = self.product_flag(flag) {
                return message;
            }
        }
        OutboundMessage::audio(self.cue.clone())
    }

    fn product_flag(&mut self, flag: ProductFlag) -> Option<OutboundMessage> {
        match flag {
            ProductFlag::Single => self.single(),
            ProductFlag::Comparison => self.comparison().or_else(|| self.single()),
            ProductFlag::Similar => self.similar().or_else(|| self.single()),
        }
    }

    fn single(&mut self) -> Option<OutboundMessage> {
        let record = self.catalog.products().choose(&mut self.rng)?.clone();
        Some(OutboundMessage::ProductSingle { record })
    }

    fn comparison(&mut self) -> Option<OutboundMessage> {
        let mut picked = self
            .catalog
            .products()
            .choose_multiple(&mut self.rng, 2)
            .cloned();
        let record_a = picked.next()?;
        let record_b = picked.next()?;
        Some(OutboundMessage::ProductComparison {
            record_a,
            record_b,
            reason: COMPARISON_REASON.to_string(),
        })
    }

    fn similar(&mut self) -> Option<OutboundMessage> {
        let group = self.catalog.similar_groups().choose(&mut self.rng)?;
        let main_pool: Vec<&ProductRecord> = self
            .catalog
            .products()
            .iter()
            .filter(|p| group.iter().all(|c| c.id != p.id))
            .collect();
        let main = (*main_pool.choose(&mut self.rng)?).clone();
        let candidates: Vec<ProductRecord> = group
            .iter()
            .filter(|c| c.id != main.id)
            .cloned()
            .collect();
        Some(OutboundMessage::ProductSimilar {
            main,
            candidates,
            reason: SIMILARITY_REASON.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSource for DummyNotificationSource {
    fn delay(&mut self) -> Duration {
        if self.policy.delay_min == self.policy.delay_max {
            return self.policy.delay_min;
        }
        self.rng
            .gen_range(self.policy.delay_min..=self.policy.delay_max)
    }

    async fn next(&mut self) -> OutboundMessage {
        self.generate()
    }
}

/// Builds one [`DummyNotificationSource`] per session.
///
/// With a seeded policy, session `k` (counting from zero) is seeded with
/// `seed + k`, so every session is reproducible but sessions differ.
pub struct DummySourceFactory {
    policy: NotificationPolicy,
    catalog: Arc<StubCatalog>,
    created: AtomicU64,
}

impl DummySourceFactory {
    #[must_use]
    pub fn new(policy: NotificationPolicy, catalog: StubCatalog) -> Self {
        Self {
            policy,
            catalog: Arc::new(catalog),
            created: AtomicU64::new(0),
        }
    }
}

impl NotificationSourceFactory for DummySourceFactory {
    fn create(&self) -> Box<dyn NotificationSource> {
        let index = self.created.fetch_add(1, Ordering::Relaxed);
        let mut policy = self.policy.clone();
        policy.seed = policy.seed.map(|seed| seed.wrapping_add(index));
        Box::new(DummyNotificationSource::new(
            policy,
            Arc::clone(&self.catalog),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn source(seed: u64, probability: f64) -> DummyNotificationSource {
        DummyNotificationSource::new(
            NotificationPolicy::default()
                .with_seed(seed)
                .with_product_probability(probability),
            Arc::new(StubCatalog::sample()),
        )
    }

    #[test]
    fn test_delay_within_range() {
        let mut source = source(7, 0.7);
        for _ in 0..500 {
            let delay = source.delay();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(8));
        }
    }

    #[test]
    fn test_fixed_delay() {
        let mut source = DummyNotificationSource::new(
            NotificationPolicy::fixed(Duration::from_millis(5)),
            Arc::new(StubCatalog::sample()),
        );
        assert_eq!(source.delay(), Duration::from_millis(5));
    }

    #[test]
    fn test_inverted_range_is_normalised() {
        let policy = NotificationPolicy {
            delay_min: Duration::from_millis(900),
            delay_max: Duration::from_millis(100),
            ..NotificationPolicy::default()
        };
        let mut source = DummyNotificationSource::new(policy, Arc::new(StubCatalog::sample()));
        let delay = source.delay();
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(900));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = source(42, 0.7);
        let mut b = source(42, 0.7);
        for _ in 0..50 {
            assert_eq!(a.delay(), b.delay());
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn test_comparison_records_are_distinct() {
        let mut source = source(3, 1.0);
        let mut seen = 0;
        for _ in 0..1_000 {
            if let OutboundMessage::ProductComparison {
                record_a,
                record_b,
                reason,
            } = source.generate()
            {
                assert_ne!(record_a.id, record_b.id);
                assert_eq!(reason, COMPARISON_REASON);
                seen += 1;
            }
        }
        assert!(seen > 0, "comparison flag never produced");
    }

    #[test]
    fn test_similar_candidates_exclude_main() {
        let mut source = source(11, 1.0);
        let mut seen = 0;
        for _ in 0..1_000 {
            if let OutboundMessage::ProductSimilar {
                main,
                candidates,
                reason,
            } = source.generate()
            {
                assert!(!candidates.is_empty());
                assert!(candidates.iter().all(|c| c.id != main.id));
                assert_eq!(reason, SIMILARITY_REASON);
                seen += 1;
            }
        }
        assert!(seen > 0, "similar flag never produced");
    }

    #[test]
    fn test_similar_excludes_main_even_when_catalogs_overlap() {
        let shared = ProductRecord::new("x", "Shared", "B", 1.0, "u");
        let other = ProductRecord::new("y", "Other", "B", 2.0, "u");
        let catalog = StubCatalog::new(
            vec![shared.clone(), other.clone()],
            vec![vec![shared, ProductRecord::new("z", "Z", "B", 3.0, "u")]],
        );
        let mut source = DummyNotificationSource::new(
            NotificationPolicy::default().with_seed(1),
            Arc::new(catalog),
        );
        for _ in 0..200 {
            if let Some(OutboundMessage::ProductSimilar {
                main, candidates, ..
            }) = source.similar()
            {
                assert_eq!(main.id, "y");
                assert!(candidates.iter().all(|c| c.id != main.id));
            }
        }
    }

    #[test]
    fn test_probability_zero_yields_audio_only() {
        let mut source = source(5, 0.0);
        for _ in 0..100 {
            assert!(matches!(
                source.generate(),
                OutboundMessage::AudioEcho { .. }
            ));
        }
    }

    #[test]
    fn test_probability_one_yields_products_only() {
        let mut source = source(5, 1.0);
        for _ in 0..100 {
            assert!(source.generate().is_product());
        }
    }

    #[test]
    fn test_nan_probability_falls_back_to_default() {
        let mut nan = source(99, f64::NAN);
        let mut default = source(99, DEFAULT_PRODUCT_PROBABILITY);
        for _ in 0..200 {
            assert_eq!(nan.generate(), default.generate());
        }

        let mut infinite = source(3, f64::INFINITY);
        let _ = infinite.generate();
    }

    #[test]
    fn test_product_mix_roughly_matches_probability() {
        let mut source = source(99, 0.7);
        let products = (0..2_000).filter(|_| source.generate().is_product()).count();
        // 0.7 * 2000 = 1400; allow generous slack
        assert!((1_250..=1_550).contains(&products), "got {products}");
    }

    #[test]
    fn test_single_product_catalog_degrades_comparison() {
        let catalog = StubCatalog::new(
            vec![ProductRecord::new("only", "Only", "B", 1.0, "u")],
            Vec::new(),
        );
        let mut source = DummyNotificationSource::new(
            NotificationPolicy::default()
                .with_seed(2)
                .with_product_probability(1.0),
            Arc::new(catalog),
        );
        for _ in 0..50 {
            match source.generate() {
                OutboundMessage::ProductSingle { record } => assert_eq!(record.id, "only"),
                other => panic!("expected single, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_catalog_falls_back_to_audio() {
        let mut source = DummyNotificationSource::new(
            NotificationPolicy::default()
                .with_seed(2)
                .with_product_probability(1.0),
            Arc::new(StubCatalog::new(Vec::new(), Vec::new())),
        );
        assert!(matches!(
            source.generate(),
            OutboundMessage::AudioEcho { .. }
        ));
    }

    #[tokio::test]
    async fn test_factory_sessions_are_reproducible_and_distinct() {
        let policy = NotificationPolicy::default().with_seed(10);
        let first = DummySourceFactory::new(policy.clone(), StubCatalog::sample());
        let second = DummySourceFactory::new(policy, StubCatalog::sample());

        let mut a0 = first.create();
        let mut b0 = second.create();
        for _ in 0..10 {
            assert_eq!(a0.delay(), b0.delay());
            assert_eq!(a0.next().await, b0.next().await);
        }

        let mut a1 = first.create();
        let delays_a0: Vec<Duration> = (0..10).map(|_| a0.delay()).collect();
        let delays_a1: Vec<Duration> = (0..10).map(|_| a1.delay()).collect();
        assert_ne!(delays_a0, delays_a1);
    }
}

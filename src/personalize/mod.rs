//! Behavioral clustering and personalized prediction adjustment.
//!
//! Profiles stream in through the store; clustering passes partition them
//! with seeded k-means and replace the cluster set wholesale. Predictions
//! are adjusted per user from the cluster aggregates and the user's own
//! preference scalars.

mod kmeans;
pub mod profile;


pub use profile::{
    BehavioralProfile, BettingBehavior, PerformanceMetrics, PredictionPreferences, ProfileStore,
    RiskTraits,
};

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::risk::Bet;
use crate::types::Prediction;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Aggregate view of one behavioral cluster. Rebuilt wholesale each pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub size: usize,
    pub average_roi: f64,
    pub average_win_rate: f64,
    pub average_stake: Decimal,
    pub risk_traits: RiskTraits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub user_id: String,
    pub cluster_id: usize,
}

/// Profile store plus the clustering state derived from it.
#[derive(Debug, Clone)]
pub struct Personalizer {
    config: ClusterConfig,
    store: ProfileStore,
    clusters: Vec<Cluster>,
    /// Population mean stake captured at the last pass; baseline for the
    /// cluster stake multiplier.
    population_average_stake: Decimal,
    last_clustered_population: usize,
}

impl Personalizer {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            store: ProfileStore::new(),
            clusters: Vec::new(),
            population_average_stake: Decimal::ZERO,
            last_clustered_population: 0,
        }
    }

    pub fn from_profiles(config: ClusterConfig, profiles: Vec<BehavioralProfile>) -> Self {
        Self {
            store: ProfileStore::from_profiles(profiles),
            ..Self::new(config)
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn profile(&self, user_id: &str) -> Option<&BehavioralProfile> {
        self.store.get(user_id)
    }

    /// Stream one resolved bet into a user's profile.
    pub fn update_profile(&mut self, user_id: &str, bet: &Bet, prediction: &Prediction) -> Result<()> {
        self.store.update_profile(user_id, bet, prediction)
    }

    /// True when profiles were added or removed since the last pass.
    pub fn needs_reclustering(&self) -> bool {
        !self.store.is_empty() && self.store.len() != self.last_clustered_population
    }

    /// Cluster count for a population: one cluster per `min_cluster_size`
    /// profiles, at least 1, at most `max_clusters`. Small populations
    /// degrade softly to a single cluster.
    fn cluster_count(&self, population: usize) -> usize {
        (population / self.config.min_cluster_size).clamp(1, self.config.max_clusters)
    }

    /// Partition all profiles with seeded k-means and stamp assignments.
    /// An empty store is a no-op.
    pub fn perform_clustering(&mut self) -> Vec<ClusterAssignment> {
        let population = self.store.len();
        if population == 0 {
            return Vec::new();
        }

        // Sorted ordering keeps passes reproducible for a given seed.
        let mut ordered: Vec<(String, [f64; kmeans::FEATURE_DIMS])> = self
            .store
            .profiles()
            .map(|p| (p.user_id.clone(), p.feature_vector()))
            .collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        let features: Vec<_> = ordered.iter().map(|(_, f)| *f).collect();

        let k = self.cluster_count(population);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let outcome = kmeans::cluster(&features, k, self.config.max_iterations, &mut rng);
        debug!(
            iterations = outcome.iterations,
            converged = outcome.converged,
            "k-means finished"
        );

        let assignments: Vec<ClusterAssignment> = ordered
            .iter()
            .zip(outcome.assignments.iter())
            .map(|((user_id, _), &cluster_id)| ClusterAssignment {
                user_id: user_id.clone(),
                cluster_id,
            })
            .collect();

        self.clusters = build_clusters(&self.store, &assignments, outcome.centroids.len());
        self.population_average_stake = self.store.population_average_stake();
        self.last_clustered_population = population;

        for assignment in &assignments {
            if let Some(profile) = self.store.get_mut(&assignment.user_id) {
                profile.cluster_id = Some(assignment.cluster_id);
            }
        }

        info!(population, k, clusters = self.clusters.len(), "clustering pass");
        assignments
    }

    /// Adjust a prediction for one user. Unknown users get the prediction
    /// back unchanged. Adjustments apply in a fixed order: cluster
    /// confidence shift, cluster stake scaling, model trust, market factor
    /// scaling, temporal factor scaling.
    pub fn personalized_prediction(&self, user_id: &str, prediction: &Prediction) -> Prediction {
        let mut adjusted = prediction.clone();
        let Some(profile) = self.store.get(user_id) else {
            return adjusted;
        };

        if let Some(cluster) = profile.cluster_id.and_then(|id| self.clusters.get(id)) {
            adjusted.confidence = (adjusted.confidence
                + cluster.risk_traits.confidence_threshold
                - 0.5)
                .clamp(0.0, 1.0);

            if let Some(stake) = adjusted.recommended_stake {
                adjusted.recommended_stake = Some(stake * self.stake_multiplier(cluster));
            }
        }

        if let Some(trust) = profile.preferences.model_trust.get(&prediction.model_id) {
            adjusted.confidence = (adjusted.confidence * trust).clamp(0.0, 1.0);
        }

        for value in adjusted.market_factors.values_mut() {
            *value *= profile.preferences.market_sensitivity;
        }
        for value in adjusted.temporal_factors.values_mut() {
            *value *= profile.preferences.temporal_preference;
        }

        adjusted
    }

    /// Cluster staking appetite relative to the population at the last
    /// pass. Neutral when either side is undefined.
    fn stake_multiplier(&self, cluster: &Cluster) -> Decimal {
        if self.population_average_stake > Decimal::ZERO && cluster.average_stake > Decimal::ZERO {
            cluster.average_stake / self.population_average_stake
        } else {
            Decimal::ONE
        }
    }
}

fn build_clusters(
    store: &ProfileStore,
    assignments: &[ClusterAssignment],
    cluster_count: usize,
) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = (0..cluster_count)
        .map(|id| Cluster {
            id,
            size: 0,
            average_roi: 0.0,
            average_win_rate: 0.0,
            average_stake: Decimal::ZERO,
            risk_traits: RiskTraits::default(),
        })
        .collect();
    let mut trait_sums = vec![(0.0f64, 0.0f64, 0.0f64); cluster_count];

    for assignment in assignments {
        let Some(profile) = store.get(&assignment.user_id) else {
            continue;
        };
        let cluster = &mut clusters[assignment.cluster_id];
        cluster.size += 1;
        cluster.average_roi += profile.performance.roi;
        cluster.average_win_rate += profile.performance.win_rate;
        cluster.average_stake += profile.betting_behavior.average_stake;
        let sums = &mut trait_sums[assignment.cluster_id];
        sums.0 += profile.risk_traits.stake_variation;
        sums.1 += profile.risk_traits.odds_preference;
        sums.2 += profile.risk_traits.confidence_threshold;
    }

    for cluster in &mut clusters {
        if cluster.size == 0 {
            continue;
        }
        let n = cluster.size as f64;
        cluster.average_roi /= n;
        cluster.average_win_rate /= n;
        cluster.average_stake /= Decimal::from(cluster.size as u64);
        let sums = trait_sums[cluster.id];
        cluster.risk_traits = RiskTraits {
            stake_variation: sums.0 / n,
            odds_preference: sums.1 / n,
            confidence_threshold: sums.2 / n,
        };
    }

    clusters
}

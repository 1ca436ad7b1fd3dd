/*!
 * # Learned Order Correction
 *
 * Epsilon-greedy Q-learning over a linear function approximation,
 * used to scale the planner's first-period order by a multiplier from
 * a fixed grid. Each action owns a weight vector over the standardized
 * tactical state; a semi-gradient temporal-difference update adjusts
 * the taken action's weights from replayed experience. Until the first
 * learning pass fits the feature scaler, greedy selection passes the
 * baseline through unchanged so an untrained policy never vetoes the
 * planner.
 */

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::ml::solver::STATE_DIM;

/// Order-quantity multipliers selectable by the policy.
pub const ACTION_MULTIPLIERS: [f64; 5] = [0.0, 0.5, 1.0, 1.5, 2.0];

pub const ACTION_COUNT: usize = ACTION_MULTIPLIERS.len();

/// Index of the pass-through multiplier 1.0.
pub const NEUTRAL_ACTION: usize = 2;

// Feature positions inside the tactical state vector.
const FEATURE_STOCK: usize = 0;
const FEATURE_AVAILABLE: usize = 3;
const FEATURE_COVERAGE: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub exploration_rate: f64,
    pub exploration_floor: f64,
    pub exploration_decay: f64,
    pub batch_size: usize,
    pub memory_size: usize,
    /// Experiences required before any learning pass runs
    pub min_experiences: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            discount_factor: 0.95,
            exploration_rate: 0.1,
            exploration_floor: 0.01,
            exploration_decay: 0.995,
            batch_size: 32,
            memory_size: 10_000,
            min_experiences: 100,
        }
    }
}

/// One transition in the replay buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Experience {
    pub state: [f64; STATE_DIM],
    pub action_index: usize,
    pub reward: f64,
    pub next_state: [f64; STATE_DIM],
    pub done: bool,
}

/// Outcome of one action selection.
#[derive(Debug, Clone, Copy)]
pub struct ActionChoice {
    pub index: usize,
    pub multiplier: f64,
    pub quantity: i32,
    pub q_value: f64,
}

/// Per-feature standardization fitted once from the replay buffer and
/// then frozen. Zero-variance features keep a unit scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureScaler {
    mean: [f64; STATE_DIM],
    scale: [f64; STATE_DIM],
}

impl FeatureScaler {
    fn fit(samples: &[[f64; STATE_DIM]]) -> Self {
        let count = samples.len().max(1) as f64;
        let mut mean = [0.0; STATE_DIM];
        for sample in samples {
            for d in 0..STATE_DIM {
                mean[d] += sample[d];
            }
        }
        for value in mean.iter_mut() {
            *value /= count;
        }

        let mut scale = [0.0; STATE_DIM];
        for sample in samples {
            for d in 0..STATE_DIM {
                let delta = sample[d] - mean[d];
                scale[d] += delta * delta;
            }
        }
        for value in scale.iter_mut() {
            let std = (*value / count).sqrt();
            *value = if std > 1e-12 { std } else { 1.0 };
        }

        Self { mean, scale }
    }

    fn transform(&self, state: &[f64; STATE_DIM]) -> [f64; STATE_DIM] {
        let mut features = [0.0; STATE_DIM];
        for d in 0..STATE_DIM {
            features[d] = (state[d] - self.mean[d]) / self.scale[d];
        }
        features
    }
}

/// Linear Q-learning policy for one product.
///
/// Serializes to a checkpointable snapshot of weights, scaler, buffer,
/// and epsilon; the sampling rng is rebuilt from entropy on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QLearningPolicy {
    config: PolicyConfig,
    weights: [[f64; STATE_DIM]; ACTION_COUNT],
    scaler: Option<FeatureScaler>,
    memory: VecDeque<Experience>,
    epsilon: f64,
    #[serde(skip, default = "entropy_rng")]
    rng: SmallRng,
}

fn entropy_rng() -> SmallRng {
    SmallRng::from_entropy()
}

impl QLearningPolicy {
    pub fn new(config: PolicyConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let mut weights = [[0.0; STATE_DIM]; ACTION_COUNT];
        for action in weights.iter_mut() {
            for weight in action.iter_mut() {
                let sample: f64 = StandardNormal.sample(&mut rng);
                *weight = sample * 0.1;
            }
        }

        let epsilon = config.exploration_rate;
        Self {
            config,
            weights,
            scaler: None,
            memory: VecDeque::new(),
            epsilon,
            rng,
        }
    }

    pub fn exploration_rate(&self) -> f64 {
        self.epsilon
    }

    pub fn experience_count(&self) -> usize {
        self.memory.len()
    }

    /// True once the first learning pass has fitted the scaler.
    pub fn has_learned(&self) -> bool {
        self.scaler.is_some()
    }

    /// Estimated value of taking `action_index` in `state`. Zero until
    /// the scaler is fitted.
    pub fn q_value(&self, state: &[f64; STATE_DIM], action_index: usize) -> f64 {
        match &self.scaler {
            Some(scaler) => dot(&scaler.transform(state), &self.weights[action_index]),
            None => 0.0,
        }
    }

    /// Epsilon-greedy selection of an order multiplier.
    ///
    /// The returned quantity is the baseline scaled by the chosen
    /// multiplier, truncated to whole units.
    pub fn select_action(
        &mut self,
        state: &[f64; STATE_DIM],
        base_quantity: i32,
        exploration: bool,
    ) -> ActionChoice {
        let index = if exploration && self.rng.gen::<f64>() < self.epsilon {
            self.rng.gen_range(0..ACTION_COUNT)
        } else if self.scaler.is_none() {
            NEUTRAL_ACTION
        } else {
            let mut best = 0;
            let mut best_q = f64::NEG_INFINITY;
            for action in 0..ACTION_COUNT {
                let q = self.q_value(state, action);
                if q > best_q {
                    best_q = q;
                    best = action;
                }
            }
            best
        };

        let multiplier = ACTION_MULTIPLIERS[index];
        let quantity = (base_quantity as f64 * multiplier) as i32;

        ActionChoice {
            index,
            multiplier,
            quantity,
            q_value: self.q_value(state, index),
        }
    }

    /// Appends a transition, evicting the oldest when full.
    pub fn store_experience(&mut self, experience: Experience) {
        if self.memory.len() >= self.config.memory_size {
            self.memory.pop_front();
        }
        self.memory.push_back(experience);
    }

    /// One mini-batch temporal-difference update.
    ///
    /// Returns false without touching weights or epsilon when the
    /// buffer holds fewer than `min_experiences` transitions. The
    /// first pass fits the feature scaler over the whole buffer.
    pub fn learn(&mut self) -> bool {
        if self.memory.len() < self.config.min_experiences {
            return false;
        }

        if self.scaler.is_none() {
            let samples: Vec<[f64; STATE_DIM]> = self
                .memory
                .iter()
                .flat_map(|e| [e.state, e.next_state])
                .collect();
            self.scaler = Some(FeatureScaler::fit(&samples));
        }

        let batch_size = self.config.batch_size.min(self.memory.len());
        let picks = rand::seq::index::sample(&mut self.rng, self.memory.len(), batch_size);

        for pick in picks.iter() {
            let experience = self.memory[pick];
            let target = if experience.done {
                experience.reward
            } else {
                let mut best_next = f64::NEG_INFINITY;
                for action in 0..ACTION_COUNT {
                    best_next = best_next.max(self.q_value(&experience.next_state, action));
                }
                experience.reward + self.config.discount_factor * best_next
            };

            let features = match &self.scaler {
                Some(scaler) => scaler.transform(&experience.state),
                None => continue,
            };
            let current = dot(&features, &self.weights[experience.action_index]);
            let error = target - current;
            for d in 0..STATE_DIM {
                self.weights[experience.action_index][d] +=
                    self.config.learning_rate * error * features[d];
            }
        }

        self.epsilon =
            (self.epsilon * self.config.exploration_decay).max(self.config.exploration_floor);
        true
    }
}

/// Economics for after-the-fact reward attribution.
#[derive(Debug, Clone, Copy)]
pub struct RewardParams {
    pub unit_cost: f64,
    pub stockout_penalty: f64,
    pub order_cost: f64,
}

/// Reward for an action judged by the state observed afterwards.
///
/// A fixed bonus for staying in stock, less holding on the position,
/// less a shortfall-proportional stockout penalty, less the order fee
/// when anything was ordered, less an efficiency penalty once coverage
/// exceeds thirty days.
pub fn action_reward(
    state_after: &[f64; STATE_DIM],
    action_quantity: f64,
    params: &RewardParams,
) -> f64 {
    let stock = state_after[FEATURE_STOCK];
    let available = state_after[FEATURE_AVAILABLE];
    let coverage = state_after[FEATURE_COVERAGE];

    let service_reward = if available > 0.0 { 100.0 } else { -100.0 };
    let holding_cost = stock * params.unit_cost * 0.001;
    let stockout_cost = if available <= 0.0 {
        params.stockout_penalty * available.abs()
    } else {
        0.0
    };
    let ordering_cost = if action_quantity > 0.0 {
        params.order_cost
    } else {
        0.0
    };
    let efficiency_penalty = ((coverage - 30.0) * 10.0).max(0.0);

    service_reward - holding_cost - stockout_cost - ordering_cost - efficiency_penalty
}

fn dot(a: &[f64; STATE_DIM], b: &[f64; STATE_DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

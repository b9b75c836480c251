//! Configuration shared by the builders, the evaluator and the comparison harness

use serde::{Deserialize, Serialize};

use crate::error::{Result, SparsifyError};

/// Hard ceiling on the mimicking enumeration bound (2^24 masks)
pub const MAX_ENUMERATION_TERMINALS: usize = 24;

/// How the flow sparsifier is constructed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FlowMethod {
    /// Cut-equivalent (Gomory-Hu) tree over the terminals; pairwise exact
    CutTree,
    /// Average of random capacity-biased spanning trees; approximate
    SampledTrees {
        /// Number of trees to average (`None` = 8 * ceil(log2 k))
        samples: Option<usize>,
        /// Multiplicative noise applied to tree edge lengths
        jitter: f64,
    },
}

impl Default for FlowMethod {
    fn default() -> Self {
        FlowMethod::CutTree
    }
}

/// Configuration for sparsifier construction and evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparsifierConfig {
    /// Relative floating tolerance for cut comparisons
    pub epsilon: f64,
    /// Maximum terminal count for the mimicking network enumeration
    pub max_mimic_terminals: usize,
    /// Evaluate every nontrivial mask when 2^k - 2 is at most this
    pub exhaustive_subset_limit: usize,
    /// Number of masks drawn when the exhaustive limit is exceeded
    pub sample_size: usize,
    /// Maximum number of terminal pairs scored in the pairwise report
    pub pair_sample_limit: usize,
    /// Seed for every randomized choice
    pub seed: u64,
    /// Run independent cut queries and builders on the rayon pool
    pub parallel: bool,
    /// Flow sparsifier construction
    pub flow_method: FlowMethod,
}

impl Default for SparsifierConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-9,
            max_mimic_terminals: 16,
            exhaustive_subset_limit: 4096,
            sample_size: 256,
            pair_sample_limit: 256,
            seed: 42,
            parallel: true,
            flow_method: FlowMethod::CutTree,
        }
    }
}

impl SparsifierConfig {
    /// Create a configuration with the given tolerance
    pub fn new(epsilon: f64) -> Result<Self> {
        let config = Self {
            epsilon,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the mimicking enumeration bound
    pub fn with_max_mimic_terminals(mut self, limit: usize) -> Self {
        self.max_mimic_terminals = limit;
        self
    }

    /// Set the exhaustive evaluation limit and the sample size used beyond it
    pub fn with_sampling(mut self, exhaustive_limit: usize, sample_size: usize) -> Self {
        self.exhaustive_subset_limit = exhaustive_limit;
        self.sample_size = sample_size;
        self
    }

    /// Set the pairwise report limit
    pub fn with_pair_sample_limit(mut self, limit: usize) -> Self {
        self.pair_sample_limit = limit;
        self
    }

    /// Enable or disable parallel execution
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Select the flow sparsifier construction
    pub fn with_flow_method(mut self, method: FlowMethod) -> Self {
        self.flow_method = method;
        self
    }

    /// Check every parameter range
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0 && self.epsilon <= 1e-3) {
            return Err(SparsifyError::InvalidParameter(format!(
                "epsilon = {} (expected 0 < epsilon <= 1e-3)",
                self.epsilon
            )));
        }
        if self.max_mimic_terminals < 2 || self.max_mimic_terminals > MAX_ENUMERATION_TERMINALS {
            return Err(SparsifyError::InvalidParameter(format!(
                "max_mimic_terminals = {} (expected 2..={MAX_ENUMERATION_TERMINALS})",
                self.max_mimic_terminals
            )));
        }
        if self.sample_size == 0 {
            return Err(SparsifyError::InvalidParameter(
                "sample_size must be positive".to_string(),
            ));
        }
        if let FlowMethod::SampledTrees { samples, jitter } = self.flow_method {
            if samples == Some(0) {
                return Err(SparsifyError::InvalidParameter(
                    "flow sample count must be positive".to_string(),
                ));
            }
            if !(jitter >= 0.0 && jitter.is_finite()) {
                return Err(SparsifyError::InvalidParameter(format!(
                    "jitter = {jitter} (expected finite, >= 0)"
                )));
            }
        }
        Ok(())
    }

    /// Whether work should be spread over the rayon pool
    pub(crate) fn use_parallel(&self) -> bool {
        cfg!(feature = "parallel") && self.parallel
    }
}

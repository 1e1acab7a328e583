//! Flat parameter arena for the actor-critic network
//!
//! Every tensor of the network (shared core, actor head, critic head) lives
//! in a single contiguous `Vec<f64>`. Groups are addressed through
//! [`ParamGroup`], and scalar biases are simply length-1 groups, so the
//! optimizer and gradient code never need a separate scalar path.
//!
//! Gradients and Adam moments use the same type, which keeps every buffer
//! shaped identically to the parameters it mirrors.

use std::ops::Range;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Length of the observation vector fed to the network
pub const OBS_SIZE: usize = 48;

/// Width of the single tanh hidden layer
pub const HIDDEN_SIZE: usize = 48;

/// Number of continuous action components (throttle, steer, aim)
pub const ACTION_SIZE: usize = 3;

/// Initial value of every per-action log standard deviation
pub const INITIAL_LOG_STD: f64 = -0.5;

/// Scale applied to the uniform init of the output heads
const HEAD_INIT_SCALE: f64 = 0.1;

/// Named parameter groups, in arena order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamGroup {
    /// Input to hidden weights, row-major `[HIDDEN_SIZE][OBS_SIZE]`
    W1,
    /// Hidden bias
    B1,
    /// Mean head weights, row-major `[ACTION_SIZE][HIDDEN_SIZE]`
    WMean,
    /// Mean head bias
    BMean,
    /// Free per-action log standard deviation
    LogStd,
    /// Shoot logit weights
    WShoot,
    /// Shoot logit bias (scalar)
    BShoot,
    /// Value head weights
    WValue,
    /// Value head bias (scalar)
    BValue,
}

impl ParamGroup {
    /// All groups in arena order
    pub const ALL: [ParamGroup; 9] = [
        ParamGroup::W1,
        ParamGroup::B1,
        ParamGroup::WMean,
        ParamGroup::BMean,
        ParamGroup::LogStd,
        ParamGroup::WShoot,
        ParamGroup::BShoot,
        ParamGroup::WValue,
        ParamGroup::BValue,
    ];

    /// Number of scalars in this group
    pub const fn len(self) -> usize {
        match self {
            ParamGroup::W1 => HIDDEN_SIZE * OBS_SIZE,
            ParamGroup::B1 => HIDDEN_SIZE,
            ParamGroup::WMean => ACTION_SIZE * HIDDEN_SIZE,
            ParamGroup::BMean => ACTION_SIZE,
            ParamGroup::LogStd => ACTION_SIZE,
            ParamGroup::WShoot => HIDDEN_SIZE,
            ParamGroup::BShoot => 1,
            ParamGroup::WValue => HIDDEN_SIZE,
            ParamGroup::BValue => 1,
        }
    }

    /// Offset of the first scalar of this group inside the arena
    pub const fn offset(self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self as usize {
            total += Self::ALL[i].len();
            i += 1;
        }
        total
    }

    /// Arena index range covered by this group
    pub const fn range(self) -> Range<usize> {
        self.offset()..self.offset() + self.len()
    }

    /// Stable name used in logs and error messages
    pub const fn name(self) -> &'static str {
        match self {
            ParamGroup::W1 => "w1",
            ParamGroup::B1 => "b1",
            ParamGroup::WMean => "w_mean",
            ParamGroup::BMean => "b_mean",
            ParamGroup::LogStd => "log_std",
            ParamGroup::WShoot => "w_shoot",
            ParamGroup::BShoot => "b_shoot",
            ParamGroup::WValue => "w_value",
            ParamGroup::BValue => "b_value",
        }
    }
}

/// Total number of scalars in a parameter set
pub const PARAM_COUNT: usize = ParamGroup::BValue.offset() + ParamGroup::BValue.len();

/// Borrowed, group-wise view of a parameter set
#[derive(Debug, Clone, Copy)]
pub struct ParamView<'a> {
    /// Input to hidden weights
    pub w1: &'a [f64],
    /// Hidden bias
    pub b1: &'a [f64],
    /// Mean head weights
    pub w_mean: &'a [f64],
    /// Mean head bias
    pub b_mean: &'a [f64],
    /// Log standard deviations
    pub log_std: &'a [f64],
    /// Shoot weights
    pub w_shoot: &'a [f64],
    /// Shoot bias
    pub b_shoot: f64,
    /// Value weights
    pub w_value: &'a [f64],
    /// Value bias
    pub b_value: f64,
}

/// Mutable group-wise view, used to accumulate gradients head by head
#[derive(Debug)]
pub struct ParamViewMut<'a> {
    /// Input to hidden weights
    pub w1: &'a mut [f64],
    /// Hidden bias
    pub b1: &'a mut [f64],
    /// Mean head weights
    pub w_mean: &'a mut [f64],
    /// Mean head bias
    pub b_mean: &'a mut [f64],
    /// Log standard deviations
    pub log_std: &'a mut [f64],
    /// Shoot weights
    pub w_shoot: &'a mut [f64],
    /// Shoot bias
    pub b_shoot: &'a mut f64,
    /// Value weights
    pub w_value: &'a mut [f64],
    /// Value bias
    pub b_value: &'a mut f64,
}

/// Fixed-shape parameter arena ("brain"), also used for gradients and moments
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    values: Vec<f64>,
}

impl Default for ParamSet {
    fn default() -> Self {
        Self::zeros()
    }
}

impl ParamSet {
    /// All-zero arena, the starting point for gradients and Adam moments
    pub fn zeros() -> Self {
        Self { values: vec![0.0; PARAM_COUNT] }
    }

    /// Randomly initialize a brain from a seed
    ///
    /// The same seed always yields the same brain, which is what the store
    /// falls back to when a persisted blob is rejected.
    pub fn initialize(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::initialize_with(&mut rng)
    }

    /// Randomly initialize a brain from an existing RNG
    pub fn initialize_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut params = Self::zeros();
        let core_bound = 1.0 / (OBS_SIZE as f64).sqrt();
        let head_bound = HEAD_INIT_SCALE / (HIDDEN_SIZE as f64).sqrt();

        for w in params.group_mut(ParamGroup::W1) {
            *w = rng.gen_range(-core_bound..core_bound);
        }
        for group in [ParamGroup::WMean, ParamGroup::WShoot, ParamGroup::WValue] {
            for w in params.group_mut(group) {
                *w = rng.gen_range(-head_bound..head_bound);
            }
        }
        params.group_mut(ParamGroup::LogStd).fill(INITIAL_LOG_STD);
        params
    }

    /// Build a parameter set from a raw arena
    ///
    /// Returns `None` when the length does not match [`PARAM_COUNT`].
    pub fn from_vec(values: Vec<f64>) -> Option<Self> {
        (values.len() == PARAM_COUNT).then_some(Self { values })
    }

    /// Number of scalars (always [`PARAM_COUNT`])
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whole arena
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Whole arena, mutably
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Slice of a single group
    pub fn group(&self, group: ParamGroup) -> &[f64] {
        &self.values[group.range()]
    }

    /// Mutable slice of a single group
    pub fn group_mut(&mut self, group: ParamGroup) -> &mut [f64] {
        &mut self.values[group.range()]
    }

    /// Reset every entry to zero without reallocating
    pub fn zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Multiply every entry by `factor`
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// True when no entry is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Borrow the arena group by group
    pub fn view(&self) -> ParamView<'_> {
        let rest = self.values.as_slice();
        let (w1, rest) = rest.split_at(ParamGroup::W1.len());
        let (b1, rest) = rest.split_at(ParamGroup::B1.len());
        let (w_mean, rest) = rest.split_at(ParamGroup::WMean.len());
        let (b_mean, rest) = rest.split_at(ParamGroup::BMean.len());
        let (log_std, rest) = rest.split_at(ParamGroup::LogStd.len());
        let (w_shoot, rest) = rest.split_at(ParamGroup::WShoot.len());
        let (b_shoot, rest) = rest.split_at(ParamGroup::BShoot.len());
        let (w_value, b_value) = rest.split_at(ParamGroup::WValue.len());

        ParamView {
            w1,
            b1,
            w_mean,
            b_mean,
            log_std,
            w_shoot,
            b_shoot: b_shoot[0],
            w_value,
            b_value: b_value[0],
        }
    }

    /// Mutably borrow the arena group by group
    pub fn view_mut(&mut self) -> ParamViewMut<'_> {
        let rest = self.values.as_mut_slice();
        let (w1, rest) = rest.split_at_mut(ParamGroup::W1.len());
        let (b1, rest) = rest.split_at_mut(ParamGroup::B1.len());
        let (w_mean, rest) = rest.split_at_mut(ParamGroup::WMean.len());
        let (b_mean, rest) = rest.split_at_mut(ParamGroup::BMean.len());
        let (log_std, rest) = rest.split_at_mut(ParamGroup::LogStd.len());
        let (w_shoot, rest) = rest.split_at_mut(ParamGroup::WShoot.len());
        let (b_shoot, rest) = rest.split_at_mut(ParamGroup::BShoot.len());
        let (w_value, b_value) = rest.split_at_mut(ParamGroup::WValue.len());

        ParamViewMut {
            w1,
            b1,
            w_mean,
            b_mean,
            log_std,
            w_shoot,
            b_shoot: &mut b_shoot[0],
            w_value,
            b_value: &mut b_value[0],
        }
    }
}

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;

use crate::transform::AxisCrop;

pub const DEFAULT_NUM_SLICES: usize = 10;
pub const DEFAULT_SEED: u64 = 42;

// 64-bit FNV-1a. Case seeds must not change across Rust releases or platforms, which `std::hash`
// does not promise.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Which depth indices of a volume are written as 2D samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceSelection {
    All,
    /// The display range, see [`AxisCrop::display`]
    Central,
    /// `count` distinct indices drawn with a per-case seed
    Random { count: usize, seed: u64 },
}

impl SliceSelection {
    /// Selected indices in ascending order
    pub fn select(&self, case_id: &str, depth: usize) -> Vec<usize> {
        match *self {
            SliceSelection::All => (0..depth).collect(),
            SliceSelection::Central => AxisCrop::display(depth).range().collect(),
            SliceSelection::Random { count, .. } if count >= depth => (0..depth).collect(),
            SliceSelection::Random { count, seed } => {
                let mut rng = StdRng::seed_from_u64(case_seed(seed, case_id));
                let mut indices = rand::seq::index::sample(&mut rng, depth, count).into_vec();
                indices.sort_unstable();
                indices
            }
        }
    }
}

/// Mix a run seed with a case id so the draw for a case does not depend on processing order.
///
/// The case id is hashed with FNV-1a and xor-ed with `seed`, so a given `(seed, case_id)` maps
/// to the same value on every build.
pub fn case_seed(seed: u64, case_id: &str) -> u64 {
    let hash = case_id
        .bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ b as u64).wrapping_mul(FNV_PRIME));
    hash ^ seed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SelectionPolicy {
    #[default]
    Random,
    Central,
    All,
}

impl SelectionPolicy {
    pub fn into_selection(self, count: usize, seed: u64) -> SliceSelection {
        match self {
            SelectionPolicy::Random => SliceSelection::Random { count, seed },
            SelectionPolicy::Central => SliceSelection::Central,
            SelectionPolicy::All => SliceSelection::All,
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy_str = match self {
            SelectionPolicy::Random => "random",
            SelectionPolicy::Central => "central",
            SelectionPolicy::All => "all",
        };
        write!(f, "{}", policy_str)
    }
}

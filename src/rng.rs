// Copyright 2016 Google Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A deterministic, 64-bit seeded random source. The combiner shuffles
//! candidate lists and samples population caps with this; it is owned by
//! the combiner instance (never a process-global), and the combiner only
//! ever touches it from one owning context at a time (see `Combiner::rng`).

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub trait CombinerRng {
    /// A uniformly distributed double in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// A uniformly distributed integer in `[0, n)`. Panics if `n == 0`.
    fn next_below(&mut self, n: usize) -> usize;

    /// Shuffles `slice` in place (Fisher-Yates).
    fn shuffle<T>(&mut self, slice: &mut [T]);
}

/// The default `CombinerRng`, backed by `rand`'s non-cryptographic
/// small-state generator seeded from a single `u64`.
pub struct SeededRng(SmallRng);

impl SeededRng {
    pub fn from_seed(seed: u64) -> Self {
        SeededRng(SmallRng::seed_from_u64(seed))
    }
}

impl CombinerRng for SeededRng {
    fn next_f64(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    fn next_below(&mut self, n: usize) -> usize {
        assert!(n > 0, "next_below requires a positive bound");
        self.0.gen_range(0, n)
    }

    fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SeededRng::from_seed(42);
        let mut b = SeededRng::from_seed(42);
        for _ in 0..16 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn f64_is_in_unit_interval() {
        let mut rng = SeededRng::from_seed(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!(v >= 0.0 && v < 1.0);
        }
    }

    #[test]
    fn next_below_respects_bound() {
        let mut rng = SeededRng::from_seed(7);
        for _ in 0..1000 {
            assert!(rng.next_below(5) < 5);
        }
    }

    #[test]
    fn shuffle_preserves_elements() {
        let mut rng = SeededRng::from_seed(7);
        let mut v: Vec<u32> = (0..20).collect();
        rng.shuffle(&mut v);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }
}

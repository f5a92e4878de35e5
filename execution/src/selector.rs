//! Weighted random selection.
//!
//! A selector turns a random draw value into an outcome. The draw value and
//! the total it was drawn against are kept with the result so a recorded spin
//! can be checked against the table that produced it.

use rand::Rng;

use crate::EngineError;

#[derive(Clone, Debug, PartialEq)]
pub struct Draw<O> {
    /// Raw random value, in `[0, total)` for weighted tables.
    pub value: f64,
    pub total: f64,
    /// `None` is a "no win" draw.
    pub outcome: Option<O>,
}

pub trait Selector {
    type Outcome;

    /// Sum of the weights the draw value is taken against.
    fn total(&self) -> f64;

    /// Maps a draw value to an outcome.
    fn resolve(&self, value: f64) -> Option<Self::Outcome>;

    /// Draws a value from `rng`. Fails with `NoCandidates` when nothing can win.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, EngineError>;

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Draw<Self::Outcome>, EngineError> {
        let value = self.sample(rng)?;
        Ok(Draw {
            value,
            total: self.total(),
            outcome: self.resolve(value),
        })
    }
}

/// Ordered candidates with dynamic non-negative weights.
#[derive(Clone, Debug)]
pub struct WeightedTable<T> {
    candidates: Vec<(T, f64)>,
}

/// Negative and non-finite weights count as zero.
fn effective(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

impl<T: Clone> WeightedTable<T> {
    pub fn new(candidates: Vec<(T, f64)>) -> Self {
        Self { candidates }
    }

    /// Every candidate weighs the same.
    pub fn uniform(candidates: impl IntoIterator<Item = T>) -> Self {
        Self::new(candidates.into_iter().map(|c| (c, 1.0)).collect())
    }

    pub fn is_eligible(&self) -> bool {
        self.total() > 0.0
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl<T: Clone> Selector for WeightedTable<T> {
    type Outcome = T;

    fn total(&self) -> f64 {
        self.candidates.iter().map(|(_, w)| effective(*w)).sum()
    }

    fn resolve(&self, value: f64) -> Option<T> {
        let mut cumulative = 0.0;
        for (candidate, weight) in &self.candidates {
            let weight = effective(*weight);
            if weight == 0.0 {
                continue;
            }
            cumulative += weight;
            if cumulative >= value {
                return Some(candidate.clone());
            }
        }
        None
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, EngineError> {
        let total = self.total();
        if total <= 0.0 {
            return Err(EngineError::NoCandidates);
        }
        Ok(rng.gen_range(0.0..total))
    }
}

/// Precomputed table over integer faces `1..=faces`.
#[derive(Clone, Debug)]
pub struct LookupTable<T> {
    faces: u32,
    entries: Vec<(u32, T)>,
}

impl<T: Clone> LookupTable<T> {
    pub fn new(faces: u32, entries: Vec<(u32, T)>) -> Self {
        Self { faces, entries }
    }
}

impl<T: Clone> Selector for LookupTable<T> {
    type Outcome = T;

    fn total(&self) -> f64 {
        f64::from(self.faces)
    }

    fn resolve(&self, value: f64) -> Option<T> {
        if !value.is_finite() || value < 1.0 {
            return None;
        }
        let face = value as u32;
        self.entries
            .iter()
            .find(|(f, _)| *f == face)
            .map(|(_, outcome)| outcome.clone())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, EngineError> {
        if self.faces == 0 {
            return Err(EngineError::NoCandidates);
        }
        Ok(f64::from(rng.gen_range(1..=self.faces)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn second_candidate_wins_past_first_boundary() {
        let table = WeightedTable::new(vec![("lose", 1.0), ("gift", 1.0)]);
        assert_eq!(table.total(), 2.0);
        assert_eq!(table.resolve(1.5), Some("gift"));
        assert_eq!(table.resolve(1.0), Some("lose"));
        assert_eq!(table.resolve(0.0), Some("lose"));
    }

    #[test]
    fn zero_weight_is_never_selected() {
        let table = WeightedTable::new(vec![("shown", 0.0), ("real", 3.0), ("hidden", 0.0)]);
        assert_eq!(table.resolve(0.0), Some("real"));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            assert_eq!(table.draw(&mut rng).unwrap().outcome, Some("real"));
        }
    }

    #[test]
    fn empty_or_weightless_table_has_no_candidates() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty: WeightedTable<u8> = WeightedTable::new(Vec::new());
        assert!(matches!(empty.draw(&mut rng), Err(EngineError::NoCandidates)));
        let weightless = WeightedTable::new(vec![(1u8, 0.0), (2, -4.0), (3, f64::NAN)]);
        assert!(!weightless.is_eligible());
        assert!(matches!(
            weightless.draw(&mut rng),
            Err(EngineError::NoCandidates)
        ));
    }

    #[test]
    fn lookup_table_resolves_faces() {
        let table = LookupTable::new(64, vec![(64, "jackpot"), (1, "bar")]);
        assert_eq!(table.resolve(64.0), Some("jackpot"));
        assert_eq!(table.resolve(1.0), Some("bar"));
        assert_eq!(table.resolve(2.0), None);
        assert_eq!(table.resolve(0.0), None);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let draw = table.draw(&mut rng).unwrap();
            assert!((1.0..=64.0).contains(&draw.value));
            assert_eq!(draw.total, 64.0);
        }
    }

    fn weights() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(prop_oneof![Just(0.0), 0.001f64..100.0], 1..12)
            .prop_filter("sum must be positive", |w| w.iter().sum::<f64>() > 0.0)
    }

    proptest! {
        #[test]
        fn selects_exactly_one_reaching_candidate(w in weights(), fraction in 0.0f64..1.0) {
            let table = WeightedTable::new(w.iter().copied().enumerate().collect::<Vec<_>>());
            let r = fraction * table.total();
            let chosen = table.resolve(r);
            prop_assert!(chosen.is_some());
            let index = chosen.unwrap();
            prop_assert!(w[index] > 0.0);
            let cumulative: f64 = w[..=index].iter().sum();
            let before: f64 = w[..index].iter().sum();
            prop_assert!(cumulative >= r);
            prop_assert!(before < r || index == w.iter().position(|x| *x > 0.0).unwrap());
        }

        #[test]
        fn selection_is_monotonic_in_draw_value(w in weights(), a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let table = WeightedTable::new(w.iter().copied().enumerate().collect::<Vec<_>>());
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let first = table.resolve(low * table.total()).unwrap();
            let second = table.resolve(high * table.total()).unwrap();
            prop_assert!(first <= second);
        }

        #[test]
        fn sampled_values_stay_in_range(w in weights(), seed in any::<u64>()) {
            let table = WeightedTable::new(w.into_iter().enumerate().collect::<Vec<_>>());
            let mut rng = StdRng::seed_from_u64(seed);
            let draw = table.draw(&mut rng).unwrap();
            prop_assert!(draw.value >= 0.0 && draw.value < draw.total);
            prop_assert!(draw.outcome.is_some());
        }
    }
}

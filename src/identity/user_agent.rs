use super::ChooserError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// A user agent string and its relative selection weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentOption {
    #[serde(rename = "ua")]
    pub user_agent: String,

    /// Share of picks, relative to the sum of all weights
    #[serde(rename = "pct")]
    pub weight: u32,
}

impl UserAgentOption {
    pub fn new(user_agent: impl Into<String>, weight: u32) -> Self {
        Self {
            user_agent: user_agent.into(),
            weight,
        }
    }
}

/// Weighted-random chooser over user agent strings
///
/// Options with weight zero are never picked. The selection frequency of
/// each option converges to its weight divided by the total weight.
#[derive(Debug)]
pub struct UserAgentChooser {
    options: Vec<UserAgentOption>,
    index: WeightedIndex<u32>,
    rng: Mutex<StdRng>,
}

impl UserAgentChooser {
    pub fn new(options: Vec<UserAgentOption>) -> Result<Self, ChooserError> {
        Self::with_rng(options, StdRng::from_entropy())
    }

    /// Builds a chooser with a deterministic random sequence
    pub fn with_seed(options: Vec<UserAgentOption>, seed: u64) -> Result<Self, ChooserError> {
        Self::with_rng(options, StdRng::seed_from_u64(seed))
    }

    fn with_rng(options: Vec<UserAgentOption>, rng: StdRng) -> Result<Self, ChooserError> {
        if options.is_empty() {
            return Err(ChooserError::NoOptions);
        }
        let index = WeightedIndex::new(options.iter().map(|o| o.weight))
            .map_err(|e| ChooserError::InvalidWeights(e.to_string()))?;
        Ok(Self {
            options,
            index,
            rng: Mutex::new(rng),
        })
    }

    pub fn pick(&self) -> &str {
        let i = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.index.sample(&mut *rng)
        };
        &self.options[i].user_agent
    }

    pub fn options(&self) -> &[UserAgentOption] {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_share_converges() {
        let chooser = UserAgentChooser::with_seed(
            vec![UserAgentOption::new("first", 90), UserAgentOption::new("second", 10)],
            42,
        )
        .unwrap();

        let draws = 100_000;
        let first = (0..draws).filter(|_| chooser.pick() == "first").count();
        let share = first as f64 / draws as f64;
        assert!((share - 0.90).abs() < 0.02, "share was {}", share);
    }

    #[test]
    fn test_zero_weight_never_picked() {
        let chooser = UserAgentChooser::with_seed(
            vec![UserAgentOption::new("never", 0), UserAgentOption::new("always", 5)],
            7,
        )
        .unwrap();

        assert!((0..1_000).all(|_| chooser.pick() == "always"));
    }

    #[test]
    fn test_empty_list_rejected() {
        assert_eq!(
            UserAgentChooser::new(Vec::new()).unwrap_err(),
            ChooserError::NoOptions
        );
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let result = UserAgentChooser::new(vec![
            UserAgentOption::new("a", 0),
            UserAgentOption::new("b", 0),
        ]);
        assert!(matches!(result, Err(ChooserError::InvalidWeights(_))));
    }

    #[test]
    fn test_deserializes_from_agents_file_shape() {
        let options: Vec<UserAgentOption> =
            serde_json::from_str(r#"[{"ua": "Mozilla/5.0", "pct": 75}]"#).unwrap();
        assert_eq!(options, vec![UserAgentOption::new("Mozilla/5.0", 75)]);
    }
}

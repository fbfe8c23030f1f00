use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::baseline::{Dimension, DimensionWeights, GlobalBaseline, RegimeBlend, TeamOverride, TeamScores};
use crate::regime::{classify, Regime, TeamRegime};
use crate::store::{BaselineStore, StoreError};

/// Global share of blended weights (team gets the rest).
pub const WEIGHT_GLOBAL_SHARE: f64 = 0.5;
/// Global share of the blended regime triple.
pub const REGIME_GLOBAL_SHARE: f64 = 0.7;
pub const DEFAULT_SCORE_FLOOR: f64 = 0.01;

#[derive(Debug, Error)]
pub enum BlendError {
    #[error("score for {dimension} is {value}, refusing to blend a non-positive score")]
    ZeroScore { dimension: Dimension, value: f64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to do with a dimension score that is zero, negative or not a number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroScorePolicy {
    /// Raise the score to the floor and report the dimension as clamped.
    #[default]
    Clamp,
    /// Fail the blend with [`BlendError::ZeroScore`].
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlendedScores {
    pub shm: f64,
    pub weights: DimensionWeights,
    pub regime_blend: RegimeBlend,
    pub team_id: String,
    pub global_influence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clamped_dimensions: Vec<Dimension>,
}

impl BlendedScores {
    pub fn regime(&self) -> Regime {
        classify(&self.regime_blend)
    }

    pub fn team_regime(&self) -> TeamRegime {
        TeamRegime::new(self.team_id.clone(), self.regime())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendEngine {
    pub zero_score_policy: ZeroScorePolicy,
    pub score_floor: f64,
}

impl Default for BlendEngine {
    fn default() -> Self {
        Self {
            zero_score_policy: ZeroScorePolicy::Clamp,
            score_floor: DEFAULT_SCORE_FLOOR,
        }
    }
}

impl BlendEngine {
    pub fn new(zero_score_policy: ZeroScorePolicy, score_floor: f64) -> Self {
        Self {
            zero_score_policy,
            score_floor,
        }
    }

    /// Loads the global baseline and the team's override (if any) and blends them.
    /// A team without an override is not an error.
    pub async fn blend_for_team<S>(
        &self,
        store: &S,
        team_id: &str,
        scores: &TeamScores,
    ) -> Result<BlendedScores, BlendError>
    where
        S: BaselineStore + ?Sized,
    {
        let global = store.load_global().await?;
        let team = match store.load_team(team_id).await {
            Ok(team) => Some(team),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };
        self.blend(&global, team.as_ref(), team_id, scores)
    }

    pub fn blend(
        &self,
        global: &GlobalBaseline,
        team: Option<&TeamOverride>,
        team_id: &str,
        scores: &TeamScores,
    ) -> Result<BlendedScores, BlendError> {
        let Some(team) = team else {
            return Ok(BlendedScores {
                shm: global.shm,
                weights: global.weights,
                regime_blend: global.regime_blend,
                team_id: team_id.to_string(),
                global_influence: 1.0,
                clamped_dimensions: Vec::new(),
            });
        };

        let weights = global.weights.mix(&team.weights, WEIGHT_GLOBAL_SHARE);
        let regime_blend = global.regime_blend.mix(&team.regime_blend, REGIME_GLOBAL_SHARE);
        let (shm, clamped_dimensions) = self.harmonic_shm(scores, &weights)?;
        if !clamped_dimensions.is_empty() {
            warn!(
                team = team_id,
                dimensions = ?clamped_dimensions,
                floor = self.score_floor,
                "clamped non-positive scores before blending"
            );
        }

        Ok(BlendedScores {
            shm,
            weights,
            regime_blend,
            team_id: team_id.to_string(),
            global_influence: WEIGHT_GLOBAL_SHARE,
            clamped_dimensions,
        })
    }

    /// Blended regime for a team; falls back to the global triple without an override.
    pub fn team_regime(&self, global: &GlobalBaseline, team: Option<&TeamOverride>, team_id: &str) -> TeamRegime {
        let blend = match team {
            Some(team) => global.regime_blend.mix(&team.regime_blend, REGIME_GLOBAL_SHARE),
            None => global.regime_blend,
        };
        TeamRegime::new(team_id, classify(&blend))
    }

    /// Weighted harmonic mean `1 / Σ(wᵢ / sᵢ)`.
    pub fn harmonic_shm(
        &self,
        scores: &TeamScores,
        weights: &DimensionWeights,
    ) -> Result<(f64, Vec<Dimension>), BlendError> {
        let mut clamped = Vec::new();
        let mut reciprocal_sum = 0.0;
        for dimension in Dimension::ALL {
            let raw = scores.get(dimension);
            let score = match self.zero_score_policy {
                ZeroScorePolicy::Clamp => {
                    if !raw.is_finite() || raw < self.score_floor {
                        clamped.push(dimension);
                        self.score_floor
                    } else {
                        raw
                    }
                }
                ZeroScorePolicy::Reject => {
                    if !raw.is_finite() || raw <= 0.0 {
                        return Err(BlendError::ZeroScore {
                            dimension,
                            value: raw,
                        });
                    }
                    raw
                }
            };
            reciprocal_sum += weights.get(dimension) / score;
        }

        let shm = if reciprocal_sum > 0.0 {
            1.0 / reciprocal_sum
        } else {
            0.0
        };
        Ok((shm, clamped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::fixtures::{global_baseline, ux_team};
    use crate::store::MemoryStore;

    fn scores() -> TeamScores {
        TeamScores {
            ux: 0.85,
            design: 0.90,
            code: 0.75,
            semantic: 0.80,
            journey: 0.88,
            state: 0.82,
        }
    }

    #[test]
    fn unknown_team_uses_global_verbatim() {
        let global = global_baseline();
        let blended = BlendEngine::default()
            .blend(&global, None, "team-unknown", &scores())
            .expect("blend");
        assert_eq!(blended.global_influence, 1.0);
        assert_eq!(blended.weights, global.weights);
        assert_eq!(blended.regime_blend, global.regime_blend);
        assert_eq!(blended.shm, global.shm);
    }

    #[test]
    fn override_blends_weights_evenly_and_regime_seventy_thirty() {
        let global = global_baseline();
        let team = ux_team();
        let blended = BlendEngine::default()
            .blend(&global, Some(&team), "team-ux", &scores())
            .expect("blend");

        assert_eq!(blended.global_influence, 0.5);
        for dimension in Dimension::ALL {
            let expected = 0.5 * global.weights.get(dimension) + 0.5 * team.weights.get(dimension);
            assert!((blended.weights.get(dimension) - expected).abs() < 1e-12);
        }
        for i in 0..3 {
            let expected = 0.7 * global.regime_blend.0[i] + 0.3 * team.regime_blend.0[i];
            assert!((blended.regime_blend.0[i] - expected).abs() < 1e-12);
        }
        assert!(blended.weights.design > 0.2);
        assert!(blended.regime_blend.exploration() > global.regime_blend.exploration());
    }

    #[test]
    fn harmonic_mean_of_uniform_scores_is_that_score() {
        let weights = DimensionWeights {
            ux: 1.0 / 6.0,
            design: 1.0 / 6.0,
            code: 1.0 / 6.0,
            semantic: 1.0 / 6.0,
            journey: 1.0 / 6.0,
            state: 1.0 / 6.0,
        };
        let uniform = TeamScores {
            ux: 0.8,
            design: 0.8,
            code: 0.8,
            semantic: 0.8,
            journey: 0.8,
            state: 0.8,
        };
        let (shm, clamped) = BlendEngine::default()
            .harmonic_shm(&uniform, &weights)
            .expect("shm");
        assert!((shm - 0.8).abs() < 1e-9);
        assert!(clamped.is_empty());
    }

    #[test]
    fn zero_score_is_clamped_and_reported() {
        let mut with_zero = scores();
        with_zero.state = 0.0;
        let global = global_baseline();
        let blended = BlendEngine::default()
            .blend(&global, Some(&ux_team()), "team-ux", &with_zero)
            .expect("blend");
        assert_eq!(blended.clamped_dimensions, vec![Dimension::State]);
        assert!(blended.shm > 0.0 && blended.shm < 0.1);
    }

    #[test]
    fn zero_score_is_rejected_under_reject_policy() {
        let mut with_zero = scores();
        with_zero.code = 0.0;
        let engine = BlendEngine::new(ZeroScorePolicy::Reject, DEFAULT_SCORE_FLOOR);
        let err = engine
            .blend(&global_baseline(), Some(&ux_team()), "team-ux", &with_zero)
            .unwrap_err();
        assert!(matches!(
            err,
            BlendError::ZeroScore {
                dimension: Dimension::Code,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn store_backed_blend_falls_back_for_unknown_team() {
        let store = MemoryStore::with_global(global_baseline()).with_team(ux_team());
        let engine = BlendEngine::default();
        let known = engine
            .blend_for_team(&store, "team-ux", &scores())
            .await
            .expect("known team");
        let unknown = engine
            .blend_for_team(&store, "team-nobody", &scores())
            .await
            .expect("unknown team");
        assert_eq!(known.global_influence, 0.5);
        assert_eq!(unknown.global_influence, 1.0);
    }

    #[tokio::test]
    async fn missing_global_is_fatal() {
        let store = MemoryStore::new();
        let err = BlendEngine::default()
            .blend_for_team(&store, "team-ux", &scores())
            .await
            .unwrap_err();
        assert!(matches!(err, BlendError::Store(StoreError::NotFound { .. })));
    }
}

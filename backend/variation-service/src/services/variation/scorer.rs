//! Heuristic similarity score for an applied variation config
//!
//! Starts at 100 and subtracts a fixed penalty per noticeably-deviating
//! parameter. The result is always clamped to `[MIN_SCORE, MAX_SCORE]`.

use crate::models::VariationConfig;

pub const MIN_SCORE: u8 = 50;
pub const MAX_SCORE: u8 = 70;

const BASE_SCORE: i32 = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer;

impl SimilarityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, config: &VariationConfig) -> u8 {
        let mut score = BASE_SCORE;

        if deviates(config.speed, 1.0, 0.04) {
            score -= 5;
        }
        if deviates(config.brightness, 0.0, 0.02) {
            score -= 4;
        }
        if deviates(config.contrast, 1.0, 0.02) {
            score -= 4;
        }
        if deviates(config.saturation, 1.0, 0.05) {
            score -= 3;
        }
        if config.horizontal_flip {
            score -= 8;
        }
        if config.has_noise() {
            score -= 3;
        }
        if deviates(config.scale, 1.0, 0.01) {
            score -= 3;
        }
        if let Some(margin) = config.crop_margin.filter(|m| *m > 1.0) {
            score -= margin.round() as i32;
        }
        if deviates(config.volume, 1.0, 0.05) {
            score -= 2;
        }

        score.clamp(MIN_SCORE as i32, MAX_SCORE as i32) as u8
    }
}

fn deviates(value: Option<f64>, identity: f64, threshold: f64) -> bool {
    value.map_or(false, |v| (v - identity).abs() > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::variation::synthesizer::ConfigSynthesizer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_empty_config_clamps_to_max() {
        assert_eq!(SimilarityScorer::new().score(&VariationConfig::default()), MAX_SCORE);
    }

    #[test]
    fn test_extreme_config_stays_in_range() {
        let config = VariationConfig {
            speed: Some(2.0),
            brightness: Some(1.0),
            contrast: Some(3.0),
            saturation: Some(3.0),
            gamma: Some(3.0),
            volume: Some(4.0),
            scale: Some(3.0),
            crop_margin: Some(49.0),
            horizontal_flip: true,
            noise_strength: Some(100.0),
            ..VariationConfig::default()
        };
        assert_eq!(SimilarityScorer::new().score(&config), MIN_SCORE);
    }

    #[test]
    fn test_flip_alone_stays_at_ceiling() {
        // 100 - 8 is still above the ceiling.
        let config = VariationConfig {
            horizontal_flip: true,
            ..VariationConfig::default()
        };
        assert_eq!(SimilarityScorer::new().score(&config), MAX_SCORE);
    }

    #[test]
    fn test_crop_penalty_uses_rounded_margin() {
        let scorer = SimilarityScorer::new();
        let base = VariationConfig {
            speed: Some(1.05),
            brightness: Some(0.05),
            contrast: Some(1.05),
            saturation: Some(1.1),
            horizontal_flip: true,
            noise_strength: Some(2.0),
            scale: Some(1.02),
            volume: Some(1.1),
            ..VariationConfig::default()
        };
        // 100 - 5 - 4 - 4 - 3 - 8 - 3 - 3 - 2 = 68
        assert_eq!(scorer.score(&base), 68);

        let cropped = VariationConfig {
            crop_margin: Some(1.6),
            ..base.clone()
        };
        assert_eq!(scorer.score(&cropped), 66);

        let below_threshold = VariationConfig {
            crop_margin: Some(0.9),
            ..base
        };
        assert_eq!(scorer.score(&below_threshold), 68);
    }

    #[test]
    fn test_random_configs_always_in_range() {
        let scorer = SimilarityScorer::new();
        let mut rng = StdRng::seed_from_u64(2024);

        for _ in 0..2000 {
            let config = VariationConfig {
                speed: rng.gen_bool(0.5).then(|| rng.gen_range(0.1..4.0)),
                brightness: rng.gen_bool(0.5).then(|| rng.gen_range(-1.0..1.0)),
                contrast: rng.gen_bool(0.5).then(|| rng.gen_range(0.1..4.0)),
                saturation: rng.gen_bool(0.5).then(|| rng.gen_range(0.0..3.0)),
                gamma: rng.gen_bool(0.5).then(|| rng.gen_range(0.1..4.0)),
                volume: rng.gen_bool(0.5).then(|| rng.gen_range(0.0..4.0)),
                scale: rng.gen_bool(0.5).then(|| rng.gen_range(0.1..4.0)),
                crop_margin: rng.gen_bool(0.5).then(|| rng.gen_range(0.0..50.0)),
                horizontal_flip: rng.gen_bool(0.5),
                noise_strength: rng.gen_bool(0.5).then(|| rng.gen_range(1.0..3.0)),
                ..VariationConfig::default()
            };
            let score = scorer.score(&config);
            assert!((MIN_SCORE..=MAX_SCORE).contains(&score), "score {score}");
        }

        let synth = ConfigSynthesizer::new();
        for index in 0..300 {
            let score = scorer.score(&synth.synthesize(index, &mut rng));
            assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
        }
    }
}

//! Randomized per-variation parameter synthesis
//!
//! A configuration family is chosen by `index % families.len()`; each family
//! defines which parameters exist and their legal ranges. A jitter pass then
//! nudges speed, brightness and contrast so that no two variations coincide.

use rand::Rng;

use crate::models::{ConfigFamily, VariationConfig};

/// Inclusive parameter bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.min..=self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Parameters and ranges for one configuration family
#[derive(Debug, Clone, Copy)]
pub struct FamilySpec {
    pub family: ConfigFamily,
    pub speed: Option<ParamRange>,
    pub brightness: Option<ParamRange>,
    pub contrast: Option<ParamRange>,
    pub saturation: Option<ParamRange>,
    pub gamma: Option<ParamRange>,
    pub volume: Option<ParamRange>,
    pub scale: Option<ParamRange>,
    pub crop_margin: Option<ParamRange>,
    pub flip_probability: Option<f64>,
    pub noise_probability: Option<f64>,
}

/// Noise strength is drawn from `[1, 3)`
pub const NOISE_STRENGTH_MIN: f64 = 1.0;
pub const NOISE_STRENGTH_MAX: f64 = 3.0;

/// Multiplicative jitter for speed/contrast, additive for brightness
pub const JITTER: f64 = 0.01;

pub const FAMILIES: [FamilySpec; 3] = [
    FamilySpec {
        family: ConfigFamily::Balanced,
        speed: Some(ParamRange::new(0.95, 1.05)),
        brightness: Some(ParamRange::new(-0.05, 0.05)),
        contrast: Some(ParamRange::new(0.95, 1.05)),
        saturation: Some(ParamRange::new(0.9, 1.1)),
        gamma: None,
        volume: Some(ParamRange::new(0.9, 1.1)),
        scale: None,
        crop_margin: None,
        flip_probability: Some(0.3),
        noise_probability: None,
    },
    FamilySpec {
        family: ConfigFamily::Subtle,
        speed: Some(ParamRange::new(0.97, 1.03)),
        brightness: Some(ParamRange::new(-0.03, 0.03)),
        contrast: Some(ParamRange::new(0.97, 1.03)),
        saturation: Some(ParamRange::new(0.95, 1.05)),
        gamma: Some(ParamRange::new(0.95, 1.05)),
        volume: None,
        scale: None,
        crop_margin: None,
        flip_probability: None,
        noise_probability: Some(0.4),
    },
    FamilySpec {
        family: ConfigFamily::Reframe,
        speed: Some(ParamRange::new(0.96, 1.04)),
        brightness: Some(ParamRange::new(-0.04, 0.04)),
        contrast: None,
        saturation: None,
        gamma: None,
        volume: None,
        scale: Some(ParamRange::new(0.98, 1.02)),
        crop_margin: Some(ParamRange::new(0.0, 2.0)),
        flip_probability: Some(0.5),
        noise_probability: None,
    },
];

/// Produces a fresh `VariationConfig` per variation index
#[derive(Debug, Clone, Copy)]
pub struct ConfigSynthesizer {
    families: &'static [FamilySpec],
}

impl Default for ConfigSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSynthesizer {
    pub fn new() -> Self {
        Self {
            families: &FAMILIES,
        }
    }

    pub fn family_for(&self, index: u32) -> &'static FamilySpec {
        &self.families[index as usize % self.families.len()]
    }

    /// Synthesize the parameter set for variation `index`.
    ///
    /// Only parameters defined by the selected family are populated.
    pub fn synthesize<R: Rng + ?Sized>(&self, index: u32, rng: &mut R) -> VariationConfig {
        let spec = self.family_for(index);

        let mut config = VariationConfig {
            family: Some(spec.family),
            speed: spec.speed.map(|r| r.sample(rng)),
            brightness: spec.brightness.map(|r| r.sample(rng)),
            contrast: spec.contrast.map(|r| r.sample(rng)),
            saturation: spec.saturation.map(|r| r.sample(rng)),
            gamma: spec.gamma.map(|r| r.sample(rng)),
            volume: spec.volume.map(|r| r.sample(rng)),
            scale: spec.scale.map(|r| r.sample(rng)),
            crop_margin: spec.crop_margin.map(|r| r.sample(rng)),
            horizontal_flip: spec.flip_probability.map_or(false, |p| rng.gen_bool(p)),
            noise_strength: None,
        };

        if let Some(p) = spec.noise_probability {
            if rng.gen_bool(p) {
                config.noise_strength = Some(rng.gen_range(NOISE_STRENGTH_MIN..NOISE_STRENGTH_MAX));
            }
        }

        apply_jitter(spec, &mut config, rng);
        config
    }
}

/// Second, independent perturbation pass. Results are clamped back into the
/// family range.
fn apply_jitter<R: Rng + ?Sized>(spec: &FamilySpec, config: &mut VariationConfig, rng: &mut R) {
    if let (Some(range), Some(speed)) = (spec.speed, config.speed.as_mut()) {
        *speed = range.clamp(*speed * rng.gen_range(1.0 - JITTER..=1.0 + JITTER));
    }
    if let (Some(range), Some(brightness)) = (spec.brightness, config.brightness.as_mut()) {
        *brightness = range.clamp(*brightness + rng.gen_range(-JITTER..=JITTER));
    }
    if let (Some(range), Some(contrast)) = (spec.contrast, config.contrast.as_mut()) {
        *contrast = range.clamp(*contrast * rng.gen_range(1.0 - JITTER..=1.0 + JITTER));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn within(range: Option<ParamRange>, value: Option<f64>) -> bool {
        match (range, value) {
            (Some(range), Some(value)) => range.contains(value),
            (None, None) => true,
            _ => false,
        }
    }

    #[test]
    fn test_family_selected_by_index_modulo() {
        let synth = ConfigSynthesizer::new();
        assert_eq!(synth.family_for(0).family, ConfigFamily::Balanced);
        assert_eq!(synth.family_for(1).family, ConfigFamily::Subtle);
        assert_eq!(synth.family_for(2).family, ConfigFamily::Reframe);
        assert_eq!(synth.family_for(3).family, ConfigFamily::Balanced);
        assert_eq!(synth.family_for(301).family, ConfigFamily::Subtle);
    }

    #[test]
    fn test_parameters_stay_within_family_ranges() {
        let synth = ConfigSynthesizer::new();
        let mut rng = StdRng::seed_from_u64(7);

        for index in 0..600 {
            let spec = synth.family_for(index);
            let config = synth.synthesize(index, &mut rng);

            assert_eq!(config.family, Some(spec.family));
            assert!(within(spec.speed, config.speed));
            assert!(within(spec.brightness, config.brightness));
            assert!(within(spec.contrast, config.contrast));
            assert!(within(spec.saturation, config.saturation));
            assert!(within(spec.gamma, config.gamma));
            assert!(within(spec.volume, config.volume));
            assert!(within(spec.scale, config.scale));
            assert!(within(spec.crop_margin, config.crop_margin));

            if spec.flip_probability.is_none() {
                assert!(!config.horizontal_flip);
            }
            match (spec.noise_probability, config.noise_strength) {
                (None, Some(_)) => panic!("noise outside a noise family"),
                (_, Some(strength)) => {
                    assert!((NOISE_STRENGTH_MIN..NOISE_STRENGTH_MAX).contains(&strength))
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_reframe_family_omits_color_and_audio() {
        let synth = ConfigSynthesizer::new();
        let mut rng = StdRng::seed_from_u64(11);
        let config = synth.synthesize(2, &mut rng);

        assert!(config.contrast.is_none());
        assert!(config.saturation.is_none());
        assert!(config.gamma.is_none());
        assert!(config.volume.is_none());
        assert!(config.noise_strength.is_none());
        assert!(config.scale.is_some());
        assert!(config.crop_margin.is_some());
    }

    #[test]
    fn test_same_seed_reproduces_configs() {
        let synth = ConfigSynthesizer::new();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);

        for index in 0..9 {
            assert_eq!(synth.synthesize(index, &mut a), synth.synthesize(index, &mut b));
        }
    }

    #[test]
    fn test_repeated_index_yields_distinct_configs() {
        let synth = ConfigSynthesizer::new();
        let mut rng = StdRng::seed_from_u64(3);
        let first = synth.synthesize(0, &mut rng);
        let second = synth.synthesize(0, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_flip_rate_tracks_family_probability() {
        let synth = ConfigSynthesizer::new();
        let mut rng = StdRng::seed_from_u64(99);
        let trials = 3000;
        let flips = (0..trials)
            .filter(|_| synth.synthesize(2, &mut rng).horizontal_flip)
            .count();
        let rate = flips as f64 / trials as f64;
        assert!((0.45..0.55).contains(&rate), "flip rate {rate}");
    }
}

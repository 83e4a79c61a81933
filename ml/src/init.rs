use rand::Rng;

use crate::model::ParamSpec;

/// Fills a fresh flat parameter buffer: Kaiming-uniform weights
/// (`U(-sqrt(6/fan_in), sqrt(6/fan_in))`), zero biases.
///
/// Sampling walks the layout in declaration order, so a given RNG seed
/// always yields the same buffer.
pub fn init_params<R: Rng>(layout: &[ParamSpec], size: usize, rng: &mut R) -> Vec<f32> {
    let mut params = vec![0.0; size];

    for spec in layout {
        if !spec.name.ends_with(".weight") {
            continue;
        }

        let fan_in = spec.shape.0;
        let bound = (6.0 / fan_in as f32).sqrt();

        for w in &mut params[spec.offset..spec.offset + spec.len] {
            *w = rng.random_range(-bound..bound);
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn biases_stay_zero_and_weights_stay_bounded() {
        let layout = vec![
            ParamSpec {
                name: "fc.weight".to_string(),
                offset: 0,
                len: 6,
                shape: (2, 3),
            },
            ParamSpec {
                name: "fc.bias".to_string(),
                offset: 6,
                len: 3,
                shape: (3, 1),
            },
        ];

        let params = init_params(&layout, 9, &mut StdRng::seed_from_u64(1));
        let bound = (6.0_f32 / 2.0).sqrt();

        assert!(params[..6].iter().all(|w| w.abs() < bound));
        assert!(params[..6].iter().any(|w| *w != 0.0));
        assert_eq!(&params[6..], &[0.0, 0.0, 0.0]);
    }
}

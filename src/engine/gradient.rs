use bevy::{
    color::{Alpha, Mix},
    prelude::*,
};

/// Number of colors sampled into the `_sphereColors` uniform array.
pub const PALETTE_SIZE: usize = 8;

/// Anything that can be evaluated at a normalized position.
pub trait GradientSource {
    fn evaluate(&self, t: f32) -> LinearRgba;
}

impl<F: Fn(f32) -> LinearRgba> GradientSource for F {
    #[inline]
    fn evaluate(&self, t: f32) -> LinearRgba {
        self(t)
    }
}

/// Normalized sampling positions `i / N`. Position `1.0` is never part of it.
pub fn sample_positions<const N: usize>() -> [f32; N] {
    let step = 1. / N as f32;
    std::array::from_fn(|i| step * i as f32)
}

pub fn sample_gradient<const N: usize>(gradient: &impl GradientSource) -> [LinearRgba; N] {
    sample_positions::<N>().map(|t| gradient.evaluate(t))
}

#[inline]
pub fn sample_palette(gradient: &impl GradientSource) -> [LinearRgba; PALETTE_SIZE] {
    sample_gradient::<PALETTE_SIZE>(gradient)
}

#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GradientMode {
    #[default]
    Blend,
    /// Holds the color of the next key, no interpolation.
    Fixed,
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct ColorKey {
    pub color: Srgba,
    pub time: f32,
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct AlphaKey {
    pub alpha: f32,
    pub time: f32,
}

/// Keyed color ramp, colors and alpha keyed independently.
///
/// Keys are interpolated in sRGB space and returned as linear colors.
/// Keys do not need to be sorted.
#[derive(Reflect, Debug, Clone, PartialEq)]
#[reflect(Default)]
pub struct ColorGradient {
    pub mode: GradientMode,
    pub color_keys: Vec<ColorKey>,
    pub alpha_keys: Vec<AlphaKey>,
}

impl Default for ColorGradient {
    fn default() -> Self {
        Self::new([(0., Srgba::WHITE), (1., Srgba::BLACK)])
    }
}

impl ColorGradient {
    pub fn new(keys: impl IntoIterator<Item = (f32, Srgba)>) -> Self {
        Self {
            mode: GradientMode::Blend,
            color_keys: keys
                .into_iter()
                .map(|(time, color)| ColorKey { color, time })
                .collect(),
            alpha_keys: vec![AlphaKey {
                alpha: 1.,
                time: 0.,
            }],
        }
    }

    pub fn with_mode(mut self, mode: GradientMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_alpha_keys(mut self, keys: impl IntoIterator<Item = (f32, f32)>) -> Self {
        self.alpha_keys = keys
            .into_iter()
            .map(|(time, alpha)| AlphaKey { alpha, time })
            .collect();
        self
    }

    fn color_at(&self, t: f32) -> Srgba {
        let keys = sorted(&self.color_keys, |k| k.time);
        interpolate(&keys, t, self.mode, |k| k.time, |k| k.color, |a, b, f| a.mix(&b, f))
            .unwrap_or(Srgba::WHITE)
    }

    fn alpha_at(&self, t: f32) -> f32 {
        let keys = sorted(&self.alpha_keys, |k| k.time);
        interpolate(&keys, t, self.mode, |k| k.time, |k| k.alpha, |a, b, f| a + (b - a) * f)
            .unwrap_or(1.)
    }
}

impl GradientSource for ColorGradient {
    fn evaluate(&self, t: f32) -> LinearRgba {
        self.color_at(t).with_alpha(self.alpha_at(t)).into()
    }
}

fn sorted<K: Copy>(keys: &[K], time: impl Fn(&K) -> f32) -> Vec<K> {
    let mut keys = keys.to_vec();
    keys.sort_by(|a, b| time(a).total_cmp(&time(b)));
    keys
}

fn interpolate<K, V: Copy>(
    keys: &[K],
    t: f32,
    mode: GradientMode,
    time: impl Fn(&K) -> f32,
    value: impl Fn(&K) -> V,
    mix: impl Fn(V, V, f32) -> V,
) -> Option<V> {
    let (first, last) = (keys.first()?, keys.last()?);

    if t <= time(first) {
        return Some(value(first));
    }
    if t >= time(last) {
        return Some(value(last));
    }

    let next = keys.iter().position(|k| time(k) >= t)?;
    let (a, b) = (&keys[next - 1], &keys[next]);

    Some(match mode {
        GradientMode::Fixed => value(b),
        GradientMode::Blend => {
            let span = time(b) - time(a);
            let f = if span > 0. { (t - time(a)) / span } else { 1. };
            mix(value(a), value(b), f)
        }
    })
}

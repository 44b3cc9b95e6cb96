//! Sub-pixel convolution super-resolution network (ESPCN family).
//!
//! The network runs on luma only. Its last layer produces `scale²` channels
//! that are pixel-shuffled into a high-resolution luma residual, which is
//! added to a Lanczos-upscaled base image.

use std::path::Path;

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::resample::lanczos;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvLayer {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    /// Row-major `[out][in][ky][kx]`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrModel {
    pub name: String,
    pub scale: u32,
    pub layers: Vec<ConvLayer>,
}

/// Channel-major feature map.
struct FeatureMap {
    channels: usize,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl FeatureMap {
    fn at(&self, c: usize, x: usize, y: usize) -> f32 {
        self.data[(c * self.height + y) * self.width + x]
    }
}

impl SrModel {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read model file '{}': {}", path.display(), e))?;
        let model: SrModel = serde_json::from_str(&content)
            .map_err(|e| format!("cannot parse model file '{}': {}", path.display(), e))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scale < 1 {
            return Err("model scale must be >= 1".to_string());
        }
        let Some(first) = self.layers.first() else {
            return Err("model has no layers".to_string());
        };
        if first.in_channels != 1 {
            return Err(format!(
                "first layer must take 1 luma channel, takes {}",
                first.in_channels
            ));
        }

        let mut channels = 1;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.in_channels != channels {
                return Err(format!(
                    "layer {} expects {} input channels, previous layer produces {}",
                    i, layer.in_channels, channels
                ));
            }
            if layer.kernel_size == 0 || layer.kernel_size % 2 == 0 {
                return Err(format!("layer {} kernel size must be odd", i));
            }
            let expected = layer.out_channels * layer.in_channels * layer.kernel_size.pow(2);
            if layer.weights.len() != expected {
                return Err(format!(
                    "layer {} has {} weights, expected {}",
                    i,
                    layer.weights.len(),
                    expected
                ));
            }
            if layer.bias.len() != layer.out_channels {
                return Err(format!(
                    "layer {} has {} biases, expected {}",
                    i,
                    layer.bias.len(),
                    layer.out_channels
                ));
            }
            channels = layer.out_channels;
        }

        let shuffle = (self.scale * self.scale) as usize;
        if channels != shuffle {
            return Err(format!(
                "last layer must produce scale² = {} channels, produces {}",
                shuffle, channels
            ));
        }
        Ok(())
    }

    /// Upscales by exactly `self.scale`.
    pub fn upsample(&self, image: &RgbImage) -> RgbImage {
        let scale = self.scale as usize;
        let (width, height) = (image.width() as usize, image.height() as usize);

        let mut features = FeatureMap {
            channels: 1,
            width,
            height,
            data: image.pixels().map(|p| luma(p) / 255.0).collect(),
        };
        for layer in &self.layers {
            features = convolve(layer, &features);
        }

        let base = lanczos(image, (width * scale) as u32, (height * scale) as u32);
        let mut out = base;
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let (x, y) = (x as usize, y as usize);
            let channel = (y % scale) * scale + (x % scale);
            let residual = features.at(channel, x / scale, y / scale) * 255.0;
            *pixel = add_luma(pixel, residual);
        }
        out
    }
}

fn convolve(layer: &ConvLayer, input: &FeatureMap) -> FeatureMap {
    let (width, height) = (input.width, input.height);
    let k = layer.kernel_size;
    let half = (k / 2) as isize;
    let mut data = vec![0.0f32; layer.out_channels * width * height];

    for o in 0..layer.out_channels {
        for y in 0..height {
            for x in 0..width {
                let mut acc = layer.bias[o];
                for i in 0..input.channels {
                    for ky in 0..k {
                        let sy = y as isize + ky as isize - half;
                        if sy < 0 || sy >= height as isize {
                            continue;
                        }
                        for kx in 0..k {
                            let sx = x as isize + kx as isize - half;
                            if sx < 0 || sx >= width as isize {
                                continue;
                            }
                            let w = layer.weights[((o * input.channels + i) * k + ky) * k + kx];
                            acc += w * input.at(i, sx as usize, sy as usize);
                        }
                    }
                }
                if layer.activation == Activation::Relu {
                    acc = acc.max(0.0);
                }
                data[(o * height + y) * width + x] = acc;
            }
        }
    }

    FeatureMap {
        channels: layer.out_channels,
        width,
        height,
        data,
    }
}

fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

/// Adds `delta` to the BT.601 luma of `p` while keeping its chroma.
fn add_luma(p: &Rgb<u8>, delta: f32) -> Rgb<u8> {
    if delta == 0.0 {
        return *p;
    }
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Rgb([
        to_u8(p[0] as f32 + delta),
        to_u8(p[1] as f32 + delta),
        to_u8(p[2] as f32 + delta),
    ])
}

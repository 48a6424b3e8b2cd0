// 该文件是 Linzhi （林芝） 项目的一部分。
// src/preprocess.rs - 图像预处理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use image::{
  ImageReader, RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  tensor::{Tensor, TensorError},
  url_path,
};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("裁剪尺寸 {crop} 无效, 缩放尺寸为 {resize}")]
  InvalidCrop { resize: u32, crop: u32 },
  #[error("图像尺寸无效: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 待预处理的图像文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFileInput {
  path: PathBuf,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = PreprocessError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(PreprocessError::SchemaMismatch);
    }

    Ok(ImageFileInput {
      path: url_path(url),
    })
  }
}

impl ImageFileInput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Result<RgbImage, PreprocessError> {
    info!("读取图像文件: {}", self.path.display());
    let image = ImageReader::open(&self.path)?.decode()?;
    Ok(image.to_rgb8())
  }
}

/// 短边缩放、中心裁剪、归一化并转换为 NCHW 的 float32 张量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocess {
  pub resize: u32,
  pub crop: u32,
  pub mean: [f32; 3],
  pub std: [f32; 3],
}

impl Default for Preprocess {
  fn default() -> Self {
    Self {
      resize: 256,
      crop: 224,
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
    }
  }
}

impl Preprocess {
  /// 短边缩放到 `resize`，长边按同一比例缩放后取整
  pub fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
    let scale = |long: u32, short: u32| {
      let long = (long as f64 * (self.resize as f64 / short as f64)) as u32;
      long.max(self.resize)
    };
    if height <= width {
      (scale(width, height), self.resize)
    } else {
      (self.resize, scale(height, width))
    }
  }

  pub fn apply(&self, image: &RgbImage) -> Result<Tensor, PreprocessError> {
    if self.crop == 0 || self.crop > self.resize {
      return Err(PreprocessError::InvalidCrop {
        resize: self.resize,
        crop: self.crop,
      });
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(PreprocessError::EmptyImage(width, height));
    }

    let (resized_width, resized_height) = self.resized_dims(width, height);
    debug!(
      "缩放图像 {}x{} -> {}x{}",
      width, height, resized_width, resized_height
    );
    let resized = imageops::resize(image, resized_width, resized_height, FilterType::Triangle);

    let left = (resized_width - self.crop) / 2;
    let top = (resized_height - self.crop) / 2;
    let cropped = imageops::crop_imm(&resized, left, top, self.crop, self.crop).to_image();

    let side = self.crop as usize;
    let plane = side * side;
    let mut data = vec![0f32; 3 * plane];
    for (w, h, pixel) in cropped.enumerate_pixels() {
      let offset = h as usize * side + w as usize;
      for c in 0..3 {
        let value = pixel[c] as f32 / 255.0;
        data[c * plane + offset] = (value - self.mean[c]) / self.std[c];
      }
    }

    Ok(Tensor::from_slice(&[1, 3, side, side], &data)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    input::TensorFileInput,
    tensor::{DataType, TensorDesc},
  };
  use image::Rgb;

  #[test]
  fn shorter_side_is_scaled_to_resize() {
    let preprocess = Preprocess::default();
    assert_eq!(preprocess.resized_dims(300, 260), (295, 256));
    assert_eq!(preprocess.resized_dims(100, 151), (256, 386));
  }

  #[test]
  fn solid_image_is_normalized_per_channel() {
    let image = RgbImage::from_pixel(300, 260, Rgb([255, 128, 0]));
    let tensor = Preprocess::default().apply(&image).unwrap();

    assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    assert_eq!(tensor.as_bytes().len(), 3 * 224 * 224 * 4);

    let values = tensor.to_vec::<f32>().unwrap();
    let plane = 224 * 224;
    assert!((values[0] - 2.248_908).abs() < 1e-4);
    assert!((values[plane] - 0.205_182).abs() < 1e-4);
    assert!((values[2 * plane + plane - 1] + 1.804_444).abs() < 1e-4);
  }

  #[test]
  fn crop_larger_than_resize_is_rejected() {
    let image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
    let preprocess = Preprocess {
      resize: 16,
      crop: 32,
      ..Preprocess::default()
    };
    assert!(matches!(
      preprocess.apply(&image),
      Err(PreprocessError::InvalidCrop {
        resize: 16,
        crop: 32
      })
    ));
  }

  #[test]
  fn image_file_becomes_loadable_tensor_file() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("test.png");
    RgbImage::from_pixel(320, 240, Rgb([10, 200, 30]))
      .save(&image_path)
      .unwrap();

    let url = Url::parse(&format!("image:{}", image_path.display())).unwrap();
    let image = ImageFileInput::from_url(&url).unwrap().load().unwrap();
    let tensor = Preprocess::default().apply(&image).unwrap();

    let output = TensorFileInput::new(dir.path().join("test.bin"));
    output.write(&tensor).unwrap();
    assert_eq!(
      std::fs::metadata(output.path()).unwrap().len(),
      3 * 224 * 224 * 4
    );

    let desc = TensorDesc::new("input", &[1, 3, 224, 224], DataType::Float32);
    assert_eq!(output.load(&desc).unwrap(), tensor);
  }

  #[test]
  fn from_url_rejects_other_schemes() {
    let url = Url::parse("tensor:test.bin").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(PreprocessError::SchemaMismatch)
    ));
  }
}

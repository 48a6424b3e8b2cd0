// 该文件是 Linzhi （林芝） 项目的一部分。
// src/model.rs - 推理后端能力接口
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

use std::path::Path;

use crate::tensor::{ModelDescriptor, Tensor};

/// 推理运行时：负责获取设备与加载模型
pub trait Runtime {
  type Device: DeviceContext;
  type Model: InferenceModel;
  type Error: std::error::Error + Send + Sync + 'static;

  fn acquire_device(&self, device_id: u32) -> Result<Self::Device, Self::Error>;
  fn load_model(&self, device: &Self::Device, path: &Path) -> Result<Self::Model, Self::Error>;
}

/// 设备上下文，析构时释放设备
pub trait DeviceContext {
  fn device_id(&self) -> u32;
}

/// 已加载的模型，析构时释放模型
pub trait InferenceModel {
  type Error: std::error::Error + Send + Sync + 'static;

  fn descriptor(&self) -> &ModelDescriptor;

  /// 同步静态批次推理，结果写入按描述预先分配的 `outputs`
  fn infer(&mut self, inputs: &[Tensor], outputs: &mut [Tensor]) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
  pub class_id: u32,
  pub class_name: String,
  pub confidence: f32,
}

/// 每个批次元素一组按置信度降序排列的分类结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyResult {
  pub batches: Box<[Box<[ClassInfo]>]>,
}

impl ClassifyResult {
  pub fn is_empty(&self) -> bool {
    self.batches.iter().all(|items| items.is_empty())
  }

  pub fn len(&self) -> usize {
    self.batches.len()
  }
}

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxDevice, OnnxError, OnnxModel, OnnxRuntime};

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnDevice, RknnError, RknnModel, RknnRuntime};

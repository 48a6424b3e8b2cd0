// 该文件是 Linzhi （林芝） 项目的一部分。
// src/error.rs - 流水线错误
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

use thiserror::Error;

use crate::{input::InputError, postprocess::PostProcessError, tensor::TensorError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 流水线各阶段的错误，`code()` 作为进程退出码
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("设备初始化失败: {0}")]
  Device(#[source] BoxError),
  #[error("模型加载失败: {0}")]
  ModelLoad(#[source] BoxError),
  #[error("配置错误: {0}")]
  Config(#[source] BoxError),
  #[error("读取输入失败: {0}")]
  Io(#[from] InputError),
  #[error("输出张量分配失败: {0}")]
  Allocation(#[from] TensorError),
  #[error("推理失败: {0}")]
  Inference(#[source] BoxError),
  #[error("后处理失败: {0}")]
  PostProcess(#[from] PostProcessError),
}

impl PipelineError {
  pub fn device(err: impl Into<BoxError>) -> Self {
    PipelineError::Device(err.into())
  }

  pub fn model_load(err: impl Into<BoxError>) -> Self {
    PipelineError::ModelLoad(err.into())
  }

  pub fn config(err: impl Into<BoxError>) -> Self {
    PipelineError::Config(err.into())
  }

  pub fn inference(err: impl Into<BoxError>) -> Self {
    PipelineError::Inference(err.into())
  }

  pub fn code(&self) -> u8 {
    match self {
      PipelineError::Device(_) => 10,
      PipelineError::ModelLoad(_) => 11,
      PipelineError::Config(_) => 12,
      PipelineError::Io(_) => 13,
      PipelineError::Allocation(_) => 14,
      PipelineError::Inference(_) => 15,
      PipelineError::PostProcess(_) => 16,
    }
  }

  /// 出错的阶段名称
  pub fn stage(&self) -> &'static str {
    match self {
      PipelineError::Device(_) | PipelineError::ModelLoad(_) | PipelineError::Config(_) => "Init",
      PipelineError::Io(_) => "ReadInputTensor",
      PipelineError::Allocation(_) | PipelineError::Inference(_) => "Inference",
      PipelineError::PostProcess(_) => "PostProcess",
    }
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/postprocess.rs - 分类结果后处理
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

use std::cmp::Ordering;

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  label::LabelMap,
  model::{ClassInfo, ClassifyResult},
  tensor::{Tensor, TensorError},
};

#[derive(Error, Debug)]
pub enum PostProcessError {
  #[error("类别数量必须大于 0")]
  InvalidClassNum,
  #[error("top-k 必须大于 0")]
  InvalidTopK,
  #[error("模型没有输出张量")]
  NoOutput,
  #[error("输出张量形状无效: {0:?}")]
  InvalidShape(Box<[usize]>),
  #[error("类别数量不匹配: 期望 {expected}, 实际 {actual}")]
  ClassNumMismatch { expected: usize, actual: usize },
  #[error("输出张量错误: {0}")]
  Tensor(#[from] TensorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassPostConfig {
  pub class_num: u32,
  pub top_k: u32,
  pub softmax: bool,
  pub check_tensor: bool,
}

/// 分类后处理：可选 softmax，按置信度排序并截取前 k 个
#[derive(Debug, Clone)]
pub struct ClassPostProcessor {
  config: ClassPostConfig,
  labels: LabelMap,
}

impl ClassPostProcessor {
  pub fn new(config: ClassPostConfig, labels: LabelMap) -> Result<Self, PostProcessError> {
    if config.class_num == 0 {
      return Err(PostProcessError::InvalidClassNum);
    }
    if config.top_k == 0 {
      return Err(PostProcessError::InvalidTopK);
    }
    if labels.len() != config.class_num as usize {
      debug!(
        "标签数量 {} 与类别数量 {} 不一致",
        labels.len(),
        config.class_num
      );
    }
    Ok(Self { config, labels })
  }

  /// 第一个输出张量视作 `[batch, classes]`，首维为批次，其余维度展平为类别
  pub fn process(&self, outputs: &[Tensor]) -> Result<ClassifyResult, PostProcessError> {
    let tensor = outputs.first().ok_or(PostProcessError::NoOutput)?;
    let (batch, classes) = match tensor.shape() {
      [] => return Err(PostProcessError::InvalidShape(tensor.shape().into())),
      [classes] => (1, *classes),
      [batch, rest @ ..] => (*batch, rest.iter().product()),
    };
    if batch == 0 || classes == 0 {
      error!("输出张量形状无效: {:?}", tensor.shape());
      return Err(PostProcessError::InvalidShape(tensor.shape().into()));
    }
    if self.config.check_tensor && classes != self.config.class_num as usize {
      error!(
        "输出类别数量 {} 与配置 {} 不一致",
        classes, self.config.class_num
      );
      return Err(PostProcessError::ClassNumMismatch {
        expected: self.config.class_num as usize,
        actual: classes,
      });
    }

    let scores = tensor.to_f32_vec()?;
    let batches = scores
      .chunks_exact(classes)
      .map(|row| self.rank(row))
      .collect::<Vec<_>>();

    Ok(ClassifyResult {
      batches: batches.into_boxed_slice(),
    })
  }

  fn rank(&self, scores: &[f32]) -> Box<[ClassInfo]> {
    let confidences = if self.config.softmax {
      softmax(scores)
    } else {
      scores.to_vec()
    };

    top_k(&confidences, self.config.top_k as usize)
      .into_iter()
      .map(|(idx, confidence)| {
        let class_id = idx as u32;
        ClassInfo {
          class_id,
          class_name: self.labels.name(class_id).into_owned(),
          confidence,
        }
      })
      .collect()
  }
}

/// 减去最大值后计算的 softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps = logits.iter().map(|&x| (x - max).exp()).collect::<Vec<_>>();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / sum).collect()
}

/// 按分数降序返回前 k 个 `(下标, 分数)`，分数相同时下标小者在前
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
  let mut ranked = scores.iter().copied().enumerate().collect::<Vec<_>>();
  ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
    Ordering::Equal => a.0.cmp(&b.0),
    ord => ord,
  });
  ranked.truncate(k);
  ranked
}

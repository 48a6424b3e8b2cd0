// 该文件是 Linzhi （林芝） 项目的一部分。
// src/param.rs - 初始化参数
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{postprocess::ClassPostConfig, url_path};

pub const DEFAULT_DEVICE_ID: u32 = 0;
pub const DEFAULT_CLASS_NUM: u32 = 1000;
pub const DEFAULT_TOP_K: u32 = 5;
pub const DEFAULT_LABEL_PATH: &str = "../model/shufflenetv2plus_clsidx_to_labels.names";
pub const DEFAULT_MODEL_URL: &str = "onnx:../model/shufflenetv2plus.onnx";
pub const DEFAULT_INPUT_URL: &str = "tensor:../test.bin";

#[derive(Error, Debug)]
pub enum ParamError {
  #[error("无法读取配置文件 {0}: {1}")]
  Io(String, std::io::Error),
  #[error("配置文件 {0} 格式错误: {1}")]
  Json(String, serde_json::Error),
}

/// 初始化参数，启动时创建一次，之后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitParam {
  pub device_id: u32,
  pub label_path: PathBuf,
  pub class_num: u32,
  pub top_k: u32,
  pub softmax: bool,
  pub check_tensor: bool,
  /// 模型地址，方案决定推理后端，例如 `onnx:model.onnx`
  pub model: Url,
}

impl Default for InitParam {
  fn default() -> Self {
    Self {
      device_id: DEFAULT_DEVICE_ID,
      label_path: PathBuf::from(DEFAULT_LABEL_PATH),
      class_num: DEFAULT_CLASS_NUM,
      top_k: DEFAULT_TOP_K,
      softmax: false,
      check_tensor: true,
      model: Url::parse(DEFAULT_MODEL_URL).expect("内置模型地址无效"),
    }
  }
}

impl InitParam {
  pub fn from_json_file(path: &Path) -> Result<Self, ParamError> {
    info!("加载配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)
      .map_err(|e| ParamError::Io(path.display().to_string(), e))?;
    serde_json::from_str(&content).map_err(|e| ParamError::Json(path.display().to_string(), e))
  }

  pub fn model_path(&self) -> PathBuf {
    url_path(&self.model)
  }

  pub fn post_config(&self) -> ClassPostConfig {
    ClassPostConfig {
      class_num: self.class_num,
      top_k: self.top_k,
      softmax: self.softmax,
      check_tensor: self.check_tensor,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn defaults_follow_shipped_model() {
    let param = InitParam::default();
    assert_eq!(param.class_num, 1000);
    assert_eq!(param.top_k, 5);
    assert!(!param.softmax);
    assert!(param.check_tensor);
    assert_eq!(param.model.scheme(), "onnx");
    assert_eq!(param.model_path(), PathBuf::from("../model/shufflenetv2plus.onnx"));
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"top_k": 3, "softmax": true, "model": "rknn:/opt/model/net.rknn?input=1x3x224x224&output=1x1000"}}"#
    )
    .unwrap();

    let param = InitParam::from_json_file(file.path()).unwrap();
    assert_eq!(param.top_k, 3);
    assert!(param.softmax);
    assert_eq!(param.class_num, DEFAULT_CLASS_NUM);
    assert_eq!(param.model.scheme(), "rknn");
    assert_eq!(param.model_path(), PathBuf::from("/opt/model/net.rknn"));
  }

  #[test]
  fn malformed_json_is_reported() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{ top_k: ").unwrap();
    assert!(matches!(
      InitParam::from_json_file(file.path()),
      Err(ParamError::Json(..))
    ));
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/input.rs - 张量文件输入
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

use std::{
  fs::File,
  io::Read,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  tensor::{DataType, Tensor, TensorDesc, TensorError},
  url_path,
};

const F32_SIZE: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("无法打开数据文件 {0}: {1}")]
  Open(String, std::io::Error),
  #[error("读取数据文件 {0} 失败: {1}")]
  Read(String, std::io::Error),
  #[error("写入数据文件 {0} 失败: {1}")]
  Write(String, std::io::Error),
  #[error("数据文件 {path} 大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  SizeMismatch {
    path: String,
    expected: u64,
    actual: u64,
  },
  #[error("数据文件元素数量过大: {0}")]
  TooLarge(usize),
  #[error("模型输入类型为 {0}, 只支持 float32 输入")]
  UnsupportedType(DataType),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 预处理好的原始 float32 张量文件（无文件头、小端、行优先）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorFileInput {
  path: PathBuf,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemaMismatch);
    }

    Ok(TensorFileInput {
      path: url_path(url),
    })
  }
}

impl TensorFileInput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 读取恰好 `element_count` 个 float32，文件长度不一致视为错误
  pub fn read_f32(&self, element_count: usize) -> Result<Vec<f32>, InputError> {
    let path_str = self.path.display().to_string();
    let byte_len = element_count
      .checked_mul(F32_SIZE)
      .ok_or(InputError::TooLarge(element_count))?;
    let mut file = File::open(&self.path).map_err(|e| {
      error!("无法打开数据文件: {}", path_str);
      InputError::Open(path_str.clone(), e)
    })?;

    let expected = byte_len as u64;
    let actual = file
      .metadata()
      .map_err(|e| InputError::Read(path_str.clone(), e))?
      .len();
    if actual != expected {
      error!(
        "数据文件大小不匹配: 期望 {} 字节, 实际 {} 字节",
        expected, actual
      );
      return Err(InputError::SizeMismatch {
        path: path_str,
        expected,
        actual,
      });
    }

    let mut bytes = vec![0u8; byte_len];
    file
      .read_exact(&mut bytes)
      .map_err(|e| InputError::Read(path_str.clone(), e))?;
    debug!("读取 {} 个 float32 数据", element_count);

    Ok(
      bytes
        .chunks_exact(F32_SIZE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect(),
    )
  }

  /// 按模型输入描述读取并构造输入张量
  pub fn load(&self, desc: &TensorDesc) -> Result<Tensor, InputError> {
    if desc.dtype != DataType::Float32 {
      return Err(InputError::UnsupportedType(desc.dtype));
    }
    let count = desc
      .element_count()
      .ok_or_else(|| TensorError::ShapeOverflow(desc.shape.clone()))?;
    let data = self.read_f32(count)?;
    Ok(Tensor::from_slice(&desc.shape, &data)?)
  }

  /// 以相同格式写出 float32 张量，覆盖已有文件
  pub fn write(&self, tensor: &Tensor) -> Result<(), InputError> {
    if tensor.dtype() != DataType::Float32 {
      return Err(InputError::UnsupportedType(tensor.dtype()));
    }
    let path_str = self.path.display().to_string();
    std::fs::write(&self.path, tensor.as_bytes()).map_err(|e| {
      error!("写入数据文件失败: {}", path_str);
      InputError::Write(path_str.clone(), e)
    })?;
    debug!("写入 {} 个 float32 数据", tensor.element_count());
    Ok(())
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/tensor.rs - 张量与模型描述定义
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

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("数据长度不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("元素数量不匹配: 期望 {expected}, 实际 {actual}")]
  CountMismatch { expected: usize, actual: usize },
  #[error("数据类型不匹配: 期望 {expected}, 实际 {actual}")]
  TypeMismatch { expected: DataType, actual: DataType },
  #[error("不支持的数据类型: {0}")]
  Unsupported(DataType),
  #[error("无法分配 {0} 字节张量内存")]
  Alloc(usize),
  #[error("张量形状溢出: {0:?}")]
  ShapeOverflow(Box<[usize]>),
}

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
  Float32,
  Float16,
  Int8,
  UInt8,
  Int32,
  Int64,
}

impl DataType {
  /// 单个元素的字节宽度
  pub fn size(&self) -> usize {
    match self {
      DataType::Float32 | DataType::Int32 => 4,
      DataType::Float16 => 2,
      DataType::Int8 | DataType::UInt8 => 1,
      DataType::Int64 => 8,
    }
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DataType::Float32 => "float32",
      DataType::Float16 => "float16",
      DataType::Int8 => "int8",
      DataType::UInt8 => "uint8",
      DataType::Int32 => "int32",
      DataType::Int64 => "int64",
    };
    f.write_str(name)
  }
}

/// 可以直接写入张量缓冲区的元素
pub trait Element: Copy {
  const DTYPE: DataType;
  fn write_le(self, dst: &mut [u8]);
  fn read_le(src: &[u8]) -> Self;
}

macro_rules! impl_element {
  ($ty:ty, $dtype:expr) => {
    impl Element for $ty {
      const DTYPE: DataType = $dtype;

      fn write_le(self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.to_le_bytes());
      }

      fn read_le(src: &[u8]) -> Self {
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice(src);
        <$ty>::from_le_bytes(buf)
      }
    }
  };
}

impl_element!(f32, DataType::Float32);
impl_element!(i8, DataType::Int8);
impl_element!(u8, DataType::UInt8);
impl_element!(i32, DataType::Int32);
impl_element!(i64, DataType::Int64);

/// 模型单个输入/输出张量的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
  pub name: String,
  pub shape: Box<[usize]>,
  pub dtype: DataType,
}

impl TensorDesc {
  pub fn new(name: impl Into<String>, shape: &[usize], dtype: DataType) -> Self {
    Self {
      name: name.into(),
      shape: shape.into(),
      dtype,
    }
  }

  /// 各维度的乘积，溢出时返回 `None`
  pub fn element_count(&self) -> Option<usize> {
    checked_element_count(&self.shape)
  }

  /// 形状与元素宽度的乘积，溢出时返回 `None`
  pub fn byte_size(&self) -> Option<usize> {
    checked_byte_size(&self.shape, self.dtype)
  }
}

/// 模型输入输出描述，模型加载后只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDescriptor {
  pub inputs: Vec<TensorDesc>,
  pub outputs: Vec<TensorDesc>,
}

fn checked_element_count(shape: &[usize]) -> Option<usize> {
  shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

fn checked_byte_size(shape: &[usize], dtype: DataType) -> Option<usize> {
  shape
    .iter()
    .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
}

/// 带形状和类型的张量，数据以小端字节保存
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  shape: Box<[usize]>,
  dtype: DataType,
  data: Box<[u8]>,
}

impl Tensor {
  /// 按描述分配一块清零的张量内存
  pub fn alloc(desc: &TensorDesc) -> Result<Self, TensorError> {
    let size = desc
      .byte_size()
      .ok_or_else(|| TensorError::ShapeOverflow(desc.shape.clone()))?;
    let mut data = Vec::new();
    data
      .try_reserve_exact(size)
      .map_err(|_| TensorError::Alloc(size))?;
    data.resize(size, 0u8);

    Ok(Self {
      shape: desc.shape.clone(),
      dtype: desc.dtype,
      data: data.into_boxed_slice(),
    })
  }

  pub fn from_bytes(shape: &[usize], dtype: DataType, data: Vec<u8>) -> Result<Self, TensorError> {
    let expected =
      checked_byte_size(shape, dtype).ok_or_else(|| TensorError::ShapeOverflow(shape.into()))?;
    if data.len() != expected {
      return Err(TensorError::SizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape: shape.into(),
      dtype,
      data: data.into_boxed_slice(),
    })
  }

  pub fn from_slice<T: Element>(shape: &[usize], values: &[T]) -> Result<Self, TensorError> {
    let expected =
      checked_element_count(shape).ok_or_else(|| TensorError::ShapeOverflow(shape.into()))?;
    if values.len() != expected {
      return Err(TensorError::CountMismatch {
        expected,
        actual: values.len(),
      });
    }

    let width = T::DTYPE.size();
    let mut data = vec![0u8; values.len() * width];
    for (chunk, value) in data.chunks_exact_mut(width).zip(values) {
      value.write_le(chunk);
    }
    Self::from_bytes(shape, T::DTYPE, data)
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn dtype(&self) -> DataType {
    self.dtype
  }

  pub fn element_count(&self) -> usize {
    self.data.len() / self.dtype.size()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// 用同类型元素覆盖整个张量
  pub fn fill_from<T: Element>(&mut self, values: &[T]) -> Result<(), TensorError> {
    if T::DTYPE != self.dtype {
      return Err(TensorError::TypeMismatch {
        expected: self.dtype,
        actual: T::DTYPE,
      });
    }
    if values.len() != self.element_count() {
      return Err(TensorError::CountMismatch {
        expected: self.element_count(),
        actual: values.len(),
      });
    }

    let width = self.dtype.size();
    for (chunk, value) in self.data.chunks_exact_mut(width).zip(values) {
      value.write_le(chunk);
    }
    Ok(())
  }

  pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
    if T::DTYPE != self.dtype {
      return Err(TensorError::TypeMismatch {
        expected: T::DTYPE,
        actual: self.dtype,
      });
    }
    Ok(
      self
        .data
        .chunks_exact(self.dtype.size())
        .map(T::read_le)
        .collect(),
    )
  }

  /// 将数值类型的张量转换为 f32，供后处理使用
  pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
    let values = match self.dtype {
      DataType::Float32 => self.to_vec::<f32>()?,
      DataType::Int8 => self.to_vec::<i8>()?.into_iter().map(f32::from).collect(),
      DataType::UInt8 => self.to_vec::<u8>()?.into_iter().map(f32::from).collect(),
      DataType::Int32 => self
        .to_vec::<i32>()?
        .into_iter()
        .map(|v| v as f32)
        .collect(),
      DataType::Int64 => self
        .to_vec::<i64>()?
        .into_iter()
        .map(|v| v as f32)
        .collect(),
      DataType::Float16 => return Err(TensorError::Unsupported(DataType::Float16)),
    };
    Ok(values)
  }
}

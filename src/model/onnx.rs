// 该文件是 Linzhi （林芝） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use ort::{
  session::{Session, SessionInputValue, builder::GraphOptimizationLevel},
  tensor::TensorElementType,
  value::ValueType,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DeviceContext, InferenceModel, Runtime},
  tensor::{DataType, ModelDescriptor, Tensor, TensorDesc, TensorError},
};

/// ONNX Runtime 只提供 CPU 设备
const ONNX_CPU_DEVICE: u32 = 0;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的参数 {0}: {1}")]
  InvalidQuery(String, String),
  #[error("不支持的设备: {0}, ONNX Runtime 仅支持 CPU 设备 0")]
  UnsupportedDevice(u32),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("张量 {0} 不是静态形状: {1:?}")]
  DynamicShape(String, Vec<i64>),
  #[error("张量 {0} 不是普通张量")]
  NotTensor(String),
  #[error("张量 {0} 的数据类型不受支持: {1}")]
  UnsupportedType(String, String),
  #[error("输入数量不匹配: 期望 {expected}, 实际 {actual}")]
  InputCount { expected: usize, actual: usize },
  #[error("输出数量不匹配: 期望 {expected}, 实际 {actual}")]
  OutputCount { expected: usize, actual: usize },
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
}

#[derive(Debug, Clone, Default)]
pub struct OnnxRuntime {
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxRuntime {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxRuntime {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OnnxError::SchemeMismatch);
    }

    let mut runtime = OnnxRuntime::default();
    for (k, v) in url.query_pairs() {
      if k == "threads" {
        let threads = v
          .parse::<usize>()
          .map_err(|e| OnnxError::InvalidQuery(k.to_string(), e.to_string()))?;
        runtime.intra_threads = Some(threads);
      }
    }
    Ok(runtime)
  }
}

#[derive(Debug)]
pub struct OnnxDevice {
  id: u32,
}

impl DeviceContext for OnnxDevice {
  fn device_id(&self) -> u32 {
    self.id
  }
}

impl Drop for OnnxDevice {
  fn drop(&mut self) {
    debug!("释放 ONNX Runtime 设备 {}", self.id);
  }
}

pub struct OnnxModel {
  session: Session,
  descriptor: ModelDescriptor,
}

impl Runtime for OnnxRuntime {
  type Device = OnnxDevice;
  type Model = OnnxModel;
  type Error = OnnxError;

  fn acquire_device(&self, device_id: u32) -> Result<Self::Device, Self::Error> {
    if device_id != ONNX_CPU_DEVICE {
      error!("ONNX Runtime 不支持设备 {}", device_id);
      return Err(OnnxError::UnsupportedDevice(device_id));
    }
    info!("使用 ONNX Runtime CPU 设备");
    Ok(OnnxDevice { id: device_id })
  }

  fn load_model(&self, device: &Self::Device, path: &Path) -> Result<Self::Model, Self::Error> {
    info!(
      "加载模型文件: {} (设备 {})",
      path.display(),
      device.device_id()
    );
    if !path.is_file() {
      return Err(OnnxError::ModelNotFound(path.display().to_string()));
    }

    let mut builder =
      Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = self.intra_threads {
      debug!("推理线程数: {}", threads);
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_file(path)?;
    info!("模型加载完成");

    let descriptor = build_descriptor(&session)?;
    debug!("模型输入: {:?}", descriptor.inputs);
    debug!("模型输出: {:?}", descriptor.outputs);

    Ok(OnnxModel {
      session,
      descriptor,
    })
  }
}

fn build_descriptor(session: &Session) -> Result<ModelDescriptor, OnnxError> {
  let inputs = session
    .inputs
    .iter()
    .map(|input| tensor_desc_from_value_type(&input.name, &input.input_type))
    .collect::<Result<Vec<_>, _>>()?;
  let outputs = session
    .outputs
    .iter()
    .map(|output| tensor_desc_from_value_type(&output.name, &output.output_type))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(ModelDescriptor { inputs, outputs })
}

fn tensor_desc_from_value_type(name: &str, value_type: &ValueType) -> Result<TensorDesc, OnnxError> {
  let ValueType::Tensor { ty, shape, .. } = value_type else {
    return Err(OnnxError::NotTensor(name.to_string()));
  };

  let dtype = match ty {
    TensorElementType::Float32 => DataType::Float32,
    TensorElementType::Float16 => DataType::Float16,
    TensorElementType::Int8 => DataType::Int8,
    TensorElementType::Uint8 => DataType::UInt8,
    TensorElementType::Int32 => DataType::Int32,
    TensorElementType::Int64 => DataType::Int64,
    other => return Err(OnnxError::UnsupportedType(name.to_string(), other.to_string())),
  };

  if shape.iter().any(|&d| d <= 0) {
    return Err(OnnxError::DynamicShape(
      name.to_string(),
      shape.iter().copied().collect(),
    ));
  }
  let dims = shape.iter().map(|&d| d as usize).collect::<Vec<_>>();

  Ok(TensorDesc::new(name, &dims, dtype))
}

fn tensor_to_session_input(tensor: &Tensor) -> Result<SessionInputValue<'static>, OnnxError> {
  let shape = tensor.shape().to_vec();
  let value = match tensor.dtype() {
    DataType::Float32 => ort::value::Tensor::from_array((shape, tensor.to_vec::<f32>()?))?.into_dyn(),
    DataType::Int32 => ort::value::Tensor::from_array((shape, tensor.to_vec::<i32>()?))?.into_dyn(),
    DataType::Int64 => ort::value::Tensor::from_array((shape, tensor.to_vec::<i64>()?))?.into_dyn(),
    DataType::UInt8 => ort::value::Tensor::from_array((shape, tensor.to_vec::<u8>()?))?.into_dyn(),
    DataType::Int8 => ort::value::Tensor::from_array((shape, tensor.to_vec::<i8>()?))?.into_dyn(),
    other => return Err(TensorError::Unsupported(other).into()),
  };
  Ok(SessionInputValue::from(value))
}

impl InferenceModel for OnnxModel {
  type Error = OnnxError;

  fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  fn infer(&mut self, inputs: &[Tensor], outputs: &mut [Tensor]) -> Result<(), Self::Error> {
    if inputs.len() != self.descriptor.inputs.len() {
      return Err(OnnxError::InputCount {
        expected: self.descriptor.inputs.len(),
        actual: inputs.len(),
      });
    }
    if outputs.len() != self.descriptor.outputs.len() {
      return Err(OnnxError::OutputCount {
        expected: self.descriptor.outputs.len(),
        actual: outputs.len(),
      });
    }

    debug!("设置模型输入");
    let mut ort_inputs = Vec::with_capacity(inputs.len());
    for (desc, input) in self.descriptor.inputs.iter().zip(inputs) {
      ort_inputs.push((desc.name.clone(), tensor_to_session_input(input)?));
    }

    debug!("执行模型推理");
    let results = self.session.run(ort_inputs)?;

    debug!("获取模型输出");
    for (idx, ((_, value), output)) in results.iter().zip(outputs.iter_mut()).enumerate() {
      match output.dtype() {
        DataType::Float32 => output.fill_from(value.try_extract_tensor::<f32>()?.1)?,
        DataType::Int32 => output.fill_from(value.try_extract_tensor::<i32>()?.1)?,
        DataType::Int64 => output.fill_from(value.try_extract_tensor::<i64>()?.1)?,
        DataType::UInt8 => output.fill_from(value.try_extract_tensor::<u8>()?.1)?,
        DataType::Int8 => output.fill_from(value.try_extract_tensor::<i8>()?.1)?,
        other => {
          error!("第 {} 个输出的数据类型不受支持: {}", idx, other);
          return Err(TensorError::Unsupported(other).into());
        }
      }
    }

    Ok(())
  }
}

impl Drop for OnnxModel {
  fn drop(&mut self) {
    debug!("释放 ONNX 模型");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_url_reads_thread_count() {
    let url = Url::parse("onnx:../model/net.onnx?threads=2").unwrap();
    let runtime = OnnxRuntime::from_url(&url).unwrap();
    assert_eq!(runtime.intra_threads, Some(2));
  }

  #[test]
  fn from_url_rejects_other_schemes() {
    let url = Url::parse("rknn:../model/net.rknn").unwrap();
    assert!(matches!(
      OnnxRuntime::from_url(&url),
      Err(OnnxError::SchemeMismatch)
    ));
  }

  #[test]
  fn only_cpu_device_is_available() {
    let runtime = OnnxRuntime::default();
    assert_eq!(runtime.acquire_device(0).unwrap().device_id(), 0);
    assert!(matches!(
      runtime.acquire_device(1),
      Err(OnnxError::UnsupportedDevice(1))
    ));
  }

  #[test]
  fn missing_model_file_fails_before_session() {
    let runtime = OnnxRuntime::default();
    let device = runtime.acquire_device(0).unwrap();
    let result = runtime.load_model(&device, Path::new("/nonexistent/model.onnx"));
    assert!(matches!(result, Err(OnnxError::ModelNotFound(_))));
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理后端
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DeviceContext, InferenceModel, Runtime},
  tensor::{DataType, ModelDescriptor, Tensor, TensorDesc, TensorError},
};

/// 板载 NPU 只有一个设备
const RKNN_NPU_DEVICE: u32 = 0;

#[derive(Error, Debug)]
pub enum RknnError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少模型描述参数: {0}")]
  MissingShape(&'static str),
  #[error("无效的形状参数 {0}: {1}")]
  InvalidShape(String, String),
  #[error("不支持的设备: {0}")]
  UnsupportedDevice(u32),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

impl RknnError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnError::ModelInvalid(msg.to_string(), e)
  }
}

/// RKNN 模型不暴露张量属性，输入输出形状由 URL 参数声明，
/// 例如 `rknn:model.rknn?input=1x3x224x224&output=1x1000`
#[derive(Debug, Clone)]
pub struct RknnRuntime {
  inputs: Vec<TensorDesc>,
  outputs: Vec<TensorDesc>,
}

impl FromUrlWithScheme for RknnRuntime {
  const SCHEME: &'static str = "rknn";
}

fn parse_shape(key: &str, value: &str) -> Result<Box<[usize]>, RknnError> {
  let dims = value
    .split('x')
    .map(|d| d.trim().parse::<usize>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| RknnError::InvalidShape(key.to_string(), e.to_string()))?;
  let overflow = dims
    .iter()
    .try_fold(DataType::Float32.size(), |acc, &d| acc.checked_mul(d))
    .is_none();
  if dims.is_empty() || dims.contains(&0) || overflow {
    return Err(RknnError::InvalidShape(
      key.to_string(),
      value.to_string(),
    ));
  }
  Ok(dims.into_boxed_slice())
}

impl FromUrl for RknnRuntime {
  type Error = RknnError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RknnError::SchemeMismatch);
    }

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "input" => {
          let name = format!("input{}", inputs.len());
          inputs.push(TensorDesc::new(name, &parse_shape(&k, &v)?, DataType::Float32));
        }
        "output" => {
          let name = format!("output{}", outputs.len());
          outputs.push(TensorDesc::new(name, &parse_shape(&k, &v)?, DataType::Float32));
        }
        _ => {}
      }
    }

    if inputs.is_empty() {
      return Err(RknnError::MissingShape("input"));
    }
    if outputs.is_empty() {
      return Err(RknnError::MissingShape("output"));
    }

    Ok(RknnRuntime { inputs, outputs })
  }
}

#[derive(Debug)]
pub struct RknnDevice {
  id: u32,
}

impl DeviceContext for RknnDevice {
  fn device_id(&self) -> u32 {
    self.id
  }
}

impl Drop for RknnDevice {
  fn drop(&mut self) {
    debug!("释放 NPU 设备 {}", self.id);
  }
}

pub struct RknnModel {
  context: Context,
  descriptor: ModelDescriptor,
}

impl Runtime for RknnRuntime {
  type Device = RknnDevice;
  type Model = RknnModel;
  type Error = RknnError;

  fn acquire_device(&self, device_id: u32) -> Result<Self::Device, Self::Error> {
    if device_id != RKNN_NPU_DEVICE {
      error!("NPU 设备 {} 不存在", device_id);
      return Err(RknnError::UnsupportedDevice(device_id));
    }
    info!("使用 NPU 设备 {}", device_id);
    Ok(RknnDevice { id: device_id })
  }

  fn load_model(&self, _device: &Self::Device, path: &Path) -> Result<Self::Model, Self::Error> {
    info!("加载模型文件: {}", path.display());
    let model_data = std::fs::read(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;
    info!("模型加载完成");

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RknnError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnError::invalid("无法获取输出数量", e))?;
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs as usize != self.inputs.len() {
      let msg = format!(
        "声明的输入数量为 {}, 模型实际为 {}",
        self.inputs.len(),
        num_inputs
      );
      error!("{}", msg);
      return Err(RknnError::invalid(&msg, rknpu::Error::InvalidModel));
    }
    if num_outputs as usize != self.outputs.len() {
      let msg = format!(
        "声明的输出数量为 {}, 模型实际为 {}",
        self.outputs.len(),
        num_outputs
      );
      error!("{}", msg);
      return Err(RknnError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    Ok(RknnModel {
      context,
      descriptor: ModelDescriptor {
        inputs: self.inputs.clone(),
        outputs: self.outputs.clone(),
      },
    })
  }
}

impl InferenceModel for RknnModel {
  type Error = RknnError;

  fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  fn infer(&mut self, inputs: &[Tensor], outputs: &mut [Tensor]) -> Result<(), Self::Error> {
    debug!("设置模型输入");
    for (idx, input) in inputs.iter().enumerate() {
      if input.dtype() != DataType::Float32 {
        return Err(TensorError::Unsupported(input.dtype()).into());
      }
      self.context.set_input(
        idx as u32,
        input.as_bytes(),
        TensorFormat::NCHW,
        TensorType::Float32,
      )?;
    }

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let result = self.context.get_outputs()?;
    for (idx, output) in outputs.iter_mut().enumerate() {
      let data = result.get_f32(idx)?;
      output.fill_from(data)?;
    }

    Ok(())
  }
}

impl Drop for RknnModel {
  fn drop(&mut self) {
    debug!("释放 RKNN 推理上下文");
  }
}

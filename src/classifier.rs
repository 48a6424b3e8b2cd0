// 该文件是 Linzhi （林芝） 项目的一部分。
// src/classifier.rs - 分类推理流水线
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

use std::time::Instant;

use tracing::{debug, error, info};

use crate::{
  InitParam, PipelineError,
  input::TensorFileInput,
  label::LabelMap,
  model::{ClassifyResult, DeviceContext, InferenceModel, Runtime},
  postprocess::ClassPostProcessor,
  tensor::{Tensor, TensorDesc},
};

pub trait Classify {
  /// 读取输入、推理并后处理
  fn classify(&mut self, input: &TensorFileInput) -> Result<ClassifyResult, PipelineError>;
}

/// 持有设备、模型与后处理器的分类器
///
/// 字段按释放顺序排列：模型、后处理器、设备、运行时。
pub struct Classifier<R: Runtime> {
  model: R::Model,
  post: ClassPostProcessor,
  device: R::Device,
  runtime: R,
  input_desc: TensorDesc,
}

impl<R: Runtime> Classifier<R> {
  pub fn init(runtime: R, param: &InitParam) -> Result<Self, PipelineError> {
    info!("初始化设备 {}", param.device_id);
    let device = runtime.acquire_device(param.device_id).map_err(|e| {
      error!("设备初始化失败: {}", e);
      PipelineError::device(e)
    })?;

    let model = runtime
      .load_model(&device, &param.model_path())
      .map_err(|e| {
        error!("模型加载失败: {}", e);
        PipelineError::model_load(e)
      })?;

    let input_desc = model
      .descriptor()
      .inputs
      .first()
      .cloned()
      .ok_or_else(|| {
        error!("模型没有输入张量");
        PipelineError::model_load("模型没有输入张量")
      })?;
    if matches!(input_desc.element_count(), None | Some(0)) {
      error!("模型输入形状无效: {:?}", input_desc.shape);
      return Err(PipelineError::config(format!(
        "模型输入形状无效: {:?}",
        input_desc.shape
      )));
    }
    debug!(
      "模型输入 {}: {:?} {}",
      input_desc.name, input_desc.shape, input_desc.dtype
    );

    let labels = LabelMap::from_file(&param.label_path).map_err(|e| {
      error!("标签文件加载失败: {}", e);
      PipelineError::config(e)
    })?;
    let post = ClassPostProcessor::new(param.post_config(), labels).map_err(|e| {
      error!("后处理初始化失败: {}", e);
      PipelineError::config(e)
    })?;
    info!("初始化完成");

    Ok(Self {
      model,
      post,
      device,
      runtime,
      input_desc,
    })
  }

  pub fn input_desc(&self) -> &TensorDesc {
    &self.input_desc
  }

  pub fn read_input_tensor(&self, input: &TensorFileInput) -> Result<Tensor, PipelineError> {
    debug!("读取输入张量: {}", input.path().display());
    let tensor = input.load(&self.input_desc).map_err(|e| {
      error!("读取输入张量失败: {}", e);
      PipelineError::from(e)
    })?;
    Ok(tensor)
  }

  pub fn inference(&mut self, input: Tensor) -> Result<Vec<Tensor>, PipelineError> {
    let mut outputs = Vec::with_capacity(self.model.descriptor().outputs.len());
    for desc in &self.model.descriptor().outputs {
      let tensor = Tensor::alloc(desc).map_err(|e| {
        error!("输出张量 {} 分配失败: {}", desc.name, e);
        PipelineError::from(e)
      })?;
      outputs.push(tensor);
    }

    let now = Instant::now();
    self
      .model
      .infer(std::slice::from_ref(&input), &mut outputs)
      .map_err(|e| {
        error!("模型推理失败: {}", e);
        PipelineError::inference(e)
      })?;
    debug!("推理耗时: {:.2?}", now.elapsed());

    Ok(outputs)
  }

  pub fn post_process(&self, outputs: &[Tensor]) -> Result<ClassifyResult, PipelineError> {
    self.post.process(outputs).map_err(|e| {
      error!("后处理失败: {}", e);
      PipelineError::from(e)
    })
  }

  pub fn process(&mut self, input: &TensorFileInput) -> Result<ClassifyResult, PipelineError> {
    let tensor = self.read_input_tensor(input)?;
    let outputs = self.inference(tensor)?;
    self.post_process(&outputs)
  }

  /// 按模型、后处理器、设备的顺序释放资源
  pub fn deinit(self) {
    let Self {
      model,
      post,
      device,
      runtime,
      ..
    } = self;
    info!("释放模型");
    drop(model);
    drop(post);
    info!("释放设备 {}", device.device_id());
    drop(device);
    drop(runtime);
  }
}

impl<R: Runtime> Classify for Classifier<R> {
  fn classify(&mut self, input: &TensorFileInput) -> Result<ClassifyResult, PipelineError> {
    self.process(input)
  }
}

/// 根据模型地址的方案选择推理后端
pub enum ClassifierWrapper {
  #[cfg(feature = "onnx")]
  Onnx(Classifier<crate::model::OnnxRuntime>),
  #[cfg(feature = "rknpu")]
  Rknn(Classifier<crate::model::RknnRuntime>),
}

impl ClassifierWrapper {
  pub fn init(param: &InitParam) -> Result<Self, PipelineError> {
    #[cfg(feature = "onnx")]
    {
      use crate::{FromUrl, FromUrlWithScheme, model::OnnxRuntime};

      if param.model.scheme() == OnnxRuntime::SCHEME {
        let runtime = OnnxRuntime::from_url(&param.model).map_err(PipelineError::config)?;
        return Ok(ClassifierWrapper::Onnx(Classifier::init(runtime, param)?));
      }
    }
    #[cfg(feature = "rknpu")]
    {
      use crate::{FromUrl, FromUrlWithScheme, model::RknnRuntime};

      if param.model.scheme() == RknnRuntime::SCHEME {
        let runtime = RknnRuntime::from_url(&param.model).map_err(PipelineError::config)?;
        return Ok(ClassifierWrapper::Rknn(Classifier::init(runtime, param)?));
      }
    }
    error!("不支持的模型地址: {}", param.model);
    Err(PipelineError::config(format!(
      "不支持的模型地址方案: {}",
      param.model.scheme()
    )))
  }

  pub fn deinit(self) {
    match self {
      #[cfg(feature = "onnx")]
      ClassifierWrapper::Onnx(classifier) => classifier.deinit(),
      #[cfg(feature = "rknpu")]
      ClassifierWrapper::Rknn(classifier) => classifier.deinit(),
    }
  }
}

impl Classify for ClassifierWrapper {
  fn classify(&mut self, input: &TensorFileInput) -> Result<ClassifyResult, PipelineError> {
    match self {
      #[cfg(feature = "onnx")]
      ClassifierWrapper::Onnx(classifier) => classifier.process(input),
      #[cfg(feature = "rknpu")]
      ClassifierWrapper::Rknn(classifier) => classifier.process(input),
    }
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// tests/pipeline.rs - 分类流水线集成测试
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
  io::Write,
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use linzhi::{
  InitParam, PipelineError,
  classifier::Classifier,
  input::TensorFileInput,
  model::{DeviceContext, InferenceModel, Runtime},
  output::LogOutput,
  task::{OneShotTask, RepeatShotTask, Task},
  tensor::{DataType, ModelDescriptor, Tensor, TensorDesc},
};
use tempfile::TempDir;
use thiserror::Error;
use url::Url;

const CLASSES: usize = 4;

#[derive(Error, Debug)]
#[error("fake runtime: {0}")]
struct FakeError(&'static str);

#[derive(Default)]
struct Counters {
  acquired: AtomicUsize,
  released: AtomicUsize,
  order: Mutex<Vec<&'static str>>,
}

impl Counters {
  fn release(&self, what: &'static str) {
    self.released.fetch_add(1, Ordering::SeqCst);
    self.order.lock().unwrap().push(what);
  }

  fn release_order(&self) -> Vec<&'static str> {
    self.order.lock().unwrap().clone()
  }

  fn balanced(&self) -> bool {
    self.acquired.load(Ordering::SeqCst) == self.released.load(Ordering::SeqCst)
  }
}

#[derive(Clone, Copy, Default, PartialEq)]
enum Fault {
  #[default]
  None,
  Device,
  Load,
  Infer,
  HugeOutput,
  HugeInput,
  NoInput,
}

struct FakeRuntime {
  counters: Arc<Counters>,
  fault: Fault,
  output_classes: usize,
}

struct FakeDevice {
  id: u32,
  counters: Arc<Counters>,
}

impl DeviceContext for FakeDevice {
  fn device_id(&self) -> u32 {
    self.id
  }
}

impl Drop for FakeDevice {
  fn drop(&mut self) {
    self.counters.release("device");
  }
}

/// 输出每个类别等于对应通道输入之和
struct FakeModel {
  descriptor: ModelDescriptor,
  counters: Arc<Counters>,
  fail_infer: bool,
}

impl Drop for FakeModel {
  fn drop(&mut self) {
    self.counters.release("model");
  }
}

impl Runtime for FakeRuntime {
  type Device = FakeDevice;
  type Model = FakeModel;
  type Error = FakeError;

  fn acquire_device(&self, device_id: u32) -> Result<Self::Device, Self::Error> {
    if self.fault == Fault::Device {
      return Err(FakeError("device busy"));
    }
    self.counters.acquired.fetch_add(1, Ordering::SeqCst);
    Ok(FakeDevice {
      id: device_id,
      counters: self.counters.clone(),
    })
  }

  fn load_model(&self, _device: &Self::Device, path: &Path) -> Result<Self::Model, Self::Error> {
    if self.fault == Fault::Load || !path.ends_with("net.fake") {
      return Err(FakeError("cannot load model"));
    }
    self.counters.acquired.fetch_add(1, Ordering::SeqCst);

    let output_shape = if self.fault == Fault::HugeOutput {
      vec![usize::MAX, 2]
    } else {
      vec![1, self.output_classes]
    };
    let inputs = match self.fault {
      Fault::NoInput => vec![],
      Fault::HugeInput => vec![TensorDesc::new("input", &[usize::MAX, 2], DataType::Float32)],
      _ => vec![TensorDesc::new("input", &[1, CLASSES, 2, 2], DataType::Float32)],
    };
    Ok(FakeModel {
      descriptor: ModelDescriptor {
        inputs,
        outputs: vec![TensorDesc::new("logits", &output_shape, DataType::Float32)],
      },
      counters: self.counters.clone(),
      fail_infer: self.fault == Fault::Infer,
    })
  }
}

impl InferenceModel for FakeModel {
  type Error = FakeError;

  fn descriptor(&self) -> &ModelDescriptor {
    &self.descriptor
  }

  fn infer(&mut self, inputs: &[Tensor], outputs: &mut [Tensor]) -> Result<(), Self::Error> {
    if self.fail_infer {
      return Err(FakeError("engine failure"));
    }
    let values = inputs[0].to_vec::<f32>().map_err(|_| FakeError("bad input"))?;
    let classes = outputs[0].element_count();
    let plane = values.len() / CLASSES;
    let scores = (0..classes)
      .map(|c| {
        values
          .get(c * plane..(c + 1) * plane)
          .map(|p| p.iter().sum())
          .unwrap_or(0.0)
      })
      .collect::<Vec<f32>>();
    outputs[0]
      .fill_from(&scores)
      .map_err(|_| FakeError("bad output"))
  }
}

struct Fixture {
  dir: TempDir,
  counters: Arc<Counters>,
}

impl Fixture {
  fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let mut labels = std::fs::File::create(dir.path().join("labels.names")).unwrap();
    writeln!(labels, "# test labels").unwrap();
    for name in ["tench", "goldfish", "great white shark", "tiger shark"] {
      writeln!(labels, "{}", name).unwrap();
    }
    Self {
      dir,
      counters: Arc::new(Counters::default()),
    }
  }

  fn runtime(&self, fault: Fault) -> FakeRuntime {
    FakeRuntime {
      counters: self.counters.clone(),
      fault,
      output_classes: CLASSES,
    }
  }

  fn param(&self, top_k: u32, softmax: bool) -> InitParam {
    InitParam {
      label_path: self.dir.path().join("labels.names"),
      class_num: CLASSES as u32,
      top_k,
      softmax,
      model: Url::parse("fake:models/net.fake").unwrap(),
      ..InitParam::default()
    }
  }

  /// 四个通道的和依次为 0.9, 0.1, 0.5, 0.2
  fn input(&self, name: &str, floats: usize) -> TensorFileInput {
    let sums = [0.9f32, 0.1, 0.5, 0.2];
    let path: PathBuf = self.dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for i in 0..floats {
      let value = sums[(i / 4) % CLASSES] / 4.0;
      file.write_all(&value.to_le_bytes()).unwrap();
    }
    TensorFileInput::new(path)
  }
}

#[test]
fn classifies_with_top_k_and_labels() {
  let fx = Fixture::new();
  let mut classifier = Classifier::init(fx.runtime(Fault::None), &fx.param(2, false)).unwrap();
  assert_eq!(classifier.input_desc().element_count(), Some(16));

  let result = classifier.process(&fx.input("test.bin", 16)).unwrap();
  assert_eq!(result.len(), 1);
  let items = &result.batches[0];
  assert_eq!(items.len(), 2);
  assert_eq!(items[0].class_id, 0);
  assert_eq!(items[0].class_name, "tench");
  assert_eq!(items[1].class_id, 2);
  assert_eq!(items[1].class_name, "great white shark");
  assert!((items[0].confidence - 0.9).abs() < 1e-5);

  classifier.deinit();
  assert!(fx.counters.balanced());
  assert_eq!(fx.counters.release_order(), vec!["model", "device"]);
}

#[test]
fn dropping_releases_model_before_device() {
  let fx = Fixture::new();
  let classifier = Classifier::init(fx.runtime(Fault::None), &fx.param(2, false)).unwrap();
  assert!(fx.counters.release_order().is_empty());

  drop(classifier);
  assert_eq!(fx.counters.release_order(), vec!["model", "device"]);
}

#[test]
fn softmax_confidences_are_probabilities() {
  let fx = Fixture::new();
  let mut classifier = Classifier::init(fx.runtime(Fault::None), &fx.param(10, true)).unwrap();
  let result = classifier.process(&fx.input("test.bin", 16)).unwrap();

  let items = &result.batches[0];
  assert_eq!(items.len(), CLASSES);
  let sum: f32 = items.iter().map(|c| c.confidence).sum();
  assert!((sum - 1.0).abs() < 1e-5);
  assert!(items.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn processing_twice_is_idempotent() {
  let fx = Fixture::new();
  let input = fx.input("test.bin", 16);
  let mut classifier = Classifier::init(fx.runtime(Fault::None), &fx.param(3, true)).unwrap();

  let first = classifier.process(&input).unwrap();
  let second = classifier.process(&input).unwrap();
  assert_eq!(first, second);

  let repeated = RepeatShotTask::default()
    .with_repeat_times(4)
    .run_task(&input, &mut classifier, &LogOutput)
    .unwrap();
  assert_eq!(repeated, first);
}

#[test]
fn short_input_is_an_io_error() {
  let fx = Fixture::new();
  let mut classifier = Classifier::init(fx.runtime(Fault::None), &fx.param(2, false)).unwrap();
  let err = classifier.process(&fx.input("short.bin", 15)).unwrap_err();
  assert!(matches!(err, PipelineError::Io(_)));
  assert_eq!(err.code(), 13);

  let err = classifier
    .process(&TensorFileInput::new(fx.dir.path().join("missing.bin")))
    .unwrap_err();
  assert!(matches!(err, PipelineError::Io(_)));

  drop(classifier);
  assert!(fx.counters.balanced());
}

#[test]
fn init_failures_map_to_distinct_kinds() {
  let fx = Fixture::new();

  let err = Classifier::init(fx.runtime(Fault::Device), &fx.param(2, false))
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::Device(_)));
  assert_eq!(err.code(), 10);

  let err = Classifier::init(fx.runtime(Fault::Load), &fx.param(2, false))
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::ModelLoad(_)));
  assert_eq!(err.code(), 11);

  let mut param = fx.param(2, false);
  param.label_path = fx.dir.path().join("missing.names");
  let err = Classifier::init(fx.runtime(Fault::None), &param)
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::Config(_)));
  assert_eq!(err.code(), 12);

  let err = Classifier::init(fx.runtime(Fault::None), &fx.param(0, false))
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::Config(_)));

  let err = Classifier::init(fx.runtime(Fault::NoInput), &fx.param(2, false))
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::ModelLoad(_)));
  assert_eq!(err.code(), 11);

  let err = Classifier::init(fx.runtime(Fault::HugeInput), &fx.param(2, false))
    .err()
    .unwrap();
  assert!(matches!(err, PipelineError::Config(_)));
  assert_eq!(err.code(), 12);

  assert!(fx.counters.balanced());
}

#[test]
fn runner_failures_map_to_distinct_kinds() {
  let fx = Fixture::new();
  let input = fx.input("test.bin", 16);

  let mut classifier = Classifier::init(fx.runtime(Fault::Infer), &fx.param(2, false)).unwrap();
  let err = classifier.process(&input).unwrap_err();
  assert!(matches!(err, PipelineError::Inference(_)));
  assert_eq!(err.code(), 15);
  classifier.deinit();

  let mut classifier =
    Classifier::init(fx.runtime(Fault::HugeOutput), &fx.param(2, false)).unwrap();
  let err = classifier.process(&input).unwrap_err();
  assert!(matches!(err, PipelineError::Allocation(_)));
  assert_eq!(err.code(), 14);
  classifier.deinit();

  assert!(fx.counters.balanced());
}

#[test]
fn class_count_mismatch_is_a_post_process_error() {
  let fx = Fixture::new();
  let runtime = FakeRuntime {
    output_classes: 3,
    ..fx.runtime(Fault::None)
  };
  let mut classifier = Classifier::init(runtime, &fx.param(2, false)).unwrap();
  let err = classifier.process(&fx.input("test.bin", 16)).unwrap_err();
  assert!(matches!(err, PipelineError::PostProcess(_)));
  assert_eq!(err.code(), 16);
  assert_eq!(err.stage(), "PostProcess");
}

#[test]
fn one_shot_task_reports_pipeline_error() {
  let fx = Fixture::new();
  let mut classifier = Classifier::init(fx.runtime(Fault::Infer), &fx.param(2, false)).unwrap();
  let err = OneShotTask
    .run_task(&fx.input("test.bin", 16), &mut classifier, &LogOutput)
    .unwrap_err();
  let pipeline = err.downcast_ref::<PipelineError>().unwrap();
  assert_eq!(pipeline.code(), 15);
}

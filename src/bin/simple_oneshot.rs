// 该文件是 Linzhi （林芝） 项目的一部分。
// src/bin/simple_oneshot.rs - 单次分类推理
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

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{error, info};
use url::Url;

use linzhi::{
  FromUrl, InitParam, PipelineError,
  classifier::ClassifierWrapper,
  input::TensorFileInput,
  output::OutputWrapper,
  param::{DEFAULT_INPUT_URL, DEFAULT_LABEL_PATH, DEFAULT_MODEL_URL},
  task::{OneShotTask, Task},
};

/// Linzhi 单次分类参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址（onnx:FILE 或 rknn:FILE?input=NxCxHxW&output=NxK）
  #[arg(long, value_name = "MODEL", default_value = DEFAULT_MODEL_URL)]
  pub model: Url,
  /// 输入张量地址
  #[arg(long, value_name = "SOURCE", default_value = DEFAULT_INPUT_URL)]
  pub input: Url,
  /// 输出地址（log: 或 text:FILE）
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
  /// 类别标签文件
  #[arg(long, value_name = "FILE", default_value = DEFAULT_LABEL_PATH)]
  pub labels: PathBuf,
  /// 设备编号
  #[arg(long, default_value_t = 0)]
  pub device_id: u32,
  /// 类别数量
  #[arg(long, default_value_t = 1000)]
  pub class_num: u32,
  /// 保留的最高置信度类别数量
  #[arg(long, default_value_t = 5)]
  pub top_k: u32,
  /// 对输出做 softmax
  #[arg(long)]
  pub softmax: bool,
  /// 不检查输出张量的类别数量
  #[arg(long)]
  pub no_check_tensor: bool,
  /// JSON 格式的初始化参数文件
  #[arg(
    long,
    value_name = "FILE",
    conflicts_with_all = ["model", "labels", "device_id", "class_num", "top_k", "softmax", "no_check_tensor"]
  )]
  pub config: Option<PathBuf>,
}

impl Args {
  fn init_param(&self) -> Result<InitParam, PipelineError> {
    if let Some(path) = &self.config {
      return InitParam::from_json_file(path).map_err(PipelineError::config);
    }
    Ok(InitParam {
      device_id: self.device_id,
      label_path: self.labels.clone(),
      class_num: self.class_num,
      top_k: self.top_k,
      softmax: self.softmax,
      check_tensor: !self.no_check_tensor,
      model: self.model.clone(),
    })
  }
}

fn run(args: &Args) -> anyhow::Result<()> {
  let param = args.init_param()?;
  info!("模型地址: {}", param.model);
  let input = TensorFileInput::from_url(&args.input).map_err(PipelineError::config)?;
  let output = OutputWrapper::from_url(&args.output).map_err(PipelineError::config)?;

  let mut classifier = ClassifierWrapper::init(&param)?;
  let result = OneShotTask.run_task(&input, &mut classifier, &output);
  classifier.deinit();
  result.map(|_| ())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      let (stage, code) = e
        .downcast_ref::<PipelineError>()
        .map(|pe| (pe.stage(), pe.code()))
        .unwrap_or(("Task", 1));
      error!("{} 阶段失败, ret={}: {:#}", stage, code, e);
      ExitCode::from(code)
    }
  }
}

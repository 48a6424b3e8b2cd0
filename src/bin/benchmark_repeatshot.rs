// 该文件是 Linzhi （林芝） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理基准测试
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
  param::DEFAULT_INPUT_URL,
  task::{RepeatShotTask, Task},
};

/// Linzhi 重复推理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 格式的初始化参数文件，缺省时使用内置参数
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 输入张量地址
  #[arg(long, value_name = "SOURCE", default_value = DEFAULT_INPUT_URL)]
  pub input: Url,
  /// 输出地址
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value_t = 1000)]
  pub repeat: usize,
}

fn run(args: &Args) -> anyhow::Result<()> {
  let param = match &args.config {
    Some(path) => InitParam::from_json_file(path).map_err(PipelineError::config)?,
    None => InitParam::default(),
  };
  info!("模型地址: {}", param.model);

  let input = TensorFileInput::from_url(&args.input).map_err(PipelineError::config)?;
  let output = OutputWrapper::from_url(&args.output).map_err(PipelineError::config)?;

  let mut classifier = ClassifierWrapper::init(&param)?;
  let result = RepeatShotTask::default()
    .with_repeat_times(args.repeat)
    .with_interrupt(true)
    .run_task(&input, &mut classifier, &output);
  classifier.deinit();
  result.map(|_| ())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

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

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/bin/preprocess.rs - 图像转换为输入张量文件
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use linzhi::{
  FromUrl,
  input::TensorFileInput,
  preprocess::{ImageFileInput, Preprocess},
};

/// Linzhi 图像预处理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像
  #[arg(long, value_name = "SOURCE", default_value = "image:test.JPEG")]
  pub input: Url,
  /// 输出张量文件
  #[arg(long, value_name = "OUTPUT", default_value = "tensor:test.bin")]
  pub output: Url,
  /// 短边缩放尺寸
  #[arg(long, default_value_t = 256)]
  pub resize: u32,
  /// 中心裁剪尺寸
  #[arg(long, default_value_t = 224)]
  pub crop: u32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = ImageFileInput::from_url(&args.input)?;
  let output = TensorFileInput::from_url(&args.output)?;
  let preprocess = Preprocess {
    resize: args.resize,
    crop: args.crop,
    ..Preprocess::default()
  };

  let now = std::time::Instant::now();
  let image = input.load()?;
  let tensor = preprocess.apply(&image)?;
  output.write(&tensor)?;
  info!(
    "预处理完成，输出形状 {:?}，耗时: {:.2?}",
    tensor.shape(),
    now.elapsed()
  );

  Ok(())
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/output/text_file.rs - 文本文件输出
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

use std::{fs::OpenOptions, io::Write, path::PathBuf};

use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::TensorFileInput,
  model::ClassifyResult,
  output::{Render, format_result_lines},
  url_path,
};

#[derive(Error, Debug)]
pub enum TextFileOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 以追加方式写入结果文件，每行带 UTC 时间戳
#[derive(Debug, Clone)]
pub struct TextFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for TextFileOutput {
  const SCHEME: &'static str = "text";
}

impl FromUrl for TextFileOutput {
  type Error = TextFileOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TextFileOutputError::SchemeMismatch);
    }
    Ok(TextFileOutput {
      path: url_path(url),
    })
  }
}

impl TextFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl Render<TensorFileInput, ClassifyResult> for TextFileOutput {
  type Error = TextFileOutputError;

  fn render_result(
    &self,
    source: &TensorFileInput,
    result: &ClassifyResult,
  ) -> Result<(), Self::Error> {
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    for line in format_result_lines(source.path(), result) {
      writeln!(file, "[{}] {}", now, line)?;
    }
    debug!("结果已写入 {}", self.path.display());
    Ok(())
  }
}

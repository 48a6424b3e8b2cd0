// 该文件是 Linzhi （林芝） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::input::TensorFileInput;
use crate::model::{ClassInfo, ClassifyResult};
use crate::{FromUrl, FromUrlWithScheme};

pub trait Render<Source, Output>: Sized {
  type Error;
  fn render_result(&self, source: &Source, result: &Output) -> Result<(), Self::Error>;
}

mod log_output;
pub use self::log_output::{LogOutput, LogOutputError};

mod text_file;
pub use self::text_file::{TextFileOutput, TextFileOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("日志输出错误: {0}")]
  LogOutputError(#[from] LogOutputError),
  #[error("文本文件输出错误: {0}")]
  TextFileOutputError(#[from] TextFileOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 一行结果：`文件名 Results: 编号,名称,置信度,...`
pub fn format_result_line(source: &Path, items: &[ClassInfo]) -> String {
  let file_name = source
    .file_name()
    .map(|name| name.to_string_lossy())
    .unwrap_or_else(|| source.to_string_lossy());
  let triples = items
    .iter()
    .map(|c| format!("{},{},{:.6}", c.class_id, c.class_name, c.confidence))
    .collect::<Vec<_>>()
    .join(",");
  format!("{} Results: {}", file_name, triples)
}

pub fn format_result_lines(source: &Path, result: &ClassifyResult) -> Vec<String> {
  result
    .batches
    .iter()
    .map(|items| format_result_line(source, items))
    .collect()
}

pub enum OutputWrapper {
  Log(LogOutput),
  TextFile(TextFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      TextFileOutput::SCHEME => Ok(OutputWrapper::TextFile(TextFileOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<TensorFileInput, ClassifyResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    source: &TensorFileInput,
    result: &ClassifyResult,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output
        .render_result(source, result)
        .map_err(|never| match never {}),
      OutputWrapper::TextFile(output) => output
        .render_result(source, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> ClassifyResult {
    ClassifyResult {
      batches: vec![
        vec![
          ClassInfo {
            class_id: 0,
            class_name: "tench".to_string(),
            confidence: 0.9,
          },
          ClassInfo {
            class_id: 2,
            class_name: "great white shark".to_string(),
            confidence: 0.5,
          },
        ]
        .into_boxed_slice(),
      ]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn line_uses_base_name_and_triples() {
    let lines = format_result_lines(Path::new("../data/test.bin"), &sample());
    assert_eq!(
      lines,
      vec!["test.bin Results: 0,tench,0.900000,2,great white shark,0.500000"]
    );
  }

  #[test]
  fn wrapper_dispatches_on_scheme() {
    let url = Url::parse("log:").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Log(_))
    ));

    let url = Url::parse("text:results.txt").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::TextFile(_))
    ));

    let url = Url::parse("folder:/tmp/out").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/label.rs - 类别标签文件
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

use std::{borrow::Cow, collections::BTreeMap, path::Path};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {0}: {1}")]
  Read(String, std::io::Error),
  #[error("标签文件 {0} 中没有标签")]
  Empty(String),
}

/// 类别编号到类别名称的映射
///
/// 文件按行解析：空行与 `#` 开头的行被忽略；`编号:名称` 指定编号，
/// 其余行使用上一个编号加一（从 0 开始）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
  names: BTreeMap<u32, String>,
}

impl LabelMap {
  pub fn from_file(path: &Path) -> Result<Self, LabelError> {
    info!("加载标签文件: {}", path.display());
    let content = std::fs::read_to_string(path)
      .map_err(|e| LabelError::Read(path.display().to_string(), e))?;
    let labels = Self::parse(&content);
    if labels.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }
    debug!("共加载 {} 个标签", labels.len());
    Ok(labels)
  }

  pub fn parse(content: &str) -> Self {
    let mut names = BTreeMap::new();
    let mut next_id = 0u32;

    for line in content.lines() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      let (id, name) = match line.split_once(':') {
        Some((id, name)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
          match id.parse::<u32>() {
            Ok(id) => (id, name.trim()),
            Err(_) => (next_id, line),
          }
        }
        _ => (next_id, line),
      };

      if names.insert(id, name.to_string()).is_some() {
        warn!("标签编号 {} 重复定义，使用后出现的名称", id);
      }
      next_id = id.saturating_add(1);
    }

    Self { names }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, id: u32) -> Option<&str> {
    self.names.get(&id).map(String::as_str)
  }

  /// 查不到的编号以十进制数字作为名称
  pub fn name(&self, id: u32) -> Cow<'_, str> {
    match self.get(id) {
      Some(name) => Cow::Borrowed(name),
      None => Cow::Owned(id.to_string()),
    }
  }
}

// 该文件是 Linzhi （林芝） 项目的一部分。
// src/task.rs - 推理任务
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
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  classifier::Classify, input::TensorFileInput, model::ClassifyResult, output::Render,
};

/// 统计平均耗时时跳过的预热次数
const WARMUP_TIMES: usize = 2;

pub trait Task<M, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: &TensorFileInput,
    model: &mut M,
    output: &O,
  ) -> Result<ClassifyResult, Self::Error>;
}

fn render<O, E>(output: &O, input: &TensorFileInput, result: &ClassifyResult)
where
  O: Render<TensorFileInput, ClassifyResult, Error = E>,
  E: Display,
{
  if let Err(e) = output.render_result(input, result) {
    warn!("输出结果失败: {}", e);
  }
}

pub struct OneShotTask;

impl<M: Classify, O: Render<TensorFileInput, ClassifyResult, Error = E>, E: Display> Task<M, O>
  for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: &TensorFileInput,
    model: &mut M,
    output: &O,
  ) -> Result<ClassifyResult, Self::Error> {
    info!("开始任务...");
    info!("读取输入文件: {}", input.path().display());
    let now = Instant::now();
    let result = model.classify(input)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    render(output, input, &result);
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(result)
  }
}

#[derive(Debug)]
pub struct RepeatShotTask {
  repeat_times: usize,
  interruptible: bool,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat_times: 1000,
      interruptible: false,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(1);
    self
  }

  /// 收到 Ctrl-C 后提前结束循环并输出已有统计
  pub fn with_interrupt(mut self, interruptible: bool) -> Self {
    self.interruptible = interruptible;
    self
  }

  fn install_interrupt(&self) -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    if self.interruptible {
      let flag = stop.clone();
      if let Err(e) = ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        flag.store(true, Ordering::SeqCst);
      }) {
        warn!("无法设置中断处理: {}", e);
      }
    }
    stop
  }
}

impl<M: Classify, O: Render<TensorFileInput, ClassifyResult, Error = E>, E: Display> Task<M, O>
  for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: &TensorFileInput,
    model: &mut M,
    output: &O,
  ) -> Result<ClassifyResult, Self::Error> {
    info!("开始任务...");
    let stop = self.install_interrupt();

    let now = Instant::now();
    let first = model.classify(input)?;
    let mut times = vec![now.elapsed()];
    info!("(0)推理完成，耗时: {:.2?}", times[0]);
    render(output, input, &first);

    for i in 1..self.repeat_times {
      if stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      let now = Instant::now();
      let result = model.classify(input)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      if result != first {
        anyhow::bail!("第 {} 次推理结果与第一次不一致", i);
      }
      times.push(elapsed);
    }

    let measured = if times.len() > WARMUP_TIMES {
      &times[WARMUP_TIMES..]
    } else {
      &times[..]
    };
    warn!(
      "共推理 {} 次，平均推理时间: {:.2?}",
      times.len(),
      measured.iter().sum::<Duration>() / measured.len() as u32
    );

    Ok(first)
  }
}

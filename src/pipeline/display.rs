// 该文件是 Lookout （瞭望） 项目的一部分。
// src/pipeline/display.rs - 显示阶段
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
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  frame::Frame,
  output::Render,
  pipeline::{PipelineConfig, PipelineError, StageContext},
};

/// 显示循环读取哪个槽
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFeed {
  /// 结果槽中画好框的帧
  Annotated,
  /// 帧槽中的原始帧
  Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
  /// 用户按下 `q` 或关闭了窗口
  Quit,
  /// 其他地方触发了退出
  Shutdown,
}

pub struct DisplayStage {
  ctx: StageContext,
  feed: DisplayFeed,
  wait: Duration,
  poll: Duration,
}

impl DisplayStage {
  pub fn new(ctx: StageContext, config: &PipelineConfig, feed: DisplayFeed) -> Self {
    Self {
      ctx,
      feed,
      wait: config.display_wait,
      poll: config.startup_poll,
    }
  }

  /// 轮询直到拿到第一帧
  ///
  /// 检测画面优先取结果槽，其次取帧槽；推理快于显示时帧槽可能总是空的。
  /// 超时、收到退出信号或上游已经不可能再产出帧时返回 `None`。
  pub fn wait_first_frame(&self, timeout: Option<Duration>) -> Option<Frame> {
    info!("等待第一帧...");
    let started = Instant::now();
    loop {
      if let Some(frame) = self.poll_first() {
        info!("收到第一帧: {}x{}", frame.width(), frame.height());
        return Some(frame);
      }
      if self.ctx.shutdown.is_triggered() {
        return None;
      }
      if self.starved() {
        // 判断期间推理线程可能刚放入结果
        if let Some(frame) = self.poll_first() {
          info!("收到第一帧: {}x{}", frame.width(), frame.height());
          return Some(frame);
        }
        warn!("采集线程已退出，没有可显示的帧");
        return None;
      }
      if timeout.is_some_and(|limit| started.elapsed() >= limit) {
        return None;
      }
      thread::sleep(self.poll);
    }
  }

  fn poll_first(&self) -> Option<Frame> {
    match self.feed {
      DisplayFeed::Annotated => self
        .ctx
        .results
        .try_take()
        .map(|annotated| annotated.frame)
        .or_else(|| self.ctx.frames.try_take()),
      DisplayFeed::Raw => self.ctx.frames.try_take(),
    }
  }

  /// 采集线程已退出且两个槽都不会再有帧
  ///
  /// 推理线程仍存活并且已经有帧被采集时，它手上可能还有一帧正在处理。
  fn starved(&self) -> bool {
    let stats = &self.ctx.stats;
    if stats.capture_alive() || !self.ctx.frames.is_empty() {
      return false;
    }
    match self.feed {
      DisplayFeed::Raw => true,
      DisplayFeed::Annotated => {
        self.ctx.results.is_empty() && (stats.snapshot().captured == 0 || !stats.inference_alive())
      }
    }
  }

  fn poll_latest(&self) -> Option<Frame> {
    match self.feed {
      DisplayFeed::Annotated => self.ctx.results.try_take().map(|annotated| annotated.frame),
      DisplayFeed::Raw => self.ctx.frames.try_take(),
    }
  }

  /// 显示主循环，必须在主线程上调用
  ///
  /// 推理结果到达之前一直显示 `first`，之后总是显示最新的结果；
  /// 没有新结果时重复显示上一帧。
  pub fn run<R>(&self, render: &mut R, first: Frame) -> Result<DisplayOutcome, PipelineError>
  where
    R: Render,
    R::Error: Display,
  {
    let mut latest = first;
    loop {
      if self.ctx.shutdown.is_triggered() {
        return Ok(DisplayOutcome::Shutdown);
      }

      if let Some(frame) = self.poll_latest() {
        latest = frame;
      }

      render
        .render(&latest)
        .map_err(|e| PipelineError::Display(e.to_string()))?;
      self.ctx.stats.record_displayed();

      if render.poll_quit(self.wait) {
        info!("用户请求退出");
        self.ctx.shutdown.trigger();
        return Ok(DisplayOutcome::Quit);
      }
    }
  }
}

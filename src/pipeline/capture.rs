// 该文件是 Lookout （瞭望） 项目的一部分。
// src/pipeline/capture.rs - 采集阶段
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
  io,
  thread::{self, JoinHandle},
};

use tracing::{debug, error, info};

use crate::{
  input::{FrameSource, SourceError},
  pipeline::{StageContext, StageKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
  EndOfStream,
  Failed(String),
  Shutdown,
}

/// 采集阶段独占帧来源，把读到的每一帧写入帧槽
pub struct CaptureStage<S> {
  source: S,
  ctx: StageContext,
}

impl<S: FrameSource> CaptureStage<S> {
  pub fn new(source: S, ctx: StageContext) -> Self {
    Self { source, ctx }
  }

  /// 循环读取直到流结束、读取失败或收到退出信号，返回前释放来源
  pub fn run(mut self) -> CaptureOutcome {
    info!("采集线程已启动");
    let outcome = loop {
      if self.ctx.shutdown.is_triggered() {
        break CaptureOutcome::Shutdown;
      }
      match self.source.read() {
        Ok(frame) => {
          let displaced = self.ctx.frames.put(frame).is_some();
          if displaced {
            debug!("帧槽中的旧帧被覆盖");
          }
          self.ctx.stats.record_captured(displaced);
        }
        Err(SourceError::EndOfStream) => {
          info!("视频流结束");
          break CaptureOutcome::EndOfStream;
        }
        Err(e) => {
          error!("读取帧失败: {}", e);
          break CaptureOutcome::Failed(e.to_string());
        }
      }
    };
    self.source.close();
    info!("采集线程退出: {:?}", outcome);
    outcome
  }
}

impl<S: FrameSource + Send + 'static> CaptureStage<S> {
  pub fn spawn(self) -> io::Result<JoinHandle<CaptureOutcome>> {
    let alive = self.ctx.stats.enter(StageKind::Capture);
    thread::Builder::new()
      .name("capture".to_string())
      .spawn(move || {
        let _alive = alive;
        self.run()
      })
  }
}

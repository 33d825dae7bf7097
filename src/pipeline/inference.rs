// 该文件是 Lookout （瞭望） 项目的一部分。
// src/pipeline/inference.rs - 推理阶段
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
  io,
  sync::mpsc::SyncSender,
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::{
  frame::Frame,
  model::{DetectResult, Model},
  output::draw::Draw,
  pipeline::{AnnotatedFrame, PipelineConfig, StageContext, StageKind},
  slot::SlotError,
};

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理失败: {0}")]
  InferenceFailure(Box<dyn std::error::Error + Send + Sync>),
}

/// 推理阶段：取最新帧，检测，画框，写入结果槽
pub struct InferenceStage<M> {
  model: M,
  draw: Draw,
  ctx: StageContext,
  threshold: f32,
  timeout: Duration,
  exit_on_failure: bool,
}

impl<M> InferenceStage<M>
where
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(model: M, draw: Draw, ctx: StageContext, config: &PipelineConfig) -> Self {
    Self {
      model,
      draw,
      ctx,
      threshold: config.confidence_threshold,
      timeout: config.inference_timeout,
      exit_on_failure: config.exit_on_inference_failure,
    }
  }

  /// 对单帧做检测并画出置信度不低于阈值的结果
  pub fn process(&self, mut frame: Frame) -> Result<AnnotatedFrame, InferenceError> {
    let now = Instant::now();
    let result = self
      .model
      .infer(&frame)
      .map_err(|e| InferenceError::InferenceFailure(Box::new(e)))?;
    let infer_elapsed = now.elapsed();

    let detections = result.above_threshold(self.threshold);
    for item in detections.iter() {
      debug!(
        "检测到 {}: 置信度 {:.2}, 边框 {:?}",
        self.draw.names().name(item.class_id),
        item.score,
        item.bbox
      );
    }
    let drawn = self.draw.draw_detections(frame.image_mut(), &detections);
    debug!(
      "推理耗时: {:.2?}, 总耗时: {:.2?}, 绘制 {} 个目标",
      infer_elapsed,
      now.elapsed(),
      drawn
    );

    Ok(AnnotatedFrame { frame, detections })
  }

  /// 循环直到推理失败或收到退出信号
  pub fn run(self) -> Result<(), InferenceError> {
    info!("推理线程已启动，置信度阈值 {}", self.threshold);
    loop {
      if self.ctx.shutdown.is_triggered() {
        info!("推理线程退出");
        return Ok(());
      }

      let frame = match self.ctx.frames.take(self.timeout) {
        Ok(frame) => frame,
        Err(SlotError::Timeout(waited)) => {
          trace!("{:?} 内没有新帧，继续等待", waited);
          continue;
        }
      };

      match self.process(frame) {
        Ok(annotated) => {
          let displaced = self.ctx.results.put(annotated).is_some();
          self.ctx.stats.record_inferred(displaced);
        }
        Err(e) => {
          error!("{}，推理线程停止", e);
          if self.exit_on_failure {
            self.ctx.shutdown.trigger();
          }
          return Err(e);
        }
      }
    }
  }
}

/// 在推理线程中加载模型并运行推理循环
///
/// 加载结果通过 `ready` 回报给启动方，加载失败时线程直接结束。
pub(crate) fn spawn<M, L, E>(
  loader: L,
  draw: Draw,
  ctx: StageContext,
  config: &PipelineConfig,
  ready: SyncSender<Result<(), String>>,
) -> io::Result<JoinHandle<Result<(), InferenceError>>>
where
  M: Model<Input = Frame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
  L: FnOnce() -> Result<M, E> + Send + 'static,
  E: Display,
{
  let config = config.clone();
  let alive = ctx.stats.enter(StageKind::Inference);
  thread::Builder::new()
    .name("inference".to_string())
    .spawn(move || {
      let _alive = alive;
      info!("正在加载模型...");
      let now = Instant::now();
      let model = match loader() {
        Ok(model) => model,
        Err(e) => {
          let _ = ready.send(Err(e.to_string()));
          return Ok(());
        }
      };
      info!("模型加载完成，耗时: {:.2?}", now.elapsed());
      let _ = ready.send(Ok(()));
      InferenceStage::new(model, draw, ctx, &config).run()
    })
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;
  use crate::{labels::ClassNames, model::DetectItem};

  #[derive(Error, Debug)]
  #[error("NPU 错误")]
  struct NpuError;

  struct Scripted {
    calls: AtomicU32,
    fail_on: u32,
  }

  impl Model for Scripted {
    type Input = Frame;
    type Output = DetectResult;
    type Error = NpuError;

    fn infer(&self, _input: &Frame) -> Result<DetectResult, NpuError> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      if call == self.fail_on {
        return Err(NpuError);
      }
      Ok(DetectResult::new(vec![DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [0.25, 0.25, 0.75, 0.75],
      }]))
    }
  }

  fn config() -> PipelineConfig {
    PipelineConfig {
      inference_timeout: Duration::from_millis(5),
      ..PipelineConfig::default()
    }
  }

  #[test]
  fn process_draws_and_keeps_detections() {
    let model = Scripted {
      calls: AtomicU32::new(0),
      fail_on: 0,
    };
    let draw = Draw::new(ClassNames::coco()).unwrap();
    let stage = InferenceStage::new(model, draw, StageContext::new(), &config());

    let annotated = stage.process(Frame::filled(40, 40, [0, 0, 0])).unwrap();
    assert_eq!(annotated.detections.len(), 1);
    assert_ne!(annotated.frame.image().get_pixel(10, 20).0, [0, 0, 0]);
  }

  #[test]
  fn failure_stops_loop_and_optionally_shuts_down() {
    for exit_on_failure in [false, true] {
      let ctx = StageContext::new();
      let model = Scripted {
        calls: AtomicU32::new(0),
        fail_on: 1,
      };
      let draw = Draw::new(ClassNames::coco()).unwrap();
      let config = PipelineConfig {
        exit_on_inference_failure: exit_on_failure,
        ..config()
      };
      ctx.frames.put(Frame::filled(8, 8, [1, 1, 1]));

      let stage = InferenceStage::new(model, draw, ctx.clone(), &config);
      assert!(matches!(
        stage.run(),
        Err(InferenceError::InferenceFailure(_))
      ));
      assert_eq!(ctx.shutdown.is_triggered(), exit_on_failure);
      assert!(ctx.results.is_empty());
    }
  }

  #[test]
  fn shutdown_ends_idle_loop() {
    let ctx = StageContext::new();
    let model = Scripted {
      calls: AtomicU32::new(0),
      fail_on: 0,
    };
    let draw = Draw::new(ClassNames::coco()).unwrap();
    let stage = InferenceStage::new(model, draw, ctx.clone(), &config());

    let shutdown = ctx.shutdown.clone();
    let handle = thread::spawn(move || stage.run());
    thread::sleep(Duration::from_millis(20));
    shutdown.trigger();
    assert!(handle.join().unwrap().is_ok());
  }

  #[test]
  fn loader_failure_is_reported() {
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    let draw = Draw::new(ClassNames::coco()).unwrap();
    let ctx = StageContext::new();
    let handle = spawn(
      || Err::<Scripted, _>("找不到模型文件"),
      draw,
      ctx.clone(),
      &config(),
      tx,
    )
    .unwrap();

    assert_eq!(rx.recv().unwrap(), Err("找不到模型文件".to_string()));
    assert!(handle.join().unwrap().is_ok());
    assert!(!ctx.stats.inference_alive());
  }
}

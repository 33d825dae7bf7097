// 该文件是 Lookout （瞭望） 项目的一部分。
// src/pipeline.rs - 三阶段流水线
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

//! # 流水线
//!
//! 采集线程、推理线程和主线程上的显示循环通过两个 [`Slot`] 连接：
//!
//! ```text
//! 采集 --put--> [帧槽] --take--> 推理 --put--> [结果槽] --try_take--> 显示
//! ```
//!
//! 每个槽只保留最新的元素，任何一端变慢都只会丢帧而不会积压。
//! 三个循环都观察同一个 [`Shutdown`] 标志。

use std::{
  fmt::Display,
  io,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc,
  },
  thread::JoinHandle,
  time::Duration,
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  frame::Frame,
  input::FrameSource,
  model::{DetectResult, Model},
  output::{Render, draw::Draw},
  slot::Slot,
};

mod capture;
mod display;
mod inference;
mod state;

pub use self::capture::{CaptureOutcome, CaptureStage};
pub use self::display::{DisplayFeed, DisplayOutcome, DisplayStage};
pub use self::inference::{InferenceError, InferenceStage};
pub use self::state::{PipelineState, StateCell};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// 流水线的时间与阈值参数
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub confidence_threshold: f32,
  /// 推理线程等待新帧的上限，超时后继续等待
  pub inference_timeout: Duration,
  /// 显示循环每轮等待按键的时间，同时用于限速
  pub display_wait: Duration,
  /// 启动时轮询第一帧的间隔
  pub startup_poll: Duration,
  /// 等待第一帧的上限，`None` 表示一直等待
  pub startup_timeout: Option<Duration>,
  /// 推理失败时是否关闭整个流水线，默认只停止推理线程
  pub exit_on_inference_failure: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      inference_timeout: Duration::from_secs(1),
      display_wait: Duration::from_millis(1),
      startup_poll: Duration::from_millis(100),
      startup_timeout: Some(Duration::from_secs(10)),
      exit_on_inference_failure: false,
    }
  }
}

/// 可克隆的退出标志
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn trigger(&self) {
    if !self.0.swap(true, Ordering::SeqCst) {
      info!("已请求退出");
    }
  }

  pub fn is_triggered(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
  Capture,
  Inference,
}

/// 运行计数与线程存活标志
#[derive(Debug, Default)]
pub struct PipelineStats {
  captured: AtomicU64,
  dropped_frames: AtomicU64,
  inferred: AtomicU64,
  dropped_results: AtomicU64,
  displayed: AtomicU64,
  capture_alive: AtomicBool,
  inference_alive: AtomicBool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub captured: u64,
  pub dropped_frames: u64,
  pub inferred: u64,
  pub dropped_results: u64,
  pub displayed: u64,
}

impl PipelineStats {
  fn alive_flag(&self, kind: StageKind) -> &AtomicBool {
    match kind {
      StageKind::Capture => &self.capture_alive,
      StageKind::Inference => &self.inference_alive,
    }
  }

  /// 标记阶段存活，返回的守卫在任何退出路径上（包括 panic）清除标志
  pub fn enter(self: &Arc<Self>, kind: StageKind) -> LivenessGuard {
    self.alive_flag(kind).store(true, Ordering::SeqCst);
    LivenessGuard {
      stats: Arc::clone(self),
      kind,
    }
  }

  pub fn capture_alive(&self) -> bool {
    self.capture_alive.load(Ordering::SeqCst)
  }

  pub fn inference_alive(&self) -> bool {
    self.inference_alive.load(Ordering::SeqCst)
  }

  pub(crate) fn record_captured(&self, displaced: bool) {
    self.captured.fetch_add(1, Ordering::Relaxed);
    if displaced {
      self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_inferred(&self, displaced: bool) {
    self.inferred.fetch_add(1, Ordering::Relaxed);
    if displaced {
      self.dropped_results.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_displayed(&self) {
    self.displayed.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      captured: self.captured.load(Ordering::Relaxed),
      dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
      inferred: self.inferred.load(Ordering::Relaxed),
      dropped_results: self.dropped_results.load(Ordering::Relaxed),
      displayed: self.displayed.load(Ordering::Relaxed),
    }
  }
}

pub struct LivenessGuard {
  stats: Arc<PipelineStats>,
  kind: StageKind,
}

impl Drop for LivenessGuard {
  fn drop(&mut self) {
    self
      .stats
      .alive_flag(self.kind)
      .store(false, Ordering::SeqCst);
  }
}

/// 画好检测框的帧以及实际绘制的检测结果
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
  pub frame: Frame,
  pub detections: DetectResult,
}

/// 各阶段共享的槽、计数与退出标志
#[derive(Debug, Clone, Default)]
pub struct StageContext {
  pub frames: Arc<Slot<Frame>>,
  pub results: Arc<Slot<AnnotatedFrame>>,
  pub stats: Arc<PipelineStats>,
  pub shutdown: Shutdown,
}

impl StageContext {
  pub fn new() -> Self {
    Self::default()
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("模型加载失败: {0}")]
  ModelLoadFailure(String),
  #[error("等待 {0:?} 仍未收到第一帧")]
  NoFirstFrame(Duration),
  #[error("显示失败: {0}")]
  Display(String),
  #[error("无法创建线程: {0}")]
  Spawn(#[from] io::Error),
}

/// 一次运行的结果，线程 panic 时对应阶段为 `None`
#[derive(Debug)]
pub struct PipelineReport {
  pub capture: Option<CaptureOutcome>,
  pub inference: Option<Result<(), InferenceError>>,
  pub display: DisplayOutcome,
  pub stats: StatsSnapshot,
}

pub struct Pipeline {
  config: PipelineConfig,
  ctx: StageContext,
  state: StateCell,
}

impl Pipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      ctx: StageContext::new(),
      state: StateCell::new(),
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn shutdown_handle(&self) -> Shutdown {
    self.ctx.shutdown.clone()
  }

  pub fn stats(&self) -> Arc<PipelineStats> {
    Arc::clone(&self.ctx.stats)
  }

  pub fn state(&self) -> PipelineState {
    self.state.get()
  }

  /// 运行检测流水线，直到用户退出或收到退出信号
  ///
  /// `loader` 在推理线程中执行，模型本身不需要能跨线程移动。
  /// 模型加载成功之后才启动采集线程。
  pub fn run<S, M, L, E, R>(
    &self,
    mut source: S,
    loader: L,
    render: &mut R,
    draw: Draw,
  ) -> Result<PipelineReport, PipelineError>
  where
    S: FrameSource + Send + 'static,
    M: Model<Input = Frame, Output = DetectResult>,
    M::Error: std::error::Error + Send + Sync + 'static,
    L: FnOnce() -> Result<M, E> + Send + 'static,
    E: Display,
    R: Render,
    R::Error: Display,
  {
    info!("启动检测流水线");
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let inference = match inference::spawn(loader, draw, self.ctx.clone(), &self.config, ready_tx) {
      Ok(handle) => handle,
      Err(e) => {
        self.abort_startup(&mut source);
        self.state.transition(PipelineState::Terminated);
        return Err(e.into());
      }
    };

    let loaded = ready_rx
      .recv()
      .unwrap_or_else(|_| Err("推理线程在加载模型时退出".to_string()));
    if let Err(message) = loaded {
      error!("模型加载失败: {}", message);
      self.abort_startup(&mut source);
      join_logged("推理", inference);
      self.state.transition(PipelineState::Terminated);
      return Err(PipelineError::ModelLoadFailure(message));
    }

    let capture = match CaptureStage::new(source, self.ctx.clone()).spawn() {
      Ok(handle) => handle,
      Err(e) => {
        self.state.transition(PipelineState::ShuttingDown);
        self.ctx.shutdown.trigger();
        join_logged("推理", inference);
        self.state.transition(PipelineState::Terminated);
        return Err(e.into());
      }
    };

    let display = DisplayStage::new(self.ctx.clone(), &self.config, DisplayFeed::Annotated);
    let outcome = self.drive_display(&display, render);
    let (capture, inference) = self.teardown(render, Some(capture), Some(inference));
    let display = outcome?;

    Ok(self.report(capture, inference, display))
  }

  /// 只有采集与显示的预览流水线，显示原始帧
  pub fn run_preview<S, R>(&self, source: S, render: &mut R) -> Result<PipelineReport, PipelineError>
  where
    S: FrameSource + Send + 'static,
    R: Render,
    R::Error: Display,
  {
    info!("启动预览流水线");
    let capture = CaptureStage::new(source, self.ctx.clone()).spawn()?;
    let display = DisplayStage::new(self.ctx.clone(), &self.config, DisplayFeed::Raw);
    let outcome = self.drive_display(&display, render);
    let (capture, _) = self.teardown(render, Some(capture), None);
    let display = outcome?;

    Ok(self.report(capture, None, display))
  }

  fn abort_startup<S: FrameSource>(&self, source: &mut S) {
    self.state.transition(PipelineState::ShuttingDown);
    self.ctx.shutdown.trigger();
    source.close();
  }

  fn drive_display<R>(&self, display: &DisplayStage, render: &mut R) -> Result<DisplayOutcome, PipelineError>
  where
    R: Render,
    R::Error: Display,
  {
    let Some(first) = display.wait_first_frame(self.config.startup_timeout) else {
      self.state.transition(PipelineState::ShuttingDown);
      if self.ctx.shutdown.is_triggered() {
        info!("启动期间收到退出信号");
        return Ok(DisplayOutcome::Shutdown);
      }
      let waited = self.config.startup_timeout.unwrap_or_default();
      error!("没有收到第一帧，放弃启动");
      return Err(PipelineError::NoFirstFrame(waited));
    };

    self.state.transition(PipelineState::Running);
    let outcome = display.run(render, first);
    self.state.transition(PipelineState::ShuttingDown);
    outcome
  }

  fn teardown<R: Render>(
    &self,
    render: &mut R,
    capture: Option<JoinHandle<CaptureOutcome>>,
    inference: Option<JoinHandle<Result<(), InferenceError>>>,
  ) -> (Option<CaptureOutcome>, Option<Result<(), InferenceError>>) {
    self.ctx.shutdown.trigger();
    render.close();

    let capture = capture.and_then(|handle| join_logged("采集", handle));
    let inference = inference.and_then(|handle| join_logged("推理", handle));

    self.state.transition(PipelineState::Terminated);
    (capture, inference)
  }

  fn report(
    &self,
    capture: Option<CaptureOutcome>,
    inference: Option<Result<(), InferenceError>>,
    display: DisplayOutcome,
  ) -> PipelineReport {
    let stats = self.ctx.stats.snapshot();
    info!(
      "流水线已结束: 采集 {} 帧（丢弃 {}），推理 {} 帧（丢弃 {}），显示 {} 次",
      stats.captured, stats.dropped_frames, stats.inferred, stats.dropped_results, stats.displayed
    );
    PipelineReport {
      capture,
      inference,
      display,
      stats,
    }
  }
}

/// 等待线程结束，线程 panic 时记录日志并返回 `None`
fn join_logged<T>(stage: &str, handle: JoinHandle<T>) -> Option<T> {
  match handle.join() {
    Ok(outcome) => Some(outcome),
    Err(_) => {
      warn!("{}线程异常退出", stage);
      None
    }
  }
}

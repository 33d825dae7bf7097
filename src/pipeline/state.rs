// 该文件是 Lookout （瞭望） 项目的一部分。
// src/pipeline/state.rs - 流水线状态机
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

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
  Starting = 0,
  Running = 1,
  ShuttingDown = 2,
  Terminated = 3,
}

impl PipelineState {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => PipelineState::Starting,
      1 => PipelineState::Running,
      2 => PipelineState::ShuttingDown,
      _ => PipelineState::Terminated,
    }
  }

  pub fn can_transition_to(self, next: PipelineState) -> bool {
    use PipelineState::*;
    matches!(
      (self, next),
      (Starting, Running) | (Starting, ShuttingDown) | (Running, ShuttingDown) | (ShuttingDown, Terminated)
    )
  }
}

/// 可在线程间读取的状态
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
  fn default() -> Self {
    Self::new()
  }
}

impl StateCell {
  pub fn new() -> Self {
    Self(AtomicU8::new(PipelineState::Starting as u8))
  }

  pub fn get(&self) -> PipelineState {
    PipelineState::from_u8(self.0.load(Ordering::SeqCst))
  }

  /// 尝试迁移状态，非法迁移被拒绝并返回 `false`
  pub fn transition(&self, next: PipelineState) -> bool {
    let result = self
      .0
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        PipelineState::from_u8(current)
          .can_transition_to(next)
          .then_some(next as u8)
      });
    match result {
      Ok(previous) => {
        debug!("流水线状态: {:?} -> {:?}", PipelineState::from_u8(previous), next);
        true
      }
      Err(current) => {
        warn!(
          "拒绝非法状态迁移: {:?} -> {:?}",
          PipelineState::from_u8(current),
          next
        );
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normal_lifecycle() {
    let state = StateCell::new();
    assert_eq!(state.get(), PipelineState::Starting);
    assert!(state.transition(PipelineState::Running));
    assert!(state.transition(PipelineState::ShuttingDown));
    assert!(state.transition(PipelineState::Terminated));
    assert_eq!(state.get(), PipelineState::Terminated);
  }

  #[test]
  fn startup_failure_skips_running() {
    let state = StateCell::new();
    assert!(state.transition(PipelineState::ShuttingDown));
    assert!(!state.transition(PipelineState::Running));
    assert!(state.transition(PipelineState::Terminated));
  }

  #[test]
  fn terminated_is_final() {
    let state = StateCell::new();
    assert!(!state.transition(PipelineState::Terminated));
    state.transition(PipelineState::ShuttingDown);
    state.transition(PipelineState::Terminated);
    for next in [
      PipelineState::Starting,
      PipelineState::Running,
      PipelineState::ShuttingDown,
      PipelineState::Terminated,
    ] {
      assert!(!state.transition(next));
    }
    assert_eq!(state.get(), PipelineState::Terminated);
  }
}

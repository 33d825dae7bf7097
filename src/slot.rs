// 该文件是 Lookout （瞭望） 项目的一部分。
// src/slot.rs - 单元素覆盖式交接槽
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

//! # 最新帧交接槽
//!
//! `Slot` 最多保存一个元素。写入永远成功并覆盖旧值，读取只会拿到最近一次写入的内容，
//! 中间被覆盖的元素直接丢弃。流水线的各个阶段用它在线程之间交接帧，
//! 生产者比消费者快时不会产生积压。
//!
//! ```
//! use std::time::Duration;
//! use lookout::slot::Slot;
//!
//! let slot = Slot::new();
//! slot.put(1);
//! slot.put(2);
//! assert_eq!(slot.try_take(), Some(2));
//! assert!(slot.take(Duration::from_millis(1)).is_err());
//! ```

use std::{
  sync::{Condvar, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
  #[error("等待超时: {0:?}")]
  Timeout(Duration),
}

#[derive(Debug)]
pub struct Slot<T> {
  item: Mutex<Option<T>>,
  ready: Condvar,
}

impl<T> Default for Slot<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Slot<T> {
  pub fn new() -> Self {
    Self {
      item: Mutex::new(None),
      ready: Condvar::new(),
    }
  }

  // 槽内只有普通数据，持锁线程崩溃后内容依然可用
  fn lock(&self) -> MutexGuard<'_, Option<T>> {
    self.item.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 写入新元素，返回被覆盖的旧元素（如果有）
  pub fn put(&self, item: T) -> Option<T> {
    let previous = self.lock().replace(item);
    self.ready.notify_one();
    previous
  }

  /// 非阻塞读取
  pub fn try_take(&self) -> Option<T> {
    self.lock().take()
  }

  /// 阻塞读取，最多等待 `timeout`
  pub fn take(&self, timeout: Duration) -> Result<T, SlotError> {
    let guard = self.lock();
    let (mut guard, _) = self
      .ready
      .wait_timeout_while(guard, timeout, |item| item.is_none())
      .unwrap_or_else(PoisonError::into_inner);
    guard.take().ok_or(SlotError::Timeout(timeout))
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_none()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
  };

  use super::*;

  #[test]
  fn latest_put_wins() {
    let slot = Slot::new();
    for i in 0..10 {
      slot.put(i);
    }
    assert_eq!(slot.try_take(), Some(9));
  }

  #[test]
  fn put_reports_displaced_item() {
    let slot = Slot::new();
    assert_eq!(slot.put("a"), None);
    assert_eq!(slot.put("b"), Some("a"));
    assert_eq!(slot.try_take(), Some("b"));
  }

  #[test]
  fn try_take_drains() {
    let slot = Slot::new();
    slot.put(7u8);
    assert_eq!(slot.try_take(), Some(7));
    assert_eq!(slot.try_take(), None);
    assert!(slot.is_empty());
  }

  #[test]
  fn take_times_out_within_bounds() {
    let slot: Slot<u32> = Slot::new();
    let timeout = Duration::from_millis(50);
    let start = Instant::now();
    let result = slot.take(timeout);
    let elapsed = start.elapsed();

    assert_eq!(result, Err(SlotError::Timeout(timeout)));
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(
      elapsed < timeout + Duration::from_millis(500),
      "returned late after {:?}",
      elapsed
    );
  }

  #[test]
  fn take_returns_immediately_when_filled() {
    let slot = Slot::new();
    slot.put(3);
    assert_eq!(slot.take(Duration::from_secs(5)), Ok(3));
  }

  #[test]
  fn take_wakes_on_put_from_other_thread() {
    let slot = Arc::new(Slot::new());
    let producer = {
      let slot = slot.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        slot.put(42);
      })
    };

    let start = Instant::now();
    assert_eq!(slot.take(Duration::from_secs(5)), Ok(42));
    assert!(start.elapsed() < Duration::from_secs(5));
    producer.join().unwrap();
  }
}

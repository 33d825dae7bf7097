// 该文件是 Lookout （瞭望） 项目的一部分。
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

use std::time::Duration;

use crate::frame::Frame;

/// 显示端
///
/// 显示阶段在主线程上驱动实现者：每轮先 `render` 最新帧，
/// 再用 `poll_quit` 等待一小段时间并检查退出按键。
pub trait Render {
  type Error;

  fn render(&mut self, frame: &Frame) -> Result<(), Self::Error>;

  /// 等待最多 `wait` 并返回用户是否请求退出
  fn poll_quit(&mut self, wait: Duration) -> bool;

  fn close(&mut self) {}
}

pub mod draw;

#[cfg(feature = "display_window")]
mod window;
#[cfg(feature = "display_window")]
pub use self::window::{MinifbWindow, WindowError};

// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output/window.rs - 窗口显示输出
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

//! # 窗口输出
//!
//! 基于 minifb 的带标题窗口，按 `q` 或关闭窗口即请求退出。
//! 窗口库不是线程安全的，只能在主线程上创建和驱动。

use std::{thread, time::Duration};

use minifb::{Key, Window, WindowOptions};
use thiserror::Error;
use tracing::info;

use crate::{frame::Frame, output::Render};

#[derive(Error, Debug)]
pub enum WindowError {
  #[error("窗口错误: {0}")]
  MinifbError(#[from] minifb::Error),
}

pub struct MinifbWindow {
  title: String,
  window: Option<Window>,
  buffer: Vec<u32>,
  size: (usize, usize),
}

impl MinifbWindow {
  /// 窗口在第一次渲染时按帧尺寸创建
  pub fn new(title: &str) -> Self {
    Self {
      title: title.to_string(),
      window: None,
      buffer: Vec::new(),
      size: (0, 0),
    }
  }

  fn ensure_window(&mut self, width: usize, height: usize) -> Result<(), WindowError> {
    if self.window.is_none() || self.size != (width, height) {
      info!("创建窗口 \"{}\": {}x{}", self.title, width, height);
      self.window = Some(Window::new(
        &self.title,
        width,
        height,
        WindowOptions::default(),
      )?);
      self.size = (width, height);
    }
    Ok(())
  }
}

/// RGB 转 minifb 使用的 0RGB 像素
fn pack_rgb(frame: &Frame, buffer: &mut Vec<u32>) {
  buffer.clear();
  buffer.extend(frame.image().pixels().map(|pixel| {
    let [r, g, b] = pixel.0;
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
  }));
}

impl Render for MinifbWindow {
  type Error = WindowError;

  fn render(&mut self, frame: &Frame) -> Result<(), Self::Error> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    self.ensure_window(width, height)?;
    pack_rgb(frame, &mut self.buffer);
    if let Some(window) = self.window.as_mut() {
      window.update_with_buffer(&self.buffer, width, height)?;
    }
    Ok(())
  }

  fn poll_quit(&mut self, wait: Duration) -> bool {
    if !wait.is_zero() {
      thread::sleep(wait);
    }
    match self.window.as_mut() {
      Some(window) => {
        window.update();
        !window.is_open() || window.is_key_down(Key::Q)
      }
      None => false,
    }
  }

  fn close(&mut self) {
    if self.window.take().is_some() {
      info!("窗口 \"{}\" 已关闭", self.title);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn packs_rgb_into_0rgb() {
    let frame = Frame::filled(2, 1, [0x12, 0x34, 0x56]);
    let mut buffer = Vec::new();
    pack_rgb(&frame, &mut buffer);
    assert_eq!(buffer, vec![0x0012_3456, 0x0012_3456]);
  }
}

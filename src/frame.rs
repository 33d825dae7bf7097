// 该文件是 Lookout （瞭望） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::{Rgb, RgbImage};

pub const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 一帧摄像头图像（HWC 排列的 RGB 数据）
///
/// 帧本身不携带编号或时间戳，先后顺序即到达顺序。
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
}

impl Frame {
  /// 由 HWC 排列的原始数据构造，长度不匹配时返回 `None`
  pub fn from_nhwc(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
    RgbImage::from_raw(width, height, data).map(Self::from)
  }

  /// 创建单色帧
  pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
    Self {
      image: RgbImage::from_pixel(width, height, Rgb(color)),
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn image_mut(&mut self) -> &mut RgbImage {
    &mut self.image
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}

impl AsNhwcFrame for Frame {
  fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_nhwc_checks_length() {
    assert!(Frame::from_nhwc(2, 2, vec![0u8; 12]).is_some());
    assert!(Frame::from_nhwc(2, 2, vec![0u8; 11]).is_none());
  }

  #[test]
  fn filled_frame_layout() {
    let frame = Frame::filled(4, 3, [1, 2, 3]);
    assert_eq!(frame.width(), 4);
    assert_eq!(frame.height(), 3);
    assert_eq!(frame.as_nhwc().len(), 4 * 3 * RGB_CHANNELS);
    assert_eq!(&frame.as_nhwc()[..3], &[1, 2, 3]);
  }
}

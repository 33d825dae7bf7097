// 该文件是 Lookout （瞭望） 项目的一部分。
// src/input/v4l_camera.rs - V4L2 摄像头输入源
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

use std::pin::Pin;

use image::ImageFormat;
use tracing::{info, warn};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  frame::Frame,
  input::{CameraConfig, FrameSource, SourceError},
};

const STREAM_BUFFERS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Yuyv,
  Mjpeg,
}

impl PixelFormat {
  fn from_fourcc(fourcc: FourCC) -> Option<Self> {
    match &fourcc.repr {
      b"YUYV" => Some(PixelFormat::Yuyv),
      b"MJPG" => Some(PixelFormat::Mjpeg),
      _ => None,
    }
  }
}

/// V4L2 摄像头输入源
///
/// v4l 的 Stream 需要引用 Device，这里用 `Pin<Box<Device>>` 固定设备地址，
/// 再创建引用它的 Stream。
pub struct V4lCamera {
  // 字段顺序保证 stream 先于 device 释放
  stream: Option<Stream<'static>>,
  device: Option<Pin<Box<Device>>>,
  device_index: usize,
  width: u32,
  height: u32,
  pixel_format: PixelFormat,
}

impl V4lCamera {
  /// 打开摄像头并申请分辨率，设备可能协商出不同的尺寸
  pub fn open(config: &CameraConfig) -> Result<Self, SourceError> {
    let unavailable =
      |e: std::io::Error| SourceError::DeviceUnavailable(format!("/dev/video{}: {}", config.device_index, e));

    let device = Box::pin(Device::new(config.device_index).map_err(unavailable)?);

    let mut format = device.format().map_err(unavailable)?;
    format.width = config.width;
    format.height = config.height;
    format.fourcc = FourCC::new(b"YUYV");
    let mut format = device.set_format(&format).map_err(unavailable)?;

    if PixelFormat::from_fourcc(format.fourcc).is_none() {
      // 部分摄像头在该分辨率下只提供 MJPG
      format.fourcc = FourCC::new(b"MJPG");
      format = device.set_format(&format).map_err(unavailable)?;
    }

    let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
      SourceError::DeviceUnavailable(format!("不支持的像素格式: {}", format.fourcc))
    })?;

    if format.width != config.width || format.height != config.height {
      warn!(
        "摄像头不支持 {}x{}，实际使用 {}x{}",
        config.width, config.height, format.width, format.height
      );
    }

    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动；
    // stream 字段声明在 device 之前，close 中也先释放 stream，引用始终有效
    let device_ref: &Device = &device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, STREAM_BUFFERS).map_err(unavailable)?
    };

    info!(
      "摄像头 /dev/video{} 已打开: {}x{} {:?}",
      config.device_index, format.width, format.height, pixel_format
    );

    Ok(Self {
      stream: Some(stream),
      device: Some(device),
      device_index: config.device_index,
      width: format.width,
      height: format.height,
      pixel_format,
    })
  }
}

fn decode(
  pixel_format: PixelFormat,
  width: u32,
  height: u32,
  buffer: &[u8],
) -> Result<Frame, SourceError> {
  match pixel_format {
    PixelFormat::Yuyv => {
      let rgb = yuyv_to_rgb(buffer, width, height);
      Frame::from_nhwc(width, height, rgb).ok_or_else(|| {
        SourceError::CaptureError(format!(
          "YUYV 数据长度不足: {} 字节, 分辨率 {}x{}",
          buffer.len(),
          width,
          height
        ))
      })
    }
    PixelFormat::Mjpeg => {
      let image = image::load_from_memory_with_format(buffer, ImageFormat::Jpeg)?;
      Ok(Frame::from(image.to_rgb8()))
    }
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let pixels = (width * height) as usize;
  let mut rgb = Vec::with_capacity(pixels * 3);

  for chunk in yuyv.chunks_exact(4).take(pixels / 2) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl FrameSource for V4lCamera {
  fn read(&mut self) -> Result<Frame, SourceError> {
    let (pixel_format, width, height) = (self.pixel_format, self.width, self.height);
    let stream = self.stream.as_mut().ok_or(SourceError::EndOfStream)?;
    match stream.next() {
      Ok((buffer, _meta)) => decode(pixel_format, width, height, buffer),
      Err(e) => {
        warn!("摄像头读取失败，视为流结束: {}", e);
        Err(SourceError::EndOfStream)
      }
    }
  }

  fn close(&mut self) {
    if self.stream.take().is_some() {
      self.device.take();
      info!("摄像头 /dev/video{} 已释放", self.device_index);
    }
  }
}

impl Drop for V4lCamera {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_maps_to_gray() {
    // Y=128, U=V=128 为中性灰
    let yuyv = vec![128u8; 2 * 2 * 2];
    let rgb = yuyv_to_rgb(&yuyv, 2, 2);
    assert_eq!(rgb.len(), 2 * 2 * 3);
    assert!(rgb.iter().all(|&c| c == 128));
  }

  #[test]
  fn yuyv_short_buffer_yields_short_output() {
    let rgb = yuyv_to_rgb(&[16, 128, 16, 128], 2, 2);
    assert_eq!(rgb.len(), 6);
  }

  #[test]
  fn fourcc_mapping() {
    assert_eq!(
      PixelFormat::from_fourcc(FourCC::new(b"YUYV")),
      Some(PixelFormat::Yuyv)
    );
    assert_eq!(
      PixelFormat::from_fourcc(FourCC::new(b"MJPG")),
      Some(PixelFormat::Mjpeg)
    );
    assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
  }
}

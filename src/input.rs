// 该文件是 Lookout （瞭望） 项目的一部分。
// src/input.rs - 帧来源
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("设备不可用: {0}")]
  DeviceUnavailable(String),
  #[error("视频流已结束")]
  EndOfStream,
  #[error("帧捕获失败: {0}")]
  CaptureError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像加载错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 拉取式帧来源
///
/// 来源在存活期间独占设备；`close` 释放设备，重复调用只释放一次。
/// 实现者应在 `Drop` 中调用 `close`，保证任何退出路径都会释放。
pub trait FrameSource {
  fn read(&mut self) -> Result<Frame, SourceError>;
  fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn read(&mut self) -> Result<Frame, SourceError> {
    (**self).read()
  }

  fn close(&mut self) {
    (**self).close()
  }
}

pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;

/// 摄像头配置，分辨率为期望值，设备可能不支持
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConfig {
  pub device_index: usize,
  pub width: u32,
  pub height: u32,
}

impl Default for CameraConfig {
  fn default() -> Self {
    Self {
      device_index: 0,
      width: DEFAULT_CAMERA_WIDTH,
      height: DEFAULT_CAMERA_HEIGHT,
    }
  }
}

impl CameraConfig {
  pub fn new(device_index: usize, width: u32, height: u32) -> Self {
    Self {
      device_index,
      width,
      height,
    }
  }

  pub fn to_url(&self) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
      "{}:///dev/video{}?width={}&height={}",
      Self::SCHEME,
      self.device_index,
      self.width,
      self.height
    ))
  }
}

impl FromUrlWithScheme for CameraConfig {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for CameraConfig {
  type Error = SourceError;

  /// 格式: `v4l:///dev/video0?width=640&height=480`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SourceError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut config = CameraConfig::default();
    let path = url.path();
    if !path.is_empty() && path != "/" {
      let index = path.trim_start_matches("/dev/video").trim_start_matches('/');
      config.device_index = index
        .parse()
        .map_err(|_| SourceError::DeviceUnavailable(format!("无效的设备路径: {}", path)))?;
    }

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "width" => config.width = v.parse().unwrap_or(config.width),
        "height" => config.height = v.parse().unwrap_or(config.height),
        _ => {}
      }
    }

    Ok(config)
  }
}

#[cfg(feature = "camera_v4l")]
mod v4l_camera;
#[cfg(feature = "camera_v4l")]
pub use self::v4l_camera::V4lCamera;

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::ImageFileSource;

pub enum InputWrapper {
  #[cfg(feature = "camera_v4l")]
  V4lCamera(V4lCamera),
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileSource),
}

impl FromUrl for InputWrapper {
  type Error = SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "camera_v4l")]
      CameraConfig::SCHEME => {
        let config = CameraConfig::from_url(url)?;
        Ok(InputWrapper::V4lCamera(V4lCamera::open(&config)?))
      }
      #[cfg(feature = "read_image_file")]
      ImageFileSource::SCHEME => Ok(InputWrapper::ImageFile(ImageFileSource::from_url(url)?)),
      other => Err(SourceError::SchemeMismatch(format!(
        "不支持的输入方案 '{}'",
        other
      ))),
    }
  }
}

impl FrameSource for InputWrapper {
  fn read(&mut self) -> Result<Frame, SourceError> {
    match self {
      #[cfg(feature = "camera_v4l")]
      InputWrapper::V4lCamera(input) => input.read(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.read(),
    }
  }

  fn close(&mut self) {
    match self {
      #[cfg(feature = "camera_v4l")]
      InputWrapper::V4lCamera(input) => input.close(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.close(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_config_from_url() {
    let url = Url::parse("v4l:///dev/video2?width=1280&height=720").unwrap();
    assert_eq!(
      CameraConfig::from_url(&url).unwrap(),
      CameraConfig::new(2, 1280, 720)
    );
  }

  #[test]
  fn camera_config_url_parses_back() {
    let config = CameraConfig::new(3, 320, 240);
    assert_eq!(CameraConfig::from_url(&config.to_url().unwrap()).unwrap(), config);
  }

  #[test]
  fn camera_config_defaults() {
    let url = Url::parse("v4l:///").unwrap();
    assert_eq!(CameraConfig::from_url(&url).unwrap(), CameraConfig::default());

    let url = Url::parse("v4l:///dev/video1?width=abc").unwrap();
    assert_eq!(
      CameraConfig::from_url(&url).unwrap(),
      CameraConfig::new(1, DEFAULT_CAMERA_WIDTH, DEFAULT_CAMERA_HEIGHT)
    );
  }

  #[test]
  fn camera_config_rejects_bad_urls() {
    let url = Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      CameraConfig::from_url(&url),
      Err(SourceError::SchemeMismatch(_))
    ));

    let url = Url::parse("v4l:///dev/sda").unwrap();
    assert!(matches!(
      CameraConfig::from_url(&url),
      Err(SourceError::DeviceUnavailable(_))
    ));
  }

  #[test]
  fn wrapper_rejects_unknown_scheme() {
    let url = Url::parse("gst://camera/dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(SourceError::SchemeMismatch(_))
    ));
  }
}

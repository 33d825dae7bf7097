// 该文件是 Lookout （瞭望） 项目的一部分。
// src/input/image_file.rs - 静态图像输入
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

use std::{thread, time::Duration};

use image::{ImageReader, RgbImage};
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::Frame,
  input::{FrameSource, SourceError},
};

const DEFAULT_INTERVAL_MS: u64 = 33;

/// 把一张图片当作摄像头重复输出
///
/// `repeat` 为 0 时无限输出，否则输出指定帧数后报告流结束。
pub struct ImageFileSource {
  image: Option<RgbImage>,
  repeat: u64,
  interval: Duration,
  emitted: u64,
}

impl ImageFileSource {
  pub fn new(image: RgbImage, repeat: u64, interval: Duration) -> Self {
    Self {
      image: Some(image),
      repeat,
      interval,
      emitted: 0,
    }
  }

  pub fn emitted(&self) -> u64 {
    self.emitted
  }
}

impl FromUrlWithScheme for ImageFileSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileSource {
  type Error = SourceError;

  /// 格式: `image:///path/to/file.jpg?repeat=0&interval_ms=33`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(SourceError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut repeat = 0;
    let mut interval_ms = DEFAULT_INTERVAL_MS;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "repeat" => repeat = v.parse().unwrap_or(repeat),
        "interval_ms" => interval_ms = v.parse().unwrap_or(interval_ms),
        _ => {}
      }
    }

    let path = decoded_path(url);
    let image = ImageReader::open(&path)
      .map_err(|e| SourceError::DeviceUnavailable(format!("{}: {}", path, e)))?
      .decode()?
      .to_rgb8();
    info!(
      "已加载图像 {}: {}x{}",
      path,
      image.width(),
      image.height()
    );

    Ok(Self::new(image, repeat, Duration::from_millis(interval_ms)))
  }
}

impl FrameSource for ImageFileSource {
  fn read(&mut self) -> Result<Frame, SourceError> {
    if self.repeat != 0 && self.emitted >= self.repeat {
      return Err(SourceError::EndOfStream);
    }
    let image = self.image.as_ref().ok_or(SourceError::EndOfStream)?;
    if self.emitted > 0 && !self.interval.is_zero() {
      thread::sleep(self.interval);
    }
    self.emitted += 1;
    Ok(Frame::from(image.clone()))
  }

  fn close(&mut self) {
    if self.image.take().is_some() {
      info!("图像输入已关闭，共输出 {} 帧", self.emitted);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn repeats_then_ends() {
    let image = RgbImage::from_pixel(4, 2, image::Rgb([1, 2, 3]));
    let mut source = ImageFileSource::new(image, 3, Duration::ZERO);
    for _ in 0..3 {
      let frame = source.read().unwrap();
      assert_eq!((frame.width(), frame.height()), (4, 2));
    }
    assert!(matches!(source.read(), Err(SourceError::EndOfStream)));
    assert_eq!(source.emitted(), 3);
  }

  #[test]
  fn closed_source_reports_end_of_stream() {
    let image = RgbImage::new(2, 2);
    let mut source = ImageFileSource::new(image, 0, Duration::ZERO);
    assert!(source.read().is_ok());
    source.close();
    source.close();
    assert!(matches!(source.read(), Err(SourceError::EndOfStream)));
  }

  #[test]
  fn missing_file_is_unavailable() {
    let url = Url::parse("image:///nonexistent/lookout-test.png").unwrap();
    assert!(matches!(
      ImageFileSource::from_url(&url),
      Err(SourceError::DeviceUnavailable(_))
    ));
  }

  #[test]
  fn loads_file_with_query() {
    let path = std::env::temp_dir().join("lookout-image-source.png");
    RgbImage::from_pixel(3, 3, image::Rgb([9, 9, 9]))
      .save(&path)
      .unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let mut url = Url::parse(&format!("image://{}", url.path())).unwrap();
    url.set_query(Some("repeat=1&interval_ms=0"));

    let mut source = ImageFileSource::from_url(&url).unwrap();
    assert_eq!(source.read().unwrap().image().get_pixel(1, 1).0, [9, 9, 9]);
    assert!(matches!(source.read(), Err(SourceError::EndOfStream)));
    let _ = std::fs::remove_file(path);
  }
}

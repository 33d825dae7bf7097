// 该文件是 Lookout （瞭望） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use lookout::{
  input::{CameraConfig, DEFAULT_CAMERA_HEIGHT, DEFAULT_CAMERA_WIDTH},
  pipeline::{DEFAULT_CONFIDENCE_THRESHOLD, PipelineConfig},
};

/// Lookout 实时目标检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// RKNN 模型路径，例如 yolo26:///opt/models/yolo26n.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 类别名称 JSON 文件，默认使用 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输入来源，支持 v4l:///dev/video0 与 image:///path.jpg
  /// 未指定时按 --device/--width/--height 打开摄像头
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<Url>,

  /// 摄像头设备序号
  #[arg(long, default_value_t = 0, value_name = "INDEX")]
  pub device: usize,

  #[arg(long, default_value_t = DEFAULT_CAMERA_WIDTH, value_name = "PIXELS")]
  pub width: u32,

  #[arg(long, default_value_t = DEFAULT_CAMERA_HEIGHT, value_name = "PIXELS")]
  pub height: u32,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 窗口标题
  #[arg(long, default_value = "Lookout", value_name = "TITLE")]
  pub title: String,

  /// 推理线程等待新帧的超时（毫秒）
  #[arg(long, default_value_t = 1000, value_name = "MS")]
  pub inference_timeout_ms: u64,

  /// 显示循环每轮等待按键的时间（毫秒）
  #[arg(long, default_value_t = 1, value_name = "MS")]
  pub display_wait_ms: u64,

  /// 启动时轮询第一帧的间隔（毫秒）
  #[arg(long, default_value_t = 100, value_name = "MS")]
  pub startup_poll_ms: u64,

  /// 等待第一帧的上限（毫秒），0 表示一直等待
  #[arg(long, default_value_t = 10_000, value_name = "MS")]
  pub startup_timeout_ms: u64,

  /// 推理失败时退出整个程序，默认只停止推理并冻结画面
  #[arg(long)]
  pub exit_on_inference_error: bool,
}

impl Args {
  pub fn camera_url(&self) -> Result<Url, url::ParseError> {
    match &self.input {
      Some(url) => Ok(url.clone()),
      None => CameraConfig::new(self.device, self.width, self.height).to_url(),
    }
  }

  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      confidence_threshold: self.confidence,
      inference_timeout: Duration::from_millis(self.inference_timeout_ms),
      display_wait: Duration::from_millis(self.display_wait_ms),
      startup_poll: Duration::from_millis(self.startup_poll_ms),
      startup_timeout: (self.startup_timeout_ms > 0)
        .then(|| Duration::from_millis(self.startup_timeout_ms)),
      exit_on_inference_failure: self.exit_on_inference_error,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use lookout::FromUrl;

  #[test]
  fn defaults_follow_pipeline_config() {
    let args = Args::parse_from(["lookout", "--model", "yolo26:///m.rknn"]);
    assert_eq!(args.pipeline_config(), PipelineConfig::default());
    assert_eq!(
      CameraConfig::from_url(&args.camera_url().unwrap()).unwrap(),
      CameraConfig::default()
    );
  }

  #[test]
  fn camera_flags_build_v4l_url() {
    let args = Args::parse_from([
      "lookout",
      "--model",
      "yolo26:///m.rknn",
      "--device",
      "2",
      "--width",
      "1280",
      "--height",
      "720",
      "--startup-timeout-ms",
      "0",
    ]);
    assert_eq!(
      CameraConfig::from_url(&args.camera_url().unwrap()).unwrap(),
      CameraConfig::new(2, 1280, 720)
    );
    assert_eq!(args.pipeline_config().startup_timeout, None);
  }
}

// 该文件是 Lookout （瞭望） 项目的一部分。
// src/bin/cam_preview.rs - 摄像头预览
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lookout::{
  FromUrl,
  input::{CameraConfig, DEFAULT_CAMERA_HEIGHT, DEFAULT_CAMERA_WIDTH, InputWrapper},
  output::MinifbWindow,
  pipeline::{Pipeline, PipelineConfig},
};

/// 摄像头预览，按 q 退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头设备序号
  #[arg(long, default_value_t = 0, value_name = "INDEX")]
  pub device: usize,

  #[arg(long, default_value_t = DEFAULT_CAMERA_WIDTH, value_name = "PIXELS")]
  pub width: u32,

  #[arg(long, default_value_t = DEFAULT_CAMERA_HEIGHT, value_name = "PIXELS")]
  pub height: u32,

  #[arg(long, default_value = "Webcam Feed", value_name = "TITLE")]
  pub title: String,

  /// 显示循环每轮等待按键的时间（毫秒）
  #[arg(long, default_value_t = 1, value_name = "MS")]
  pub display_wait_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let url = CameraConfig::new(args.device, args.width, args.height).to_url()?;
  info!("打开摄像头: {}", url);

  let source = InputWrapper::from_url(&url).with_context(|| format!("无法打开摄像头 {}", url))?;
  let mut window = MinifbWindow::new(&args.title);

  let pipeline = Pipeline::new(PipelineConfig {
    display_wait: Duration::from_millis(args.display_wait_ms),
    ..PipelineConfig::default()
  });
  let shutdown = pipeline.shutdown_handle();
  ctrlc::set_handler(move || shutdown.trigger()).context("无法设置 Ctrl-C 处理函数")?;

  let report = pipeline.run_preview(source, &mut window)?;
  info!(
    "预览结束: 显示 {} 帧，丢弃 {} 帧",
    report.stats.displayed, report.stats.dropped_frames
  );

  Ok(())
}

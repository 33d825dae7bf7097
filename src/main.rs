// 该文件是 Lookout （瞭望） 项目的一部分。
// src/main.rs - 实时目标检测主程序
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

mod args;

use std::{thread, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use lookout::{
  FromUrl,
  input::InputWrapper,
  labels::ClassNames,
  model::Yolo26Builder,
  output::{MinifbWindow, draw::Draw},
  pipeline::{Pipeline, Shutdown},
};

fn install_ctrlc(shutdown: Shutdown) -> Result<()> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    shutdown.trigger();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.pipeline_config();
  let input = args.camera_url()?;

  info!("模型路径: {}", args.model);
  info!("输入来源: {}", input);
  info!("置信度阈值: {}", config.confidence_threshold);

  let names = match &args.labels {
    Some(path) => ClassNames::load(path)
      .with_context(|| format!("无法读取类别文件 {}", path.display()))?,
    None => ClassNames::coco(),
  };
  info!("共 {} 个类别", names.len());
  let draw = Draw::new(names)?;

  // 摄像头不可用时直接退出
  let source = InputWrapper::from_url(&input).with_context(|| format!("无法打开输入 {}", input))?;

  let builder = Yolo26Builder::from_url(&args.model)?.confidence(config.confidence_threshold);
  let mut window = MinifbWindow::new(&args.title);

  let pipeline = Pipeline::new(config);
  install_ctrlc(pipeline.shutdown_handle())?;

  let report = pipeline.run(source, move || builder.build(), &mut window, draw)?;
  info!("退出方式: {:?}", report.display);

  match report.inference {
    Some(Err(e)) if pipeline.config().exit_on_inference_failure => bail!(e),
    Some(Err(e)) => warn!("推理线程曾异常停止: {}", e),
    None => warn!("推理线程异常退出"),
    Some(Ok(())) => {}
  }

  Ok(())
}

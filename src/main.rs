// 该文件是 Zishi （姿势） 项目的一部分。
// src/main.rs - 姿态估计服务主程序
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

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{info, warn};
use url::Url;

use zishi::{
  model::ModelRuntime,
  output::Draw,
  pipeline::PosePipeline,
  server::{AppState, router},
  telemetry,
};

use args::Args;

/// 将裸路径转换为 `file://` URL，其余按 URL 解析
fn model_url(model: &str) -> Result<Url> {
  if let Ok(url) = Url::parse(model) {
    return Ok(url);
  }
  let path = std::path::absolute(model).with_context(|| format!("无法解析模型路径: {model}"))?;
  Url::from_file_path(&path).map_err(|_| anyhow::anyhow!("无法将模型路径转换为 URL: {}", path.display()))
}

#[cfg(feature = "model_movenet")]
fn load_runtime(args: &Args) -> Result<ModelRuntime> {
  use zishi::{FromUrl, model::MoveNetBuilder};

  let url = model_url(&args.model)?;
  let model = MoveNetBuilder::from_url(&url)?
    .input_size(args.input_size)
    .intra_threads(args.intra_threads)
    .build()?;
  Ok(ModelRuntime::with_engine(model))
}

#[cfg(not(feature = "model_movenet"))]
fn load_runtime(args: &Args) -> Result<ModelRuntime> {
  let url = model_url(&args.model)?;
  anyhow::bail!("未启用 model_movenet 特性，无法加载模型 {url}")
}

fn load_draw(args: &Args) -> Draw {
  let Some(font) = &args.font else {
    return Draw::default();
  };
  match Draw::with_font_file(font) {
    Ok(draw) => draw,
    Err(e) => {
      warn!("字体加载失败，使用内置点阵字: {}: {}", font.display(), e);
      Draw::default()
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init_logging();
  let args = Args::parse();

  info!("Zishi 姿态估计服务");
  info!("模型路径: {}", args.model);
  info!("监听地址: {}:{}", args.host, args.port);

  let runtime = match load_runtime(&args) {
    Ok(runtime) => {
      info!("模型加载完成");
      runtime
    }
    Err(e) if args.require_model => return Err(e.context("模型加载失败")),
    Err(e) => {
      warn!("模型加载失败，服务以未加载模型状态启动: {:#}", e);
      ModelRuntime::unloaded()
    }
  };

  let pipeline = PosePipeline::new(Arc::new(runtime))
    .with_draw(load_draw(&args))
    .with_jpeg_quality(args.jpeg_quality);
  let handle = telemetry::init_metrics_recorder().clone();
  let max_body_bytes = (args.max_body_bytes > 0).then_some(args.max_body_bytes);
  let state = Arc::new(
    AppState::new(pipeline)
      .with_metrics(handle)
      .with_max_body_bytes(max_body_bytes),
  );

  let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
  let shutdown_tx = Mutex::new(Some(shutdown_tx));
  ctrlc::set_handler(move || {
    info!("收到退出信号，正在停止服务...");
    if let Some(tx) = shutdown_tx.lock().ok().and_then(|mut tx| tx.take()) {
      let _ = tx.send(());
    }
  })
  .context("无法注册 Ctrl-C 处理函数")?;

  let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
    .await
    .with_context(|| format!("无法监听 {}:{}", args.host, args.port))?;
  info!("服务已启动: http://{}", listener.local_addr()?);

  axum::serve(listener, router(state))
    .with_graceful_shutdown(async {
      let _ = shutdown_rx.await;
    })
    .await
    .context("HTTP 服务异常退出")?;

  info!("服务已停止");
  Ok(())
}

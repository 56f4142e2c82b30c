// 该文件是 Zishi （姿势） 项目的一部分。
// src/bin/pose_oneshot.rs - 单张图像姿态估计
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use url::Url;

use zishi::{
  FromUrl,
  model::{ModelRuntime, MoveNetBuilder, localize},
  output::Draw,
};

/// 对单张图像运行姿态估计，输出标注图像与 JSON 结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL（movenet:// 或 file://）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像路径
  #[arg(long, value_name = "SOURCE")]
  pub input: PathBuf,
  /// 标注图像输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  /// 模型输入分辨率
  #[arg(long, default_value_t = 256, value_name = "PIXELS")]
  pub input_size: u32,
  /// 置信度标签字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型路径: {}", args.model);
  info!("输入图像: {}", args.input.display());
  info!("输出路径: {}", args.output.display());

  let image = image::open(&args.input)
    .with_context(|| format!("无法读取图像: {}", args.input.display()))?
    .to_rgb8();
  let model = MoveNetBuilder::from_url(&args.model)?
    .input_size(args.input_size)
    .build()?;
  let runtime = ModelRuntime::with_engine(model);
  let draw = match &args.font {
    Some(font) => Draw::with_font_file(font)?,
    None => Draw::default(),
  };

  info!("开始推理...");
  let now = std::time::Instant::now();
  let keypoints = runtime.predict_pose(&image)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  let detections: Vec<_> = localize(&keypoints, image.width(), image.height())
    .into_iter()
    .collect();
  let annotated = draw.try_annotate(&image, &detections)?;
  annotated
    .save(&args.output)
    .with_context(|| format!("无法保存图像: {}", args.output.display()))?;

  let report = json!({
    "count": detections.len(),
    "boxes": detections.iter().map(|d| d.bbox).collect::<Vec<_>>(),
    "keypoints": detections.iter().map(|d| &d.keypoints).collect::<Vec<_>>(),
  });
  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}

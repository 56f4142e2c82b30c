// 该文件是 Zishi （姿势） 项目的一部分。
// src/args.rs - 服务参数配置
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

use clap::Parser;
use zishi::server::DEFAULT_MAX_BODY_BYTES;

/// Zishi 姿态估计服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，支持本地路径或 movenet:// / file:// URL
  #[arg(
    long,
    env = "MODEL_PATH",
    default_value = "/app/model/movenet-full-256.onnx",
    value_name = "MODEL"
  )]
  pub model: String,

  /// 监听地址
  #[arg(long, env = "HOST", default_value = "0.0.0.0")]
  pub host: String,

  /// 监听端口
  #[arg(long, env = "PORT", default_value_t = 8000)]
  pub port: u16,

  /// 模型输入分辨率（正方形边长）
  #[arg(long, env = "MODEL_INPUT_SIZE", default_value_t = 256, value_name = "PIXELS")]
  pub input_size: u32,

  /// 推理线程数
  #[arg(long, default_value_t = 1, value_name = "COUNT")]
  pub intra_threads: usize,

  /// 置信度标签字体（TTF/OTF），缺省时使用内置点阵字
  #[arg(long, env = "POSE_FONT", value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 标注图像的 JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = 95, value_name = "QUALITY",
        value_parser = clap::value_parser!(u8).range(1..=100))]
  pub jpeg_quality: u8,

  /// 请求体大小上限（字节），0 表示不限制
  #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES, value_name = "BYTES")]
  pub max_body_bytes: usize,

  /// 模型加载失败时退出，而不是以未加载状态启动
  #[arg(long)]
  pub require_model: bool,
}

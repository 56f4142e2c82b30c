// 该文件是 Zishi （姿势） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::{io::Cursor, sync::Arc};

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use zishi::{
  frame::RgbNhwcF32Frame,
  model::{BodyPart, EngineError, InferenceEngine, KEYPOINT_COUNT, ModelRuntime},
  output::encode_jpeg_base64,
  pipeline::PosePipeline,
  server::{AppState, router},
  telemetry,
};

/// 输出一个站立在画面中央的人体关键点
pub struct StandingPerson;

impl StandingPerson {
  /// (y, x)，归一化坐标
  pub fn pose(part: BodyPart) -> (f32, f32) {
    match part {
      BodyPart::Nose => (0.15, 0.50),
      BodyPart::LeftEye => (0.13, 0.52),
      BodyPart::RightEye => (0.13, 0.48),
      BodyPart::LeftEar => (0.14, 0.54),
      BodyPart::RightEar => (0.14, 0.46),
      BodyPart::LeftShoulder => (0.25, 0.58),
      BodyPart::RightShoulder => (0.25, 0.42),
      BodyPart::LeftElbow => (0.38, 0.60),
      BodyPart::RightElbow => (0.38, 0.40),
      BodyPart::LeftWrist => (0.50, 0.61),
      BodyPart::RightWrist => (0.50, 0.39),
      BodyPart::LeftHip => (0.52, 0.55),
      BodyPart::RightHip => (0.52, 0.45),
      BodyPart::LeftKnee => (0.68, 0.55),
      BodyPart::RightKnee => (0.68, 0.45),
      BodyPart::LeftAnkle => (0.85, 0.55),
      BodyPart::RightAnkle => (0.85, 0.45),
    }
  }
}

impl InferenceEngine for StandingPerson {
  fn input_size(&self) -> (u32, u32) {
    (32, 32)
  }

  fn infer(&mut self, _input: &RgbNhwcF32Frame) -> Result<Vec<f32>, EngineError> {
    let mut values = Vec::with_capacity(KEYPOINT_COUNT * 3);
    for part in BodyPart::ALL {
      let (y, x) = Self::pose(part);
      values.extend([y, x, 0.9]);
    }
    Ok(values)
  }
}

/// 推理时直接 panic 的引擎
pub struct PanickingEngine;

impl InferenceEngine for PanickingEngine {
  fn input_size(&self) -> (u32, u32) {
    (8, 8)
  }

  fn infer(&mut self, _input: &RgbNhwcF32Frame) -> Result<Vec<f32>, EngineError> {
    panic!("engine crashed")
  }
}

pub fn jpeg_payload(width: u32, height: u32) -> String {
  let image = RgbImage::from_fn(width, height, |x, y| {
    Rgb([(x % 256) as u8, (y % 256) as u8, 128])
  });
  let mut bytes = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
    .unwrap();
  STANDARD.encode(bytes)
}

/// 高质量编码的噪声图像，base64 后远大于 2 MiB
pub fn noisy_jpeg_payload(width: u32, height: u32) -> String {
  let mut state = 0x2545_f491u32;
  let image = RgbImage::from_fn(width, height, |_, _| {
    let mut channel = || {
      state ^= state << 13;
      state ^= state >> 17;
      state ^= state << 5;
      (state >> 24) as u8
    };
    Rgb([channel(), channel(), channel()])
  });
  encode_jpeg_base64(&image, 100).unwrap()
}

pub fn app(runtime: ModelRuntime) -> Router {
  app_with(runtime, |state| state)
}

pub fn app_with(runtime: ModelRuntime, configure: impl FnOnce(AppState) -> AppState) -> Router {
  let pipeline = PosePipeline::new(Arc::new(runtime));
  let handle = telemetry::init_metrics_recorder().clone();
  router(Arc::new(configure(AppState::new(pipeline).with_metrics(handle))))
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
  let response = app.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  (status, bytes.to_vec())
}

pub async fn post(
  app: &Router,
  path: &str,
  content_type: &str,
  body: impl Into<Body>,
) -> (StatusCode, Value) {
  let request = Request::builder()
    .method("POST")
    .uri(path)
    .header(header::CONTENT_TYPE, content_type)
    .body(body.into())
    .unwrap();
  let (status, bytes) = send(app, request).await;
  (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
  post(app, path, "application/json", body.to_string()).await
}

pub async fn get(app: &Router, path: &str) -> (StatusCode, Vec<u8>) {
  let request = Request::builder()
    .method("GET")
    .uri(path)
    .body(Body::empty())
    .unwrap();
  send(app, request).await
}

// 该文件是 Zishi （姿势） 项目的一部分。
// src/pipeline.rs - 请求处理流水线
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

//! 每个请求依次经过
//! `Validate -> CheckModelLoaded -> Decode -> Localize -> {Format | Annotate+Encode}`，
//! 任一阶段失败立即返回错误响应，不做重试。

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use axum::http::StatusCode;
use image::RgbImage;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  input::{DecodeError, decode_image_payload},
  model::{BoundingBox, KeypointSet, ModelRuntime, PersonDetection, localize},
  output::{DEFAULT_JPEG_QUALITY, Draw, EncodeError, encode_jpeg_base64},
};

#[derive(Error, Debug)]
pub enum PoseError {
  #[error("请求内容类型不是 JSON")]
  InvalidContentType,
  #[error("请求体超过大小限制")]
  PayloadTooLarge,
  #[error("缺少必需参数")]
  MissingParameters,
  #[error("参数类型错误")]
  InvalidParameterType,
  #[error("模型未加载")]
  ModelNotLoaded,
  #[error("无效图像: {0}")]
  InvalidImage(#[source] DecodeError),
  #[error("图像编码失败: {0}")]
  ImageEncodingFailed(#[source] EncodeError),
  #[error("内部错误: {0:#}")]
  InternalError(anyhow::Error),
}

impl PoseError {
  pub fn status(&self) -> StatusCode {
    match self {
      PoseError::InvalidContentType
      | PoseError::MissingParameters
      | PoseError::InvalidParameterType
      | PoseError::InvalidImage(_) => StatusCode::BAD_REQUEST,
      PoseError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
      PoseError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
      PoseError::ImageEncodingFailed(_) | PoseError::InternalError(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  /// 错误计数指标使用的标签
  pub fn kind(&self) -> &'static str {
    match self {
      PoseError::InvalidContentType => "invalid_content_type",
      PoseError::PayloadTooLarge => "payload_too_large",
      PoseError::MissingParameters => "missing_parameters",
      PoseError::InvalidParameterType => "invalid_parameter_type",
      PoseError::ModelNotLoaded => "model_not_loaded",
      PoseError::InvalidImage(_) => "invalid_image",
      PoseError::ImageEncodingFailed(_) => "image_encoding_failed",
      PoseError::InternalError(_) => "internal_error",
    }
  }

  pub fn is_client_error(&self) -> bool {
    self.status().is_client_error()
  }
}

/// 两种响应形式共用同一流水线
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseVariant {
  Json,
  Image,
}

impl ResponseVariant {
  fn internal_message(self) -> &'static str {
    match self {
      ResponseVariant::Json => "Internal server error during pose detection",
      ResponseVariant::Image => "Internal server error during pose estimation image",
    }
  }
}

/// 各阶段耗时（秒，保留 6 位小数）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StageTimings {
  pub speed_preprocess: f64,
  pub speed_inference: f64,
  pub speed_postprocess: f64,
}

fn round_seconds(duration: Duration) -> f64 {
  (duration.as_secs_f64() * 1e6).round() / 1e6
}

#[derive(Debug, Default)]
struct StageClock {
  preprocess: Duration,
  inference: Duration,
  postprocess: Duration,
}

impl StageClock {
  fn timings(&self) -> StageTimings {
    StageTimings {
      speed_preprocess: round_seconds(self.preprocess),
      speed_inference: round_seconds(self.inference),
      speed_postprocess: round_seconds(self.postprocess),
    }
  }
}

/// 流水线失败：错误本身、已知的请求 id 与已经记录的阶段耗时
#[derive(Debug)]
pub struct PoseFailure {
  pub variant: ResponseVariant,
  pub error: PoseError,
  pub id: Option<String>,
  pub timings: Option<StageTimings>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub status: &'static str,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(flatten, skip_serializing_if = "Option::is_none")]
  pub timings: Option<StageTimings>,
}

impl PoseFailure {
  pub fn status(&self) -> StatusCode {
    self.error.status()
  }

  /// 返回给客户端的消息；内部错误不暴露细节
  pub fn message(&self) -> &'static str {
    match self.error {
      PoseError::InvalidContentType => "Content-Type must be application/json",
      PoseError::PayloadTooLarge => "Request body exceeds the size limit",
      PoseError::MissingParameters => "Required parameters \"image\" and \"id\" are missing",
      PoseError::InvalidParameterType => "Parameters \"image\" and \"id\" must be strings",
      PoseError::ModelNotLoaded => "Model not loaded",
      PoseError::InvalidImage(_) => "Invalid image format or corrupted data",
      PoseError::ImageEncodingFailed(_) => "Failed to encode annotated image",
      PoseError::InternalError(_) => self.variant.internal_message(),
    }
  }

  pub fn body(&self) -> ErrorBody {
    ErrorBody {
      status: "error",
      message: self.message().to_string(),
      id: self.id.clone(),
      timings: self.timings,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseRequest {
  pub image: String,
  pub id: String,
}

#[derive(Debug, Serialize)]
pub struct PoseJsonResponse {
  pub id: String,
  pub count: usize,
  pub boxes: Vec<BoundingBox>,
  pub keypoints: Vec<KeypointSet>,
  #[serde(flatten)]
  pub timings: StageTimings,
}

#[derive(Debug, Serialize)]
pub struct PoseImageResponse {
  pub id: String,
  pub annotated_image: String,
  #[serde(flatten)]
  pub timings: StageTimings,
}

/// `application/json` 或 `application/*+json`，忽略参数
pub fn is_json_content_type(content_type: &str) -> bool {
  let mime = content_type
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase();
  match mime.split_once('/') {
    Some(("application", subtype)) => subtype == "json" || subtype.ends_with("+json"),
    _ => false,
  }
}

/// 校验请求头与请求体；失败时附带可回显的 id
pub fn validate_request(
  content_type: Option<&str>,
  body: &[u8],
) -> Result<PoseRequest, (PoseError, Option<String>)> {
  if !content_type.is_some_and(is_json_content_type) {
    return Err((PoseError::InvalidContentType, None));
  }

  let Ok(Value::Object(mut fields)) = serde_json::from_slice::<Value>(body) else {
    return Err((PoseError::MissingParameters, None));
  };
  let (Some(image), Some(id)) = (fields.remove("image"), fields.remove("id")) else {
    return Err((PoseError::MissingParameters, None));
  };

  match (image, id) {
    (Value::String(image), Value::String(id)) => Ok(PoseRequest { image, id }),
    (_, Value::String(id)) => Err((PoseError::InvalidParameterType, Some(id))),
    _ => Err((PoseError::InvalidParameterType, None)),
  }
}

/// 尽力从请求体中取出字符串 `id`，用于流水线之外的错误响应
pub fn request_id(body: &[u8]) -> Option<String> {
  match serde_json::from_slice::<Value>(body).ok()?.get_mut("id")?.take() {
    Value::String(id) => Some(id),
    _ => None,
  }
}

pub struct PosePipeline {
  runtime: Arc<ModelRuntime>,
  draw: Draw,
  jpeg_quality: u8,
}

impl PosePipeline {
  pub fn new(runtime: Arc<ModelRuntime>) -> Self {
    Self {
      runtime,
      draw: Draw::default(),
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality.clamp(1, 100);
    self
  }

  pub fn runtime(&self) -> &ModelRuntime {
    &self.runtime
  }

  /// `/pose/json`：返回外接框与关键点
  pub fn handle_json(
    &self,
    content_type: Option<&str>,
    body: &[u8],
  ) -> Result<PoseJsonResponse, PoseFailure> {
    let variant = ResponseVariant::Json;
    let request = self.admit(variant, content_type, body)?;
    let mut clock = StageClock::default();

    let (_, detections) = self
      .detect(&request, &mut clock)
      .map_err(|error| failure(variant, error, &request, &clock))?;

    let started = Instant::now();
    let count = detections.len();
    let (boxes, keypoints) = detections
      .into_iter()
      .map(|detection| (detection.bbox, detection.keypoints))
      .unzip();
    clock.postprocess = started.elapsed();

    info!(id = %request.id, count, "姿态检测完成");
    Ok(PoseJsonResponse {
      id: request.id,
      count,
      boxes,
      keypoints,
      timings: clock.timings(),
    })
  }

  /// `/pose/image`：返回标注后的 base64 JPEG
  pub fn handle_image(
    &self,
    content_type: Option<&str>,
    body: &[u8],
  ) -> Result<PoseImageResponse, PoseFailure> {
    let variant = ResponseVariant::Image;
    let request = self.admit(variant, content_type, body)?;
    let mut clock = StageClock::default();

    let (image, detections) = self
      .detect(&request, &mut clock)
      .map_err(|error| failure(variant, error, &request, &clock))?;

    let started = Instant::now();
    let annotated = self.draw.annotate(&image, &detections);
    if annotated.is_fallback() {
      debug!(id = %request.id, "使用未标注图像作为响应");
    }
    let encoded = encode_jpeg_base64(&annotated.image, self.jpeg_quality);
    clock.postprocess = started.elapsed();
    let annotated_image = encoded.map_err(|e| {
      failure(variant, PoseError::ImageEncodingFailed(e), &request, &clock)
    })?;

    info!(id = %request.id, count = detections.len(), "姿态标注完成");
    Ok(PoseImageResponse {
      id: request.id,
      annotated_image,
      timings: clock.timings(),
    })
  }

  /// 校验请求并确认模型可用；这一步不触碰图像与模型
  fn admit(
    &self,
    variant: ResponseVariant,
    content_type: Option<&str>,
    body: &[u8],
  ) -> Result<PoseRequest, PoseFailure> {
    let request = validate_request(content_type, body).map_err(|(error, id)| PoseFailure {
      variant,
      error,
      id,
      timings: None,
    })?;

    if !self.runtime.is_loaded() {
      return Err(PoseFailure {
        variant,
        error: PoseError::ModelNotLoaded,
        id: Some(request.id),
        timings: None,
      });
    }
    Ok(request)
  }

  fn detect(
    &self,
    request: &PoseRequest,
    clock: &mut StageClock,
  ) -> Result<(RgbImage, Vec<PersonDetection>), PoseError> {
    let started = Instant::now();
    let decoded = decode_image_payload(&request.image);
    clock.preprocess = started.elapsed();
    let image = decoded.map_err(PoseError::InvalidImage)?;
    debug!(id = %request.id, "图像解码完成: {}x{}", image.width(), image.height());

    let started = Instant::now();
    let predicted = self.runtime.predict_pose(&image);
    let detections = predicted.map(|keypoints| {
      localize(&keypoints, image.width(), image.height())
        .into_iter()
        .collect::<Vec<_>>()
    });
    clock.inference = started.elapsed();
    let detections = detections.map_err(|e| PoseError::InternalError(e.into()))?;

    Ok((image, detections))
  }
}

fn failure(
  variant: ResponseVariant,
  error: PoseError,
  request: &PoseRequest,
  clock: &StageClock,
) -> PoseFailure {
  PoseFailure {
    variant,
    error,
    id: Some(request.id.clone()),
    timings: Some(clock.timings()),
  }
}

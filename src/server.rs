// 该文件是 Zishi （姿势） 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Instant,
};

use axum::{
  Json, Router,
  body::Bytes,
  extract::{DefaultBodyLimit, MatchedPath, State, rejection::BytesRejection},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use sysinfo::System;
use tracing::{Instrument, error, field, info_span, warn};

use crate::{
  pipeline::{PoseError, PoseFailure, PosePipeline, ResponseVariant, request_id},
  telemetry::{
    DETECTIONS_TOTAL, ERRORS_TOTAL, REQUEST_DURATION_SECONDS, REQUESTS_TOTAL, SystemStats,
  },
};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// 请求体默认上限，足以容纳 base64 编码后的高分辨率照片
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
  pipeline: PosePipeline,
  system: Mutex<System>,
  metrics: Option<PrometheusHandle>,
  max_body_bytes: Option<usize>,
}

impl AppState {
  pub fn new(pipeline: PosePipeline) -> Self {
    Self {
      pipeline,
      system: Mutex::new(System::new()),
      metrics: None,
      max_body_bytes: Some(DEFAULT_MAX_BODY_BYTES),
    }
  }

  /// `None` 表示不限制请求体大小
  pub fn with_max_body_bytes(mut self, limit: Option<usize>) -> Self {
    self.max_body_bytes = limit;
    self
  }

  pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
    self.metrics = Some(handle);
    self
  }
}

pub fn router(state: Arc<AppState>) -> Router {
  let body_limit = match state.max_body_bytes {
    Some(limit) => DefaultBodyLimit::max(limit),
    None => DefaultBodyLimit::disable(),
  };
  Router::new()
    .route("/pose/json", post(pose_json))
    .route("/pose/image", post(pose_image))
    .route("/api/pose_detection", post(pose_json))
    .route("/api/pose_estimation_image", post(pose_image))
    .route("/health", get(health))
    .route("/metrics", get(render_metrics))
    .layer(body_limit)
    .with_state(state)
}

async fn pose_json(
  State(state): State<Arc<AppState>>,
  path: MatchedPath,
  headers: HeaderMap,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  run_pose(state, path, headers, body, ResponseVariant::Json, |pipeline, content_type, body| {
    pipeline.handle_json(content_type, body)
  })
  .await
}

async fn pose_image(
  State(state): State<Arc<AppState>>,
  path: MatchedPath,
  headers: HeaderMap,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  run_pose(state, path, headers, body, ResponseVariant::Image, |pipeline, content_type, body| {
    pipeline.handle_image(content_type, body)
  })
  .await
}

/// 在阻塞线程上执行流水线，并记录指标
async fn run_pose<T, F>(
  state: Arc<AppState>,
  path: MatchedPath,
  headers: HeaderMap,
  body: Result<Bytes, BytesRejection>,
  variant: ResponseVariant,
  handle: F,
) -> Response
where
  T: Serialize + Send + 'static,
  F: FnOnce(&PosePipeline, Option<&str>, &[u8]) -> Result<T, PoseFailure> + Send + 'static,
{
  let endpoint = path.as_str().to_string();
  metrics::counter!(REQUESTS_TOTAL, "method" => "POST", "endpoint" => endpoint.clone()).increment(1);

  let started = Instant::now();
  let span = info_span!("pose_request", endpoint = %endpoint, id = field::Empty);
  let content_type = headers
    .get(header::CONTENT_TYPE)
    .and_then(|value| value.to_str().ok())
    .map(str::to_owned);

  let result = match body {
    Ok(body) => {
      let worker_span = span.clone();
      let worker_body = body.clone();
      let joined = tokio::task::spawn_blocking(move || {
        worker_span.in_scope(|| handle(&state.pipeline, content_type.as_deref(), &worker_body))
      })
      .instrument(span.clone())
      .await;

      joined.unwrap_or_else(|e| {
        Err(PoseFailure {
          variant,
          error: PoseError::InternalError(anyhow::anyhow!("推理线程异常退出: {}", e)),
          id: request_id(&body),
          timings: None,
        })
      })
    }
    Err(rejection) => Err(PoseFailure {
      variant,
      error: body_rejection(&rejection),
      id: None,
      timings: None,
    }),
  };

  let id = match &result {
    Ok(_) => None,
    Err(failure) => failure.id.as_deref(),
  };
  if let Some(id) = id {
    span.record("id", id);
  }

  span.in_scope(|| match result {
    Ok(response) => {
      metrics::histogram!(REQUEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
      metrics::counter!(DETECTIONS_TOTAL).increment(1);
      (StatusCode::OK, Json(response)).into_response()
    }
    Err(failure) => {
      metrics::counter!(ERRORS_TOTAL, "error_type" => failure.error.kind()).increment(1);
      if failure.error.is_client_error() {
        warn!(id = ?failure.id, "请求被拒绝: {}", failure.error);
      } else {
        error!(id = ?failure.id, "请求处理失败: {}", failure.error);
      }
      (failure.status(), Json(failure.body())).into_response()
    }
  })
}

/// 请求体读取失败：超限为 413，其余视为缺少参数
fn body_rejection(rejection: &BytesRejection) -> PoseError {
  if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
    PoseError::PayloadTooLarge
  } else {
    PoseError::MissingParameters
  }
}

#[derive(Debug, Serialize)]
struct HealthReport {
  status: &'static str,
  model_loaded: bool,
  timestamp: String,
  system: SystemStats,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
  metrics::counter!(REQUESTS_TOTAL, "method" => "GET", "endpoint" => "/health").increment(1);

  let model_loaded = state.pipeline.runtime().is_loaded();
  let system = {
    let mut system = state.system.lock().unwrap_or_else(PoisonError::into_inner);
    SystemStats::capture(&mut system)
  };

  Json(HealthReport {
    status: if model_loaded { "healthy" } else { "unhealthy" },
    model_loaded,
    timestamp: chrono::Local::now()
      .format("%Y-%m-%dT%H:%M:%S%.6f")
      .to_string(),
    system,
  })
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> Response {
  let text = state
    .metrics
    .as_ref()
    .map(PrometheusHandle::render)
    .unwrap_or_default();
  ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response()
}

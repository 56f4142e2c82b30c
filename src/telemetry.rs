// 该文件是 Zishi （姿势） 项目的一部分。
// src/telemetry.rs - 日志、指标与系统状态
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

use std::{sync::OnceLock, thread, time::Duration};

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use sysinfo::System;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub const REQUESTS_TOTAL: &str = "pose_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "pose_request_duration_seconds";
pub const DETECTIONS_TOTAL: &str = "pose_detections_total";
pub const ERRORS_TOTAL: &str = "pose_errors_total";

const DURATION_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 初始化日志，默认级别为 info，可通过 `RUST_LOG` 覆盖
pub fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  // 测试中可能重复初始化
  let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 安装全局 Prometheus 记录器并返回句柄；重复调用返回同一句柄
pub fn init_metrics_recorder() -> &'static PrometheusHandle {
  PROM_HANDLE.get_or_init(|| {
    let builder = PrometheusBuilder::new();
    let builder = match builder
      .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION_SECONDS.to_string()), &DURATION_BUCKETS)
    {
      Ok(builder) => builder,
      Err(e) => {
        warn!("无法设置请求耗时直方图分桶: {}", e);
        PrometheusBuilder::new()
      }
    };
    let recorder = builder.build_recorder();
    let handle = recorder.handle();

    if let Err(e) = metrics::set_global_recorder(recorder) {
      warn!("全局指标记录器已存在，指标不会导出: {}", e);
    }
    describe_metrics();

    let upkeep_handle = handle.clone();
    let spawned = thread::Builder::new()
      .name("prometheus-upkeep".to_string())
      .spawn(move || {
        loop {
          thread::sleep(UPKEEP_INTERVAL);
          upkeep_handle.run_upkeep();
        }
      });
    if let Err(e) = spawned {
      warn!("无法启动指标维护线程: {}", e);
    }

    handle
  })
}

fn describe_metrics() {
  metrics::describe_counter!(REQUESTS_TOTAL, "Total pose estimation requests");
  metrics::describe_histogram!(
    REQUEST_DURATION_SECONDS,
    metrics::Unit::Seconds,
    "Pose estimation request duration"
  );
  metrics::describe_counter!(DETECTIONS_TOTAL, "Total successful pose detections");
  metrics::describe_counter!(ERRORS_TOTAL, "Total pose estimation errors");
}

/// 健康检查中报告的主机状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemStats {
  pub cpu_percent: f32,
  pub memory_percent: f32,
  /// 字节
  pub memory_available: u64,
}

impl SystemStats {
  pub fn capture(system: &mut System) -> Self {
    system.refresh_cpu_usage();
    system.refresh_memory();

    let total = system.total_memory();
    let available = system.available_memory();
    let memory_percent = if total == 0 {
      0.0
    } else {
      (total.saturating_sub(available) as f64 / total as f64 * 100.0) as f32
    };

    Self {
      cpu_percent: system.global_cpu_usage(),
      memory_percent,
      memory_available: available,
    }
  }
}

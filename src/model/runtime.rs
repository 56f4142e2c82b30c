// 该文件是 Zishi （姿势） 项目的一部分。
// src/model/runtime.rs - 模型运行时：串行化的推理入口
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

use std::sync::Mutex;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  frame::RgbNhwcF32Frame,
  model::{EngineError, InferenceEngine, KEYPOINT_COUNT, KEYPOINT_DIMS, Keypoint, KeypointSet},
};

#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("模型未加载")]
  ModelNotLoaded,
  #[error("推理失败: {0}")]
  InferenceError(#[from] EngineError),
  #[error("引擎输出 {actual} 个数值，期望 {expected} 个")]
  OutputShape { expected: usize, actual: usize },
  #[error("模型锁已因先前的 panic 失效")]
  LockPoisoned,
}

/// 进程内唯一的模型句柄
///
/// 缩放、推理、拷贝输出整个过程都在同一把互斥锁内完成；
/// 未加载模型时所有调用返回 `ModelNotLoaded`。
pub struct ModelRuntime {
  engine: Option<Mutex<Box<dyn InferenceEngine>>>,
}

impl ModelRuntime {
  pub fn unloaded() -> Self {
    Self { engine: None }
  }

  pub fn with_engine<E: InferenceEngine + 'static>(engine: E) -> Self {
    Self::from_boxed(Box::new(engine))
  }

  pub fn from_boxed(engine: Box<dyn InferenceEngine>) -> Self {
    Self {
      engine: Some(Mutex::new(engine)),
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.engine.is_some()
  }

  /// 对整幅图像做一次单人姿态推理
  pub fn predict_pose(&self, image: &RgbImage) -> Result<KeypointSet, RuntimeError> {
    let engine = self.engine.as_ref().ok_or(RuntimeError::ModelNotLoaded)?;
    let mut engine = engine.lock().map_err(|_| RuntimeError::LockPoisoned)?;

    let (width, height) = engine.input_size();
    debug!(
      "缩放输入 {}x{} -> {}x{}",
      image.width(),
      image.height(),
      width,
      height
    );
    let frame = RgbNhwcF32Frame::from_rgb_image(image, width, height);

    let output = engine.infer(&frame).inspect_err(|e| {
      error!("姿态推理失败: {}", e);
    })?;

    let keypoints = KeypointSet::from_tensor(&output).ok_or(RuntimeError::OutputShape {
      expected: KEYPOINT_COUNT * KEYPOINT_DIMS,
      actual: output.len(),
    })?;
    drop(engine);

    Ok(clamp_confidence(&keypoints))
  }
}

impl Default for ModelRuntime {
  fn default() -> Self {
    Self::unloaded()
  }
}

fn clamp_confidence(keypoints: &KeypointSet) -> KeypointSet {
  let mut points = [Keypoint::default(); KEYPOINT_COUNT];
  for (point, source) in points.iter_mut().zip(keypoints.iter()) {
    *point = *source;
    if point.confidence.is_finite() {
      point.confidence = point.confidence.clamp(0.0, 1.0);
    }
  }
  KeypointSet::new(points)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::AsNhwcFrame, model::BodyPart};
  use image::Rgb;

  struct ConstantEngine {
    output: Vec<f32>,
  }

  impl InferenceEngine for ConstantEngine {
    fn input_size(&self) -> (u32, u32) {
      (4, 4)
    }

    fn infer(&mut self, input: &RgbNhwcF32Frame) -> Result<Vec<f32>, EngineError> {
      assert_eq!(input.as_nhwc().len(), 4 * 4 * 3);
      Ok(self.output.clone())
    }
  }

  struct FailingEngine;

  impl InferenceEngine for FailingEngine {
    fn input_size(&self) -> (u32, u32) {
      (4, 4)
    }

    fn infer(&mut self, _input: &RgbNhwcF32Frame) -> Result<Vec<f32>, EngineError> {
      Err(EngineError::Backend("device lost".to_string()))
    }
  }

  fn image() -> RgbImage {
    RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]))
  }

  #[test]
  fn unloaded_runtime_rejects_calls() {
    let runtime = ModelRuntime::unloaded();
    assert!(!runtime.is_loaded());
    assert!(matches!(
      runtime.predict_pose(&image()),
      Err(RuntimeError::ModelNotLoaded)
    ));
  }

  #[test]
  fn returns_seventeen_clamped_keypoints() {
    let mut output = vec![0.5f32; KEYPOINT_COUNT * KEYPOINT_DIMS];
    output[2] = 1.7;
    output[5] = -0.2;
    let runtime = ModelRuntime::with_engine(ConstantEngine { output });

    let keypoints = runtime.predict_pose(&image()).unwrap();
    assert_eq!(keypoints.iter().count(), KEYPOINT_COUNT);
    assert_eq!(keypoints[BodyPart::Nose].confidence, 1.0);
    assert_eq!(keypoints[BodyPart::LeftEye].confidence, 0.0);
    assert!(
      keypoints
        .iter()
        .all(|k| (0.0..=1.0).contains(&k.confidence))
    );
  }

  #[test]
  fn wrong_output_shape_is_an_error() {
    let runtime = ModelRuntime::with_engine(ConstantEngine {
      output: vec![0.0; 10],
    });
    assert!(matches!(
      runtime.predict_pose(&image()),
      Err(RuntimeError::OutputShape {
        expected: 51,
        actual: 10
      })
    ));
  }

  #[test]
  fn engine_failures_are_surfaced() {
    let runtime = ModelRuntime::with_engine(FailingEngine);
    assert!(matches!(
      runtime.predict_pose(&image()),
      Err(RuntimeError::InferenceError(EngineError::Backend(_)))
    ));
  }
}

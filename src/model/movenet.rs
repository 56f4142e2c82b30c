// 该文件是 Zishi （姿势） 项目的一部分。
// src/model/movenet.rs - MoveNet 单人姿态模型（ONNX Runtime 后端）
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

use ndarray::Array4;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, RgbNhwcF32Frame},
  model::{EngineError, InferenceEngine, KEYPOINT_COUNT, KEYPOINT_DIMS},
  url_to_path,
};

const MOVENET_NUM_INPUTS: usize = 1;
const MOVENET_NUM_OUTPUTS: usize = 1;
const MOVENET_DEFAULT_INPUT_SIZE: u32 = 256;

pub struct MoveNet {
  session: Session,
  input_size: u32,
}

#[derive(Error, Debug)]
pub enum MoveNetError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

pub struct MoveNetBuilder {
  model_path: PathBuf,
  input_size: u32,
  intra_threads: usize,
}

impl FromUrlWithScheme for MoveNetBuilder {
  const SCHEME: &'static str = "movenet";
}

impl FromUrl for MoveNetBuilder {
  type Error = MoveNetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != "file" {
      return Err(MoveNetError::ModelPathError(format!(
        "模型路径必须使用 {} 或 file 方案，实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let model_path = url_to_path(url)
      .ok_or_else(|| MoveNetError::ModelPathError(format!("无法从 {url} 解析本地路径")))?;

    Ok(MoveNetBuilder {
      model_path,
      input_size: MOVENET_DEFAULT_INPUT_SIZE,
      intra_threads: 1,
    })
  }
}

impl MoveNetBuilder {
  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads.max(1);
    self
  }

  pub fn build(self) -> Result<MoveNet, MoveNetError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.exists() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(MoveNetError::ModelNotFound(self.model_path));
    }

    let session = Session::builder()
      .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
      .and_then(|builder| builder.with_intra_threads(self.intra_threads))
      .and_then(|builder| builder.commit_from_file(&self.model_path))
      .map_err(|e| MoveNetError::OrtError(e.to_string()))?;

    let num_inputs = session.inputs.len();
    let num_outputs = session.outputs.len();
    if num_inputs != MOVENET_NUM_INPUTS || num_outputs != MOVENET_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        MOVENET_NUM_INPUTS, MOVENET_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(MoveNetError::ModelInvalid(format!(
        "expected {MOVENET_NUM_INPUTS} input and {MOVENET_NUM_OUTPUTS} output, got {num_inputs}/{num_outputs}"
      )));
    }

    debug!("模型输入分辨率: {}x{}", self.input_size, self.input_size);
    info!("模型加载完成");

    Ok(MoveNet {
      session,
      input_size: self.input_size,
    })
  }
}

fn backend_error(err: impl std::fmt::Display) -> EngineError {
  EngineError::Backend(err.to_string())
}

impl InferenceEngine for MoveNet {
  fn input_size(&self) -> (u32, u32) {
    (self.input_size, self.input_size)
  }

  fn infer(&mut self, input: &RgbNhwcF32Frame) -> Result<Vec<f32>, EngineError> {
    let expected = self.input_size();
    let actual = (input.width() as u32, input.height() as u32);
    if actual != expected {
      return Err(EngineError::InputShape { expected, actual });
    }

    debug!("设置模型输入");
    let array = Array4::from_shape_vec(
      (1, input.height(), input.width(), input.channels()),
      input.as_nhwc().to_vec(),
    )
    .map_err(backend_error)?;
    let tensor = Tensor::from_array(array).map_err(backend_error)?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![tensor])
      .map_err(backend_error)?;

    // 输出形状 [1, 1, 17, 3]，在锁内拷贝为自有数据
    let output = outputs[0]
      .try_extract_array::<f32>()
      .map_err(backend_error)?;
    let values: Vec<f32> = output.iter().copied().collect();
    debug!(
      "模型输出 {} 个数值，期望 {}",
      values.len(),
      KEYPOINT_COUNT * KEYPOINT_DIMS
    );

    Ok(values)
  }
}

// 该文件是 Zishi （姿势） 项目的一部分。
// src/model.rs - 模型与姿态数据定义
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

use std::ops::Index;

use serde::{Serialize, Serializer, ser::SerializeTuple};
use thiserror::Error;

use crate::frame::RgbNhwcF32Frame;

/// 单人姿态关键点数量
pub const KEYPOINT_COUNT: usize = 17;
/// 每个关键点的分量数：(y, x, confidence)
pub const KEYPOINT_DIMS: usize = 3;
/// 关键点可见（参与外接框与绘制）的置信度下限，严格大于
pub const KEYPOINT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// 推理引擎：输入固定尺寸的归一化帧，输出 17x3 的关键点张量
///
/// 引擎内部张量会被原地覆盖，不支持并发调用，
/// 调用方（`ModelRuntime`）负责串行化。
pub trait InferenceEngine: Send {
  /// 模型输入分辨率 (width, height)
  fn input_size(&self) -> (u32, u32);

  /// 执行一次推理，返回按行展开的 `[y, x, confidence] * 17`
  fn infer(&mut self, input: &RgbNhwcF32Frame) -> Result<Vec<f32>, EngineError>;
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[error("输入帧尺寸为 {actual:?}，引擎要求 {expected:?}")]
  InputShape {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
  Nose,
  LeftEye,
  RightEye,
  LeftEar,
  RightEar,
  LeftShoulder,
  RightShoulder,
  LeftElbow,
  RightElbow,
  LeftWrist,
  RightWrist,
  LeftHip,
  RightHip,
  LeftKnee,
  RightKnee,
  LeftAnkle,
  RightAnkle,
}

impl BodyPart {
  /// 与模型输出顺序一致
  pub const ALL: [BodyPart; KEYPOINT_COUNT] = [
    BodyPart::Nose,
    BodyPart::LeftEye,
    BodyPart::RightEye,
    BodyPart::LeftEar,
    BodyPart::RightEar,
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftHip,
    BodyPart::RightHip,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
  ];

  pub fn index(self) -> usize {
    self as usize
  }

  pub fn name(self) -> &'static str {
    match self {
      BodyPart::Nose => "nose",
      BodyPart::LeftEye => "left_eye",
      BodyPart::RightEye => "right_eye",
      BodyPart::LeftEar => "left_ear",
      BodyPart::RightEar => "right_ear",
      BodyPart::LeftShoulder => "left_shoulder",
      BodyPart::RightShoulder => "right_shoulder",
      BodyPart::LeftElbow => "left_elbow",
      BodyPart::RightElbow => "right_elbow",
      BodyPart::LeftWrist => "left_wrist",
      BodyPart::RightWrist => "right_wrist",
      BodyPart::LeftHip => "left_hip",
      BodyPart::RightHip => "right_hip",
      BodyPart::LeftKnee => "left_knee",
      BodyPart::RightKnee => "right_knee",
      BodyPart::LeftAnkle => "left_ankle",
      BodyPart::RightAnkle => "right_ankle",
    }
  }
}

/// 骨架连线：躯干、手臂、腿
pub const SKELETON: [(BodyPart, BodyPart); 12] = [
  (BodyPart::LeftShoulder, BodyPart::RightShoulder),
  (BodyPart::LeftShoulder, BodyPart::LeftHip),
  (BodyPart::RightShoulder, BodyPart::RightHip),
  (BodyPart::LeftHip, BodyPart::RightHip),
  (BodyPart::LeftShoulder, BodyPart::LeftElbow),
  (BodyPart::RightShoulder, BodyPart::RightElbow),
  (BodyPart::LeftElbow, BodyPart::LeftWrist),
  (BodyPart::RightElbow, BodyPart::RightWrist),
  (BodyPart::LeftHip, BodyPart::LeftKnee),
  (BodyPart::RightHip, BodyPart::RightKnee),
  (BodyPart::LeftKnee, BodyPart::LeftAnkle),
  (BodyPart::RightKnee, BodyPart::RightAnkle),
];

/// 归一化关键点，坐标相对图像宽高
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
  pub y: f32,
  pub x: f32,
  pub confidence: f32,
}

impl Keypoint {
  pub fn new(y: f32, x: f32, confidence: f32) -> Self {
    Self { y, x, confidence }
  }

  pub fn is_well_formed(&self) -> bool {
    self.y.is_finite() && self.x.is_finite() && self.confidence.is_finite()
  }

  pub fn is_visible(&self) -> bool {
    self.is_well_formed() && self.confidence > KEYPOINT_CONFIDENCE_THRESHOLD
  }

  /// 转换到像素坐标 (x, y)。外接框与绘制共用这一换算
  pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
    (self.x * width as f32, self.y * height as f32)
  }
}

impl Serialize for Keypoint {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut tuple = serializer.serialize_tuple(KEYPOINT_DIMS)?;
    tuple.serialize_element(&self.y)?;
    tuple.serialize_element(&self.x)?;
    tuple.serialize_element(&self.confidence)?;
    tuple.end()
  }
}

/// 固定 17 个关键点，按位置索引
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct KeypointSet([Keypoint; KEYPOINT_COUNT]);

impl KeypointSet {
  pub fn new(points: [Keypoint; KEYPOINT_COUNT]) -> Self {
    Self(points)
  }

  /// 从按行展开的 17x3 张量构造，长度不符时返回 None
  pub fn from_tensor(values: &[f32]) -> Option<Self> {
    if values.len() != KEYPOINT_COUNT * KEYPOINT_DIMS {
      return None;
    }
    let mut points = [Keypoint::default(); KEYPOINT_COUNT];
    for (point, chunk) in points.iter_mut().zip(values.chunks_exact(KEYPOINT_DIMS)) {
      *point = Keypoint::new(chunk[0], chunk[1], chunk[2]);
    }
    Some(Self(points))
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Keypoint> {
    self.0.iter()
  }
}

impl Index<BodyPart> for KeypointSet {
  type Output = Keypoint;

  fn index(&self, part: BodyPart) -> &Self::Output {
    &self.0[part.index()]
  }
}

impl<'a> IntoIterator for &'a KeypointSet {
  type Item = &'a Keypoint;
  type IntoIter = std::slice::Iter<'a, Keypoint>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

/// 像素坐标外接框，`probability` 为参与构框关键点置信度的均值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
  pub probability: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonDetection {
  pub bbox: BoundingBox,
  /// 完整（未过滤）的关键点
  pub keypoints: KeypointSet,
}

mod localize;
pub use self::localize::{BOX_MARGIN, localize};

mod runtime;
pub use self::runtime::{ModelRuntime, RuntimeError};

#[cfg(feature = "model_movenet")]
mod movenet;
#[cfg(feature = "model_movenet")]
pub use self::movenet::{MoveNet, MoveNetBuilder, MoveNetError};

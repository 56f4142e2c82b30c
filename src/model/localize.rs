// 该文件是 Zishi （姿势） 项目的一部分。
// src/model/localize.rs - 由关键点几何推导人体外接框
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

use tracing::{debug, warn};

use crate::model::{BodyPart, BoundingBox, KeypointSet, PersonDetection};

/// 外接框四周外扩的像素数
pub const BOX_MARGIN: f32 = 20.0;

/// 由单人关键点推导至多一个检测结果
///
/// 只有置信度大于阈值的关键点参与构框；格式错误（非有限值）的关键点
/// 记录警告后跳过。返回结果携带完整的关键点集合。
pub fn localize(keypoints: &KeypointSet, width: u32, height: u32) -> Option<PersonDetection> {
  let mut x_min = f32::INFINITY;
  let mut y_min = f32::INFINITY;
  let mut x_max = f32::NEG_INFINITY;
  let mut y_max = f32::NEG_INFINITY;
  let mut confidence_sum = 0.0f32;
  let mut visible = 0usize;

  for (part, keypoint) in BodyPart::ALL.into_iter().zip(keypoints) {
    if !keypoint.is_well_formed() {
      warn!("跳过格式错误的关键点 {}: {:?}", part.name(), keypoint);
      continue;
    }
    if !keypoint.is_visible() {
      continue;
    }

    let (x, y) = keypoint.to_pixel(width, height);
    x_min = x_min.min(x);
    y_min = y_min.min(y);
    x_max = x_max.max(x);
    y_max = y_max.max(y);
    confidence_sum += keypoint.confidence;
    visible += 1;
  }

  if visible == 0 {
    debug!("没有置信度足够的关键点，未检测到人体");
    return None;
  }

  let (w, h) = (width as f32, height as f32);
  let x_min = (x_min - BOX_MARGIN).clamp(0.0, w);
  let y_min = (y_min - BOX_MARGIN).clamp(0.0, h);
  let x_max = (x_max + BOX_MARGIN).clamp(x_min, w);
  let y_max = (y_max + BOX_MARGIN).clamp(y_min, h);

  let bbox = BoundingBox {
    x: x_min as u32,
    y: y_min as u32,
    width: (x_max - x_min) as u32,
    height: (y_max - y_min) as u32,
    probability: confidence_sum / visible as f32,
  };
  debug!("人体外接框: {:?}（{} 个可见关键点）", bbox, visible);

  Some(PersonDetection {
    bbox,
    keypoints: keypoints.clone(),
  })
}

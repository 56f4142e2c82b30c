// 该文件是 Zishi （姿势） 项目的一部分。
// src/output/draw.rs - 姿态结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  model::{BoundingBox, KeypointSet, PersonDetection, SKELETON},
  output::glyph::{GLYPH_HEIGHT, draw_bitmap_text},
};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const SKELETON_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const KEYPOINT_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const KEYPOINT_RADIUS: i32 = 4;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET: i32 = 10;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("读取字体时 I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
  #[error("无法标注空图像")]
  EmptyImage,
  #[error("外接框 {bbox:?} 超出图像范围 {width}x{height}")]
  BoxOutOfBounds {
    bbox: BoundingBox,
    width: u32,
    height: u32,
  },
}

/// 绘制结果：失败时 `image` 为原图副本，`warning` 记录原因
#[derive(Debug)]
pub struct Annotated {
  pub image: RgbImage,
  pub warning: Option<DrawError>,
}

impl Annotated {
  pub fn is_fallback(&self) -> bool {
    self.warning.is_some()
  }
}

pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  box_color: Rgb<u8>,
  skeleton_color: Rgb<u8>,
  keypoint_color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      box_color: Rgb(BOX_COLOR),
      skeleton_color: Rgb(SKELETON_COLOR),
      keypoint_color: Rgb(KEYPOINT_COLOR),
    }
  }
}

impl Draw {
  /// 使用 TTF/OTF 字体绘制置信度标签
  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    debug!("标签字体已加载: {}", path.display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  /// 在输入图像的副本上绘制检测结果，输入本身不会被修改
  ///
  /// 绘制失败时记录警告并返回未标注的副本。
  pub fn annotate(&self, image: &RgbImage, detections: &[PersonDetection]) -> Annotated {
    match self.try_annotate(image, detections) {
      Ok(annotated) => Annotated {
        image: annotated,
        warning: None,
      },
      Err(e) => {
        warn!("绘制姿态失败，返回原图: {}", e);
        Annotated {
          image: image.clone(),
          warning: Some(e),
        }
      }
    }
  }

  pub fn try_annotate(
    &self,
    image: &RgbImage,
    detections: &[PersonDetection],
  ) -> Result<RgbImage, DrawError> {
    let (width, height) = image.dimensions();
    if !detections.is_empty() && (width == 0 || height == 0) {
      return Err(DrawError::EmptyImage);
    }
    for detection in detections {
      let bbox = detection.bbox;
      if bbox.x + bbox.width > width || bbox.y + bbox.height > height {
        return Err(DrawError::BoxOutOfBounds {
          bbox,
          width,
          height,
        });
      }
    }

    let mut canvas = image.clone();
    for detection in detections {
      self.draw_bbox_with_label(&mut canvas, &detection.bbox);
      self.draw_skeleton(&mut canvas, &detection.keypoints);
      self.draw_keypoints(&mut canvas, &detection.keypoints);
    }
    Ok(canvas)
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    let (x, y) = (bbox.x as i32, bbox.y as i32);

    // 边框加粗为 2 像素
    if bbox.width > 0 && bbox.height > 0 {
      draw_hollow_rect_mut(
        image,
        Rect::at(x, y).of_size(bbox.width, bbox.height),
        self.box_color,
      );
      if bbox.width > 2 && bbox.height > 2 {
        draw_hollow_rect_mut(
          image,
          Rect::at(x + 1, y + 1).of_size(bbox.width - 2, bbox.height - 2),
          self.box_color,
        );
      }
    }

    let label = format!("{:.2}", bbox.probability);
    match &self.font {
      Some(font) => {
        let text_y = (y - LABEL_OFFSET - self.font_scale.y as i32).max(0);
        draw_text_mut(
          image,
          self.box_color,
          x,
          text_y,
          self.font_scale,
          font,
          &label,
        );
      }
      None => {
        let text_y = (y - LABEL_OFFSET - GLYPH_HEIGHT).max(0);
        draw_bitmap_text(image, x, text_y, &label, self.box_color);
      }
    }
  }

  fn draw_skeleton(&self, image: &mut RgbImage, keypoints: &KeypointSet) {
    let (width, height) = image.dimensions();
    for (from, to) in SKELETON {
      let (a, b) = (keypoints[from], keypoints[to]);
      if !a.is_visible() || !b.is_visible() {
        continue;
      }
      let (Some((x1, y1)), Some((x2, y2))) = (
        pixel(a.to_pixel(width, height), width, height),
        pixel(b.to_pixel(width, height), width, height),
      ) else {
        continue;
      };

      // 沿短轴偏移一个像素画第二条线，得到 2 像素宽的连线
      let (ox, oy) = if x2.abs_diff(x1) >= y2.abs_diff(y1) {
        (0, 1)
      } else {
        (1, 0)
      };
      for (dx, dy) in [(0, 0), (ox, oy)] {
        draw_line_segment_mut(
          image,
          (x1.saturating_add(dx) as f32, y1.saturating_add(dy) as f32),
          (x2.saturating_add(dx) as f32, y2.saturating_add(dy) as f32),
          self.skeleton_color,
        );
      }
    }
  }

  fn draw_keypoints(&self, image: &mut RgbImage, keypoints: &KeypointSet) {
    let (width, height) = image.dimensions();
    for keypoint in keypoints.iter().filter(|k| k.is_visible()) {
      if let Some(center) = pixel(keypoint.to_pixel(width, height), width, height) {
        draw_filled_circle_mut(image, center, KEYPOINT_RADIUS, self.keypoint_color);
      }
    }
  }
}

/// 向零截断到整数像素；离图像超过一个图像尺寸的坐标不绘制
fn pixel((x, y): (f32, f32), width: u32, height: u32) -> Option<(i32, i32)> {
  let (w, h) = (width as f32, height as f32);
  let inside = |v: f32, extent: f32| v.is_finite() && v >= -extent && v <= 2.0 * extent;
  if !inside(x, w) || !inside(y, h) {
    return None;
  }
  Some((x as i32, y as i32))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BodyPart, KEYPOINT_COUNT, Keypoint, localize};

  fn standing_person() -> KeypointSet {
    let mut points = [Keypoint::new(0.5, 0.5, 0.1); KEYPOINT_COUNT];
    let layout = [
      (BodyPart::LeftShoulder, 0.3, 0.4),
      (BodyPart::RightShoulder, 0.3, 0.6),
      (BodyPart::LeftHip, 0.6, 0.42),
      (BodyPart::RightHip, 0.6, 0.58),
      (BodyPart::LeftKnee, 0.75, 0.42),
      (BodyPart::LeftAnkle, 0.9, 0.42),
    ];
    for (part, y, x) in layout {
      points[part.index()] = Keypoint::new(y, x, 0.9);
    }
    KeypointSet::new(points)
  }

  fn gray(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
  }

  #[test]
  fn annotate_leaves_input_untouched() {
    let image = gray(100, 100);
    let before = image.clone();
    let detection = localize(&standing_person(), 100, 100).unwrap();

    let annotated = Draw::default().annotate(&image, &[detection]);
    assert!(!annotated.is_fallback());
    assert_eq!(image, before);
    assert_ne!(annotated.image, before);
  }

  #[test]
  fn draws_visible_keypoints_and_box() {
    let image = gray(100, 100);
    let detection = localize(&standing_person(), 100, 100).unwrap();
    let bbox = detection.bbox;
    let annotated = Draw::default().annotate(&image, &[detection]).image;

    // 左脚踝 (42, 90)
    assert_eq!(annotated.get_pixel(42, 90), &Rgb(KEYPOINT_COLOR));
    assert_eq!(annotated.get_pixel(bbox.x, bbox.y + 5), &Rgb(BOX_COLOR));
    // 右膝不可见：附近保持原色
    assert_eq!(annotated.get_pixel(58, 75), &Rgb([128, 128, 128]));
  }

  #[test]
  fn skeleton_requires_both_endpoints_visible() {
    let image = gray(100, 100);
    let detection = localize(&standing_person(), 100, 100).unwrap();
    let annotated = Draw::default().annotate(&image, &[detection]).image;

    // 肩-肩连线中点 (50, 30)
    assert_eq!(annotated.get_pixel(50, 30), &Rgb(SKELETON_COLOR));
    // 右髋-右膝：右膝不可见，中点 (58, 67) 不画线
    assert_eq!(annotated.get_pixel(58, 67), &Rgb([128, 128, 128]));
  }

  #[test]
  fn no_detections_returns_identical_copy() {
    let image = gray(20, 10);
    let annotated = Draw::default().annotate(&image, &[]);
    assert!(!annotated.is_fallback());
    assert_eq!(annotated.image, image);
  }

  #[test]
  fn mismatched_detection_falls_back_to_original() {
    let image = gray(50, 50);
    let detection = localize(&standing_person(), 400, 400).unwrap();

    let annotated = Draw::default().annotate(&image, &[detection]);
    assert!(matches!(
      annotated.warning,
      Some(DrawError::BoxOutOfBounds { .. })
    ));
    assert_eq!(annotated.image, image);
  }

  #[test]
  fn extreme_coordinates_are_not_drawn() {
    let mut points = [Keypoint::new(0.5, 0.5, 0.1); KEYPOINT_COUNT];
    points[BodyPart::LeftShoulder.index()] = Keypoint::new(0.3, -f32::MAX, 0.9);
    points[BodyPart::RightShoulder.index()] = Keypoint::new(0.3, f32::MAX, 0.9);
    points[BodyPart::LeftHip.index()] = Keypoint::new(0.6, 0.4, 0.9);
    let image = gray(50, 50);
    let detection = localize(&KeypointSet::new(points), 50, 50).unwrap();

    let annotated = Draw::default().annotate(&image, &[detection]);
    assert!(!annotated.is_fallback());
    assert_eq!(annotated.image.dimensions(), (50, 50));
    // 左髋仍然绘制
    assert_eq!(annotated.image.get_pixel(20, 30), &Rgb(KEYPOINT_COLOR));
  }

  #[test]
  fn pixel_rejects_far_and_non_finite_coordinates() {
    assert_eq!(pixel((10.9, -0.5), 20, 20), Some((10, 0)));
    assert_eq!(pixel((-20.0, 40.0), 20, 20), Some((-20, 40)));
    assert_eq!(pixel((-20.5, 5.0), 20, 20), None);
    assert_eq!(pixel((5.0, f32::MAX), 20, 20), None);
    assert_eq!(pixel((f32::NAN, 5.0), 20, 20), None);
  }

  #[test]
  fn missing_font_file_is_reported() {
    let result = Draw::with_font_file(Path::new("/nonexistent/zishi-font.ttf"));
    assert!(matches!(result, Err(DrawError::IoError(_))));
  }
}

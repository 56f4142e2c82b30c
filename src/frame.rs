// 该文件是 Zishi （姿势） 项目的一部分。
// src/frame.rs - NHWC 浮点帧定义
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[f32];
}

/// 模型输入帧：NHWC 排列、归一化到 [0, 1] 的 RGB 浮点数据
#[derive(Debug, Clone, PartialEq)]
pub struct RgbNhwcF32Frame {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl RgbNhwcF32Frame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0f32; RGB_CHANNELS * width * height].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  /// 双线性缩放到 `width`x`height` 后归一化
  pub fn from_rgb_image(image: &RgbImage, width: u32, height: u32) -> Self {
    let resized = if image.dimensions() == (width, height) {
      image.clone()
    } else {
      image::imageops::resize(image, width, height, FilterType::Triangle)
    };

    let mut frame = Self::with_shape(height as usize, width as usize);
    for (value, byte) in frame.data.iter_mut().zip(resized.as_raw()) {
      *value = f32::from(*byte) / 255.0;
    }
    frame
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl AsNhwcFrame for RgbNhwcF32Frame {
  fn as_nhwc(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn resizes_and_normalizes() {
    let image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 51]));
    let frame = RgbNhwcF32Frame::from_rgb_image(&image, 8, 8);

    assert_eq!(frame.width(), 8);
    assert_eq!(frame.height(), 8);
    assert_eq!(frame.as_nhwc().len(), 8 * 8 * 3);
    for pixel in frame.as_nhwc().chunks_exact(3) {
      assert_eq!(pixel[0], 1.0);
      assert_eq!(pixel[1], 0.0);
      assert!((pixel[2] - 0.2).abs() < 1e-6);
    }
  }

  #[test]
  fn keeps_pixel_order_nhwc() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(1, 0, Rgb([0, 255, 0]));
    let frame = RgbNhwcF32Frame::from_rgb_image(&image, 2, 1);

    assert_eq!(frame.as_nhwc(), &[0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
  }
}

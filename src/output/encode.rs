// 该文件是 Zishi （姿势） 项目的一部分。
// src/output/encode.rs - 标注图像编码为 base64 JPEG
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

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum EncodeError {
  #[error("无法编码 {width}x{height} 的空图像")]
  EmptyImage { width: u32, height: u32 },
  #[error("JPEG 编码错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// JPEG 压缩后做 base64 编码，质量被限制在 1..=100
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String, EncodeError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(EncodeError::EmptyImage { width, height });
  }

  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
  debug!("JPEG 编码完成: {}x{}, {} 字节", width, height, buffer.len());

  Ok(STANDARD.encode(&buffer))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::decode_image_payload;
  use image::Rgb;

  #[test]
  fn decoded_jpeg_keeps_dimensions() {
    let mut image = RgbImage::from_pixel(33, 17, Rgb([200, 40, 90]));
    image.put_pixel(5, 5, Rgb([0, 0, 0]));

    let payload = encode_jpeg_base64(&image, DEFAULT_JPEG_QUALITY).unwrap();
    let decoded = decode_image_payload(&payload).unwrap();
    assert_eq!(decoded.dimensions(), (33, 17));
  }

  #[test]
  fn output_is_a_jpeg() {
    let payload = encode_jpeg_base64(&RgbImage::new(8, 8), 0).unwrap();
    let bytes = STANDARD.decode(payload).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
  }

  #[test]
  fn empty_image_fails() {
    assert!(matches!(
      encode_jpeg_base64(&RgbImage::new(0, 4), DEFAULT_JPEG_QUALITY),
      Err(EncodeError::EmptyImage {
        width: 0,
        height: 4
      })
    ));
  }
}

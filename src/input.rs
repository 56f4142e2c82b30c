// 该文件是 Zishi （姿势） 项目的一部分。
// src/input.rs - Base64 图像载荷解码
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

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("图像载荷为空")]
  Empty,
  #[error("base64 解码错误: {0}")]
  Base64Error(#[from] base64::DecodeError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 去掉 `data:<mime>;base64,` 之类的前缀，只保留 base64 正文
fn strip_data_url_prefix(payload: &str) -> &str {
  match payload.split_once(',') {
    Some((_, body)) => body,
    None => payload,
  }
}

/// 将 base64（可带 data URL 前缀）载荷解码为 RGB 图像
pub fn decode_image_payload(payload: &str) -> Result<RgbImage, DecodeError> {
  let body: String = strip_data_url_prefix(payload)
    .chars()
    .filter(|c| !c.is_ascii_whitespace())
    .collect();
  if body.is_empty() {
    return Err(DecodeError::Empty);
  }

  let bytes = STANDARD.decode(body.as_bytes())?;
  if bytes.is_empty() {
    return Err(DecodeError::Empty);
  }
  debug!("图像载荷大小: {} 字节", bytes.len());

  let image = ImageReader::new(Cursor::new(bytes))
    .with_guessed_format()?
    .decode()?;
  debug!("解码图像尺寸: {}x{}", image.width(), image.height());

  Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{DynamicImage, ImageFormat, LumaA, Rgb};

  fn png_payload(image: DynamicImage) -> String {
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    STANDARD.encode(bytes)
  }

  #[test]
  fn decodes_bare_base64() {
    let payload = png_payload(DynamicImage::ImageRgb8(RgbImage::from_pixel(
      7,
      5,
      Rgb([10, 20, 30]),
    )));
    let image = decode_image_payload(&payload).unwrap();
    assert_eq!(image.dimensions(), (7, 5));
    assert_eq!(image.get_pixel(3, 3), &Rgb([10, 20, 30]));
  }

  #[test]
  fn strips_data_url_prefix() {
    let payload = png_payload(DynamicImage::ImageRgb8(RgbImage::new(4, 4)));
    let image = decode_image_payload(&format!("data:image/png;base64,{payload}")).unwrap();
    assert_eq!(image.dimensions(), (4, 4));
  }

  #[test]
  fn normalizes_to_three_channels() {
    let gray = image::ImageBuffer::from_pixel(3, 2, LumaA([200u8, 255u8]));
    let payload = png_payload(DynamicImage::ImageLumaA8(gray));
    let image = decode_image_payload(&payload).unwrap();
    assert_eq!(image.get_pixel(0, 0), &Rgb([200, 200, 200]));
  }

  #[test]
  fn rejects_empty_payload() {
    assert!(matches!(decode_image_payload(""), Err(DecodeError::Empty)));
    assert!(matches!(
      decode_image_payload("data:image/png;base64,"),
      Err(DecodeError::Empty)
    ));
  }

  #[test]
  fn rejects_malformed_base64() {
    assert!(matches!(
      decode_image_payload("not base64 at all!!"),
      Err(DecodeError::Base64Error(_))
    ));
  }

  #[test]
  fn rejects_non_image_bytes() {
    let payload = STANDARD.encode(b"definitely not an image");
    assert!(decode_image_payload(&payload).is_err());
  }
}

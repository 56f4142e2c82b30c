// 该文件是 Zishi （姿势） 项目的一部分。
// src/output/glyph.rs - 内置点阵字形（未配置字体时绘制置信度标签）
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

use image::{Rgb, RgbImage};

pub(crate) const GLYPH_WIDTH: i32 = 5;
pub(crate) const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = GLYPH_WIDTH + 1;

/// 5x7 点阵，每行低 5 位有效，高位在左
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
  match ch {
    '0' => Some([
      0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
    ]),
    '1' => Some([
      0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
    ]),
    '2' => Some([
      0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
    ]),
    '3' => Some([
      0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
    ]),
    '4' => Some([
      0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
    ]),
    '5' => Some([
      0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
    ]),
    '6' => Some([
      0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
    ]),
    '7' => Some([
      0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
    ]),
    '8' => Some([
      0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
    ]),
    '9' => Some([
      0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
    ]),
    '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
    '-' => Some([0, 0, 0, 0b11111, 0, 0, 0]),
    _ => None,
  }
}

/// 以左上角 (x, y) 为起点绘制文本，超出图像的像素直接丢弃
pub(crate) fn draw_bitmap_text(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
  let (width, height) = (image.width() as i32, image.height() as i32);
  let mut cursor = x;
  for ch in text.chars() {
    if let Some(rows) = glyph_bits(ch) {
      for (row, pattern) in rows.iter().enumerate() {
        let py = y + row as i32;
        if py < 0 || py >= height {
          continue;
        }
        for col in 0..GLYPH_WIDTH {
          if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
            let px = cursor + col;
            if px >= 0 && px < width {
              image.put_pixel(px as u32, py as u32, color);
            }
          }
        }
      }
    }
    cursor += GLYPH_ADVANCE;
  }
}

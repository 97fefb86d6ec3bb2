// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::debug;

use crate::{
  model::InferenceResult,
  output::overlay::{Overlay, OverlayBox, PixelRect},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: u32 = 20;
// 无字体时的每字符宽度估计
const LABEL_CHAR_WIDTH: f32 = 9.0;
const LABEL_TEXT_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PALETTE_SIZE: usize = 80;

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 生成 80 种不同的颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      colors,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn color(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  /// 将源图像按宽高比放入视口并叠加检测框；视口为空时不绘制
  pub fn render(
    &self,
    source: &RgbImage,
    result: Option<&InferenceResult>,
    viewport: (u32, u32),
  ) -> Option<RgbImage> {
    let overlay = Overlay::layout(viewport, source.dimensions(), result)?;
    let lb = overlay.letterbox;
    debug!(
      "绘制视口 {}x{}, 图像区域 ({}, {}) {}x{}",
      viewport.0, viewport.1, lb.dx, lb.dy, lb.dw, lb.dh
    );

    let mut canvas = RgbImage::from_pixel(viewport.0, viewport.1, BACKGROUND);
    if lb.dw > 0 && lb.dh > 0 {
      let scaled = image::imageops::resize(source, lb.dw, lb.dh, FilterType::Triangle);
      image::imageops::replace(&mut canvas, &scaled, lb.dx as i64, lb.dy as i64);
    }

    for item in &overlay.boxes {
      self.draw_box(&mut canvas, item);
    }

    Some(canvas)
  }

  fn draw_box(&self, image: &mut RgbImage, item: &OverlayBox<'_>) {
    let Some((x, y, w, h)) = clip_to_canvas(&item.rect, image.dimensions()) else {
      debug!("跳过画布外的检测框: {:?}", item.rect);
      return;
    };
    let color = self.color(item.class_id);

    // 绘制边框（加粗为2像素）
    for t in 0..BOX_THICKNESS {
      let (bw, bh) = (w - 2 * t, h - 2 * t);
      if bw <= 0 || bh <= 0 {
        break;
      }
      draw_hollow_rect_mut(
        image,
        Rect::at(x.saturating_add(t), y.saturating_add(t)).of_size(bw as u32, bh as u32),
        color,
      );
    }

    if let Some(label) = item.label {
      self.draw_tag(image, x, y, &format!("{} {:.2}", label, item.confidence), color);
    }
  }

  /// 标签贴在检测框左上角上方
  fn draw_tag(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = match &self.font {
      Some(font) => {
        let (tw, th) = text_size(scale, font, text);
        (tw, th.max(LABEL_TEXT_HEIGHT - 2 * LABEL_TEXT_PADDING as u32))
      }
      None => (
        (text.chars().count() as f32 * LABEL_CHAR_WIDTH) as u32,
        LABEL_TEXT_HEIGHT - 2 * LABEL_TEXT_PADDING as u32,
      ),
    };
    let tag_w = text_w + 2 * LABEL_TEXT_PADDING as u32;
    let tag_h = text_h + 2 * LABEL_TEXT_PADDING as u32;
    let tag_y = y.saturating_sub_unsigned(tag_h).max(0);
    let tag_x = x.max(0);

    if tag_w == 0 || tag_h == 0 {
      return;
    }
    draw_filled_rect_mut(image, Rect::at(tag_x, tag_y).of_size(tag_w, tag_h), color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        TEXT_COLOR,
        tag_x.saturating_add(LABEL_TEXT_PADDING),
        tag_y.saturating_add(LABEL_TEXT_PADDING),
        scale,
        font,
        text,
      );
    }
  }
}

/// 将浮点框裁剪到画布外沿一圈以内，返回整数左上角与尺寸。
///
/// 坐标非有限或与画布不相交时返回 `None`。裁剪后的边落在画布外，不会被绘制。
fn clip_to_canvas(rect: &PixelRect, canvas: (u32, u32)) -> Option<(i32, i32, i32, i32)> {
  let (x0, y0) = (rect.x, rect.y);
  let (x1, y1) = (rect.x + rect.w, rect.y + rect.h);
  if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
    return None;
  }

  let (cw, ch) = (canvas.0 as f32, canvas.1 as f32);
  if x0.max(x1) < 0.0 || y0.max(y1) < 0.0 || x0.min(x1) > cw || y0.min(y1) > ch {
    return None;
  }

  let margin = BOX_THICKNESS as f32;
  let clamp_x = |v: f32| v.clamp(-margin, cw + margin).round() as i32;
  let clamp_y = |v: f32| v.clamp(-margin, ch + margin).round() as i32;
  let (left, top) = (clamp_x(x0), clamp_y(y0));
  Some((left, top, clamp_x(x1) - left, clamp_y(y1) - top))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::LabelSet,
    model::{BoundingBox, Detection, NmsBufferBuilder, NmsDecoder, NmsShape},
  };

  fn result(class_id: usize) -> InferenceResult {
    InferenceResult {
      labels: LabelSet::new(["cat", "dog"]),
      detections: vec![Detection {
        class_id,
        center_x: 0.5,
        center_y: 0.5,
        width: 0.5,
        height: 0.5,
        confidence: 0.9,
      }],
    }
  }

  #[test]
  fn empty_viewport_renders_nothing() {
    let source = RgbImage::from_pixel(64, 64, Rgb([200, 200, 200]));
    assert!(Draw::default().render(&source, None, (0, 10)).is_none());
    assert!(Draw::default().render(&source, None, (10, 0)).is_none());
  }

  #[test]
  fn image_is_centered_with_bands() {
    let source = RgbImage::from_pixel(64, 64, Rgb([200, 200, 200]));
    let canvas = Draw::default().render(&source, None, (80, 60)).unwrap();
    assert_eq!(canvas.dimensions(), (80, 60));
    // 左右两侧为黑边
    assert_eq!(*canvas.get_pixel(5, 30), BACKGROUND);
    assert_eq!(*canvas.get_pixel(75, 30), BACKGROUND);
    assert_eq!(*canvas.get_pixel(40, 30), Rgb([200, 200, 200]));
  }

  #[test]
  fn box_edges_use_class_color() {
    let draw = Draw::default();
    let source = RgbImage::from_pixel(100, 100, Rgb([10, 10, 10]));
    let canvas = draw.render(&source, Some(&result(1)), (100, 100)).unwrap();
    // 框: 左上 (25, 25), 尺寸 50x50
    assert_eq!(*canvas.get_pixel(25, 50), draw.color(1));
    assert_eq!(*canvas.get_pixel(74, 50), draw.color(1));
    assert_eq!(*canvas.get_pixel(50, 50), Rgb([10, 10, 10]));
    // 标签在框上方
    assert_eq!(*canvas.get_pixel(27, 20), draw.color(1));
  }

  #[test]
  fn unknown_class_has_no_tag() {
    let draw = Draw::default();
    let source = RgbImage::from_pixel(100, 100, Rgb([10, 10, 10]));
    let canvas = draw.render(&source, Some(&result(5)), (100, 100)).unwrap();
    assert_eq!(*canvas.get_pixel(25, 50), draw.color(5));
    assert_eq!(*canvas.get_pixel(27, 20), Rgb([10, 10, 10]));
  }

  /// 解码器原样放行的极端坐标经解码后进入绘制
  fn decoded(boxes: &[BoundingBox]) -> InferenceResult {
    let shape = NmsShape::new(2, boxes.len());
    let mut builder = NmsBufferBuilder::new(shape);
    for bbox in boxes {
      builder.push(0, *bbox).unwrap();
    }
    let buffer = builder.build().unwrap();
    InferenceResult {
      labels: LabelSet::new(["cat", "dog"]),
      detections: NmsDecoder::new(shape).decode(&buffer).unwrap(),
    }
  }

  #[test]
  fn far_out_of_range_boxes_are_skipped() {
    let draw = Draw::default();
    let source = RgbImage::from_pixel(64, 64, Rgb([10, 10, 10]));
    let result = decoded(&[
      BoundingBox::new(1e12, 1e12, 1e12, 1e12, 0.9),
      BoundingBox::new(-1e12, -1e12, -1e12, -1e12, 0.9),
      BoundingBox::new(f32::NAN, 0.1, 0.2, f32::INFINITY, 0.9),
    ]);
    assert_eq!(result.detections.len(), 3);

    let canvas = draw.render(&source, Some(&result), (64, 64)).unwrap();
    assert_eq!(canvas.dimensions(), (64, 64));
    assert!(canvas.pixels().all(|p| *p == Rgb([10, 10, 10])));
  }

  #[test]
  fn oversized_box_is_clipped_to_canvas() {
    let draw = Draw::default();
    let source = RgbImage::from_pixel(64, 64, Rgb([10, 10, 10]));
    let result = decoded(&[BoundingBox::new(-1e12, -1e12, 1e12, 1e12, 0.9)]);

    let canvas = draw.render(&source, Some(&result), (64, 64)).unwrap();
    assert_eq!(canvas.dimensions(), (64, 64));
    // 边框落在画布外，标签贴在左上角
    assert_eq!(*canvas.get_pixel(32, 32), Rgb([10, 10, 10]));
    assert_eq!(*canvas.get_pixel(1, 1), draw.color(0));
  }
}

// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/output/overlay.rs - 检测框叠加的坐标映射
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

use crate::model::{Detection, InferenceResult};

/// 保持宽高比并居中后的图像显示区域（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
  pub dx: i32,
  pub dy: i32,
  pub dw: u32,
  pub dh: u32,
}

impl Letterbox {
  /// 视口或源图像任一边小于 1 时返回 `None`
  pub fn fit(dst_w: u32, dst_h: u32, src_w: u32, src_h: u32) -> Option<Self> {
    if dst_w < 1 || dst_h < 1 || src_w < 1 || src_h < 1 {
      return None;
    }

    let (dst_w64, dst_h64) = (dst_w as u64, dst_h as u64);
    let (src_w64, src_h64) = (src_w as u64, src_h as u64);
    let (dw, dh) = if src_w64 * dst_h64 < dst_w64 * src_h64 {
      ((src_w64 * dst_h64 / src_h64) as u32, dst_h)
    } else {
      (dst_w, (src_h64 * dst_w64 / src_w64) as u32)
    };

    Some(Self {
      dx: ((dst_w - dw) / 2) as i32,
      dy: ((dst_h - dh) / 2) as i32,
      dw,
      dh,
    })
  }

  /// 将归一化的中心点与宽高映射为视口中的左上角与尺寸
  pub fn map(&self, detection: &Detection) -> PixelRect {
    let (dw, dh) = (self.dw as f32, self.dh as f32);
    let w = detection.width * dw;
    let h = detection.height * dh;
    let cx = detection.center_x * dw + self.dx as f32;
    let cy = detection.center_y * dh + self.dy as f32;

    PixelRect {
      x: cx - w / 2.0,
      y: cy - h / 2.0,
      w,
      h,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox<'a> {
  pub rect: PixelRect,
  pub class_id: usize,
  pub confidence: f32,
  /// 类别编号越界时没有标签
  pub label: Option<&'a str>,
}

/// 一次绘制所需的全部几何信息
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay<'a> {
  pub letterbox: Letterbox,
  pub boxes: Vec<OverlayBox<'a>>,
}

impl<'a> Overlay<'a> {
  pub fn layout(
    viewport: (u32, u32),
    source: (u32, u32),
    result: Option<&'a InferenceResult>,
  ) -> Option<Self> {
    let letterbox = Letterbox::fit(viewport.0, viewport.1, source.0, source.1)?;
    let boxes = result
      .map(|result| {
        result
          .detections
          .iter()
          .map(|det| OverlayBox {
            rect: letterbox.map(det),
            class_id: det.class_id,
            confidence: det.confidence,
            label: result.label(det),
          })
          .collect()
      })
      .unwrap_or_default();

    Some(Self { letterbox, boxes })
  }
}

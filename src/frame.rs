// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::RgbImage;

use crate::config::InputShape;

/// 行优先、RGB 交织、每通道 8 位的模型输入帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbNhwcFrame {
  shape: InputShape,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  /// 全零帧
  #[cfg(test)]
  pub(crate) fn with_shape(shape: InputShape) -> Self {
    Self {
      shape,
      data: vec![0u8; shape.frame_size()].into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> InputShape {
    self.shape
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

impl From<&RgbImage> for RgbNhwcFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    // RgbImage 的内存布局已是行优先 RGB 交织
    Self {
      shape: InputShape { width, height },
      data: image.as_raw().clone().into_boxed_slice(),
    }
  }
}

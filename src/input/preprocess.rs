// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/input/preprocess.rs - 模型输入预处理
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

use image::{DynamicImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{config::InputShape, frame::RgbNhwcFrame};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("输入图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 将任意尺寸图像拉伸到模型输入尺寸（不保持宽高比），输出 RGB 交织字节
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  shape: InputShape,
  filter: FilterType,
}

impl Preprocessor {
  pub fn new(shape: InputShape) -> Self {
    Self {
      shape,
      filter: FilterType::Triangle,
    }
  }

  pub fn process(&self, image: &DynamicImage) -> Result<RgbNhwcFrame, PreprocessError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(PreprocessError::EmptyImage(width, height));
    }

    let rgb = image.to_rgb8();
    let resized = if (width, height) == (self.shape.width, self.shape.height) {
      rgb
    } else {
      debug!(
        "缩放输入图像 {}x{} -> {}x{}",
        width, height, self.shape.width, self.shape.height
      );
      image::imageops::resize(&rgb, self.shape.width, self.shape.height, self.filter)
    };

    Ok(RgbNhwcFrame::from(&resized))
  }
}

// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputFrame,
  model::InferenceResult,
  output::{Render, draw::Draw},
  query_value,
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体错误: {0}")]
  FontError(String),
  #[error("参数 {0} 无效: {1}")]
  InvalidParameter(&'static str, String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 把叠加结果渲染到指定大小的视口并保存；未指定视口时使用源图像尺寸
pub struct SaveImageFileOutput {
  path: PathBuf,
  viewport: Option<(u32, u32)>,
  draw: Draw,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

fn parse_dim(url: &Url, key: &'static str) -> Result<Option<u32>, SaveImageFileError> {
  query_value(url, key)
    .map(|v| {
      v.parse()
        .map_err(|_| SaveImageFileError::InvalidParameter(key, v))
    })
    .transpose()
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let viewport = match (parse_dim(uri, "width")?, parse_dim(uri, "height")?) {
      (Some(w), Some(h)) => Some((w, h)),
      (None, None) => None,
      _ => {
        return Err(SaveImageFileError::InvalidParameter(
          "width/height",
          "需要同时指定".to_string(),
        ));
      }
    };

    let mut draw = Draw::default();
    if let Some(font_path) = query_value(uri, "font") {
      let data = std::fs::read(&font_path)?;
      let font = FontArc::try_from_vec(data)
        .map_err(|e| SaveImageFileError::FontError(format!("{}: {}", font_path, e)))?;
      draw = draw.with_font(font);
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      viewport,
      draw,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>, viewport: Option<(u32, u32)>) -> Self {
    Self {
      path: path.into(),
      viewport,
      draw: Draw::default(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<InputFrame, InferenceResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &InputFrame,
    result: &InferenceResult,
  ) -> Result<(), Self::Error> {
    let viewport = self.viewport.unwrap_or(frame.source.dimensions());
    match self.draw.render(&frame.source, Some(result), viewport) {
      Some(image) => self.save_image(image),
      None => {
        warn!("视口 {}x{} 为空, 跳过绘制", viewport.0, viewport.1);
        Ok(())
      }
    }
  }
}

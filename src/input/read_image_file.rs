// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputFrame, PreprocessError, Preprocessor},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
}

pub struct ImageFileInput {
  path: PathBuf,
  image: Option<DynamicImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref().to_path_buf();
    let image = ImageReader::open(&path)?.with_guessed_format()?.decode()?;
    info!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      path,
      image: Some(image),
    })
  }

  pub fn from_image(path: impl Into<PathBuf>, image: DynamicImage) -> Self {
    ImageFileInput {
      path: path.into(),
      image: Some(image),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn into_frames(self, preprocessor: Preprocessor) -> ImageFileFrames {
    ImageFileFrames {
      inner: self,
      preprocessor,
    }
  }
}

/// 单张图像只产出一帧
pub struct ImageFileFrames {
  inner: ImageFileInput,
  preprocessor: Preprocessor,
}

impl Iterator for ImageFileFrames {
  type Item = Result<InputFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.inner.image.take()?;
    Some(
      self
        .preprocessor
        .process(&image)
        .map(|tensor| InputFrame {
          source: image.to_rgb8(),
          tensor,
        })
        .map_err(ImageFileInputError::from),
    )
  }
}

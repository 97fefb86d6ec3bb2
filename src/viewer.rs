// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/viewer.rs - 打开图像并推理的查看器状态
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

use std::path::Path;

use image::DynamicImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  config::InputShape,
  frame::RgbNhwcFrame,
  input::{ImageFileInput, ImageFileInputError, InputFrame, Preprocessor},
  model::{AcceleratorError, DecodeError, DetectorError, InferenceResult, Model},
  output::{OutputError, Render},
};

/// 单次打开图像请求的失败原因；均终止当前请求，但不影响后续请求
#[derive(Error, Debug)]
pub enum ViewerError {
  #[error("输入错误: {0}")]
  Input(#[from] ImageFileInputError),
  #[error("{0}")]
  Accelerator(AcceleratorError),
  #[error("解码错误: {0}")]
  Decode(DecodeError),
  #[error("检测器错误: {0}")]
  Detector(DetectorError),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
}

impl From<DetectorError> for ViewerError {
  fn from(err: DetectorError) -> Self {
    match err {
      DetectorError::Accelerator(e) => ViewerError::Accelerator(e),
      DetectorError::Decode(e) => ViewerError::Decode(e),
      other => ViewerError::Detector(other),
    }
  }
}

/// 当前显示的图像与其推理结果，每次打开新图像时整体替换
#[derive(Debug, Clone)]
pub struct ViewerState {
  pub frame: InputFrame,
  pub result: InferenceResult,
}

pub struct Viewer<M> {
  model: M,
  preprocessor: Preprocessor,
  state: Option<ViewerState>,
}

impl<M> Viewer<M>
where
  M: Model<Input = RgbNhwcFrame, Output = InferenceResult, Error = DetectorError>,
{
  pub fn new(model: M, input_shape: InputShape) -> Self {
    Self {
      model,
      preprocessor: Preprocessor::new(input_shape),
      state: None,
    }
  }

  pub fn open_image(&mut self, path: impl AsRef<Path>) -> Result<&ViewerState, ViewerError> {
    self.state = None;
    let input = ImageFileInput::open(path)?;
    self.run(input)
  }

  pub fn open_decoded(
    &mut self,
    name: &str,
    image: DynamicImage,
  ) -> Result<&ViewerState, ViewerError> {
    self.state = None;
    self.run(ImageFileInput::from_image(name, image))
  }

  fn run(&mut self, input: ImageFileInput) -> Result<&ViewerState, ViewerError> {
    let path = input.path().to_path_buf();
    let frame = match input.into_frames(self.preprocessor).next() {
      Some(frame) => frame?,
      None => return Err(ViewerError::Input(ImageFileInputError::IoError(
        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "没有输入帧"),
      ))),
    };

    let now = std::time::Instant::now();
    let result = self.model.infer(&frame.tensor).inspect_err(|e| {
      warn!("推理失败 {}: {}", path.display(), e);
    })?;
    info!(
      "{}: {} 个检测结果, 耗时 {:.2?}",
      path.display(),
      result.detections.len(),
      now.elapsed()
    );

    Ok(self.state.insert(ViewerState { frame, result }))
  }

  pub fn current(&self) -> Option<&ViewerState> {
    self.state.as_ref()
  }

  /// 将当前结果交给每个输出；某个输出失败不影响其余输出，返回第一个错误
  pub fn present<O>(&self, outputs: &[O]) -> Result<(), ViewerError>
  where
    O: Render<InputFrame, InferenceResult, Error = OutputError>,
  {
    let Some(state) = self.state.as_ref() else {
      return Ok(());
    };

    let mut first_error = None;
    for output in outputs {
      if let Err(e) = output.render_result(&state.frame, &state.result) {
        warn!("输出失败: {}", e);
        first_error.get_or_insert(e);
      }
    }

    match first_error {
      Some(e) => Err(ViewerError::Output(e)),
      None => Ok(()),
    }
  }

  /// 按视口绘制当前图像与检测框；没有图像或视口为空时返回 `None`
  #[cfg(feature = "save_image_file")]
  pub fn render(
    &self,
    draw: &crate::output::draw::Draw,
    viewport: (u32, u32),
  ) -> Option<image::RgbImage> {
    let state = self.state.as_ref()?;
    draw.render(&state.frame.source, Some(&state.result), viewport)
  }
}

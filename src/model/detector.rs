// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/model/detector.rs - NMS 检测器
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

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  config::{ConfigError, InputShape, ModelConfig},
  frame::RgbNhwcFrame,
  model::{
    DecodeError, InferenceResult, Model, NmsDecoder, ReplayBackend,
    session::{AcceleratorBackend, AcceleratorError, SessionGuard},
  },
  query_value,
};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("输入尺寸 {actual:?} 与模型输入 {expected:?} 不一致")]
  InputShape {
    expected: InputShape,
    actual: InputShape,
  },
  #[error("{0}")]
  Accelerator(#[from] AcceleratorError),
  #[error("NMS 输出解码错误: {0}")]
  Decode(#[from] DecodeError),
}

/// 每次推理：打开会话、执行、释放会话，然后解码输出
pub struct NmsDetector<B> {
  backend: B,
  config: ModelConfig,
}

impl<B: AcceleratorBackend> NmsDetector<B> {
  pub fn new(backend: B, config: ModelConfig) -> Self {
    Self { backend, config }
  }

  pub fn config(&self) -> &ModelConfig {
    &self.config
  }
}

impl<B: AcceleratorBackend> Model for NmsDetector<B> {
  type Input = RgbNhwcFrame;
  type Output = InferenceResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.shape() != self.config.input_shape {
      error!(
        "输入尺寸 {:?} 与模型输入 {:?} 不一致",
        input.shape(),
        self.config.input_shape
      );
      return Err(DetectorError::InputShape {
        expected: self.config.input_shape,
        actual: input.shape(),
      });
    }

    let raw = {
      let mut session = SessionGuard::open(&self.backend, &self.config)?;
      debug!("执行模型推理");
      let now = std::time::Instant::now();
      let raw = session.run_inference(input.as_nhwc(), self.config.timeout)?;
      debug!("推理耗时: {:.2?}", now.elapsed());
      raw
    };

    debug!("后处理模型输出: {} 字节, {:?}", raw.buffer.len(), raw.shape);
    let detections = NmsDecoder::new(raw.shape).decode(&raw.buffer)?;
    info!("检测到 {} 个物体", detections.len());

    Ok(InferenceResult {
      labels: self.config.labels.clone(),
      detections,
    })
  }
}

/// 由模型 URL 构建回放检测器，例如 `replay:///data/capture.bin?classes=80&latency_ms=20`
pub struct DetectorBuilder {
  config: ModelConfig,
  backend: ReplayBackend,
}

impl FromUrl for DetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != ReplayBackend::SCHEME {
      return Err(DetectorError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        ReplayBackend::SCHEME
      )));
    }

    let latency = match query_value(url, "latency_ms") {
      Some(value) => value
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidParameter {
          key: "latency_ms",
          value,
        })?,
      None => Duration::ZERO,
    };

    Ok(DetectorBuilder {
      config: ModelConfig::from_url(url)?,
      backend: ReplayBackend::with_latency(latency),
    })
  }
}

impl DetectorBuilder {
  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn build(self) -> NmsDetector<ReplayBackend> {
    NmsDetector::new(self.backend, self.config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{
    BoundingBox, Detection, NmsBufferBuilder, NmsShape,
    session::{RawOutput, SessionStage, mock::MockBackend},
  };

  fn config() -> ModelConfig {
    ModelConfig::from_url(
      &Url::parse("mock:///model?width=8&height=8&classes=2&max_boxes=4").unwrap(),
    )
    .unwrap()
  }

  fn frame() -> RgbNhwcFrame {
    RgbNhwcFrame::with_shape(InputShape::new(8, 8).unwrap())
  }

  #[test]
  fn decodes_accelerator_response() {
    let shape = NmsShape::new(2, 4);
    let mut builder = NmsBufferBuilder::new(shape);
    builder
      .push(0, BoundingBox::new(0.0, 0.0, 0.5, 0.5, 0.8))
      .unwrap();
    let backend = MockBackend::returning(Ok(RawOutput {
      buffer: builder.build().unwrap(),
      shape,
    }));
    let detector = NmsDetector::new(backend.clone(), config());

    let result = detector.infer(&frame()).unwrap();
    assert_eq!(
      result.detections,
      vec![Detection {
        class_id: 0,
        center_x: 0.25,
        center_y: 0.25,
        width: 0.5,
        height: 0.5,
        confidence: 0.8,
      }]
    );
    assert_eq!(result.labels.name(0), Some("person"));
    assert_eq!(backend.opened.get(), 1);
    assert_eq!(backend.released.get(), 1);
  }

  #[test]
  fn accelerator_failure_releases_session() {
    let backend = MockBackend::returning(Err(AcceleratorError::new(
      SessionStage::Wait,
      4,
      "timeout",
    )));
    let detector = NmsDetector::new(backend.clone(), config());

    let err = detector.infer(&frame()).unwrap_err();
    assert!(matches!(err, DetectorError::Accelerator(ref e) if e.status == 4));
    assert_eq!(backend.released.get(), 1);
  }

  #[test]
  fn malformed_output_is_decode_error() {
    let backend = MockBackend::returning(Ok(RawOutput {
      buffer: vec![0u8; 10],
      shape: NmsShape::new(2, 4),
    }));
    let detector = NmsDetector::new(backend.clone(), config());

    let err = detector.infer(&frame()).unwrap_err();
    assert!(matches!(
      err,
      DetectorError::Decode(DecodeError::SizeMismatch { actual: 10, .. })
    ));
    assert_eq!(backend.released.get(), 1);
  }

  #[test]
  fn wrong_frame_shape_never_opens_session() {
    let backend = MockBackend::returning(Err(AcceleratorError::new(
      SessionStage::Submit,
      1,
      "unused",
    )));
    let detector = NmsDetector::new(backend.clone(), config());
    let frame = RgbNhwcFrame::with_shape(InputShape::new(4, 4).unwrap());

    assert!(matches!(
      detector.infer(&frame),
      Err(DetectorError::InputShape { .. })
    ));
    assert_eq!(backend.opened.get(), 0);
  }

  #[test]
  fn builder_requires_replay_scheme() {
    let url = Url::parse("yolo:///model.bin").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(DetectorError::ModelPathError(_))
    ));

    let url = Url::parse("replay:///capture.bin?classes=3").unwrap();
    let builder = DetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.config().nms_shape.num_classes, 3);

    let url = Url::parse("replay:///capture.bin?latency_ms=soon").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(DetectorError::Config(ConfigError::InvalidParameter {
        key: "latency_ms",
        ..
      }))
    ));
  }
}

// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::config::LabelSet;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 单个检测结果，中心点与宽高均为相对模型输入的归一化坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
  pub class_id: usize,
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
  pub confidence: f32,
}

/// 一次推理的完整结果，按类别、再按加速器返回顺序排列
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
  pub labels: LabelSet,
  pub detections: Vec<Detection>,
}

impl InferenceResult {
  pub fn label(&self, detection: &Detection) -> Option<&str> {
    self.labels.name(detection.class_id)
  }
}

mod nms;
pub use self::nms::{
  BBOX_RECORD_SIZE, BoundingBox, DecodeError, DecodedNms, NmsBufferBuilder, NmsBuildError,
  NmsDecoder, NmsShape,
};

pub mod session;
pub use self::session::{AcceleratorBackend, AcceleratorError, InferenceSession, RawOutput};

mod replay;
pub use self::replay::{ReplayBackend, ReplaySession};

mod detector;
pub use self::detector::{DetectorBuilder, DetectorError, NmsDetector};

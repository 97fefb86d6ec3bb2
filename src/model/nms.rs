// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/model/nms.rs - 按类别分桶的 NMS 输出解码
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

//! 加速器输出布局：对每个类别依次写入 4 字节计数（以 f32 存储），
//! 紧跟计数个检测框记录 `x_min, y_min, x_max, y_max, score`（均为 f32）。
//! 缓冲区总长固定为 `(4 + record_size * max_boxes_per_class) * num_classes`，
//! 未使用的尾部为填充。

use thiserror::Error;
use tracing::{debug, trace};

use crate::model::Detection;

/// 紧凑检测框记录的字节数
pub const BBOX_RECORD_SIZE: usize = 5 * F32_SIZE;
const F32_SIZE: usize = std::mem::size_of::<f32>();
const COUNT_SIZE: usize = F32_SIZE;

/// NMS 输出形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmsShape {
  pub num_classes: usize,
  pub max_boxes_per_class: usize,
  /// 单条记录占用字节数，超出 [`BBOX_RECORD_SIZE`] 的部分视为对齐填充
  pub record_size: usize,
}

impl NmsShape {
  pub fn new(num_classes: usize, max_boxes_per_class: usize) -> Self {
    Self {
      num_classes,
      max_boxes_per_class,
      record_size: BBOX_RECORD_SIZE,
    }
  }

  pub fn with_record_size(mut self, record_size: usize) -> Self {
    self.record_size = record_size;
    self
  }

  /// 期望的缓冲区长度，溢出时返回 `None`
  pub fn buffer_size(&self) -> Option<usize> {
    self
      .record_size
      .checked_mul(self.max_boxes_per_class)?
      .checked_add(COUNT_SIZE)?
      .checked_mul(self.num_classes)
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("NMS 输出形状溢出: {0:?}")]
  ShapeOverflow(NmsShape),
  #[error("检测框记录大小 {0} 小于 {min} 字节", min = BBOX_RECORD_SIZE)]
  RecordTooSmall(usize),
  #[error("NMS 输出大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("类别 {class_id} 的检测框计数无效: {raw}")]
  InvalidCount { class_id: usize, raw: f32 },
  #[error("类别 {class_id} 的检测框数量 {count} 超过上限 {max}")]
  CountOverflow {
    class_id: usize,
    count: usize,
    max: usize,
  },
}

/// 单条检测框记录，坐标为相对模型输入的归一化值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
  pub score: f32,
}

impl BoundingBox {
  pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32, score: f32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
      score,
    }
  }

  pub fn to_detection(&self, class_id: usize) -> Detection {
    Detection {
      class_id,
      center_x: (self.x_min + self.x_max) / 2.0,
      center_y: (self.y_min + self.y_max) / 2.0,
      width: self.x_max - self.x_min,
      height: self.y_max - self.y_min,
      confidence: self.score,
    }
  }
}

struct Cursor<'a> {
  buffer: &'a [u8],
  offset: usize,
  class_id: usize,
}

impl<'a> Cursor<'a> {
  fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
    let end = self
      .offset
      .checked_add(needed)
      .filter(|end| *end <= self.buffer.len())
      .ok_or(DecodeError::SizeMismatch {
        expected: self.offset.saturating_add(needed),
        actual: self.buffer.len(),
      })?;
    let buffer: &'a [u8] = self.buffer;
    let bytes = &buffer[self.offset..end];
    self.offset = end;
    Ok(bytes)
  }

  fn read_f32(&mut self) -> Result<f32, DecodeError> {
    let bytes = self.take(F32_SIZE)?;
    let mut raw = [0u8; F32_SIZE];
    raw.copy_from_slice(bytes);
    Ok(f32::from_ne_bytes(raw))
  }
}

/// 解码结果，`consumed` 为遍历实际消耗的字节数（不含尾部填充）
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNms {
  pub detections: Vec<Detection>,
  pub consumed: usize,
}

/// 纯格式转换：不做置信度过滤，也不重新排序
#[derive(Debug, Clone, Copy)]
pub struct NmsDecoder {
  shape: NmsShape,
}

impl NmsDecoder {
  pub fn new(shape: NmsShape) -> Self {
    Self { shape }
  }

  pub fn decode(&self, buffer: &[u8]) -> Result<Vec<Detection>, DecodeError> {
    self.decode_counted(buffer).map(|decoded| decoded.detections)
  }

  pub fn decode_counted(&self, buffer: &[u8]) -> Result<DecodedNms, DecodeError> {
    let shape = self.shape;
    if shape.record_size < BBOX_RECORD_SIZE {
      return Err(DecodeError::RecordTooSmall(shape.record_size));
    }
    let expected = shape
      .buffer_size()
      .ok_or(DecodeError::ShapeOverflow(shape))?;
    if buffer.len() != expected {
      return Err(DecodeError::SizeMismatch {
        expected,
        actual: buffer.len(),
      });
    }

    let padding = shape.record_size - BBOX_RECORD_SIZE;
    let mut cursor = Cursor {
      buffer,
      offset: 0,
      class_id: 0,
    };
    let mut detections = Vec::new();

    for class_id in 0..shape.num_classes {
      cursor.class_id = class_id;
      let count = read_count(&mut cursor, shape.max_boxes_per_class)?;
      if count > 0 {
        trace!("类别 {}: {} 个检测框", class_id, count);
      }

      for _ in 0..count {
        let bbox = BoundingBox {
          x_min: cursor.read_f32()?,
          y_min: cursor.read_f32()?,
          x_max: cursor.read_f32()?,
          y_max: cursor.read_f32()?,
          score: cursor.read_f32()?,
        };
        cursor.take(padding)?;
        detections.push(bbox.to_detection(class_id));
      }
    }

    debug!(
      "解码 {} 个检测框, 消耗 {} / {} 字节",
      detections.len(),
      cursor.offset,
      buffer.len()
    );

    Ok(DecodedNms {
      detections,
      consumed: cursor.offset,
    })
  }
}

/// 计数槽按 f32 写入，截断为整数
fn read_count(cursor: &mut Cursor<'_>, max: usize) -> Result<usize, DecodeError> {
  let class_id = cursor.class_id;
  let raw = cursor.read_f32()?;
  let count = raw.trunc();
  if !count.is_finite() || count < 0.0 {
    return Err(DecodeError::InvalidCount { class_id, raw });
  }
  if count > max as f32 {
    return Err(DecodeError::CountOverflow {
      class_id,
      count: count as usize,
      max,
    });
  }
  Ok(count as usize)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NmsBuildError {
  #[error("类别 {class_id} 超出范围, 共 {num_classes} 类")]
  ClassOutOfRange { class_id: usize, num_classes: usize },
  #[error("类别 {class_id} 的检测框已达上限 {max}")]
  TooManyBoxes { class_id: usize, max: usize },
  #[error("NMS 输出形状无效")]
  InvalidShape,
}

/// 按加速器布局编码 NMS 输出，用于回放采集与测试
#[derive(Debug, Clone)]
pub struct NmsBufferBuilder {
  shape: NmsShape,
  classes: Vec<Vec<BoundingBox>>,
}

impl NmsBufferBuilder {
  pub fn new(shape: NmsShape) -> Self {
    Self {
      shape,
      classes: vec![Vec::new(); shape.num_classes],
    }
  }

  pub fn push(&mut self, class_id: usize, bbox: BoundingBox) -> Result<&mut Self, NmsBuildError> {
    let num_classes = self.shape.num_classes;
    let max = self.shape.max_boxes_per_class;
    let boxes = self
      .classes
      .get_mut(class_id)
      .ok_or(NmsBuildError::ClassOutOfRange {
        class_id,
        num_classes,
      })?;
    if boxes.len() >= max {
      return Err(NmsBuildError::TooManyBoxes { class_id, max });
    }
    boxes.push(bbox);
    Ok(self)
  }

  pub fn build(&self) -> Result<Vec<u8>, NmsBuildError> {
    if self.shape.record_size < BBOX_RECORD_SIZE {
      return Err(NmsBuildError::InvalidShape);
    }
    let size = self.shape.buffer_size().ok_or(NmsBuildError::InvalidShape)?;
    let padding = self.shape.record_size - BBOX_RECORD_SIZE;
    let mut buffer = Vec::with_capacity(size);

    for boxes in &self.classes {
      buffer.extend_from_slice(&(boxes.len() as f32).to_ne_bytes());
      for bbox in boxes {
        for value in [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max, bbox.score] {
          buffer.extend_from_slice(&value.to_ne_bytes());
        }
        buffer.resize(buffer.len() + padding, 0);
      }
    }

    buffer.resize(size, 0);
    Ok(buffer)
  }
}

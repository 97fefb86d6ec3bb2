// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/config.rs - 模型配置
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

use std::{path::PathBuf, str::FromStr, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, model::NmsShape, query_value};

const DEFAULT_INPUT_W: u32 = 640;
const DEFAULT_INPUT_H: u32 = 640;
const DEFAULT_MAX_BOXES: usize = 100;
const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("参数 {key} 无效: {value}")]
  InvalidParameter { key: &'static str, value: String },
  #[error("模型输入尺寸无效: {0}x{1}")]
  InvalidShape(u32, u32),
  #[error("类别数量必须大于 0")]
  NoClasses,
  #[error("标签文件为空")]
  EmptyLabels,
  #[error("检测框记录大小 {0} 小于 {min} 字节", min = crate::model::BBOX_RECORD_SIZE)]
  RecordTooSmall(usize),
  #[error("读取标签文件错误: {0}")]
  LabelIo(#[from] std::io::Error),
  #[error("解析标签文件错误: {0}")]
  LabelParse(#[from] serde_json::Error),
}

/// 模型输入尺寸，宽高固定，不随输入图像变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
  pub width: u32,
  pub height: u32,
}

impl InputShape {
  pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
    if width == 0 || height == 0 {
      return Err(ConfigError::InvalidShape(width, height));
    }
    Ok(Self { width, height })
  }

  /// 交织 RGB 输入缓冲区的字节数
  pub fn frame_size(&self) -> usize {
    self.width as usize * self.height as usize * 3
  }
}

impl Default for InputShape {
  fn default() -> Self {
    Self {
      width: DEFAULT_INPUT_W,
      height: DEFAULT_INPUT_H,
    }
  }
}

/// 类别名称列表，下标即类别编号
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSet {
  names: Box<[String]>,
}

impl LabelSet {
  pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  pub fn coco() -> Self {
    Self::new(COCO_CLASSES)
  }

  /// 从 JSON 字符串数组文件加载
  pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
    let data = std::fs::read(path)?;
    let names: Vec<String> = serde_json::from_slice(&data)?;
    debug!("从 {} 加载 {} 个标签", path.display(), names.len());
    Ok(Self::new(names))
  }

  pub fn name(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

/// 启动时加载一次的模型配置，进程生命周期内不可变
#[derive(Debug, Clone)]
pub struct ModelConfig {
  pub model_path: PathBuf,
  pub input_shape: InputShape,
  pub nms_shape: NmsShape,
  pub labels: LabelSet,
  pub timeout: Duration,
}

fn parse_query<T: FromStr>(url: &Url, key: &'static str, default: T) -> Result<T, ConfigError> {
  match query_value(url, key) {
    Some(value) => value
      .parse()
      .map_err(|_| ConfigError::InvalidParameter { key, value }),
    None => Ok(default),
  }
}

impl FromUrl for ModelConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let input_shape = InputShape::new(
      parse_query(url, "width", DEFAULT_INPUT_W)?,
      parse_query(url, "height", DEFAULT_INPUT_H)?,
    )?;

    let labels = match query_value(url, "labels") {
      Some(path) => LabelSet::load(std::path::Path::new(&path))?,
      None => LabelSet::coco(),
    };
    if labels.is_empty() {
      return Err(ConfigError::EmptyLabels);
    }

    let num_classes = parse_query(url, "classes", labels.len())?;
    if num_classes == 0 {
      return Err(ConfigError::NoClasses);
    }
    let max_boxes_per_class = parse_query(url, "max_boxes", DEFAULT_MAX_BOXES)?;
    let record_size = parse_query(url, "record_size", crate::model::BBOX_RECORD_SIZE)?;
    if record_size < crate::model::BBOX_RECORD_SIZE {
      return Err(ConfigError::RecordTooSmall(record_size));
    }
    let timeout = Duration::from_millis(parse_query(url, "timeout_ms", DEFAULT_TIMEOUT_MS)?);

    let config = ModelConfig {
      model_path: PathBuf::from(url.path()),
      input_shape,
      nms_shape: NmsShape {
        num_classes,
        max_boxes_per_class,
        record_size,
      },
      labels,
      timeout,
    };

    info!(
      "模型配置: {} 输入 {}x{}, {} 类, 每类最多 {} 框",
      config.model_path.display(),
      config.input_shape.width,
      config.input_shape.height,
      config.nms_shape.num_classes,
      config.nms_shape.max_boxes_per_class
    );

    Ok(config)
  }
}

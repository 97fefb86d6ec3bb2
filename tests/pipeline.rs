// 该文件是 NmsViewer （夜观） 项目的一部分。
// tests/pipeline.rs - 回放端到端测试
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

use image::{Rgb, RgbImage};
use tempfile::tempdir;
use url::Url;

use nms_viewer::{
  FromUrl,
  model::{
    BoundingBox, Detection, DetectorBuilder, NmsBufferBuilder, NmsShape, session::SessionStage,
  },
  output::OutputWrapper,
  viewer::{Viewer, ViewerError},
};

fn write_capture(ws: &Path) -> PathBuf {
  let shape = NmsShape::new(2, 5);
  let mut builder = NmsBufferBuilder::new(shape);
  builder
    .push(0, BoundingBox::new(0.0, 0.0, 0.5, 0.5, 0.8))
    .unwrap();
  let path = ws.join("capture.bin");
  std::fs::write(&path, builder.build().unwrap()).unwrap();
  path
}

fn write_labels(ws: &Path) -> PathBuf {
  let path = ws.join("labels.json");
  std::fs::write(&path, r#"["cat", "dog"]"#).unwrap();
  path
}

fn write_image(ws: &Path, name: &str, w: u32, h: u32) -> PathBuf {
  let path = ws.join(name);
  RgbImage::from_pixel(w, h, Rgb([90, 120, 150]))
    .save(&path)
    .unwrap();
  path
}

fn model_url(capture: &Path, labels: &Path) -> Url {
  Url::parse(&format!(
    "replay://{}?width=64&height=64&max_boxes=5&labels={}",
    capture.display(),
    labels.display()
  ))
  .unwrap()
}

#[test]
fn replayed_capture_is_decoded_and_rendered() {
  let dir = tempdir().unwrap();
  let ws = dir.path();
  let capture = write_capture(ws);
  let labels = write_labels(ws);
  let image = write_image(ws, "input.png", 120, 80);

  let builder = DetectorBuilder::from_url(&model_url(&capture, &labels)).unwrap();
  assert_eq!(builder.config().nms_shape.num_classes, 2);
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  let state = viewer.open_image(&image).unwrap();
  assert_eq!(
    state.result.detections,
    vec![Detection {
      class_id: 0,
      center_x: 0.25,
      center_y: 0.25,
      width: 0.5,
      height: 0.5,
      confidence: 0.8,
    }]
  );
  assert_eq!(state.result.label(&state.result.detections[0]), Some("cat"));
  assert_eq!(state.frame.tensor.as_nhwc().len(), 64 * 64 * 3);

  let out_png = ws.join("out/overlay.png");
  let out_json = ws.join("out/result.json");
  let outputs = [
    OutputWrapper::from_url(
      &Url::parse(&format!("image://{}?width=800&height=600", out_png.display())).unwrap(),
    )
    .unwrap(),
    OutputWrapper::from_url(&Url::parse(&format!("json://{}", out_json.display())).unwrap())
      .unwrap(),
  ];
  viewer.present(&outputs).unwrap();

  let rendered = image::open(&out_png).unwrap().to_rgb8();
  assert_eq!(rendered.dimensions(), (800, 600));
  // 120x80 放入 800x600: 图像区域 800x533, 上下各留 33 像素黑边
  assert_eq!(*rendered.get_pixel(400, 10), Rgb([0, 0, 0]));

  let json: serde_json::Value =
    serde_json::from_slice(&std::fs::read(&out_json).unwrap()).unwrap();
  assert_eq!(json["detections"].as_array().unwrap().len(), 1);
  assert_eq!(json["labels"][1], "dog");
}

#[test]
fn failures_do_not_poison_later_requests() {
  let dir = tempdir().unwrap();
  let ws = dir.path();
  let capture = write_capture(ws);
  let labels = write_labels(ws);
  let good = write_image(ws, "good.png", 64, 64);

  let builder = DetectorBuilder::from_url(&model_url(&capture, &labels)).unwrap();
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  viewer.open_image(&good).unwrap();
  assert!(viewer.current().is_some());

  let err = viewer.open_image(ws.join("missing.png")).unwrap_err();
  assert!(matches!(err, ViewerError::Input(_)));
  assert!(viewer.current().is_none());

  viewer.open_image(&good).unwrap();
  assert_eq!(viewer.current().unwrap().result.detections.len(), 1);
}

#[test]
fn truncated_capture_is_a_decode_failure() {
  let dir = tempdir().unwrap();
  let ws = dir.path();
  let capture = ws.join("short.bin");
  std::fs::write(&capture, [0u8; 16]).unwrap();
  let labels = write_labels(ws);
  let image = write_image(ws, "input.png", 32, 32);

  let builder = DetectorBuilder::from_url(&model_url(&capture, &labels)).unwrap();
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  let err = viewer.open_image(&image).unwrap_err();
  assert!(matches!(err, ViewerError::Decode(_)));
  assert!(viewer.current().is_none());
}

#[test]
fn missing_capture_is_an_accelerator_failure() {
  let dir = tempdir().unwrap();
  let ws = dir.path();
  let labels = write_labels(ws);
  let image = write_image(ws, "input.png", 32, 32);

  let builder =
    DetectorBuilder::from_url(&model_url(&ws.join("absent.bin"), &labels)).unwrap();
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  assert!(matches!(
    viewer.open_image(&image),
    Err(ViewerError::Accelerator(_))
  ));
}

#[test]
fn slow_accelerator_times_out_at_wait() {
  let dir = tempdir().unwrap();
  let ws = dir.path();
  let capture = write_capture(ws);
  let labels = write_labels(ws);
  let image = write_image(ws, "input.png", 32, 32);

  let mut url = model_url(&capture, &labels);
  url
    .query_pairs_mut()
    .append_pair("latency_ms", "200")
    .append_pair("timeout_ms", "10");
  let builder = DetectorBuilder::from_url(&url).unwrap();
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  let err = viewer.open_image(&image).unwrap_err();
  assert!(matches!(err, ViewerError::Accelerator(ref e) if e.stage == SessionStage::Wait));
  assert!(viewer.current().is_none());
}

#[test]
fn failed_output_does_not_stop_later_images() {
  let dir = tempdir().unwrap();
  let ws = dir.path();
  let capture = write_capture(ws);
  let labels = write_labels(ws);
  let image = write_image(ws, "input.png", 32, 32);

  let builder = DetectorBuilder::from_url(&model_url(&capture, &labels)).unwrap();
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  // 父路径是普通文件，无法创建输出目录
  let blocked = ws.join("input.png").join("overlay.png");
  let out_json = ws.join("result.json");
  let outputs = [
    OutputWrapper::from_url(&Url::parse(&format!("image://{}", blocked.display())).unwrap())
      .unwrap(),
    OutputWrapper::from_url(&Url::parse(&format!("json://{}", out_json.display())).unwrap())
      .unwrap(),
  ];

  viewer.open_image(&image).unwrap();
  let err = viewer.present(&outputs).unwrap_err();
  assert!(matches!(err, ViewerError::Output(_)));
  assert!(out_json.exists());
  assert!(viewer.current().is_some());

  std::fs::remove_file(&out_json).unwrap();
  viewer.open_image(&image).unwrap();
  viewer.present(&outputs[1..]).unwrap();
  assert!(out_json.exists());
}

// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/bin/nms_viewer.rs - 打开图像、推理并输出叠加结果
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

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use nms_viewer::{
  FromUrl, FromUrlWithScheme,
  input::ImageFileInput,
  model::DetectorBuilder,
  output::OutputWrapper,
  viewer::Viewer,
};

/// NmsViewer 参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL, 例如 replay:///data/capture.bin?classes=80&max_boxes=100
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像, 例如 image:///data/dog.jpg；可重复
  #[arg(long, value_name = "SOURCE", required = true)]
  pub input: Vec<Url>,
  /// 输出, 例如 image:///tmp/out.png?width=800&height=600 或 json:///tmp/out.json；可重复
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  let builder = DetectorBuilder::from_url(&args.model)?;
  let shape = builder.config().input_shape;
  let mut viewer = Viewer::new(builder.build(), shape);

  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;
  if outputs.is_empty() {
    warn!("未指定输出, 仅打印检测结果");
  }

  let mut failures = 0usize;
  for input in &args.input {
    if input.scheme() != ImageFileInput::SCHEME {
      error!("不支持的输入: {}", input);
      failures += 1;
      continue;
    }

    let state = match viewer.open_image(input.path()) {
      Ok(state) => state,
      Err(e) => {
        error!("{}: {}", input, e);
        failures += 1;
        continue;
      }
    };

    for det in &state.result.detections {
      info!(
        "  - {}: {:.2}% at ({:.3}, {:.3}, {:.3}x{:.3})",
        state.result.label(det).unwrap_or("?"),
        det.confidence * 100.0,
        det.center_x,
        det.center_y,
        det.width,
        det.height
      );
    }

    if let Err(e) = viewer.present(&outputs) {
      error!("{}: {}", input, e);
      failures += 1;
    }
  }

  if failures == args.input.len() {
    bail!("所有输入均处理失败");
  }
  if failures > 0 {
    warn!("{} / {} 个输入处理失败", failures, args.input.len());
  }

  Ok(())
}

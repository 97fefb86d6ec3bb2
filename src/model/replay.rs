// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/model/replay.rs - 回放采集的加速器输出
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

use tracing::{debug, info, warn};

use crate::{
  config::ModelConfig,
  model::{
    NmsShape,
    session::{AcceleratorBackend, AcceleratorError, InferenceSession, RawOutput, SessionStage},
  },
};

const REPLAY_STATUS_IO: i32 = 1;
const REPLAY_STATUS_INVALID_ARGUMENT: i32 = 2;
const REPLAY_STATUS_TIMEOUT: i32 = 4;
const REPLAY_STATUS_RELEASED: i32 = 5;

/// 从文件读取一次采集到的原始 NMS 输出，每次推理都返回同一缓冲区。
///
/// `latency` 模拟设备完成推理所需的时间，超过等待时限时在等待阶段失败。
#[derive(Debug, Clone, Default)]
pub struct ReplayBackend {
  latency: Duration,
}

impl ReplayBackend {
  pub const SCHEME: &'static str = "replay";

  pub fn with_latency(latency: Duration) -> Self {
    Self { latency }
  }
}

pub struct ReplaySession {
  capture: Option<Vec<u8>>,
  shape: NmsShape,
  input_size: usize,
  latency: Duration,
}

impl AcceleratorBackend for ReplayBackend {
  type Session = ReplaySession;

  fn open(&self, config: &ModelConfig) -> Result<Self::Session, AcceleratorError> {
    info!("加载回放文件: {}", config.model_path.display());
    let capture = std::fs::read(&config.model_path).map_err(|e| {
      AcceleratorError::new(
        SessionStage::LoadModel,
        e.raw_os_error().unwrap_or(REPLAY_STATUS_IO),
        format!("无法读取 {}: {}", config.model_path.display(), e),
      )
    })?;
    debug!("回放文件大小: {} 字节", capture.len());

    Ok(ReplaySession {
      capture: Some(capture),
      shape: config.nms_shape,
      input_size: config.input_shape.frame_size(),
      latency: self.latency,
    })
  }
}

impl InferenceSession for ReplaySession {
  fn run_inference(
    &mut self,
    input: &[u8],
    timeout: Duration,
  ) -> Result<RawOutput, AcceleratorError> {
    if input.len() != self.input_size {
      return Err(AcceleratorError::new(
        SessionStage::BindBuffers,
        REPLAY_STATUS_INVALID_ARGUMENT,
        format!(
          "输入缓冲区大小 {} 与模型输入 {} 不一致",
          input.len(),
          self.input_size
        ),
      ));
    }

    let buffer = self.capture.clone().ok_or_else(|| {
      AcceleratorError::new(SessionStage::Submit, REPLAY_STATUS_RELEASED, "会话已释放")
    })?;

    if self.latency > timeout {
      std::thread::sleep(timeout);
      warn!("回放延迟 {:?} 超过等待时限 {:?}", self.latency, timeout);
      return Err(AcceleratorError::new(
        SessionStage::Wait,
        REPLAY_STATUS_TIMEOUT,
        "等待推理结果超时",
      ));
    }
    if !self.latency.is_zero() {
      std::thread::sleep(self.latency);
    }

    Ok(RawOutput {
      buffer,
      shape: self.shape,
    })
  }

  fn release(&mut self) {
    self.capture = None;
  }
}

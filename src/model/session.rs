// 该文件是 NmsViewer （夜观） 项目的一部分。
// src/model/session.rs - 加速器推理会话约定
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

use std::{fmt, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

use crate::{config::ModelConfig, model::NmsShape};

/// 会话生命周期阶段，仅用于错误报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
  OpenDevice,
  LoadModel,
  Configure,
  BindBuffers,
  Submit,
  Wait,
}

impl fmt::Display for SessionStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SessionStage::OpenDevice => "打开设备",
      SessionStage::LoadModel => "加载模型",
      SessionStage::Configure => "配置模型",
      SessionStage::BindBuffers => "绑定缓冲区",
      SessionStage::Submit => "提交推理",
      SessionStage::Wait => "等待推理",
    };
    f.write_str(name)
  }
}

/// 加速器错误：状态码只区分成功与失败，不做进一步解释
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("加速器错误 ({stage}), status={status}: {message}")]
pub struct AcceleratorError {
  pub stage: SessionStage,
  pub status: i32,
  pub message: String,
}

impl AcceleratorError {
  pub fn new(stage: SessionStage, status: i32, message: impl Into<String>) -> Self {
    Self {
      stage,
      status,
      message: message.into(),
    }
  }
}

/// 加速器返回的原始输出以及其 NMS 形状
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  pub buffer: Vec<u8>,
  pub shape: NmsShape,
}

pub trait InferenceSession {
  /// 阻塞执行一次推理，超过 `timeout` 视为失败
  fn run_inference(&mut self, input: &[u8], timeout: Duration)
  -> Result<RawOutput, AcceleratorError>;

  /// 释放设备、模型与绑定的缓冲区
  fn release(&mut self);
}

pub trait AcceleratorBackend {
  type Session: InferenceSession;

  fn open(&self, config: &ModelConfig) -> Result<Self::Session, AcceleratorError>;
}

/// 作用域内持有会话，离开作用域（包括错误与 panic 路径）时释放
pub struct SessionGuard<S: InferenceSession> {
  session: S,
}

impl<S: InferenceSession> SessionGuard<S> {
  pub fn open<B>(backend: &B, config: &ModelConfig) -> Result<Self, AcceleratorError>
  where
    B: AcceleratorBackend<Session = S>,
  {
    debug!("打开加速器会话");
    let session = backend.open(config)?;
    info!("加速器会话已就绪");
    Ok(Self { session })
  }

  pub fn run_inference(
    &mut self,
    input: &[u8],
    timeout: Duration,
  ) -> Result<RawOutput, AcceleratorError> {
    self.session.run_inference(input, timeout)
  }
}

impl<S: InferenceSession> Drop for SessionGuard<S> {
  fn drop(&mut self) {
    self.session.release();
    debug!("加速器会话已释放");
  }
}

#[cfg(test)]
pub(crate) mod mock {
  use std::{
    cell::Cell,
    rc::Rc,
    time::Duration,
  };

  use super::*;

  /// 记录打开与释放次数的测试后端
  #[derive(Clone)]
  pub struct MockBackend {
    pub response: Result<RawOutput, AcceleratorError>,
    pub fail_open: bool,
    pub opened: Rc<Cell<usize>>,
    pub released: Rc<Cell<usize>>,
  }

  impl MockBackend {
    pub fn returning(response: Result<RawOutput, AcceleratorError>) -> Self {
      Self {
        response,
        fail_open: false,
        opened: Rc::new(Cell::new(0)),
        released: Rc::new(Cell::new(0)),
      }
    }
  }

  pub struct MockSession {
    response: Result<RawOutput, AcceleratorError>,
    released: Rc<Cell<usize>>,
  }

  impl InferenceSession for MockSession {
    fn run_inference(
      &mut self,
      _input: &[u8],
      _timeout: Duration,
    ) -> Result<RawOutput, AcceleratorError> {
      self.response.clone()
    }

    fn release(&mut self) {
      self.released.set(self.released.get() + 1);
    }
  }

  impl AcceleratorBackend for MockBackend {
    type Session = MockSession;

    fn open(&self, _config: &ModelConfig) -> Result<Self::Session, AcceleratorError> {
      if self.fail_open {
        return Err(AcceleratorError::new(
          SessionStage::OpenDevice,
          8,
          "no device",
        ));
      }
      self.opened.set(self.opened.get() + 1);
      Ok(MockSession {
        response: self.response.clone(),
        released: self.released.clone(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{mock::MockBackend, *};
  use crate::{FromUrl, config::ModelConfig};

  fn config() -> ModelConfig {
    ModelConfig::from_url(&url::Url::parse("mock:///model?classes=1&max_boxes=1").unwrap())
      .unwrap()
  }

  #[test]
  fn guard_releases_on_success_and_error() {
    let config = config();
    let backend = MockBackend::returning(Err(AcceleratorError::new(
      SessionStage::Wait,
      4,
      "timeout",
    )));

    {
      let mut guard = SessionGuard::open(&backend, &config).unwrap();
      let err = guard.run_inference(&[], Duration::from_secs(1)).unwrap_err();
      assert_eq!(err.stage, SessionStage::Wait);
      assert_eq!(backend.released.get(), 0);
    }
    assert_eq!(backend.opened.get(), 1);
    assert_eq!(backend.released.get(), 1);
  }

  #[test]
  fn failed_open_has_nothing_to_release() {
    let mut backend = MockBackend::returning(Ok(RawOutput {
      buffer: Vec::new(),
      shape: NmsShape::new(1, 1),
    }));
    backend.fail_open = true;
    let err = SessionGuard::open(&backend, &config()).err().unwrap();
    assert_eq!(err.stage, SessionStage::OpenDevice);
    assert_eq!(backend.released.get(), 0);
  }

  #[test]
  fn error_message_names_stage_and_status() {
    let err = AcceleratorError::new(SessionStage::BindBuffers, 6, "bad buffer");
    let text = err.to_string();
    assert!(text.contains("绑定缓冲区"));
    assert!(text.contains("status=6"));
    assert!(text.contains("bad buffer"));
  }
}

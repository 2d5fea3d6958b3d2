//! Mock 串口后端
//!
//! 每次 `send` 把请求交给应答闭包，闭包返回的字节进入接收队列。
//! 已发送的帧记录在共享的 [`Transcript`] 中，测试可在通道被移交后继续检查。

use crate::{SerialChannel, SerialError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// 已发送帧的共享记录
#[derive(Clone, Default)]
pub struct Transcript {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transcript {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

pub struct MockChannel {
    responder: Responder,
    rx: VecDeque<u8>,
    transcript: Transcript,
    fail_open: bool,
    open: bool,
}

impl MockChannel {
    /// 使用应答闭包创建；闭包返回 `None` 表示设备不应答
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            rx: VecDeque::new(),
            transcript: Transcript::default(),
            fail_open: false,
            open: false,
        }
    }

    /// 从不应答的设备
    pub fn silent() -> Self {
        Self::new(|_| None)
    }

    /// `open()` 总是失败的设备
    pub fn failing_open() -> Self {
        let mut ch = Self::silent();
        ch.fail_open = true;
        ch
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// 直接向接收队列注入字节（模拟线上残留）
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl SerialChannel for MockChannel {
    fn open(&mut self) -> Result<(), SerialError> {
        if self.fail_open {
            return Err(SerialError::Device("mock device unavailable".into()));
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SerialError> {
        if !self.open {
            return Err(SerialError::NotOpen);
        }
        self.transcript.sent.lock().push(data.to_vec());
        if let Some(reply) = (self.responder)(data) {
            self.rx.extend(reply);
        }
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<(), SerialError> {
        if !self.open {
            return Err(SerialError::NotOpen);
        }
        let expected = buf.len();
        let available = self.rx.len().min(expected);
        for slot in buf.iter_mut().take(available) {
            // available <= rx.len()
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        if available < expected {
            return Err(SerialError::Timeout {
                received: available,
                expected,
            });
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.rx.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        String::from("mock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_responder() {
        let mut ch = MockChannel::new(|req| Some(req.to_vec()));
        let transcript = ch.transcript();
        ch.open().unwrap();
        ch.send(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 3];
        ch.receive_exact(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(transcript.sent(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_partial_reply_times_out() {
        let mut ch = MockChannel::new(|_| Some(vec![0xAA, 0xBB]));
        ch.open().unwrap();
        ch.send(&[0]).unwrap();

        let mut buf = [0u8; 8];
        let err = ch.receive_exact(&mut buf, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            SerialError::Timeout {
                received: 2,
                expected: 8
            }
        ));
    }

    #[test]
    fn test_requires_open() {
        let mut ch = MockChannel::silent();
        assert!(matches!(ch.send(&[0]), Err(SerialError::NotOpen)));
        assert!(MockChannel::failing_open().open().is_err());
    }

    #[test]
    fn test_clear_input_drops_stale_bytes() {
        let mut ch = MockChannel::silent();
        ch.open().unwrap();
        ch.inject(&[9, 9, 9]);
        ch.clear_input().unwrap();
        let mut buf = [0u8; 1];
        assert!(ch.receive_exact(&mut buf, Duration::ZERO).is_err());
    }
}

//! 段控制器系统状态
//!
//! 只由 [`Dispatcher`](crate::Dispatcher) 在其互斥锁内修改。

use segment_protocol::{ErrorCode, Mode, SEGMENT_BROADCAST, SEGMENT_UNCONFIGURED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemState {
    /// 本段 ID（启动时设置一次）
    pub segment_id: u8,
    pub mode: Mode,
    /// 急停锁存：置位后保持，直到 SetMode=Operation 清除
    pub estop_active: bool,
    /// 累计错误数（回绕）
    pub error_count: u16,
    pub last_error: ErrorCode,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            segment_id: SEGMENT_UNCONFIGURED,
            mode: Mode::Idle,
            estop_active: false,
            error_count: 0,
            last_error: ErrorCode::NoError,
        }
    }
}

impl SystemState {
    pub fn new(segment_id: u8) -> Self {
        Self {
            segment_id,
            ..Default::default()
        }
    }

    /// 目标段是否指向本节点（广播或本段 ID）
    pub fn is_addressed(&self, target: u8) -> bool {
        target == SEGMENT_BROADCAST || target == self.segment_id
    }

    pub fn record_error(&mut self, code: ErrorCode) {
        self.error_count = self.error_count.wrapping_add(1);
        self.last_error = code;
    }

    pub fn trigger_estop(&mut self) {
        self.estop_active = true;
        self.mode = Mode::Idle;
    }

    /// 切换模式；进入 Operation 时清除急停锁存
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode == Mode::Operation {
            self.estop_active = false;
        }
    }
}

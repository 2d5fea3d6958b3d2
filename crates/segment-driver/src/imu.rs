//! 姿态数据发布
//!
//! 单一写者（[`ImuUpdater`]）周期性地读取传感器、更新滤波器，并把结果作为
//! 一个完整快照原子发布；遥测线程通过 [`ImuState::snapshot`] 无锁读取，
//! 不会看到新旧混合的 roll/pitch/yaw。

use crate::ahrs::{EulerAngles, MadgwickFilter};
use crate::{DriverError, uptime_ms};
use arc_swap::ArcSwap;
use nalgebra::Vector3;
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 一次传感器采样（SI 单位）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// m/s²
    pub accel: Vector3<f32>,
    /// rad/s
    pub gyro: Vector3<f32>,
}

/// 姿态快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSnapshot {
    pub accel: Vector3<f32>,
    pub gyro: Vector3<f32>,
    pub orientation: EulerAngles,
    /// 传感器是否正常工作
    pub valid: bool,
    /// 最近一次更新（开机后毫秒）
    pub last_update_ms: u32,
}

impl Default for ImuSnapshot {
    fn default() -> Self {
        Self {
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
            orientation: EulerAngles::default(),
            valid: false,
            last_update_ms: 0,
        }
    }
}

/// 共享姿态状态（读写分离，读端无锁）
#[derive(Clone)]
pub struct ImuState {
    inner: Arc<ArcSwap<ImuSnapshot>>,
}

impl Default for ImuState {
    fn default() -> Self {
        Self::new()
    }
}

impl ImuState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(ImuSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> ImuSnapshot {
        *self.inner.load().as_ref()
    }

    /// 有效时返回姿态，否则 `None`
    pub fn orientation(&self) -> Option<EulerAngles> {
        let snap = self.inner.load();
        snap.valid.then_some(snap.orientation)
    }

    pub fn is_valid(&self) -> bool {
        self.inner.load().valid
    }

    pub fn publish(&self, snapshot: ImuSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }

    /// 保留最后一次数据，只清除 `valid`
    pub fn mark_invalid(&self) {
        let mut snap = self.snapshot();
        snap.valid = false;
        self.publish(snap);
    }
}

/// 惯性传感器（外部协作者）
pub trait SensorSource: Send {
    fn read(&mut self) -> Result<ImuSample, DriverError>;
}

/// 静止传感器：重力沿 +Z，无角速度
///
/// 无硬件时用于驱动滤波器。
#[derive(Debug, Clone, Copy, Default)]
pub struct StationarySource;

impl SensorSource for StationarySource {
    fn read(&mut self) -> Result<ImuSample, DriverError> {
        Ok(ImuSample {
            accel: Vector3::new(0.0, 0.0, 9.81),
            gyro: Vector3::zeros(),
        })
    }
}

/// 读取 → 滤波 → 发布
pub struct ImuUpdater<S: SensorSource> {
    source: S,
    filter: MadgwickFilter,
    state: ImuState,
    start: Instant,
}

impl<S: SensorSource> ImuUpdater<S> {
    pub fn new(source: S, filter: MadgwickFilter, state: ImuState, start: Instant) -> Self {
        Self {
            source,
            filter,
            state,
            start,
        }
    }

    pub fn state(&self) -> &ImuState {
        &self.state
    }

    pub fn filter(&self) -> &MadgwickFilter {
        &self.filter
    }

    /// 处理一个样本
    ///
    /// 读取失败时把状态标记为无效并返回错误；滤波器状态保持不变。
    pub fn step(&mut self) -> Result<ImuSnapshot, DriverError> {
        let sample = match self.source.read() {
            Ok(sample) => sample,
            Err(e) => {
                if self.state.is_valid() {
                    warn!("IMU sample read failed: {}", e);
                }
                self.state.mark_invalid();
                return Err(e);
            },
        };

        self.filter.update(sample.gyro, sample.accel);
        let snapshot = ImuSnapshot {
            accel: sample.accel,
            gyro: sample.gyro,
            orientation: self.filter.euler(),
            valid: true,
            last_update_ms: uptime_ms(self.start),
        };
        self.state.publish(snapshot);
        Ok(snapshot)
    }

    /// 以滤波器采样频率循环，直到 `running` 被清除
    pub fn run(&mut self, running: &AtomicBool) {
        let period = Duration::from_secs_f32(1.0 / self.filter.sample_freq());
        let sleeper = SpinSleeper::default();
        info!(
            "IMU loop started at {:.1} Hz (beta {:.2})",
            self.filter.sample_freq(),
            self.filter.beta()
        );

        while running.load(Ordering::Relaxed) {
            let tick = Instant::now();
            // 失败已在 step 中记录
            let _ = self.step();
            let elapsed = tick.elapsed();
            if elapsed < period {
                sleeper.sleep(period - elapsed);
            }
        }

        info!("IMU loop stopped");
    }
}

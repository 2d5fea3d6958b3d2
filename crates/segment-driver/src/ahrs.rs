//! Madgwick 姿态估计（陀螺仪 + 加速度计，无磁力计）
//!
//! 单位四元数从单位姿态开始，每个样本更新一次：
//! 1. 由陀螺仪角速度计算四元数导数
//! 2. 加速度计非零时，用梯度下降校正项把“上”方向拉向实测重力（增益 `beta`）
//! 3. 以固定步长 `1 / sample_freq` 积分，再归一化
//!
//! 没有磁参考，yaw 只有陀螺积分，会无界漂移。

use nalgebra::{Quaternion, Vector3};
use std::f32::consts::FRAC_PI_2;

/// 归一化阈值（模平方），低于此值视为退化
const NORM_SQ_THRESHOLD: f32 = 1e-12;

/// 欧拉角（弧度）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    /// 绕 X 轴
    pub roll: f32,
    /// 绕 Y 轴，范围 [-π/2, π/2]
    pub pitch: f32,
    /// 绕 Z 轴
    pub yaw: f32,
}

#[derive(Debug, Clone)]
pub struct MadgwickFilter {
    q: Quaternion<f32>,
    beta: f32,
    sample_freq: f32,
}

impl MadgwickFilter {
    /// # 参数
    ///
    /// - `sample_freq`: 采样频率 (Hz)，必须为正
    /// - `beta`: 滤波增益，通常 0.1 ~ 0.5，越大收敛越快、噪声越大
    pub fn new(sample_freq: f32, beta: f32) -> Self {
        Self {
            q: Quaternion::identity(),
            beta,
            sample_freq,
        }
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        self.q
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn sample_freq(&self) -> f32 {
        self.sample_freq
    }

    /// 恢复单位姿态
    pub fn reset(&mut self) {
        self.q = Quaternion::identity();
    }

    /// 用一个样本更新姿态
    ///
    /// - `gyro`: 角速度 (rad/s)
    /// - `accel`: 加速度（任意单位，内部归一化）；恰好全零时跳过校正
    pub fn update(&mut self, gyro: Vector3<f32>, accel: Vector3<f32>) {
        let (q0, q1, q2, q3) = (self.q.w, self.q.i, self.q.j, self.q.k);
        let (gx, gy, gz) = (gyro.x, gyro.y, gyro.z);

        let mut q_dot = [
            0.5 * (-q1 * gx - q2 * gy - q3 * gz),
            0.5 * (q0 * gx + q2 * gz - q3 * gy),
            0.5 * (q0 * gy - q1 * gz + q3 * gx),
            0.5 * (q0 * gz + q1 * gy - q2 * gx),
        ];

        if accel != Vector3::zeros() {
            let a = accel.normalize();
            let (ax, ay, az) = (a.x, a.y, a.z);

            let two_q0 = 2.0 * q0;
            let two_q1 = 2.0 * q1;
            let two_q2 = 2.0 * q2;
            let two_q3 = 2.0 * q3;
            let four_q0 = 4.0 * q0;
            let four_q1 = 4.0 * q1;
            let four_q2 = 4.0 * q2;
            let eight_q1 = 8.0 * q1;
            let eight_q2 = 8.0 * q2;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            let mut s = [
                four_q0 * q2q2 + two_q2 * ax + four_q0 * q1q1 - two_q1 * ay,
                four_q1 * q3q3 - two_q3 * ax + 4.0 * q0q0 * q1 - two_q0 * ay - four_q1
                    + eight_q1 * q1q1
                    + eight_q1 * q2q2
                    + four_q1 * az,
                4.0 * q0q0 * q2 + two_q0 * ax + four_q2 * q3q3 - two_q3 * ay - four_q2
                    + eight_q2 * q1q1
                    + eight_q2 * q2q2
                    + four_q2 * az,
                4.0 * q1q1 * q3 - two_q1 * ax + 4.0 * q2q2 * q3 - two_q2 * ay,
            ];

            // 已对齐重力时梯度为零，没有校正量
            let norm_sq: f32 = s.iter().map(|v| v * v).sum();
            if norm_sq > NORM_SQ_THRESHOLD {
                let recip = norm_sq.sqrt().recip();
                for (dot, step) in q_dot.iter_mut().zip(s.iter_mut()) {
                    *step *= recip;
                    *dot -= self.beta * *step;
                }
            }
        }

        let dt = 1.0 / self.sample_freq;
        let next = Quaternion::new(
            q0 + q_dot[0] * dt,
            q1 + q_dot[1] * dt,
            q2 + q_dot[2] * dt,
            q3 + q_dot[3] * dt,
        );

        if next.norm_squared() < NORM_SQ_THRESHOLD || !next.norm_squared().is_finite() {
            tracing::warn!(
                "Degenerate attitude quaternion ({:.3}, {:.3}, {:.3}, {:.3}), resetting to identity",
                next.w,
                next.i,
                next.j,
                next.k
            );
            self.q = Quaternion::identity();
        } else {
            self.q = next.normalize();
        }
    }

    /// 四元数 → 欧拉角（roll/pitch/yaw）
    ///
    /// pitch 的正弦项 |sinp| ≥ 1 时钳位到 ±π/2，结果总是有限值。
    pub fn euler(&self) -> EulerAngles {
        let (q0, q1, q2, q3) = (self.q.w, self.q.i, self.q.j, self.q.k);

        let sinr_cosp = 2.0 * (q0 * q1 + q2 * q3);
        let cosr_cosp = 1.0 - 2.0 * (q1 * q1 + q2 * q2);
        let roll = sinr_cosp.atan2(cosr_cosp);

        let sinp = 2.0 * (q0 * q2 - q3 * q1);
        let pitch = if sinp.abs() >= 1.0 {
            FRAC_PI_2.copysign(sinp)
        } else {
            sinp.asin()
        };

        let siny_cosp = 2.0 * (q0 * q3 + q1 * q2);
        let cosy_cosp = 1.0 - 2.0 * (q2 * q2 + q3 * q3);
        let yaw = siny_cosp.atan2(cosy_cosp);

        EulerAngles { roll, pitch, yaw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn test_starts_at_identity() {
        let filter = MadgwickFilter::new(100.0, 0.1);
        assert_eq!(filter.quaternion(), Quaternion::identity());
        assert_eq!(filter.euler(), EulerAngles::default());
    }

    #[test]
    fn test_zero_accel_skips_correction() {
        // 纯陀螺积分：绕 Z 轴 1 rad/s，100 Hz，1 秒
        let mut filter = MadgwickFilter::new(100.0, 0.5);
        for _ in 0..100 {
            filter.update(Vector3::new(0.0, 0.0, 1.0), Vector3::zeros());
        }
        let e = filter.euler();
        assert!((e.yaw - 1.0).abs() < 0.01, "yaw = {}", e.yaw);
        assert!(e.roll.abs() < EPS && e.pitch.abs() < EPS);
    }

    #[test]
    fn test_unit_norm_after_update() {
        let mut filter = MadgwickFilter::new(100.0, 0.1);
        for i in 0..50 {
            let t = i as f32 * 0.1;
            filter.update(
                Vector3::new(t.sin(), 0.3, -0.2),
                Vector3::new(0.1, t.cos(), 9.81),
            );
            assert!((filter.quaternion().norm() - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_euler_pitch_clamped() {
        let mut filter = MadgwickFilter::new(100.0, 0.1);
        // 绕 Y 轴 90°：q = (cos45°, 0, sin45°, 0)，sinp 可能因舍入略大于 1
        let h = std::f32::consts::FRAC_1_SQRT_2;
        filter.q = Quaternion::new(h, 0.0, h, 0.0);
        let e = filter.euler();
        assert!(e.pitch.is_finite());
        assert!((e.pitch - FRAC_PI_2).abs() < 1e-3);

        filter.q = Quaternion::new(h, 0.0, -h, 0.0);
        assert!((filter.euler().pitch + FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn test_reset() {
        let mut filter = MadgwickFilter::new(50.0, 0.2);
        filter.update(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 1.0, 0.0));
        filter.reset();
        assert_eq!(filter.quaternion(), Quaternion::identity());
        assert_eq!(filter.sample_freq(), 50.0);
        assert_eq!(filter.beta(), 0.2);
    }
}

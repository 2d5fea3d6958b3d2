//! 姿态估计集成测试

use nalgebra::{Quaternion, Vector3};
use segment_driver::{ImuState, ImuUpdater, MadgwickFilter, StationarySource};
use std::time::Instant;

const EPS: f32 = 1e-4;

#[test]
fn test_level_and_still_stays_at_identity() {
    let mut filter = MadgwickFilter::new(100.0, 0.1);
    for _ in 0..1000 {
        filter.update(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let q = filter.quaternion();
        assert!((q.w - 1.0).abs() < EPS, "q = {:?}", q);
        assert!(q.i.abs() < EPS && q.j.abs() < EPS && q.k.abs() < EPS);
    }
    let e = filter.euler();
    assert!(e.roll.abs() < EPS && e.pitch.abs() < EPS && e.yaw.abs() < EPS);
}

#[test]
fn test_converges_back_to_level() {
    let mut filter = MadgwickFilter::new(100.0, 0.5);
    // 先用陀螺把姿态转离水平
    for _ in 0..20 {
        filter.update(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
    }
    assert!(filter.euler().roll.abs() > 0.1);

    for _ in 0..2000 {
        filter.update(Vector3::zeros(), Vector3::new(0.0, 0.0, 9.81));
    }
    let e = filter.euler();
    assert!(e.roll.abs() < 0.02, "roll = {}", e.roll);
    assert!(e.pitch.abs() < 0.02, "pitch = {}", e.pitch);
}

#[test]
fn test_tilted_gravity_estimates_pitch() {
    let mut filter = MadgwickFilter::new(100.0, 0.5);
    // 绕 Y 轴倾斜 30°：机体系重力 = (-sin θ, 0, cos θ)
    let theta = 30f32.to_radians();
    for _ in 0..3000 {
        filter.update(
            Vector3::zeros(),
            Vector3::new(-theta.sin(), 0.0, theta.cos()),
        );
    }
    let e = filter.euler();
    assert!((e.pitch - theta).abs() < 0.02, "pitch = {}", e.pitch);
    assert!(e.roll.abs() < 0.02);
}

#[test]
fn test_euler_finite_at_vertical() {
    // 加速度完全沿 ±X：归一化竖直分量为 ±1
    for sign in [1.0f32, -1.0] {
        let mut filter = MadgwickFilter::new(100.0, 0.5);
        for _ in 0..5000 {
            filter.update(Vector3::zeros(), Vector3::new(sign, 0.0, 0.0));
            let e = filter.euler();
            assert!(e.roll.is_finite() && e.pitch.is_finite() && e.yaw.is_finite());
        }
        let pitch = filter.euler().pitch;
        assert!(pitch.abs() <= std::f32::consts::FRAC_PI_2);
        assert!(pitch.abs() > 1.4, "pitch = {}", pitch);
    }
}

#[test]
fn test_updater_with_stationary_source() {
    let state = ImuState::new();
    let mut updater = ImuUpdater::new(
        StationarySource,
        MadgwickFilter::new(100.0, 0.1),
        state.clone(),
        Instant::now(),
    );
    for _ in 0..100 {
        updater.step().unwrap();
    }
    let orientation = state.orientation().unwrap();
    assert!(orientation.roll.abs() < EPS);
    assert!(orientation.pitch.abs() < EPS);
    assert!(orientation.yaw.abs() < EPS);
    assert_eq!(updater.filter().quaternion(), Quaternion::identity());
}

//! 段控制器主体
//!
//! 线程布局：
//! - `tcp_accept`：接受连接，每个连接一个 `tcp_conn` 线程读取并调度命令
//! - `udp_receive`：每个数据报调度一次，并记住最近的对端
//! - `motor_state`：按 `motor_state_hz` 向最近的 UDP 对端发送 MotorState
//! - `diagnostics`：按 `diagnostics_hz` 向所有 TCP 客户端写 Diagnostics
//! - `imu`：姿态估计循环

use crate::stream::{Chunk, FrameAssembler};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use segment_driver::{
    ControllerConfig, Dispatcher, ImuState, ImuUpdater, MadgwickFilter, MotorTransportRegistry,
    StationarySource,
};
use spin_sleep::SpinSleeper;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 套接字读超时，决定关闭时的响应延迟
const SOCKET_POLL: Duration = Duration::from_millis(100);

/// 无新连接时的 accept 轮询间隔
const ACCEPT_POLL: Duration = Duration::from_millis(50);

type ClientList = Arc<Mutex<Vec<(SocketAddr, TcpStream)>>>;

pub struct Controller {
    config: ControllerConfig,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    start: Instant,
    tcp_clients: ClientList,
    udp_peer: Arc<Mutex<Option<SocketAddr>>>,
}

impl Controller {
    pub fn new(config: ControllerConfig, running: Arc<AtomicBool>) -> Self {
        let start = Instant::now();
        let dispatcher = Dispatcher::with_start(config.segment_id, ImuState::new(), start);
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            running,
            start,
            tcp_clients: Arc::new(Mutex::new(Vec::new())),
            udp_peer: Arc::new(Mutex::new(None)),
        }
    }

    /// 启动所有线程并阻塞到 `running` 被清除
    pub fn run(self) -> Result<()> {
        let net = &self.config.network;
        info!(
            "Segment controller starting (segment {}, {} motor(s))",
            self.config.segment_id,
            self.config.motors.len()
        );

        let motors = self.bring_up_motors();

        let tcp_addr = format!("{}:{}", net.bind_addr, net.tcp_port);
        let listener = TcpListener::bind(&tcp_addr)
            .with_context(|| format!("Failed to bind TCP listener on {}", tcp_addr))?;
        listener.set_nonblocking(true)?;
        info!("TCP command listener on {}", tcp_addr);

        let udp_addr = format!("{}:{}", net.bind_addr, net.udp_port);
        let udp = UdpSocket::bind(&udp_addr)
            .with_context(|| format!("Failed to bind UDP socket on {}", udp_addr))?;
        udp.set_read_timeout(Some(SOCKET_POLL))?;
        info!("UDP command socket on {}", udp_addr);

        let mut handles = Vec::new();
        handles.push(self.spawn_imu()?);
        handles.push(self.spawn_tcp_accept(listener)?);
        handles.push(self.spawn_udp_receive(udp.try_clone()?)?);
        handles.push(self.spawn_motor_state(udp)?);
        handles.push(self.spawn_diagnostics()?);

        for handle in handles {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }

        // 断开残留的 TCP 连接
        self.tcp_clients.lock().clear();
        drop(motors);
        info!(
            "Segment controller stopped after {:.1}s",
            self.start.elapsed().as_secs_f32()
        );
        Ok(())
    }

    /// 逐个初始化电机驱动器，失败不阻止启动
    fn bring_up_motors(&self) -> MotorTransportRegistry {
        let registry = MotorTransportRegistry::from_config(&self.config.motors);
        if registry.is_empty() {
            info!("No motor drivers configured");
            return registry;
        }

        let report = registry.init_all();
        for (name, err) in report.failures() {
            error!("{}: bring-up failed: {}", name, err);
        }
        if report.all_ok() {
            info!("All {} motor driver(s) ready", registry.len());
        } else {
            warn!(
                "{}/{} motor driver(s) ready",
                report.ready_count(),
                registry.len()
            );
        }
        registry
    }

    fn spawn_imu(&self) -> Result<JoinHandle<()>> {
        let filter = MadgwickFilter::new(self.config.imu.sample_freq_hz, self.config.imu.beta);
        let state = self.dispatcher.imu().clone();
        let start = self.start;
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("imu".into())
            .spawn(move || {
                let mut updater = ImuUpdater::new(StationarySource, filter, state, start);
                updater.run(&running);
            })
            .context("Failed to spawn IMU thread")?;
        Ok(handle)
    }

    fn spawn_tcp_accept(&self, listener: TcpListener) -> Result<JoinHandle<()>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let clients = Arc::clone(&self.tcp_clients);

        let handle = thread::Builder::new()
            .name("tcp_accept".into())
            .spawn(move || tcp_accept_loop(listener, dispatcher, running, clients))
            .context("Failed to spawn TCP accept thread")?;
        Ok(handle)
    }

    fn spawn_udp_receive(&self, socket: UdpSocket) -> Result<JoinHandle<()>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let peer = Arc::clone(&self.udp_peer);

        let handle = thread::Builder::new()
            .name("udp_receive".into())
            .spawn(move || udp_receive_loop(socket, dispatcher, running, peer))
            .context("Failed to spawn UDP receive thread")?;
        Ok(handle)
    }

    fn spawn_motor_state(&self, socket: UdpSocket) -> Result<JoinHandle<()>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let peer = Arc::clone(&self.udp_peer);
        let hz = self.config.network.motor_state_hz;

        let handle = thread::Builder::new()
            .name("motor_state".into())
            .spawn(move || {
                periodic(&running, hz, || {
                    let Some(addr) = *peer.lock() else {
                        return;
                    };
                    let frame = dispatcher.build_motor_state(dispatcher.segment_id());
                    if let Err(e) = socket.send_to(&frame, addr) {
                        debug!("MotorState send to {} failed: {}", addr, e);
                    }
                });
            })
            .context("Failed to spawn motor state thread")?;
        Ok(handle)
    }

    fn spawn_diagnostics(&self) -> Result<JoinHandle<()>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let clients = Arc::clone(&self.tcp_clients);
        let hz = self.config.network.diagnostics_hz;

        let handle = thread::Builder::new()
            .name("diagnostics".into())
            .spawn(move || {
                periodic(&running, hz, || {
                    let mut clients = clients.lock();
                    if clients.is_empty() {
                        return;
                    }
                    let frame = dispatcher.build_diagnostics(dispatcher.segment_id());
                    clients.retain_mut(|(addr, stream)| match stream.write_all(&frame) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("Dropping TCP client {}: {}", addr, e);
                            false
                        },
                    });
                });
            })
            .context("Failed to spawn diagnostics thread")?;
        Ok(handle)
    }
}

/// 以固定频率执行 `tick`，直到 `running` 被清除
fn periodic(running: &AtomicBool, hz: u32, mut tick: impl FnMut()) {
    let period = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));
    let sleeper = SpinSleeper::default();
    let mut next = Instant::now();

    while running.load(Ordering::Relaxed) {
        tick();
        next += period;
        let now = Instant::now();
        if next > now {
            // 分段睡眠，低频时也能及时退出
            let mut remaining = next - now;
            while remaining > Duration::ZERO && running.load(Ordering::Relaxed) {
                let step = remaining.min(SOCKET_POLL);
                sleeper.sleep(step);
                remaining -= step;
            }
        } else {
            // 落后时不追赶
            next = now;
        }
    }
}

fn tcp_accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    clients: ClientList,
) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = register_client(&stream, addr, &clients) {
                    warn!("Rejecting TCP client {}: {}", addr, e);
                    continue;
                }
                info!("TCP client connected: {}", addr);

                let dispatcher = Arc::clone(&dispatcher);
                let running = Arc::clone(&running);
                let clients = Arc::clone(&clients);
                let spawned = thread::Builder::new()
                    .name("tcp_conn".into())
                    .spawn(move || tcp_connection_loop(stream, addr, dispatcher, running, clients));
                if let Err(e) = spawned {
                    error!("Failed to spawn TCP connection thread for {}: {}", addr, e);
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!("TCP accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            },
        }
    }
}

fn register_client(
    stream: &TcpStream,
    addr: SocketAddr,
    clients: &ClientList,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(SOCKET_POLL))?;
    let writer = stream.try_clone()?;
    writer.set_write_timeout(Some(SOCKET_POLL))?;
    clients.lock().push((addr, writer));
    Ok(())
}

fn tcp_connection_loop(
    mut stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    clients: ClientList,
) {
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 512];

    while running.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => {
                assembler.push(&buf[..len]);
                dispatch_stream(&dispatcher, &mut assembler, addr);
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => {
                warn!("TCP read error from {}: {}", addr, e);
                break;
            },
        }
    }

    clients.lock().retain(|(peer, _)| *peer != addr);
    info!("TCP client disconnected: {}", addr);
}

fn udp_receive_loop(
    socket: UdpSocket,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
) {
    let mut buf = [0u8; 1024];

    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                let previous = peer.lock().replace(addr);
                if previous != Some(addr) {
                    info!("UDP telemetry peer: {}", addr);
                }
                dispatch(&dispatcher, &buf[..len], addr);
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
            Err(e) => {
                warn!("UDP recv error: {}", e);
                thread::sleep(SOCKET_POLL);
            },
        }
    }
}

/// 处理流中所有已完整的帧
///
/// 被拒绝的片段同样交给调度器，使其计入错误计数。
fn dispatch_stream(dispatcher: &Dispatcher, assembler: &mut FrameAssembler, from: SocketAddr) {
    while let Some(chunk) = assembler.next_chunk() {
        match chunk {
            Chunk::Frame(frame) => dispatch(dispatcher, &frame, from),
            Chunk::Rejected(bytes) => {
                debug!("Rejected {} byte(s) of stream data from {}", bytes.len(), from);
                dispatch(dispatcher, &bytes, from);
            },
        }
    }
    let discarded = assembler.take_discarded();
    if discarded > 0 {
        warn!("Discarded {} unframed byte(s) from {}", discarded, from);
    }
}

/// 两条投递路径共用；错误已由调度器记录
fn dispatch(dispatcher: &Dispatcher, frame: &[u8], from: SocketAddr) {
    if let Ok(command) = dispatcher.handle(frame) {
        debug!("{} from {}", command.name(), from);
    }
}

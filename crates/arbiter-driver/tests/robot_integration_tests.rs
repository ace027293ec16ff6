//! Robot 端到端集成测试
//!
//! 使用内存回环链路模拟控制器，验证读线程、控制周期与状态反映的完整流程。

use arbiter_action::behaviors::{ConstantVelocity, MovementParameters, MovementParams};
use arbiter_action::{BehaviorError, DesireSet, MAX_STRENGTH, RobotSnapshot, from_fn};
use arbiter_driver::{
    CycleConfig, CycleStatus, DriverError, HandlerOutcome, PacketClass, Robot, RobotBuilder,
    RobotConfig, RobotState, TickContext,
};
use arbiter_link::{MockLink, MockRemote};
use arbiter_protocol::{
    CMD_HEAD, CMD_SET_MAX_VEL, CMD_VEL, ID_STATUS_STOPPED, Packet, StatusPacket, decode_int_arg,
};
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn robot_with(cycle: CycleConfig) -> (Robot, MockRemote) {
    init_tracing();
    let (link, remote) = MockLink::pair();
    let robot = Robot::new(
        link,
        RobotConfig {
            cycle,
            ..Default::default()
        },
    )
    .unwrap();
    (robot, remote)
}

fn fast_cycles(max_cycles: u64) -> CycleConfig {
    CycleConfig {
        period_ms: 5,
        max_cycles: Some(max_cycles),
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_reflection_sends_velocity_every_tick_and_caps_once() {
    let (robot, mut remote) = robot_with(fast_cycles(3));
    robot.add_behavior(10, ConstantVelocity::new("cruise", 300.0));
    robot.add_behavior(
        20,
        MovementParameters::new(
            "params",
            MovementParams {
                max_vel: 200.0,
                ..Default::default()
            },
        ),
    );

    robot.run().unwrap();

    let packets = remote.drain_packets();
    let vel: Vec<_> = packets
        .iter()
        .filter(|p| p.id() == CMD_VEL)
        .map(|p| decode_int_arg(p).unwrap())
        .collect();
    assert_eq!(vel, [300, 300, 300]);

    let caps: Vec<_> = packets.iter().filter(|p| p.id() == CMD_SET_MAX_VEL).collect();
    assert_eq!(caps.len(), 1);
    assert_eq!(decode_int_arg(caps[0]), Some(200));

    let command = robot.motion_command();
    assert_eq!(command.cycle(), 3);
    assert_eq!(robot.metrics().cycles, 3);
    assert_eq!(robot.status(), CycleStatus::Stopped);
}

#[test]
fn test_status_packet_feeds_behaviors() {
    let (robot, mut remote) = robot_with(fast_cycles(1));
    robot.add_behavior(
        10,
        from_fn("turn", |_: &DesireSet, _: &RobotSnapshot| {
            let mut d = DesireSet::new();
            d.set_delta_heading(10.0, MAX_STRENGTH);
            Ok(d)
        }),
    );

    let status = StatusPacket {
        heading_deg: 90.0,
        ..Default::default()
    };
    remote.send_packet(&status.encode());
    assert!(wait_until(|| robot.state().status_packets == 1));

    robot.run().unwrap();

    let head = remote
        .wait_for_packet(Duration::from_secs(1), |p| p.id() == CMD_HEAD)
        .unwrap();
    assert_eq!(decode_int_arg(&head), Some(100));
}

#[test]
fn test_stop_on_disconnect_releases_all_waiters() {
    let (robot, mut remote) = robot_with(CycleConfig {
        period_ms: 10,
        max_cycles: None,
    });
    let robot = Arc::new(robot);
    robot.run_async().unwrap();
    assert!(robot.is_running());

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let robot = robot.clone();
            thread::spawn(move || robot.wait_for_stop(Some(Duration::from_secs(5))))
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    remote.disconnect();

    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
    assert_eq!(robot.status(), CycleStatus::Stopped);
    assert!(!robot.is_connected());
    assert!(matches!(robot.run_async(), Err(DriverError::Disconnected)));
}

#[test]
fn test_claim_conflict_through_robot() {
    let (robot, _remote) = robot_with(CycleConfig::default());
    let result = robot.claim_packet_id(ID_STATUS_STOPPED, |_: &Packet, _: &mut RobotState| {
        HandlerOutcome::Consumed
    });
    assert!(matches!(
        result,
        Err(DriverError::HandlerConflict {
            id: ID_STATUS_STOPPED
        })
    ));

    // 未认领的 ID 可以认领，注销后可以再次认领
    let handle = robot
        .claim_packet_id(0x90, |_: &Packet, _: &mut RobotState| HandlerOutcome::Consumed)
        .unwrap();
    assert!(robot.remove_packet_handler(handle));
    assert!(
        robot
            .claim_packet_id(0x90, |_: &Packet, _: &mut RobotState| HandlerOutcome::Consumed)
            .is_ok()
    );
}

#[test]
fn test_custom_handler_receives_packets() {
    let (robot, remote) = robot_with(CycleConfig::default());
    let count = Arc::new(AtomicUsize::new(0));
    {
        let count = count.clone();
        robot.add_packet_handler(PacketClass::Id(0x91), move |_: &Packet, _: &mut RobotState| {
            count.fetch_add(1, Ordering::SeqCst);
            HandlerOutcome::Consumed
        });
    }

    remote.send_packet(&Packet::empty(0x91));
    remote.send_packet(&Packet::empty(0x91));
    assert!(wait_until(|| count.load(Ordering::SeqCst) == 2));
    assert!(robot.is_responsive());
    assert_eq!(robot.metrics().packets_dispatched, 2);
}

#[test]
fn test_behavior_fault_is_isolated() {
    let (robot, _remote) = robot_with(fast_cycles(4));
    let fired = Arc::new(AtomicUsize::new(0));
    robot.add_behavior(
        20,
        from_fn("flaky", |_: &DesireSet, robot: &RobotSnapshot| {
            if robot.cycle == 2 {
                return Err(BehaviorError::Failed("sensor glitch".into()));
            }
            Ok(DesireSet::new())
        }),
    );
    {
        let fired = fired.clone();
        robot.add_behavior(
            10,
            from_fn("steady", move |_: &DesireSet, _: &RobotSnapshot| {
                fired.fetch_add(1, Ordering::SeqCst);
                let mut d = DesireSet::new();
                d.set_vel(150.0, MAX_STRENGTH);
                Ok(d)
            }),
        );
    }

    robot.run().unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 4);
    let metrics = robot.metrics();
    assert_eq!(metrics.cycles, 4);
    assert_eq!(metrics.behavior_faults, 1);
    assert_eq!(robot.motion_command().vel(), 150.0);
}

#[test]
fn test_direct_motion_suppresses_reflection() {
    let (robot, mut remote) = robot_with(fast_cycles(2));
    robot.add_behavior(10, ConstantVelocity::new("cruise", 300.0));
    robot.set_direct_motion(true);
    assert!(robot.is_direct_motion());

    robot.run().unwrap();

    assert_eq!(robot.motion_command().vel(), 300.0);
    assert!(remote.drain_packets().iter().all(|p| p.id() != CMD_VEL));

    // 原始命令照常发送
    robot.com_int(CMD_VEL, 42).unwrap();
    let packets = remote.drain_packets();
    assert_eq!(packets.len(), 1);
    assert_eq!(decode_int_arg(&packets[0]), Some(42));
}

#[test]
fn test_user_task_runs_after_arbitration() {
    let (robot, mut remote) = robot_with(fast_cycles(2));
    robot.add_behavior(10, ConstantVelocity::new("cruise", 250.0));
    robot.add_task("echo", 0, |tick: &mut TickContext<'_>| {
        let vel = tick
            .resolved
            .as_ref()
            .map(|d| d.vel().value())
            .unwrap_or_default();
        tick.state.battery_voltage = vel;
        tick.send(Packet::empty(0x42));
    });

    robot.run().unwrap();

    assert_eq!(robot.state().battery_voltage, 250.0);
    let echoes = remote
        .drain_packets()
        .iter()
        .filter(|p| p.id() == 0x42)
        .count();
    assert_eq!(echoes, 2);
}

#[test]
#[serial]
fn test_overrun_counted() {
    let (robot, _remote) = robot_with(fast_cycles(3));
    robot.add_task("slow", 0, |_: &mut TickContext<'_>| {
        thread::sleep(Duration::from_millis(15));
    });

    let started = Instant::now();
    robot.run().unwrap();

    // 超时后下一周期立即开始，不额外休眠
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(robot.metrics().cycle_overruns >= 2);
}

#[test]
#[serial]
fn test_stop_wakes_sleeping_cycle() {
    let (robot, _remote) = robot_with(CycleConfig {
        period_ms: 1000,
        max_cycles: None,
    });
    robot.run_async().unwrap();
    assert!(wait_until(|| robot.metrics().cycles == 1));

    let started = Instant::now();
    robot.stop_and_wait(Duration::from_secs(2)).unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_builder_builds_on_mock_link() {
    init_tracing();
    let (link, mut remote) = MockLink::pair();
    let robot = RobotBuilder::new().max_cycles(1).build(link).unwrap();
    robot.enable_motors(true).unwrap();
    let packet = remote
        .wait_for_packet(Duration::from_secs(1), |_| true)
        .unwrap();
    assert_eq!(decode_int_arg(&packet), Some(1));
    robot.run().unwrap();
    assert_eq!(robot.metrics().cycles, 1);
}

#[test]
#[serial]
fn test_tcp_send_to_stalled_controller_times_out() {
    init_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // 接受连接后从不读取
    let accept = thread::spawn(move || listener.accept().unwrap().0);

    let robot = RobotBuilder::new()
        .period_ms(20)
        .connect_tcp(addr, Duration::from_secs(1))
        .unwrap();
    let _stalled = accept.join().unwrap();

    let text = "x".repeat(200);
    let deadline = Instant::now() + Duration::from_secs(10);
    let err = loop {
        assert!(Instant::now() < deadline, "sends never timed out");
        if let Err(e) = robot.com_str(0x50, &text) {
            break e;
        }
    };

    assert!(matches!(err, DriverError::Link(arbiter_link::LinkError::Io(_))));
    assert!(robot.metrics().tx_errors >= 1);
    // 状态锁未被卡住
    assert!(!robot.lock().moving);
}

//! 仿真控制器端到端测试
//!
//! 驱动与 `SimulatedController` 通过内存回环链路连接，验证行为仲裁的结果
//! 经命令包到达底盘、底盘状态再经状态包回到行为的完整闭环。

use arbiter_sdk::prelude::*;
use arbiter_sdk::sim::{SimState, SimulatedController};
use serial_test::serial;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
#[serial]
fn test_robot_drives_simulated_base() {
    init_tracing();
    let (link, sim) = SimulatedController::pair();
    let sim = sim.spawn(Duration::from_millis(5));

    let robot = RobotBuilder::new().period_ms(10).build(link).unwrap();
    robot.enable_motors(true).unwrap();
    robot.add_behavior(10, ConstantVelocity::new("cruise", 400.0));
    robot.add_behavior(
        20,
        MovementParameters::new(
            "params",
            MovementParams {
                max_vel: 300.0,
                ..Default::default()
            },
        ),
    );
    robot.run_async().unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        let state = robot.state();
        state.motors_enabled() && state.x > 50.0
    }));
    robot.stop_and_wait(Duration::from_secs(1)).unwrap();

    let sim = sim.stop().unwrap();
    let state: &SimState = sim.state();
    assert_eq!(state.max_vel, 300.0);
    assert_eq!(state.target_vel, 400.0);
    assert!(state.vel <= 300.0);
    assert!(state.x > 50.0);
    assert!(state.heading.abs() < 1e-6);
}

#[test]
#[serial]
fn test_turn_on_limit_turns_simulated_base() {
    init_tracing();
    let (link, sim) = SimulatedController::pair();
    let sim = sim.spawn(Duration::from_millis(5));

    let robot = RobotBuilder::new().period_ms(10).build(link).unwrap();
    robot.enable_motors(true).unwrap();
    robot.add_behavior(10, ConstantVelocity::new("cruise", 300.0));
    robot.add_behavior(50, TurnOnLimit::new("turn", 200.0, 100.0, 20.0));
    // 更高优先级的行为把速度上限压到 100，触发完全转向
    robot.add_behavior(
        90,
        from_fn("obstacle", |_: &DesireSet, _: &RobotSnapshot| {
            let mut d = DesireSet::new();
            d.set_max_vel(100.0, MAX_STRENGTH, true);
            Ok(d)
        }),
    );
    robot.run_async().unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        robot.state().heading > 10.0
    }));
    robot.stop_and_wait(Duration::from_secs(1)).unwrap();

    assert!(matches!(
        robot.motion_command().rotation(),
        RotationCommand::Heading(_)
    ));
    let sim = sim.stop().unwrap();
    assert_eq!(sim.state().max_vel, 100.0);
}

#[test]
#[serial]
fn test_stop_behavior_halts_base() {
    init_tracing();
    let (link, sim) = SimulatedController::pair();
    let sim = sim.spawn(Duration::from_millis(5));

    let robot = RobotBuilder::new().period_ms(10).build(link).unwrap();
    robot.enable_motors(true).unwrap();
    robot.add_behavior(10, ConstantVelocity::new("cruise", 300.0));
    let stop = robot.add_behavior(90, Stop::new("stop"));
    robot.set_behavior_active(stop, false);
    robot.run_async().unwrap();

    assert!(wait_until(Duration::from_secs(3), || robot.state().vel > 100.0));

    robot.set_behavior_active(stop, true);
    assert!(wait_until(Duration::from_secs(3), || {
        let state = robot.state();
        state.vel == 0.0 && !state.moving
    }));
    assert_eq!(robot.motion_command().vel(), 0.0);

    robot.stop_and_wait(Duration::from_secs(1)).unwrap();
    drop(sim);
}

#[test]
#[serial]
fn test_controller_disconnect_stops_cycle() {
    init_tracing();
    let (link, sim) = SimulatedController::pair();
    let sim = sim.spawn(Duration::from_millis(5));

    let robot = RobotBuilder::new()
        .period_ms(10)
        .stop_on_disconnect(true)
        .build(link)
        .unwrap();
    robot.run_async().unwrap();
    assert!(wait_until(Duration::from_secs(2), || robot.is_responsive()));

    let mut sim = sim.stop().unwrap();
    sim.disconnect();

    assert!(robot.wait_for_stop(Some(Duration::from_secs(2))));
    assert_eq!(robot.status(), CycleStatus::Stopped);
    assert!(!robot.is_connected());
    assert!(matches!(robot.run_async(), Err(DriverError::Disconnected)));
}

#[test]
#[serial]
fn test_init_logging_is_idempotent() {
    let first = arbiter_sdk::init_logging();
    assert_eq!(arbiter_sdk::init_logging_with("debug"), first);
    tracing::info!("logging initialized: {}", first);
}

#[cfg(feature = "serde")]
#[test]
fn test_robot_config_serde() {
    let config = RobotBuilder::new()
        .period_ms(25)
        .max_cycles(40)
        .resolve_mode(ResolveMode::Average)
        .config()
        .clone();
    let json = serde_json::to_string(&config).unwrap();
    let back: RobotConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    // 缺省字段取默认值
    let partial: RobotConfig = serde_json::from_str(r#"{"cycle":{"period_ms":50}}"#).unwrap();
    assert_eq!(partial.cycle.period_ms, 50);
    assert_eq!(partial.reader, ReaderConfig::default());
}

mod proptests {
    use arbiter_sdk::sim::SimState;
    use arbiter_sdk::protocol::{CMD_ENABLE, CMD_SET_TRANS_ACCEL, CMD_VEL, com_int};
    use proptest::prelude::*;
    use std::time::Duration;

    proptest! {
        #[test]
        fn test_sim_velocity_never_exceeds_caps(target in -2000i16..2000, accel in 1i16..5000) {
            let mut state = SimState::default();
            state.apply_command(&com_int(CMD_ENABLE, 1));
            state.apply_command(&com_int(CMD_SET_TRANS_ACCEL, accel));
            state.apply_command(&com_int(CMD_VEL, target));

            let mut previous = 0.0f64;
            for _ in 0..50 {
                state.step(Duration::from_millis(20));
                prop_assert!(state.vel <= state.max_vel + 1e-9);
                prop_assert!(state.vel >= -state.max_neg_vel - 1e-9);
                prop_assert!((state.vel - previous).abs() <= f64::from(accel) * 0.02 + 1e-9);
                previous = state.vel;
            }
        }
    }
}

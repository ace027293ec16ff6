//! 仲裁场景测试
//!
//! 覆盖硬停止覆盖、多重限速平均和行为故障隔离等端到端场景。

use arbiter_action::{
    Behavior, BehaviorError, BehaviorSet, Channel, DesireSet, MAX_STRENGTH, MotionCommand,
    ResolveMode, Resolver, RobotSnapshot, from_fn,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn vel(value: f64, allow_override: bool) -> impl Behavior {
    from_fn(format!("vel-{}", value), move |_: &DesireSet, _: &RobotSnapshot| {
        let mut d = DesireSet::new();
        d.set(Channel::Vel, value, MAX_STRENGTH, allow_override);
        Ok(d)
    })
}

fn cap(value: f64) -> impl Behavior {
    from_fn(format!("cap-{}", value), move |_: &DesireSet, _: &RobotSnapshot| {
        let mut d = DesireSet::new();
        d.set_max_vel(value, MAX_STRENGTH, true);
        Ok(d)
    })
}

/// A 以 500 提议速度，B 以覆盖方式请求 0，按 A、B 顺序合并后硬停止胜出
#[test]
fn test_hard_stop_overrides_higher_priority() {
    init_tracing();
    let mut set = BehaviorSet::new();
    set.register(20, vel(500.0, true));
    set.register(10, vel(0.0, true));

    let mut resolver = Resolver::default();
    let resolved = resolver.resolve(&mut set, &RobotSnapshot::default());
    assert_eq!(resolved.vel().value(), 0.0);
    assert_eq!(resolved.vel().strength(), MAX_STRENGTH);
    assert!(resolved.vel().allow_override());
}

/// A 不允许覆盖时，A 已占满强度，B 的硬停止没有话语权
#[test]
fn test_non_override_first_contributor_keeps_value() {
    init_tracing();
    let mut set = BehaviorSet::new();
    set.register(20, vel(500.0, false));
    set.register(10, vel(0.0, true));

    let mut resolver = Resolver::default();
    let resolved = resolver.resolve(&mut set, &RobotSnapshot::default());
    assert_eq!(resolved.vel().value(), 500.0);
    assert!(!resolved.vel().allow_override());
}

/// 三个限速 800 / 500 / 300 以平均模式合并，结果为最严格的 300
#[test]
fn test_average_of_caps_picks_most_restrictive() {
    init_tracing();
    let mut set = BehaviorSet::new();
    set.register(0, cap(800.0));
    set.register(0, cap(500.0));
    set.register(0, cap(300.0));

    let mut resolver = Resolver::new(ResolveMode::Average);
    let resolved = resolver.resolve(&mut set, &RobotSnapshot::default());
    assert_eq!(resolved.max_vel().value(), 300.0);
    assert_eq!(resolved.max_vel().strength(), MAX_STRENGTH);

    // 优先级模式下同样取最小值
    resolver.set_mode(ResolveMode::Priority);
    let resolved = resolver.resolve(&mut set, &RobotSnapshot::default());
    assert_eq!(resolved.max_vel().value(), 300.0);
}

/// 第 N 个周期出错的行为不影响其他行为，第 N+1、N+2 个周期恢复正常
#[test]
fn test_faulting_behavior_isolated_per_cycle() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_behavior = calls.clone();

    let mut set = BehaviorSet::new();
    let flaky = set.register(
        50,
        from_fn("flaky", move |_: &DesireSet, _: &RobotSnapshot| {
            let n = calls_in_behavior.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                panic!("flaky behavior blew up");
            }
            let mut d = DesireSet::new();
            d.set_rot_vel(10.0, MAX_STRENGTH);
            Ok(d)
        }),
    );
    set.register(10, vel(200.0, false));

    let mut resolver = Resolver::default();
    let mut command = MotionCommand::default();

    for cycle in 1..=3u64 {
        let robot = RobotSnapshot {
            cycle,
            ..Default::default()
        };
        let resolved = resolver.resolve(&mut set, &robot).clone();
        command.apply(&resolved, robot.heading, cycle);

        assert_eq!(resolved.vel().value(), 200.0, "cycle {}", cycle);
        if cycle == 1 {
            assert_eq!(resolver.last_faults().len(), 1);
            assert_eq!(resolver.last_faults()[0].handle, flaky);
            assert!(matches!(
                resolver.last_faults()[0].error,
                BehaviorError::Panicked(_)
            ));
            assert!(!resolved.rot_vel().is_set());
        } else {
            assert!(resolver.last_faults().is_empty());
            assert_eq!(resolved.rot_vel().value(), 10.0);
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(resolver.fault_count(), 1);
    assert_eq!(command.vel(), 200.0);
}

/// 没有行为给出强度的通道保持上一周期的指令
#[test]
fn test_unset_channel_keeps_previous_command() {
    init_tracing();
    let mut set = BehaviorSet::new();
    let fast = set.register(10, vel(350.0, false));

    let mut resolver = Resolver::default();
    let mut command = MotionCommand::default();
    let robot = RobotSnapshot::default();

    command.apply(resolver.resolve(&mut set, &robot), 0.0, 1);
    assert_eq!(command.vel(), 350.0);

    set.set_active(fast, false);
    command.apply(resolver.resolve(&mut set, &robot), 0.0, 2);
    assert_eq!(command.vel(), 350.0);
    assert!(!command.changed(Channel::Vel));
}

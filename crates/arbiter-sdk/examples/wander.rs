//! 漫游演示
//!
//! 在仿真底盘上运行一组分层行为：巡航、速度上限、遇限转向与急停。
//! 每秒打印一次位姿，运行若干秒后停止。
//!
//! ```bash
//! RUST_LOG=arbiter_driver=debug,info cargo run -p arbiter-sdk --example wander
//! ```

use arbiter_sdk::prelude::*;
use arbiter_sdk::sim::SimulatedController;
use std::time::Duration;
use tracing::info;

// 距原点超过该半径（mm）时限速，触发转向
const FENCE_RADIUS: f64 = 1500.0;

fn main() -> Result<(), DriverError> {
    arbiter_sdk::init_logging();

    let (link, sim) = SimulatedController::pair();
    let sim = sim.spawn(Duration::from_millis(10));

    let robot = RobotBuilder::new().period_ms(50).build(link)?;
    robot.enable_motors(true)?;

    robot.add_behavior(10, ConstantVelocity::new("cruise", 400.0));
    robot.add_behavior(50, TurnOnLimit::new("turn", 200.0, 100.0, 30.0));
    robot.add_behavior(
        80,
        from_fn("fence", |_: &DesireSet, robot: &RobotSnapshot| {
            let mut d = DesireSet::new();
            if robot.x.hypot(robot.y) > FENCE_RADIUS {
                d.set_max_vel(100.0, MAX_STRENGTH, true);
            }
            Ok(d)
        }),
    );
    robot.add_behavior(
        100,
        MovementParameters::new(
            "params",
            MovementParams {
                max_vel: 500.0,
                trans_accel: 600.0,
                trans_decel: 800.0,
                max_rot_vel: 90.0,
                ..Default::default()
            },
        ),
    );

    for info in robot.list_behaviors() {
        info!("behavior {:?}", info);
    }

    robot.run_async()?;
    for _ in 0..10 {
        std::thread::sleep(Duration::from_secs(1));
        let state = robot.state();
        info!(
            "x={:.0} y={:.0} heading={:.1} vel={:.0}",
            state.x, state.y, state.heading, state.vel
        );
    }

    robot.stop_and_wait(Duration::from_secs(1))?;
    let metrics = robot.metrics();
    info!("{:?}", metrics);
    drop(sim);
    Ok(())
}

//! The tokio runner end to end, on virtual time.

use std::sync::Arc;
use std::time::Duration;

use robogrid::{CollectingNotifier, Config, Notifier, Role, Scenario, Simulation};

#[tokio::test(start_paused = true)]
async fn test_runner_drives_single_mover_to_target() {
    let notifier = Arc::new(CollectingNotifier::new());
    let mut sim = Simulation::from_scenario(
        &Scenario::open_field(),
        Config::default(),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    )
    .unwrap();
    sim.start();

    let settled = sim.wait_for_movers(Duration::from_secs(60)).await;
    sim.shutdown().await;

    assert!(settled, "mover did not settle on virtual time");
    let statuses = sim.statuses();
    let robot = statuses.iter().find(|s| s.id == "Robot1").unwrap();
    assert!(robot.reached_target);
    assert_eq!(robot.state, "stopped");
    assert!(notifier.contains("[Robot1] target reached"));
}

#[tokio::test(start_paused = true)]
async fn test_runner_boxed_in_mover_gives_up() {
    let notifier = Arc::new(CollectingNotifier::new());
    let mut sim = Simulation::from_scenario(
        &Scenario::boxed_in(),
        Config::default(),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    )
    .unwrap();
    sim.start();

    let settled = sim.wait_for_movers(Duration::from_secs(60)).await;
    sim.shutdown().await;

    assert!(settled, "giving up still counts as settling");
    let statuses = sim.statuses();
    let robot = statuses.iter().find(|s| s.id == "Robot1").unwrap();
    assert!(!robot.reached_target);
    assert_eq!(robot.state, "stopped");
    assert!(notifier.contains("[DEADLOCK] Robot1 cannot reach target - path blocked"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_agent_and_occupied_start_are_rejected() {
    let notifier: Arc<dyn Notifier> = Arc::new(CollectingNotifier::new());
    let mut sim = Simulation::new(Config::default(), notifier);

    sim.add_agent(robogrid::AgentSpec::mover(
        "Robot1",
        robogrid::Pos::new(0, 0),
        robogrid::Pos::new(4, 4),
    ))
    .unwrap();

    let duplicate = sim.add_agent(robogrid::AgentSpec::mover(
        "Robot1",
        robogrid::Pos::new(1, 1),
        robogrid::Pos::new(4, 4),
    ));
    assert!(duplicate.is_err());

    let collision = sim.add_agent(robogrid::AgentSpec::mover(
        "Robot2",
        robogrid::Pos::new(0, 0),
        robogrid::Pos::new(4, 4),
    ));
    assert!(collision.is_err());

    let statuses = sim.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].role, Role::Mover);
}

//! End-to-end runs of the full pipeline: panel event, controller, simulator,
//! and back.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use liftsim_kernel::PolicyConfig;
use liftsim_middleware::{ManualClock, TokioClock, handler};
use liftsim_runtime::{ElevatorSystem, SystemConfig, Transport};
use liftsim_types::{Channel, DoorState, Event, Payload};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const TICK_MS: u64 = 750;

struct Run {
    clock: Arc<ManualClock>,
    system: ElevatorSystem,
    motion: Arc<Mutex<Vec<(Channel, i32)>>>,
}

impl Run {
    fn starting_at(floor: i32) -> Self {
        let clock = Arc::new(ManualClock::new());
        let config = SystemConfig {
            policy: PolicyConfig::default().with_start_floor(floor),
            ..SystemConfig::default()
        };
        let system = ElevatorSystem::local(config, clock.clone());

        let motion = Arc::new(Mutex::new(Vec::new()));
        for channel in [Channel::SimFloorTick, Channel::SimArrived] {
            let motion = Arc::clone(&motion);
            system.bus().subscribe(
                channel,
                handler(move |e: &Event| {
                    if let Some(f) = e.payload.floor() {
                        motion.lock().unwrap().push((e.channel, f));
                    }
                }),
            );
        }
        Self {
            clock,
            system,
            motion,
        }
    }

    /// Advance virtual time in 50 ms steps, checking the door/motion
    /// invariant at every step.
    fn run_for(&self, ms: u64) {
        for _ in 0..ms / 50 {
            self.clock.advance_ms(50);
            let s = self.system.controller().unwrap().snapshot();
            if s.moving {
                assert_eq!(s.door, DoorState::Closed, "car moving with doors {}", s.door);
            }
        }
    }

    fn ticks(&self) -> Vec<i32> {
        self.motion
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == Channel::SimFloorTick)
            .map(|(_, f)| *f)
            .collect()
    }

    fn arrivals(&self) -> Vec<i32> {
        self.motion
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == Channel::SimArrived)
            .map(|(_, f)| *f)
            .collect()
    }
}

#[test]
fn hall_call_is_served_and_car_rests_with_doors_open() -> TestResult {
    let run = Run::starting_at(1);
    run.system.publish(Channel::HallCallUp, Payload::Floor(6))?;

    // Depart delay, five floors of travel, door opening.
    run.run_for(500 + 5 * TICK_MS + 1000);
    assert_eq!(run.ticks(), vec![2, 3, 4, 5, 6]);
    assert_eq!(run.arrivals(), vec![6]);

    let s = run.system.controller().unwrap().snapshot();
    assert_eq!(s.current_floor, 6);
    assert!(s.hall_up.is_empty());
    assert_eq!(s.door, DoorState::Open);

    run.run_for(3000);
    let s = run.system.controller().unwrap().snapshot();
    assert!(!s.moving);
    assert_eq!(s.target_floor, 6);
    assert_eq!(s.door, DoorState::Open);
    assert_eq!(run.ticks().len(), 5, "no further travel after the dwell");
    Ok(())
}

#[test]
fn obstruction_halts_travel_and_clearing_resumes_it() -> TestResult {
    let run = Run::starting_at(3);
    run.system.publish(Channel::CabinSelect, Payload::Floor(8))?;

    run.run_for(500 + 2 * TICK_MS);
    assert_eq!(run.ticks(), vec![4, 5]);

    run.system.publish(Channel::ObstructToggled, Payload::Flag(true))?;
    let s = run.system.controller().unwrap().snapshot();
    assert!(!s.moving);
    assert_eq!(s.target_floor, 5);
    assert_eq!(s.door, DoorState::Obstructed);
    assert_eq!(s.cabin, vec![8]);

    run.run_for(5000);
    assert_eq!(run.ticks(), vec![4, 5], "halted car stays put");
    assert!(!run.system.simulator().unwrap().snapshot().ticking);

    run.system.publish(Channel::ObstructToggled, Payload::Flag(false))?;
    run.run_for(1000 + 500 + 3 * TICK_MS);
    assert_eq!(run.ticks(), vec![4, 5, 6, 7, 8]);
    assert_eq!(run.arrivals(), vec![8]);
    assert!(run.system.controller().unwrap().snapshot().cabin.is_empty());
    Ok(())
}

#[test]
fn request_made_during_departure_waits_its_turn() -> TestResult {
    let run = Run::starting_at(5);
    run.system.publish(Channel::CabinSelect, Payload::Floor(9))?;
    run.system.publish(Channel::HallCallDown, Payload::Floor(3))?;

    // 9 was the only request when the car committed, so 3 waits.
    run.run_for(500 + 4 * TICK_MS + 1000 + 3000);
    assert_eq!(run.arrivals(), vec![9]);

    run.run_for(1000 + 500 + 6 * TICK_MS + 1000);
    assert_eq!(run.arrivals(), vec![9, 3]);
    Ok(())
}

#[test]
fn fire_recall_empties_requests_and_returns_to_lobby() -> TestResult {
    let run = Run::starting_at(4);
    run.system.publish(Channel::CabinSelect, Payload::Floor(7))?;
    run.system.publish(Channel::FireToggled, Payload::Flag(true))?;

    let ctrl = run.system.controller().unwrap();
    assert!(ctrl.snapshot().cabin.is_empty());
    assert!(ctrl.handle(liftsim_kernel::Input::CabinSelect(6)).is_err());

    run.run_for(500 + 4 * TICK_MS + 1000);
    let s = ctrl.snapshot();
    assert_eq!(s.current_floor, 0);
    assert_eq!(s.door, DoorState::Open);
    assert!(s.fire_mode);

    run.run_for(10_000);
    assert_eq!(ctrl.snapshot().door, DoorState::Open, "doors stay open in recall");
    Ok(())
}

#[test]
fn denials_are_published_on_the_bus() -> TestResult {
    let run = Run::starting_at(0);
    let denied = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&denied);
    run.system.bus().subscribe(
        Channel::RequestDenied,
        handler(move |e: &Event| sink.lock().unwrap().push(e.payload)),
    );

    run.system.publish(Channel::OverloadToggled, Payload::Flag(true))?;
    run.system.publish(Channel::HallCallUp, Payload::Floor(2))?;
    run.system.publish(Channel::CabinSelect, Payload::Floor(77))?;

    let denied = denied.lock().unwrap();
    assert_eq!(denied.len(), 2);
    assert!(run.ticks().is_empty());
    Ok(())
}

#[tokio::test]
async fn networked_system_serves_a_call() -> TestResult {
    let clock = Arc::new(TokioClock::start("liftsim-e2e-timer")?);
    let config = SystemConfig {
        policy: PolicyConfig::default()
            .with_door_transition(Duration::from_millis(20))
            .with_depart_delay(Duration::from_millis(10))
            .with_dwell(Duration::from_millis(50)),
        tick_period: Duration::from_millis(20),
        transport: Transport::Network(SocketAddr::from(([127, 0, 0, 1], 0))),
        ..SystemConfig::default()
    };
    let system = ElevatorSystem::connect(config, clock).await?;
    assert_eq!(system.bus_role(), Some(liftsim_middleware::BusRole::Hub));

    system.publish(Channel::HallCallUp, Payload::Floor(3))?;

    let ctrl = system.controller().unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let s = ctrl.snapshot();
            if s.current_floor == 3 && s.door == DoorState::Open {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

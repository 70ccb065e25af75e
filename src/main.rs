use std::{thread, time::Duration};

use boundbuf::{Direction, Event, Mode, SessionConfig, Simulator};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn run_session(simulator: &mut Simulator, mode: Mode) {
    let config = SessionConfig::default().with_mode(mode);
    let events = match simulator.start(config) {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "could not start session");
            return;
        }
    };

    thread::scope(|s| {
        s.spawn(|| {
            for event in events.iter() {
                match event {
                    Event::Item {
                        worker,
                        direction: Direction::Produced,
                        label,
                        ..
                    } => tracing::info!("{worker} produced {label}"),
                    Event::Item { worker, label, .. } => {
                        tracing::info!("{worker} consumed {label}")
                    }
                    Event::State { worker, state, .. } => tracing::debug!("{worker}: {state}"),
                    Event::Occupancy { len, .. } => tracing::debug!(len, "occupancy"),
                }
            }
        });

        thread::sleep(Duration::from_secs(3));
        match simulator.stop() {
            Ok(snapshot) => println!(
                "{mode}: produced {} consumed {} peak {} left {} ({})",
                snapshot.produced,
                snapshot.consumed,
                snapshot.peak,
                snapshot.occupancy,
                snapshot.status
            ),
            Err(err) => tracing::error!(error = %err, "stop failed"),
        }
        if let Err(err) = simulator.reset() {
            tracing::error!(error = %err, "reset failed");
        }
    });
}

fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let modes = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<Mode>() {
            Ok(mode) => vec![mode],
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(2);
            }
        },
        None => vec![Mode::Monitor, Mode::Semaphore],
    };

    let mut simulator = Simulator::default();
    for mode in modes {
        run_session(&mut simulator, mode);
    }
}

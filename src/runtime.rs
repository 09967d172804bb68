// Control task: sets up the control context, then runs the event loop
//
// Setup failures (config, peripherals, session, subscriber, publisher) abort the task.
// Once running, ticks and command arrivals are handled one at a time by a single loop.
// The only fatal error after setup is the command subscription closing, which means the
// session itself is gone.

use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use zenoh::qos::CongestionControl;

use crate::board::{AnalogInput, PeripheralError, PowerLatch, PwmBank, SerialBridge, SimBoard};
use crate::config::{Args, PWM_FREQ_HZ, PWM_RESOLUTION_BITS};
use crate::control::{ControlEvent, ControlLoop, LoopFlow};
use crate::drive::{ActuatorDriver, KinematicMapper};
use crate::error::ControlError;
use crate::messages::SteeringCommand;
use crate::sensor::{VoltageCalibration, VoltageSensor};
use crate::telemetry::ZenohTelemetry;

/// Parse a steering command payload, logging and dropping malformed ones
pub fn decode_command(payload: &[u8]) -> Option<SteeringCommand> {
    match serde_json::from_slice::<SteeringCommand>(payload) {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            warn!("Failed to parse command: {}", e);
            None
        }
    }
}

pub async fn run(args: Args) -> Result<(), ControlError> {
    let period = args.tick_period()?;
    let mapper = KinematicMapper::new(args.duty_range()?);
    let calibration = args.calibration()?;

    match &args.port {
        Some(port) => {
            info!("Opening I/O bridge on {}", port);
            let bridge = SerialBridge::open(port).map_err(ControlError::Setup)?;
            if !bridge.ping().map_err(ControlError::Setup)? {
                return Err(ControlError::Setup(PeripheralError::Timeout));
            }
            run_on(bridge, &args, period, mapper, calibration).await
        }
        None => {
            warn!("No bridge port given, driving the simulated bench board");
            run_on(SimBoard::new(), &args, period, mapper, calibration).await
        }
    }
}

/// Latch the supply on and zero all four channels before anything else runs
fn prepare_control<B>(
    mut board: B,
    mapper: KinematicMapper,
    calibration: VoltageCalibration,
) -> Result<ControlLoop<B, B>, ControlError>
where
    B: PwmBank + AnalogInput + PowerLatch + Clone,
{
    board.hold_power().map_err(ControlError::Setup)?;

    let mut driver = ActuatorDriver::new(board.clone());
    driver.stop().map_err(ControlError::Setup)?;
    let sensor = VoltageSensor::new(board, calibration);
    Ok(ControlLoop::new(driver, sensor, mapper))
}

/// Resolves once a stop is requested. If the handler cannot be installed there is
/// no shutdown source and this never resolves.
async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Signal handler unavailable, running without Ctrl-C shutdown: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_on<B>(
    board: B,
    args: &Args,
    period: Duration,
    mapper: KinematicMapper,
    calibration: VoltageCalibration,
) -> Result<(), ControlError>
where
    B: PwmBank + AnalogInput + PowerLatch + Clone,
{
    // Telemetry shares the tick budget; a stalled put is abandoned, not waited on
    let mut control = prepare_control(board, mapper, calibration)?.with_publish_timeout(period);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default())
        .await
        .map_err(ControlError::Session)?;

    info!("Setting up publisher and subscriber...");
    let subscriber = session
        .declare_subscriber(&args.cmd_topic)
        .await
        .map_err(|source| ControlError::Declare {
            what: "subscriber",
            topic: args.cmd_topic.clone(),
            source,
        })?;
    let publisher = session
        .declare_publisher(args.battery_topic.clone())
        .congestion_control(CongestionControl::Block)
        .await
        .map_err(|source| ControlError::Declare {
            what: "publisher",
            topic: args.battery_topic.clone(),
            source,
        })?;
    let telemetry = ZenohTelemetry::new(publisher);

    // A late tick is dropped rather than replayed
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal(tokio::signal::ctrl_c());
    tokio::pin!(shutdown);

    info!(
        "Control loop started: {}ms tick, PWM {}Hz/{}-bit",
        period.as_millis(),
        PWM_FREQ_HZ,
        PWM_RESOLUTION_BITS
    );
    info!("Subscribed to: {}", args.cmd_topic);
    info!("Publishing to: {}", args.battery_topic);

    loop {
        let event = tokio::select! {
            _ = tick.tick() => ControlEvent::TimerTick,
            sample = subscriber.recv_async() => match sample {
                Ok(sample) => match decode_command(&sample.payload().to_bytes()) {
                    Some(cmd) => ControlEvent::CommandArrived(cmd),
                    None => continue,
                },
                Err(e) => {
                    // Nothing can reach the wheels any more; stop them before bailing out
                    control.handle(ControlEvent::Shutdown, &telemetry).await?;
                    return Err(ControlError::Subscription(e));
                }
            },
            _ = &mut shutdown => ControlEvent::Shutdown,
        };

        if control.handle(event, &telemetry).await? == LoopFlow::Stop {
            break;
        }
    }

    info!(
        "Control loop stopped after {} ticks ({} faulted)",
        control.ticks(),
        control.faults()
    );
    Ok(())
}

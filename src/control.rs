// Periodic control loop
//
// One tick: sample command and battery -> compute wheel commands -> actuate -> publish.
// Command arrivals only update the ingress cell; actuation happens on ticks alone,
// so a new command takes effect at most one tick period after it arrives.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::board::{AnalogInput, PwmBank};
use crate::config::TICK_PERIOD_MS;
use crate::drive::{ActuatorDriver, DriveOutput, KinematicMapper};
use crate::error::ControlError;
use crate::ingress::CommandIngress;
use crate::messages::{BatteryReading, SteeringCommand};
use crate::sensor::VoltageSensor;
use crate::telemetry::TelemetrySink;

/// Everything the loop reacts to, in arrival order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    TimerTick,
    CommandArrived(SteeringCommand),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Sampling,
    Computing,
    Actuating,
    Publishing,
}

/// Whether the loop keeps consuming events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopFlow {
    Continue,
    Stop,
}

/// Outcome of one completed tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub command: SteeringCommand,
    pub output: DriveOutput,
    pub battery: BatteryReading,
    pub published: bool,
}

pub struct ControlLoop<P: PwmBank, A: AnalogInput> {
    ingress: CommandIngress,
    mapper: KinematicMapper,
    driver: ActuatorDriver<P>,
    sensor: VoltageSensor<A>,
    state: ControlState,
    publish_timeout: Duration,
    ticks: u64,
    faults: u64,
}

impl<P: PwmBank, A: AnalogInput> ControlLoop<P, A> {
    pub fn new(driver: ActuatorDriver<P>, sensor: VoltageSensor<A>, mapper: KinematicMapper) -> Self {
        Self {
            ingress: CommandIngress::new(),
            mapper,
            driver,
            sensor,
            state: ControlState::Idle,
            publish_timeout: Duration::from_millis(TICK_PERIOD_MS),
            ticks: 0,
            faults: 0,
        }
    }

    /// Upper bound on one telemetry publish; a stalled transport is abandoned after this.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn ingress(&self) -> &CommandIngress {
        &self.ingress
    }

    pub fn driver(&self) -> &ActuatorDriver<P> {
        &self.driver
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that ended in a recoverable fault
    pub fn faults(&self) -> u64 {
        self.faults
    }

    fn enter(&mut self, state: ControlState) {
        trace!("Tick {}: {:?} -> {:?}", self.ticks, self.state, state);
        self.state = state;
    }

    pub fn on_command(&mut self, cmd: SteeringCommand) {
        self.ingress.update(cmd);
    }

    /// Run one full cycle.
    ///
    /// Actuation always completes before anything can fail the tick: a battery read
    /// fault is reported after the wheels were driven, and a publish failure or a publish
    /// that outlives `publish_timeout` is only logged (`published == false`).
    pub async fn tick<S: TelemetrySink>(&mut self, sink: &S) -> Result<TickReport, ControlError> {
        self.ticks += 1;

        self.enter(ControlState::Sampling);
        let command = self.ingress.latest();
        let sample = self.sensor.read();

        self.enter(ControlState::Computing);
        let output = self.mapper.map(command.linear, command.angular);

        self.enter(ControlState::Actuating);
        self.driver.apply_output(&output);
        let committed = self.driver.commit();
        if let Err(e) = committed {
            self.enter(ControlState::Idle);
            return Err(e.into());
        }

        let voltage = match sample {
            Ok(voltage) => voltage,
            Err(e) => {
                self.enter(ControlState::Idle);
                return Err(e.into());
            }
        };
        let battery = BatteryReading { voltage };

        self.enter(ControlState::Publishing);
        let publish = tokio::time::timeout(self.publish_timeout, sink.publish(&battery))
            .await
            .unwrap_or(Err(ControlError::PublishTimeout(self.publish_timeout)));
        let published = match publish {
            Ok(()) => true,
            Err(e) => {
                warn!("Tick {}: telemetry not published: {}", self.ticks, e);
                false
            }
        };

        self.enter(ControlState::Idle);
        debug!(
            "Tick {}: cmd=({:.2}, {:.2}) left={:?}/{} right={:?}/{} batt={:.2}V",
            self.ticks,
            command.linear,
            command.angular,
            output.left.direction,
            output.left.duty,
            output.right.direction,
            output.right.duty,
            voltage
        );

        Ok(TickReport {
            tick: self.ticks,
            command,
            output,
            battery,
            published,
        })
    }

    /// Handle one event to completion.
    ///
    /// Recoverable tick errors are logged and counted; only fatal ones are returned.
    pub async fn handle<S: TelemetrySink>(
        &mut self,
        event: ControlEvent,
        sink: &S,
    ) -> Result<LoopFlow, ControlError> {
        match event {
            ControlEvent::TimerTick => match self.tick(sink).await {
                Ok(_) => Ok(LoopFlow::Continue),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    self.faults += 1;
                    warn!("Tick {} faulted, continuing: {}", self.ticks, e);
                    Ok(LoopFlow::Continue)
                }
            },
            ControlEvent::CommandArrived(cmd) => {
                self.on_command(cmd);
                Ok(LoopFlow::Continue)
            }
            ControlEvent::Shutdown => {
                info!("Shutdown requested after {} ticks", self.ticks);
                if let Err(e) = self.driver.stop() {
                    warn!("Failed to stop motors on shutdown: {}", e);
                }
                Ok(LoopFlow::Stop)
            }
        }
    }
}

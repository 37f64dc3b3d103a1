use super::error::PinError;
use embedded_hal::digital::v2::OutputPin as HalOutputPin;
use embedded_hal::PwmPin;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const PWM_RANGE: u8 = 100;

/// Pulse-width modulation in software on top of any `embedded_hal` output pin.
///
/// A worker thread repeats a period of `RANGE` pulse units: the pin is high for `duty` units and low for the rest.
/// With the default 100 µs unit the period is 10 ms, so the output looks steady to the eye while blinking at up to 10 Hz on top of it.
///
/// The duty is only applied while the output is enabled; a disabled output is held low.
/// The worker stops on the first pin error and `check` reports it from then on.
pub struct SoftPwm<P: HalOutputPin + Send + 'static> {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<P>>,
}

#[derive(Debug, Default)]
struct Shared {
    duty: AtomicU8,
    enabled: AtomicBool,
    stop: AtomicBool,
    fault: Mutex<Option<String>>,
}

impl<P> SoftPwm<P>
where
    P: HalOutputPin + Send + 'static,
    P::Error: Debug,
{
    pub const RANGE: u8 = PWM_RANGE;
    pub const PULSE_UNIT: Duration = Duration::from_micros(100);

    /// Takes ownership of the pin and starts the worker with the output disabled.
    pub fn new(pin: P) -> Result<Self, PinError> {
        Self::with_pulse_unit(pin, Self::PULSE_UNIT)
    }

    pub fn with_pulse_unit(pin: P, pulse_unit: Duration) -> Result<Self, PinError> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name("soft-pwm".into())
            .spawn(move || run_worker(pin, &worker_shared, pulse_unit))
            .map_err(|err| PinError::PwmWorkerStopped(err.to_string()))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Returns an error when the worker has stopped driving the pin.
    pub fn check(&self) -> Result<(), PinError> {
        let fault = self
            .shared
            .fault
            .lock()
            .map_err(|_| PinError::PwmWorkerStopped("fault state poisoned".into()))?;

        match fault.as_ref() {
            Some(reason) => Err(PinError::PwmWorkerStopped(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Stops the worker, leaves the pin low and hands it back.
    pub fn into_inner(mut self) -> Option<P> {
        self.stop_worker()
    }

    fn stop_worker(&mut self) -> Option<P> {
        self.shared.stop.store(true, Ordering::Release);
        self.worker.take().and_then(|worker| worker.join().ok())
    }
}

fn run_worker<P>(mut pin: P, shared: &Shared, pulse_unit: Duration) -> P
where
    P: HalOutputPin,
    P::Error: Debug,
{
    let range = u32::from(PWM_RANGE);

    while !shared.stop.load(Ordering::Acquire) {
        let mark = if shared.enabled.load(Ordering::Acquire) {
            u32::from(shared.duty.load(Ordering::Acquire).min(PWM_RANGE))
        } else {
            0
        };

        let result = if mark > 0 {
            pin.set_high().map(|_| thread::sleep(pulse_unit * mark))
        } else {
            Ok(())
        };
        let result = result.and_then(|_| {
            if mark < range {
                let space = pulse_unit * (range - mark);
                pin.set_low().map(|_| thread::sleep(space))
            } else {
                Ok(())
            }
        });

        if let Err(err) = result {
            log::error!("software PWM pin write failed: {:?}", err);
            if let Ok(mut fault) = shared.fault.lock() {
                *fault = Some(format!("{:?}", err));
            }
            break;
        }
    }

    let _ = pin.set_low();
    pin
}

impl<P> PwmPin for SoftPwm<P>
where
    P: HalOutputPin + Send + 'static,
    P::Error: Debug,
{
    type Duty = u8;

    fn disable(&mut self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    fn enable(&mut self) {
        self.shared.enabled.store(true, Ordering::Release);
    }

    fn get_duty(&self) -> u8 {
        self.shared.duty.load(Ordering::Acquire)
    }

    fn get_max_duty(&self) -> u8 {
        Self::RANGE
    }

    fn set_duty(&mut self, duty: u8) {
        let duty = duty.min(Self::RANGE);
        self.shared.duty.store(duty, Ordering::Release);
    }
}

impl<P: HalOutputPin + Send + 'static> Drop for SoftPwm<P> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

//! Vehicle command transport contract.

use anyhow::Result;

/// Acknowledgment returned by the vehicle for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Success,
    /// Any non-success reply, carrying the raw response text.
    Rejected(String),
}

impl Ack {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Synchronous request/acknowledgment channel to the vehicle.
///
/// Every call blocks until the vehicle answers or the transport times out.
/// `Err` means the request could not be delivered or answered at all;
/// `Ok(Ack::Rejected(..))` means the vehicle answered with a refusal.
pub trait VehicleTransport {
    /// Request take-off. Safe to repeat until acknowledged.
    fn takeoff(&mut self) -> Result<Ack>;

    fn enable_control(&mut self) -> Result<Ack>;

    /// Send one velocity setpoint. Arguments are already bounded.
    fn send_velocity(&mut self, ascent: f64, roll: f64, pitch: f64) -> Result<Ack>;

    fn disable_control(&mut self) -> Result<Ack>;
}

impl<T: VehicleTransport + ?Sized> VehicleTransport for Box<T> {
    fn takeoff(&mut self) -> Result<Ack> {
        (**self).takeoff()
    }

    fn enable_control(&mut self) -> Result<Ack> {
        (**self).enable_control()
    }

    fn send_velocity(&mut self, ascent: f64, roll: f64, pitch: f64) -> Result<Ack> {
        (**self).send_velocity(ascent, roll, pitch)
    }

    fn disable_control(&mut self) -> Result<Ack> {
        (**self).disable_control()
    }
}
